use crate::db;
use crate::domain::models::{unit_scores, SharedResult, Trait, TraitScores};
use crate::domain::scoring;
use crate::error::AppError;
use crate::middleware::rate_limit::rate_limit_middleware;
use crate::state::SharedState;
use crate::web::extract::{ApiJson, ApiPath};
use crate::web::session::UserSession;
use axum::{
    extract::State,
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SHARE_ID_LEN: usize = 22;

pub fn router(state: SharedState) -> Router {
    let public = Router::new()
        .route("/:share_id", get(view))
        .route_layer(middleware::from_fn_with_state(
            state.share_limiter.clone(),
            rate_limit_middleware,
        ))
        .with_state(state.clone());

    Router::new()
        .route("/", post(create))
        .with_state(state)
        .merge(public)
}

pub fn generate_share_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SHARE_ID_LEN)
        .map(char::from)
        .collect()
}

/// An existing share is handed out again as long as it has not expired.
pub fn reusable_share(existing: Option<SharedResult>, now: DateTime<Utc>) -> Option<SharedResult> {
    existing.filter(|share| share.is_active(now))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateShareRequest {
    test_id: Uuid,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShareResponse {
    share_id: String,
    expires_at: DateTime<Utc>,
}

impl From<SharedResult> for ShareResponse {
    fn from(share: SharedResult) -> Self {
        Self {
            share_id: share.share_id,
            expires_at: share.expires_at,
        }
    }
}

async fn create(
    UserSession(user_id): UserSession,
    State(state): State<SharedState>,
    ApiJson(payload): ApiJson<CreateShareRequest>,
) -> Result<Json<ShareResponse>, AppError> {
    let test_id = payload.test_id;
    db::get_test_result(&state.pool, test_id)
        .await?
        .filter(|row| row.user_id == user_id)
        .ok_or(AppError::NotFound("test result"))?;

    let now = Utc::now();
    if let Some(share) = reusable_share(db::find_share_for_test(&state.pool, test_id).await?, now) {
        return Ok(Json(share.into()));
    }

    let share_id = generate_share_id();
    let share = match db::issue_share(&state.pool, test_id, &share_id, now, now + state.share_ttl).await? {
        Some(issued) => {
            tracing::info!("Issued share link for test {}", test_id);
            issued
        }
        // lost a race with a concurrent request for the same test
        None => reusable_share(db::find_share_for_test(&state.pool, test_id).await?, now)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("share for {test_id} not readable after upsert")))?,
    };
    Ok(Json(share.into()))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PublicResultView {
    trait_scores: TraitScores,
    normalized_scores: TraitScores,
    dominant_trait: Option<Trait>,
    insights: Vec<String>,
    completed_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    view_count: i32,
}

async fn view(
    State(state): State<SharedState>,
    ApiPath(share_id): ApiPath<String>,
) -> Result<Json<PublicResultView>, AppError> {
    if share_id.len() != SHARE_ID_LEN || !share_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::NotFound("share link"));
    }

    let share = db::record_share_view(&state.pool, &share_id, Utc::now())
        .await?
        .ok_or(AppError::NotFound("share link"))?;
    let row = db::get_test_result(&state.pool, share.test_id)
        .await?
        .ok_or(AppError::NotFound("share link"))?;
    let scores = row.trait_scores.0;

    Ok(Json(PublicResultView {
        normalized_scores: unit_scores(&scores),
        dominant_trait: scoring::dominant_trait(&scores),
        trait_scores: scores,
        insights: row.insights.0,
        completed_at: row.completed_at,
        expires_at: share.expires_at,
        view_count: share.view_count,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn share(expires_in: Duration) -> SharedResult {
        let now = Utc::now();
        SharedResult {
            share_id: generate_share_id(),
            test_id: Uuid::new_v4(),
            created_at: now,
            expires_at: now + expires_in,
            view_count: 0,
        }
    }

    #[test]
    fn test_share_id_shape() {
        let id = generate_share_id();
        assert_eq!(id.len(), SHARE_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, generate_share_id());
    }

    #[test]
    fn test_active_share_reused() {
        let existing = share(Duration::days(30));
        let reused = reusable_share(Some(existing.clone()), Utc::now()).unwrap();
        assert_eq!(reused.share_id, existing.share_id);

        // asking twice gives the same id
        let again = reusable_share(Some(existing.clone()), Utc::now()).unwrap();
        assert_eq!(again.share_id, reused.share_id);
    }

    #[test]
    fn test_expired_share_not_reused() {
        assert!(reusable_share(Some(share(Duration::seconds(-1))), Utc::now()).is_none());
        assert!(reusable_share(None, Utc::now()).is_none());
    }
}
