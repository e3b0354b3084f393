use crate::db;
use crate::domain::insights::{format_answers, local_insights};
use crate::domain::models::{unit_scores, Answer, Trait, TraitScores, SCALE_MAX, SCALE_MIN};
use crate::domain::scoring;
use crate::error::AppError;
use crate::state::{AppState, SharedState};
use crate::web::extract::{ApiJson, ApiPath};
use crate::web::session::UserSession;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use uuid::Uuid;

const MAX_ANSWERS: usize = 200;
const MAX_QUESTION_TEXT: usize = 500;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", post(submit).get(list))
        .route("/:id", get(detail))
        .route("/:id/insights", post(regenerate_insights))
        .with_state(state)
}

/// A completed test as sent by the client.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub answers: Vec<Answer>,
    pub trait_scores: TraitScores,
}

/// Checks `{answers: Answer[], traitScores: {trait: score}}` field by field
/// so the caller learns exactly what was wrong.
pub fn parse_submission(body: &Value) -> Result<Submission, AppError> {
    let obj = body
        .as_object()
        .ok_or_else(|| AppError::validation("body must be a JSON object"))?;

    let raw_answers = obj
        .get("answers")
        .and_then(Value::as_array)
        .ok_or_else(|| AppError::validation("answers must be an array"))?;
    if raw_answers.len() > MAX_ANSWERS {
        return Err(AppError::validation(format!("at most {MAX_ANSWERS} answers are accepted")));
    }

    let mut answers = Vec::with_capacity(raw_answers.len());
    let mut seen = HashSet::new();
    for (i, raw) in raw_answers.iter().enumerate() {
        let answer: Answer = serde_json::from_value(raw.clone())
            .map_err(|_| AppError::validation(format!("answers[{i}] is malformed")))?;
        if answer.question_id.trim().is_empty() {
            return Err(AppError::validation(format!("answers[{i}] has no questionId")));
        }
        if !(SCALE_MIN..=SCALE_MAX).contains(&(answer.value as f64)) {
            return Err(AppError::validation(format!(
                "answers[{i}].value must be between {SCALE_MIN} and {SCALE_MAX}"
            )));
        }
        if answer
            .question_text
            .as_ref()
            .is_some_and(|text| text.chars().count() > MAX_QUESTION_TEXT)
        {
            return Err(AppError::validation(format!(
                "answers[{i}].questionText is longer than {MAX_QUESTION_TEXT} characters"
            )));
        }
        if !seen.insert(answer.question_id.clone()) {
            return Err(AppError::validation(format!(
                "question {} answered more than once",
                answer.question_id
            )));
        }
        answers.push(answer);
    }

    let raw_scores = obj
        .get("traitScores")
        .and_then(Value::as_object)
        .ok_or_else(|| AppError::validation("traitScores must be an object"))?;
    let mut trait_scores = TraitScores::new();
    for (key, raw) in raw_scores {
        let category = key
            .parse::<Trait>()
            .map_err(|_| AppError::validation(format!("unknown trait '{key}'")))?;
        let score = raw
            .as_f64()
            .filter(|s| s.is_finite() && (SCALE_MIN..=SCALE_MAX).contains(s))
            .ok_or_else(|| {
                AppError::validation(format!(
                    "traitScores.{key} must be a number between {SCALE_MIN} and {SCALE_MAX}"
                ))
            })?;
        trait_scores.insert(category, score);
    }

    if answers.is_empty() && trait_scores.is_empty() {
        return Err(AppError::validation("submission has no answers or scores"));
    }

    Ok(Submission {
        answers,
        trait_scores,
    })
}

/// Scores recomputed from the answers win; the client's map only stands in
/// when no answers were sent.
pub fn canonical_scores(submission: &Submission) -> TraitScores {
    if submission.answers.is_empty() {
        submission.trait_scores.clone()
    } else {
        scoring::score_answers(&submission.answers)
    }
}

/// Stores a completed test with rule-table insights. Storage errors are
/// surfaced: the user has to know the result was not saved.
pub async fn persist_submission(
    state: &AppState,
    user_id: Uuid,
    submission: &Submission,
) -> Result<Uuid, AppError> {
    let scores = canonical_scores(submission);
    let insights = local_insights(&scores);
    let enc_answers = state
        .crypto
        .seal_json(&submission.answers)
        .map_err(|e| AppError::Internal(e.into()))?;

    let test_id =
        db::insert_test_result(&state.pool, user_id, &enc_answers, &scores, &insights, Utc::now())
            .await
            .map_err(|e| {
                tracing::error!("Failed to save test result for {}: {}", user_id, e);
                AppError::PersistenceFailure(e)
            })?;

    tracing::info!(
        "Saved test result {} for {} ({} answers, {} traits)",
        test_id,
        user_id,
        submission.answers.len(),
        scores.len()
    );
    Ok(test_id)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    test_id: Uuid,
}

async fn submit(
    UserSession(user_id): UserSession,
    State(state): State<SharedState>,
    ApiJson(body): ApiJson<Value>,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    let submission = parse_submission(&body)?;
    let test_id = persist_submission(&state, user_id, &submission).await?;
    Ok((StatusCode::CREATED, Json(SubmitResponse { test_id })))
}

async fn list(
    UserSession(user_id): UserSession,
    State(state): State<SharedState>,
) -> Result<Json<Vec<db::TestResultSummary>>, AppError> {
    Ok(Json(db::list_test_results(&state.pool, user_id).await?))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TestResultView {
    id: Uuid,
    answers: Vec<Answer>,
    trait_scores: TraitScores,
    normalized_scores: TraitScores,
    dominant_trait: Option<Trait>,
    insights: Vec<String>,
    created_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    insights_updated_at: Option<DateTime<Utc>>,
    share_count: i32,
}

/// Loads a result the caller owns; anyone else gets a plain 404.
async fn load_owned(
    state: &AppState,
    user_id: Uuid,
    test_id: Uuid,
) -> Result<(crate::domain::models::TestResultRow, Vec<Answer>), AppError> {
    let row = db::get_test_result(&state.pool, test_id)
        .await?
        .filter(|row| row.user_id == user_id)
        .ok_or(AppError::NotFound("test result"))?;
    let answers: Vec<Answer> = state
        .crypto
        .open_json(&row.enc_answers)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("answers for {test_id} unreadable: {e}")))?;
    Ok((row, answers))
}

async fn detail(
    UserSession(user_id): UserSession,
    State(state): State<SharedState>,
    ApiPath(test_id): ApiPath<Uuid>,
) -> Result<Json<TestResultView>, AppError> {
    let (row, answers) = load_owned(&state, user_id, test_id).await?;
    let scores = row.trait_scores.0;

    Ok(Json(TestResultView {
        id: row.id,
        answers,
        normalized_scores: unit_scores(&scores),
        dominant_trait: scoring::dominant_trait(&scores),
        trait_scores: scores,
        insights: row.insights.0,
        created_at: row.created_at,
        completed_at: row.completed_at,
        insights_updated_at: row.insights_updated_at,
        share_count: row.share_count,
    }))
}

#[derive(Serialize)]
struct InsightsResponse {
    insights: Vec<String>,
}

async fn regenerate_insights(
    UserSession(user_id): UserSession,
    State(state): State<SharedState>,
    ApiPath(test_id): ApiPath<Uuid>,
) -> Result<Json<InsightsResponse>, AppError> {
    let (row, answers) = load_owned(&state, user_id, test_id).await?;
    let scores = row.trait_scores.0;

    let insights = state
        .insights
        .generate(&scores, &format_answers(&answers))
        .await;

    if let Err(e) = db::update_insights(&state.pool, test_id, &insights).await {
        // unsaved AI text is not shown; fall back to the rule table
        tracing::error!("Failed to store regenerated insights for {}: {}", test_id, e);
        return Ok(Json(InsightsResponse {
            insights: local_insights(&scores),
        }));
    }
    Ok(Json(InsightsResponse { insights }))
}
