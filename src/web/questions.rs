use crate::domain::models::{Answer, Question, TraitScores};
use crate::domain::question_bank;
use crate::error::AppError;
use crate::services::questions::DEFAULT_ADAPTIVE_COUNT;
use crate::state::SharedState;
use crate::web::extract::{ApiJson, ApiQuery};
use crate::web::session::UserSession;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

const DEFAULT_INITIAL_COUNT: usize = 10;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/initial", get(initial))
        .route("/adaptive", post(adaptive))
        .with_state(state)
}

#[derive(Deserialize)]
struct InitialParams {
    count: Option<usize>,
    seed: Option<u64>,
}

#[derive(Serialize)]
struct QuestionsResponse {
    questions: Vec<Question>,
}

async fn initial(ApiQuery(params): ApiQuery<InitialParams>) -> Json<QuestionsResponse> {
    let count = params.count.unwrap_or(DEFAULT_INITIAL_COUNT);
    Json(QuestionsResponse {
        questions: question_bank::initial_questions(count, params.seed),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdaptiveRequest {
    #[serde(default)]
    previous_answers: Vec<Answer>,
    #[serde(default)]
    current_scores: TraitScores,
    count: Option<usize>,
}

async fn adaptive(
    UserSession(user_id): UserSession,
    State(state): State<SharedState>,
    ApiJson(payload): ApiJson<AdaptiveRequest>,
) -> Result<Json<QuestionsResponse>, AppError> {
    tracing::debug!(
        "Adaptive questions requested by {} after {} answers",
        user_id,
        payload.previous_answers.len()
    );
    let questions = state
        .questions
        .request_adaptive_questions(
            &payload.previous_answers,
            &payload.current_scores,
            payload.count.unwrap_or(DEFAULT_ADAPTIVE_COUNT),
        )
        .await;
    Ok(Json(QuestionsResponse { questions }))
}
