use crate::domain::models::Question;
use crate::domain::question_bank;
use crate::domain::test_flow::{FlowError, SessionStatus, TestSession};
use crate::error::AppError;
use crate::services::questions::DEFAULT_ADAPTIVE_COUNT;
use crate::state::{AppState, HostedSession, SharedState};
use crate::web::extract::{ApiJson, ApiPath};
use crate::web::results::{persist_submission, Submission};
use crate::web::session::UserSession;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DEFAULT_SESSION_QUESTIONS: usize = 10;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", post(start))
        .route("/:id", get(current))
        .route("/:id/answer", post(answer))
        .route("/:id/previous", post(previous))
        .route("/:id/submit", post(submit))
        .with_state(state)
}

impl From<FlowError> for AppError {
    fn from(err: FlowError) -> Self {
        match err {
            FlowError::NotPresenting | FlowError::NotSubmitting | FlowError::AlreadyAdaptive => {
                AppError::Conflict(err.to_string())
            }
            FlowError::InvalidValue(_) | FlowError::Incomplete { .. } => {
                AppError::Validation(err.to_string())
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    session_id: Uuid,
    status: SessionStatus,
    question: Option<Question>,
    current_value: Option<i16>,
    total_questions: usize,
    answered_count: usize,
    use_ai: bool,
    adaptive: bool,
}

impl SessionView {
    fn of(session_id: Uuid, session: &TestSession) -> Self {
        Self {
            session_id,
            status: session.status(),
            question: session.current_question().cloned(),
            current_value: session.current_value(),
            total_questions: session.total_questions(),
            answered_count: session.answered_count(),
            use_ai: session.use_ai(),
            adaptive: session.is_adaptive(),
        }
    }
}

/// Runs `f` against the caller's session under the registry lock. Sessions
/// owned by someone else look exactly like missing ones.
async fn with_session<T>(
    state: &AppState,
    user_id: Uuid,
    session_id: Uuid,
    f: impl FnOnce(&mut TestSession) -> Result<T, AppError>,
) -> Result<T, AppError> {
    let mut sessions = state.test_sessions.write().await;
    let hosted = sessions
        .get_mut(&session_id)
        .filter(|hosted| hosted.owner == user_id)
        .ok_or(AppError::NotFound("test session"))?;
    hosted.last_touched = Utc::now();
    f(&mut hosted.session)
}

#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    count: Option<usize>,
    use_ai: Option<bool>,
    seed: Option<u64>,
}

/// An empty body means "all defaults"; anything else has to be valid JSON.
pub fn parse_start_request(body: &[u8]) -> Result<StartRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(StartRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::validation(format!("invalid session request: {e}")))
}

pub async fn start_session(state: &AppState, user_id: Uuid, request: StartRequest) -> SessionView {
    let questions = question_bank::initial_questions(
        request.count.unwrap_or(DEFAULT_SESSION_QUESTIONS),
        request.seed,
    );
    let session = TestSession::new(
        questions,
        request.use_ai.unwrap_or(true),
        state.adaptive_threshold,
    );
    let session_id = Uuid::new_v4();
    let view = SessionView::of(session_id, &session);

    state.test_sessions.write().await.insert(
        session_id,
        HostedSession {
            owner: user_id,
            session,
            last_touched: Utc::now(),
        },
    );
    tracing::debug!("Started test session {} for {}", session_id, user_id);
    view
}

pub async fn session_view(
    state: &AppState,
    user_id: Uuid,
    session_id: Uuid,
) -> Result<SessionView, AppError> {
    with_session(state, user_id, session_id, |s| Ok(SessionView::of(session_id, s))).await
}

/// Records an answer. Crossing the adaptive threshold pulls in one batch of
/// generated (or fallback) questions.
pub async fn answer_question(
    state: &AppState,
    user_id: Uuid,
    session_id: Uuid,
    value: i16,
) -> Result<SessionView, AppError> {
    let (view, adaptive_input) = with_session(state, user_id, session_id, |s| {
        s.answer(value)?;
        let input = s.needs_adaptive().then(|| (s.answers(), s.current_scores()));
        Ok((SessionView::of(session_id, s), input))
    })
    .await?;

    let Some((answers, scores)) = adaptive_input else {
        return Ok(view);
    };

    // fetched without holding the registry lock
    let questions = state
        .questions
        .request_adaptive_questions(&answers, &scores, DEFAULT_ADAPTIVE_COUNT)
        .await;

    with_session(state, user_id, session_id, |s| {
        // a concurrent answer may already have switched the session over
        if s.needs_adaptive() {
            s.enter_adaptive(questions)?;
            tracing::info!("Session {} switched to adaptive mode", session_id);
        }
        Ok(SessionView::of(session_id, s))
    })
    .await
}

pub async fn previous_question(
    state: &AppState,
    user_id: Uuid,
    session_id: Uuid,
) -> Result<SessionView, AppError> {
    with_session(state, user_id, session_id, |s| {
        s.previous()?;
        Ok(SessionView::of(session_id, s))
    })
    .await
}

/// Persists a finished session. On success the session is dropped; on a
/// storage failure it goes back to its last question and the error is
/// returned as is.
pub async fn submit_session(
    state: &AppState,
    user_id: Uuid,
    session_id: Uuid,
) -> Result<Uuid, AppError> {
    let (answers, trait_scores) = with_session(state, user_id, session_id, |s| {
        let answers = s.begin_submit()?;
        Ok((answers, s.current_scores()))
    })
    .await?;

    let submission = Submission {
        answers,
        trait_scores,
    };
    match persist_submission(state, user_id, &submission).await {
        Ok(test_id) => {
            with_session(state, user_id, session_id, |s| Ok(s.submission_succeeded()?)).await?;
            state.test_sessions.write().await.remove(&session_id);
            Ok(test_id)
        }
        Err(err) => {
            if let Err(e) =
                with_session(state, user_id, session_id, |s| Ok(s.submission_failed()?)).await
            {
                tracing::warn!("Could not reopen session {} after failed submit: {}", session_id, e);
            }
            Err(err)
        }
    }
}

async fn start(
    UserSession(user_id): UserSession,
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    let request = parse_start_request(&body)?;
    let view = start_session(&state, user_id, request).await;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn current(
    UserSession(user_id): UserSession,
    State(state): State<SharedState>,
    ApiPath(session_id): ApiPath<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(session_view(&state, user_id, session_id).await?))
}

#[derive(Deserialize)]
struct AnswerRequest {
    value: i16,
}

async fn answer(
    UserSession(user_id): UserSession,
    State(state): State<SharedState>,
    ApiPath(session_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<AnswerRequest>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(answer_question(&state, user_id, session_id, payload.value).await?))
}

async fn previous(
    UserSession(user_id): UserSession,
    State(state): State<SharedState>,
    ApiPath(session_id): ApiPath<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(previous_question(&state, user_id, session_id).await?))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    test_id: Uuid,
}

async fn submit(
    UserSession(user_id): UserSession,
    State(state): State<SharedState>,
    ApiPath(session_id): ApiPath<Uuid>,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    let test_id = submit_session(&state, user_id, session_id).await?;
    Ok((StatusCode::CREATED, Json(SubmitResponse { test_id })))
}
