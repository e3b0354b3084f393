use crate::services::telemetry::TelemetrySample;
use crate::state::SharedState;
use crate::web::extract::ApiJson;
use axum::{extract::State, http::StatusCode, routing::post, Router};
use chrono::Utc;
use serde::Deserialize;
use std::collections::BTreeMap;

const MAX_TEXT: usize = 2_000;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/metrics", post(metric))
        .route("/errors", post(error))
        .with_state(state)
}

#[derive(Deserialize)]
struct MetricPayload {
    name: String,
    value: f64,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct ErrorPayload {
    message: String,
    context: Option<String>,
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_TEXT).collect()
}

/// Fire-and-forget: always 202, samples that make no sense are dropped.
async fn metric(State(state): State<SharedState>, ApiJson(payload): ApiJson<MetricPayload>) -> StatusCode {
    if payload.value.is_finite() && !payload.name.trim().is_empty() {
        state
            .telemetry
            .record(TelemetrySample::Metric {
                name: truncate(payload.name.trim()),
                value: payload.value,
                tags: payload.tags,
                recorded_at: Utc::now(),
            })
            .await;
    }
    StatusCode::ACCEPTED
}

async fn error(State(state): State<SharedState>, ApiJson(payload): ApiJson<ErrorPayload>) -> StatusCode {
    tracing::debug!("Client error reported: {}", truncate(&payload.message));
    state
        .telemetry
        .record(TelemetrySample::error(
            truncate(&payload.message),
            payload.context.as_deref().map(truncate),
        ))
        .await;
    StatusCode::ACCEPTED
}
