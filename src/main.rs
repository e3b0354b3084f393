mod config;
mod crypto;
mod db;
mod domain;
mod error;
mod middleware;
mod services;
mod state;
mod web;

use crate::config::AppConfig;
use crate::middleware::RateLimiter;
use crate::services::ai::{AiService, OpenAiClient};
use crate::services::insights::InsightService;
use crate::services::questions::QuestionService;
use crate::services::telemetry::TelemetryService;
use crate::state::SharedState;
use sqlx::postgres::PgPoolOptions;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SESSION_MAX_IDLE_HOURS: i64 = 2;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to run database migrations: {}", e);
            e
        })?;
    tracing::info!("Database migrations completed");

    let crypto = Arc::new(crypto::Crypto::from_key_bytes(&config.enc_key)?);

    let telemetry = Arc::new(TelemetryService::new(
        config.telemetry_endpoint.clone(),
        config.telemetry_capacity,
        config.telemetry_timeout,
    ));
    let ai = Arc::new(AiService::new(
        Arc::new(OpenAiClient::new(
            config.openai_api_key.clone(),
            config.openai_api_base.clone(),
            config.ai_model.clone(),
        )),
        config.ai_timeout,
        config.ai_retries,
    ));
    let questions = Arc::new(QuestionService::new(
        ai.clone(),
        config.question_cache_ttl,
        telemetry.clone(),
    ));
    let insights = Arc::new(InsightService::new(ai, telemetry.clone()));

    let shared: SharedState = Arc::new(state::AppState {
        pool,
        crypto,
        questions,
        insights,
        telemetry,
        session_key: config.session_key.clone(),
        test_sessions: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
        login_limiter: RateLimiter::new(5, 60),
        share_limiter: RateLimiter::new(60, 60),
        adaptive_threshold: config.adaptive_threshold,
        share_ttl: chrono::Duration::days(config.share_ttl_days),
    });

    let scheduler = JobScheduler::new().await?;

    // Housekeeping - stale cache entries, idle sessions, rate limiter history
    let shared_for_cleanup = shared.clone();
    scheduler
        .add(Job::new_async("0 0 * * * *", move |_uuid, _l| {
            let state = shared_for_cleanup.clone();
            Box::pin(async move {
                let evicted = state.questions.evict_expired().await;
                let cached = state.questions.cached_batches().await;
                let swept = crate::state::sweep_idle_sessions(
                    &state,
                    chrono::Duration::hours(SESSION_MAX_IDLE_HOURS),
                )
                .await;
                let forgotten =
                    state.login_limiter.cleanup().await + state.share_limiter.cleanup().await;
                tracing::info!(
                    "Housekeeping: {} cached batches evicted ({} kept), {} idle sessions dropped, {} limiter entries cleared",
                    evicted,
                    cached,
                    swept,
                    forgotten
                );
            })
        })?)
        .await?;

    // Telemetry batches every 5 minutes
    let shared_for_telemetry = shared.clone();
    scheduler
        .add(Job::new_async("0 */5 * * * *", move |_uuid, _l| {
            let state = shared_for_telemetry.clone();
            Box::pin(async move {
                state.telemetry.flush().await;
            })
        })?)
        .await?;

    scheduler.start().await?;
    tracing::info!("Scheduler started:");
    tracing::info!("  - Housekeeping: hourly");
    tracing::info!("  - Telemetry flush: every 5 min");

    let app = web::routes(shared.clone()).layer(TraceLayer::new_for_http());

    tracing::info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    let flushed = shared.telemetry.flush().await;
    tracing::info!("Shut down cleanly ({} telemetry samples flushed)", flushed);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
