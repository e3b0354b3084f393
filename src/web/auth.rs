use crate::db;
use crate::error::AppError;
use crate::middleware::rate_limit::client_ip;
use crate::state::SharedState;
use crate::web::extract::ApiJson;
use crate::web::session::{self, UserSession};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, SaltString},
    Argon2, PasswordVerifier,
};
use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use uuid::Uuid;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub name: String,
    pub token: String,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .with_state(state)
}

fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_lowercase();
    let valid = email.len() <= 254
        && email
            .split_once('@')
            .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
            .unwrap_or(false);
    if valid {
        Ok(email)
    } else {
        Err(AppError::validation("email is not valid"))
    }
}

fn validate_registration(payload: &RegisterRequest) -> Result<(String, String), AppError> {
    let email = normalize_email(&payload.email)?;
    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let name = payload.name.trim();
    if name.is_empty() || name.chars().count() > 80 {
        return Err(AppError::validation("name must be 1-80 characters"));
    }
    Ok((email, name.to_string()))
}

fn is_production() -> bool {
    std::env::var("PRODUCTION").is_ok()
        || std::env::var("RAILWAY_ENVIRONMENT").is_ok()
        || std::env::var("FLY_APP_NAME").is_ok()
}

fn session_headers(token: &str) -> Result<HeaderMap, AppError> {
    let mut headers = HeaderMap::new();
    let cookie = HeaderValue::from_str(&session::session_cookie(token, is_production()))
        .map_err(|e| AppError::Internal(e.into()))?;
    headers.insert(header::SET_COOKIE, cookie);
    Ok(headers)
}

async fn register(
    State(state): State<SharedState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (email, name) = validate_registration(&payload)?;

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(payload.password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing failed: {e}")))?
        .to_string();
    let enc_name = state
        .crypto
        .encrypt_str(&name)
        .map_err(|e| AppError::Internal(e.into()))?;

    let user_id = db::create_user(&state.pool, &email, &hash, &enc_name)
        .await?
        .ok_or_else(|| AppError::Conflict("email already registered".to_string()))?;

    let token = session::sign_session(user_id, &state.session_key)
        .map_err(|e| AppError::Internal(e.into()))?;
    tracing::info!("Registered user {}", user_id);

    Ok((
        StatusCode::CREATED,
        session_headers(&token)?,
        Json(AuthResponse {
            user_id,
            name,
            token,
        }),
    ))
}

async fn login(
    peer: Option<ConnectInfo<SocketAddr>>,
    State(state): State<SharedState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let ip = client_ip(&headers, peer.as_ref());
    if !state.login_limiter.check(&ip).await {
        tracing::warn!("Login rate limit exceeded for IP: {}", ip);
        return Err(AppError::RateLimited);
    }

    let email = normalize_email(&payload.email).map_err(|_| AppError::Unauthorized)?;
    let user = db::find_user_by_email(&state.pool, &email)
        .await?
        .ok_or(AppError::Unauthorized)?;

    let parsed_hash = PasswordHash::new(&user.password_hash).map_err(|_| AppError::Unauthorized)?;
    Argon2::default()
        .verify_password(payload.password.as_bytes(), &parsed_hash)
        .map_err(|_| AppError::Unauthorized)?;

    let name = state
        .crypto
        .decrypt_str(&user.enc_name)
        .unwrap_or_else(|_| "User".to_string());
    let token = session::sign_session(user.id, &state.session_key)
        .map_err(|e| AppError::Internal(e.into()))?;

    Ok((
        session_headers(&token)?,
        Json(AuthResponse {
            user_id: user.id,
            name,
            token,
        }),
    ))
}

async fn logout() -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static(session::clear_session_cookie()),
    );
    (StatusCode::NO_CONTENT, headers)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MeResponse {
    user_id: Uuid,
    email: String,
    name: String,
}

async fn me(
    UserSession(user_id): UserSession,
    State(state): State<SharedState>,
) -> Result<Json<MeResponse>, AppError> {
    let user = db::find_user_by_id(&state.pool, user_id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    let name = state
        .crypto
        .decrypt_str(&user.enc_name)
        .unwrap_or_else(|_| "User".to_string());
    Ok(Json(MeResponse {
        user_id,
        email: user.email,
        name,
    }))
}
