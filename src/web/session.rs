use crate::db;
use crate::error::AppError;
use crate::state::SharedState;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct SessionClaims {
    pub user_id: Uuid,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid token format")]
    Invalid,
    #[error("signature mismatch")]
    Signature,
    #[error("expired")]
    Expired,
}

/// `base64(user_id|exp).base64(hmac)`
pub fn sign_session(user_id: Uuid, key: &[u8]) -> Result<String, SessionError> {
    let exp = Utc::now() + Duration::hours(SESSION_TTL_HOURS);
    sign_claims(user_id, exp.timestamp(), key)
}

fn sign_claims(user_id: Uuid, exp: i64, key: &[u8]) -> Result<String, SessionError> {
    let payload = format!("{}|{}", user_id, exp);
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SessionError::Invalid)?;
    mac.update(payload.as_bytes());
    let sig = mac.finalize().into_bytes();
    Ok(format!(
        "{}.{}",
        general_purpose::URL_SAFE_NO_PAD.encode(payload.as_bytes()),
        general_purpose::URL_SAFE_NO_PAD.encode(sig)
    ))
}

pub fn verify_session(token: &str, key: &[u8]) -> Result<SessionClaims, SessionError> {
    let (payload_b64, sig_b64) = token.split_once('.').ok_or(SessionError::Invalid)?;
    let payload_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| SessionError::Invalid)?;
    let sig_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|_| SessionError::Invalid)?;

    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SessionError::Invalid)?;
    mac.update(&payload_bytes);
    mac.verify_slice(&sig_bytes)
        .map_err(|_| SessionError::Signature)?;

    let payload = String::from_utf8(payload_bytes).map_err(|_| SessionError::Invalid)?;
    let (user_raw, exp_raw) = payload.split_once('|').ok_or(SessionError::Invalid)?;
    let user_id = Uuid::parse_str(user_raw).map_err(|_| SessionError::Invalid)?;
    let exp: i64 = exp_raw.parse().map_err(|_| SessionError::Invalid)?;
    if Utc::now().timestamp() > exp {
        return Err(SessionError::Expired);
    }
    Ok(SessionClaims { user_id, exp })
}

pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(val) = auth.to_str() {
            if let Some(bearer) = val.strip_prefix("Bearer ") {
                return Some(bearer.trim().to_string());
            }
        }
    }
    if let Some(cookie) = headers.get(axum::http::header::COOKIE) {
        if let Ok(val) = cookie.to_str() {
            for pair in val.split(';') {
                if let Some(rest) = pair.trim().strip_prefix("session=") {
                    return Some(rest.to_string());
                }
            }
        }
    }
    None
}

pub fn session_cookie(token: &str, secure: bool) -> String {
    let secure_flag = if secure { "; Secure" } else { "" };
    format!(
        "session={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}{secure_flag}",
        SESSION_TTL_HOURS * 3600
    )
}

pub fn clear_session_cookie() -> &'static str {
    "session=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0"
}

/// Authenticated caller: a valid token belonging to an active user.
///
/// ```ignore
/// async fn handler(UserSession(user_id): UserSession) -> Result<..., AppError> { ... }
/// ```
pub struct UserSession(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for UserSession
where
    S: Send + Sync,
    SharedState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let shared_state = SharedState::from_ref(state);

        let token = extract_token(&parts.headers).ok_or(AppError::Unauthorized)?;

        let claims = verify_session(&token, &shared_state.session_key).map_err(|e| {
            tracing::warn!("Session verification failed: {}", e);
            AppError::Unauthorized
        })?;

        let user = db::find_user_by_id(&shared_state.pool, claims.user_id)
            .await
            .map_err(|e| {
                tracing::warn!("User lookup failed for session: {}", e);
                AppError::Unauthorized
            })?;

        match user {
            Some(user) if user.is_active => Ok(UserSession(claims.user_id)),
            _ => Err(AppError::Unauthorized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn test_sign_and_verify() {
        let user_id = Uuid::new_v4();
        let token = sign_session(user_id, KEY).unwrap();
        let claims = verify_session(&token, KEY).unwrap();

        assert_eq!(claims.user_id, user_id);
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn test_rejects_other_key_and_garbage() {
        let token = sign_session(Uuid::new_v4(), KEY).unwrap();

        assert!(matches!(
            verify_session(&token, b"another-key-another-key-another!!"),
            Err(SessionError::Signature)
        ));
        assert!(matches!(verify_session("nodot", KEY), Err(SessionError::Invalid)));
        assert!(matches!(verify_session("a.b.c", KEY), Err(SessionError::Invalid)));
    }

    #[test]
    fn test_rejects_tampered_payload() {
        let token = sign_session(Uuid::new_v4(), KEY).unwrap();
        let (_, sig) = token.split_once('.').unwrap();
        let forged_payload = general_purpose::URL_SAFE_NO_PAD
            .encode(format!("{}|{}", Uuid::new_v4(), i64::MAX));

        assert!(matches!(
            verify_session(&format!("{forged_payload}.{sig}"), KEY),
            Err(SessionError::Signature)
        ));
    }

    #[test]
    fn test_rejects_expired() {
        let token = sign_claims(Uuid::new_v4(), Utc::now().timestamp() - 10, KEY).unwrap();
        assert!(matches!(verify_session(&token, KEY), Err(SessionError::Expired)));
    }

    #[test]
    fn test_extract_token_sources() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_token(&headers), None);

        headers.insert(axum::http::header::COOKIE, "theme=dark; session=abc.def".parse().unwrap());
        assert_eq!(extract_token(&headers).as_deref(), Some("abc.def"));

        headers.insert(axum::http::header::AUTHORIZATION, "Bearer xyz.123".parse().unwrap());
        assert_eq!(extract_token(&headers).as_deref(), Some("xyz.123"));
    }
}
