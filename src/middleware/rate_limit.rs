//! In-memory sliding-window rate limiter for anonymous endpoints
//! (login, public share views).

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::AppError;

#[derive(Clone)]
pub struct RateLimiter {
    requests: Arc<RwLock<HashMap<String, Vec<Instant>>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window_secs: u64) -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }

    /// Records a hit for `identifier` and reports whether it is allowed.
    pub async fn check(&self, identifier: &str) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        let history = requests.entry(identifier.to_string()).or_default();

        history.retain(|&timestamp| now.duration_since(timestamp) < self.window);

        if history.len() < self.max_requests {
            history.push(now);
            true
        } else {
            false
        }
    }

    /// Forgets identifiers with no hits inside the window.
    pub async fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        let before = requests.len();

        requests.retain(|_, history| {
            history.retain(|&timestamp| now.duration_since(timestamp) < self.window);
            !history.is_empty()
        });

        before - requests.len()
    }
}

/// Caller address: first `X-Forwarded-For` hop when behind a proxy, else the
/// socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Per-IP limit for routes layered with it.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    peer: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_ip(request.headers(), peer.as_ref());

    if !limiter.check(&ip).await {
        tracing::warn!("Rate limit exceeded for IP: {}", ip);
        return AppError::RateLimited.into_response();
    }

    next.run(request).await
}
