pub mod auth;
pub mod extract;
pub mod flow;
pub mod questions;
pub mod results;
pub mod session;
pub mod share;
pub mod telemetry;

use crate::state::SharedState;
use axum::{routing::get, Router};

async fn health() -> &'static str {
    "OK"
}

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::router(state.clone()))
        .nest("/api/questions", questions::router(state.clone()))
        .nest("/api/sessions", flow::router(state.clone()))
        .nest("/api/tests", results::router(state.clone()))
        .nest("/api/share", share::router(state.clone()))
        .nest("/api/telemetry", telemetry::router(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::test_state;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn call(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let resp = routes(test_state())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_initial_questions_public() {
        let (status, body) = call(
            routes(test_state()),
            Method::GET,
            "/api/questions/initial?count=7&seed=3",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let questions = body["questions"].as_array().unwrap();
        assert_eq!(questions.len(), 7);
        assert_eq!(questions[0]["options"].as_array().unwrap().len(), 5);
        assert!(questions[0]["trait"].is_string());
    }

    #[tokio::test]
    async fn test_submission_requires_session() {
        let payload = json!({
            "answers": [{"questionId": "bank-1", "value": 5, "trait": "openness"}],
            "traitScores": {"openness": 5.0}
        });
        let (status, body) = call(routes(test_state()), Method::POST, "/api/tests", Some(payload)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "unauthorized");
    }

    #[tokio::test]
    async fn test_forged_token_rejected_before_storage() {
        let token = crate::web::session::sign_session(uuid::Uuid::new_v4(), b"not-the-server-key").unwrap();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/share")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({"testId": uuid::Uuid::new_v4()}).to_string()))
            .unwrap();
        let resp = routes(test_state()).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_protected_routes_reject_anonymous() {
        let app = routes(test_state());
        for (method, uri) in [
            (Method::GET, "/api/tests"),
            (Method::POST, "/api/sessions"),
            (Method::POST, "/api/questions/adaptive"),
            (Method::GET, "/auth/me"),
        ] {
            let (status, _) = call(app.clone(), method, uri, Some(json!({}))).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_malformed_share_id_not_found() {
        let (status, body) = call(routes(test_state()), Method::GET, "/api/share/short", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn test_telemetry_accepted_and_buffered() {
        let state = test_state();
        let app = routes(state.clone());

        let (status, _) = call(
            app.clone(),
            Method::POST,
            "/api/telemetry/metrics",
            Some(json!({"name": "page_load_ms", "value": 412.0, "tags": {"page": "results"}})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (status, _) = call(
            app,
            Method::POST,
            "/api/telemetry/errors",
            Some(json!({"message": "TypeError: x is undefined"})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(state.telemetry.buffered().await, 2);
    }

    async fn raw_call(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_bad_query_gets_error_body() {
        let (status, body) = call(
            routes(test_state()),
            Method::GET,
            "/api/questions/initial?count=abc",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation");
        assert!(body["error"]["message"].as_str().unwrap().contains("query string"));
    }

    #[tokio::test]
    async fn test_malformed_json_gets_error_body() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/telemetry/metrics")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = raw_call(routes(test_state()), req).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation");

        // wrong shape, valid JSON
        let (status, body) = call(
            routes(test_state()),
            Method::POST,
            "/api/telemetry/errors",
            Some(json!({"context": "missing message"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation");
    }

    #[tokio::test]
    async fn test_missing_content_type_gets_error_body() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/auth/login")
            .body(Body::from(r#"{"email":"a@b.co","password":"x"}"#))
            .unwrap();
        let (status, body) = raw_call(routes(test_state()), req).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation");
    }

    #[tokio::test]
    async fn test_logout_clears_cookie() {
        let resp = routes(test_state())
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/auth/logout")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.contains("Max-Age=0"));
    }
}
