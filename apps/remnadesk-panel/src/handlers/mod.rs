pub mod admin;
pub mod client;
pub mod health;
pub mod webhooks;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use serde::{Deserialize, de::DeserializeOwned};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

const BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/webhooks/{provider}", post(webhooks::payment_webhook))
        .nest("/api/admin", admin::routes(state.clone()))
        .nest("/api/client", client::routes(state.clone()))
        .layer(cors_layer(&state.config.cors_origins))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o.trim()) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// `?q=&status=` style list filters shared by several admin pages.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub q: Option<String>,
    pub status: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl ListQuery {
    pub fn pagination(&self) -> remnadesk_db::models::page::Pagination {
        remnadesk_db::models::page::Pagination {
            page: self.page,
            per_page: self.per_page,
        }
    }

    /// Empty strings from HTML forms count as "no filter".
    pub fn status<T: std::str::FromStr>(&self) -> Result<Option<T>, T::Err> {
        self.status
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .transpose()
    }
}

/// Body for POST actions whose payload is optional; empty means `T::default()`.
pub fn optional_json<T: DeserializeOwned + Default>(body: &[u8]) -> AppResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::auth::CLIENT_ROLE;
    use crate::state::test_state;

    async fn send(req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let app = router(test_state());
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn admin_routes_need_a_token() {
        let (status, body) = send(Request::get("/api/admin/users").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn client_tokens_do_not_open_admin_routes() {
        let state = test_state();
        let token = state.tokens.issue(1, CLIENT_ROLE).unwrap();
        let res = router(state)
            .oneshot(
                Request::get("/api/admin/plans")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_tokens_do_not_open_client_routes() {
        let state = test_state();
        let token = state.tokens.issue(1, "superadmin").unwrap();
        let res = router(state)
            .oneshot(
                Request::get("/api/client/profile")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unread_counter_needs_a_client_token() {
        let (status, body) = send(
            Request::get("/api/client/notifications/unread")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn unknown_webhook_provider_is_rejected() {
        let (status, body) = send(
            Request::post("/api/webhooks/bitpay")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
    }

    #[tokio::test]
    async fn forged_init_data_is_rejected() {
        let (status, _) = send(
            Request::post("/api/client/auth/telegram")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"init_data":"user=%7B%22id%22%3A1%7D&auth_date=1&hash=00"}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn health_reports_degraded_without_database() {
        let (status, body) = send(Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["database"], "unreachable");
    }

    #[test]
    fn blank_status_filter_is_ignored() {
        let q = ListQuery {
            status: Some(" ".into()),
            ..Default::default()
        };
        let parsed: Option<remnadesk_db::models::payment::PaymentStatus> = q.status().unwrap();
        assert!(parsed.is_none());

        let q = ListQuery {
            status: Some("weird".into()),
            ..Default::default()
        };
        assert!(q.status::<remnadesk_db::models::payment::PaymentStatus>().is_err());
    }

    #[test]
    fn empty_action_body_uses_defaults() {
        let decision: admin::partners::PayoutDecision = optional_json(b"").unwrap();
        assert!(decision.note.is_none());

        let decision: admin::partners::PayoutDecision = optional_json(br#"{"note":"sent via TRC20"}"#).unwrap();
        assert_eq!(decision.note.as_deref(), Some("sent via TRC20"));

        let err = optional_json::<admin::partners::PayoutDecision>(b"{nope").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
