//! HTTP boundary: routes, CORS and the rate limiting middleware.

mod middleware;
mod response;
mod server;

pub use middleware::rate_limit;
pub use response::{too_many_requests, ApiResponse, LIMIT_HEADER, TOO_MANY_REQUESTS};
pub use server::HttpServer;

use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::get;
use axum::{Json, Router};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::ratelimit::AdmissionControl;

/// Build the service router.
///
/// Everything under `/api` is rate limited; `/healthz` is not, so probes
/// never consume caller budget.
pub fn router(limiter: Arc<dyn AdmissionControl>, allowed_origins: &[String]) -> Router {
    let api = Router::new()
        .route("/ping", get(ping))
        .route_layer(axum::middleware::from_fn_with_state(limiter, rate_limit));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(allowed_origins)),
        )
}

/// CORS policy for the API.
///
/// A `*` entry allows any origin without credentials; otherwise only the
/// listed origins are echoed back and credentials are allowed.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ]);

    if allowed_origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn ping() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::ok("pong"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{LimitConfig, ManualClock, RateLimiter};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_router(max_requests: u64, origins: &[&str]) -> Router {
        let limiter = RateLimiter::with_clock(
            LimitConfig::new(60_000, max_requests),
            ManualClock::new(0),
        )
        .unwrap();
        let origins: Vec<String> = origins.iter().map(|o| o.to_string()).collect();
        router(Arc::new(limiter), &origins)
    }

    fn get_from(uri: &str, client: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("x-forwarded-for", client)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_admitted_request_reaches_handler() {
        let app = test_router(2, &["http://localhost:3000"]);

        let response = app.oneshot(get_from("/api/ping", "10.0.0.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({ "success": true, "data": "pong" })
        );
    }

    #[tokio::test]
    async fn test_rejected_request_gets_429() {
        let app = test_router(2, &["http://localhost:3000"]);

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(get_from("/api/ping", "10.0.0.1"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .clone()
            .oneshot(get_from("/api/ping", "10.0.0.1, 10.0.0.254"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[LIMIT_HEADER], "2");
        assert_eq!(
            json_body(response).await,
            serde_json::json!({ "success": false, "error": "Too many requests" })
        );

        // A different client still has its own budget
        let response = app.oneshot(get_from("/api/ping", "10.0.0.2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_is_not_rate_limited() {
        let app = test_router(1, &["*"]);

        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(get_from("/healthz", "10.0.0.1"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_requests_without_address_share_anonymous_bucket() {
        let app = test_router(1, &["*"]);
        let anonymous = || Request::builder().uri("/api/ping").body(Body::empty()).unwrap();

        let response = app.clone().oneshot(anonymous()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(anonymous()).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_cors_echoes_allowed_origin() {
        let app = test_router(5, &["https://example.org"]);

        let request = Request::builder()
            .uri("/api/ping")
            .header("origin", "https://example.org")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        let headers = response.headers();
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://example.org"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[tokio::test]
    async fn test_cors_preflight_skips_rate_limit() {
        let app = test_router(1, &["https://example.org"]);
        let preflight = || {
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/ping")
                .header("origin", "https://example.org")
                .header("access-control-request-method", "POST")
                .header("x-forwarded-for", "10.0.0.1")
                .body(Body::empty())
                .unwrap()
        };

        for _ in 0..3 {
            let response = app.clone().oneshot(preflight()).await.unwrap();
            assert!(response.status().is_success());
        }

        let response = app.oneshot(get_from("/api/ping", "10.0.0.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_wildcard_origin_does_not_panic() {
        let _layer = cors_layer(&["*".to_string()]);
    }
}
