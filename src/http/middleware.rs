//! Rate limiting middleware.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::trace;

use super::response::too_many_requests;
use crate::ratelimit::{AdmissionControl, ClientKey, Decision};

/// Admit or reject a request before it reaches its handler.
///
/// Admitted requests pass through unmodified. Rejections are answered here
/// with a 429 and never reach the inner service.
pub async fn rate_limit(
    State(limiter): State<Arc<dyn AdmissionControl>>,
    request: Request,
    next: Next,
) -> Response {
    let key = ClientKey::from_headers(request.headers());

    match limiter.check(&key) {
        Decision::Admit { remaining } => {
            trace!(
                key = %key,
                anonymous = key.is_anonymous(),
                remaining,
                "Request admitted"
            );
            next.run(request).await
        }
        Decision::Reject(rejection) => {
            trace!(
                key = %rejection.key,
                anonymous = rejection.key.is_anonymous(),
                "Request rejected"
            );
            too_many_requests(&rejection)
        }
    }
}
