//! JSON response envelope.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::ratelimit::Rejection;

/// Message returned to rate limited callers.
pub const TOO_MANY_REQUESTS: &str = "Too many requests";

/// Header carrying the per-window limit on rejected responses.
pub const LIMIT_HEADER: &str = "x-ratelimit-limit";

/// `{ success, data?, error? }` body shared by every API route.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the request was handled
    pub success: bool,
    /// Payload of a successful request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Message for a failed request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Successful response carrying `data`.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    /// Failed response carrying `message`.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Build the 429 response for a rejected check.
pub fn too_many_requests(rejection: &Rejection) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ApiResponse::error(TOO_MANY_REQUESTS)),
    )
        .into_response();
    response
        .headers_mut()
        .insert(LIMIT_HEADER, HeaderValue::from(rejection.limit));
    response
}
