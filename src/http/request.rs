//! Request identification.
//!
//! # Responsibilities
//! - Generate a UUID request ID for every HTTP request (tower-http layers)
//! - Read it back in handlers so every log line of a call carries it

use axum::http::HeaderMap;

pub const X_REQUEST_ID: &str = "x-request-id";

/// The request ID set by `SetRequestIdLayer`, or `"unknown"`.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}
