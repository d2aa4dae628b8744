//! Outcome → HTTP response mapping.
//!
//! # Design Decisions
//! - Validation and unsupported operations are 400 (caller can fix the request)
//! - Connection and execution failures are 500
//! - Body is always the status envelope, success or not

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::dispatch::{into_envelope, Outcome};
use crate::error::{ErrorKind, GatewayError};

/// An outcome ready to be sent as an HTTP response.
#[derive(Debug)]
pub struct HttpReply(pub Outcome);

pub fn status_for(err: &GatewayError) -> StatusCode {
    match err.kind() {
        ErrorKind::Validation | ErrorKind::UnsupportedOperation => StatusCode::BAD_REQUEST,
        ErrorKind::Connection | ErrorKind::Execution => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for HttpReply {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Ok(_) => StatusCode::OK,
            Err(e) => status_for(e),
        };
        (status, Json(into_envelope(self.0))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(status_for(&GatewayError::validation("x")), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&GatewayError::UnsupportedOperation("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&GatewayError::Connection("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&GatewayError::Execution("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn success_is_ok() {
        let response = HttpReply(Ok(crate::dispatch::Success::Deleted(0))).into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
