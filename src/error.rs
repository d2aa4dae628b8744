//! Error taxonomy shared by every gateway call.
//!
//! Each failure a caller can observe maps to exactly one [`ErrorKind`]. The
//! transports decide how a kind is surfaced (HTTP status, session event);
//! the message itself is already safe to show to the caller.

use thiserror::Error;

/// Failure of a single gateway call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The request or its operation descriptor is malformed or incomplete.
    /// Never reaches the database.
    #[error("{0}")]
    Validation(String),

    /// The connection target could not be opened or failed its probe.
    #[error("{0}")]
    Connection(String),

    /// The database rejected the operation. Carries the engine message.
    #[error("{0}")]
    Execution(String),

    /// The operation name is outside the supported set, or not accepted on
    /// the route it arrived on.
    #[error("{0}")]
    UnsupportedOperation(String),
}

/// Classification of a [`GatewayError`], used for logging and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Connection,
    Execution,
    UnsupportedOperation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Connection => "connection",
            ErrorKind::Execution => "execution",
            ErrorKind::UnsupportedOperation => "unsupported_operation",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GatewayError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Validation(_) => ErrorKind::Validation,
            GatewayError::Connection(_) => ErrorKind::Connection,
            GatewayError::Execution(_) => ErrorKind::Execution,
            GatewayError::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
        }
    }

    /// Whether the caller can fix this by changing the request alone.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation | ErrorKind::UnsupportedOperation
        )
    }
}

/// Result alias for gateway calls.
pub type GatewayResult<T> = Result<T, GatewayError>;
