//! Per-call gateway service shared by every transport.
//!
//! # Call States
//! ```text
//! Received → Validated → Connected → Executed → Released → Responded
//!               │            │           │
//!               └─ error     └─ error    └─ error (still Released first)
//! ```
//!
//! A call that reaches `Connected` always passes through `Released`, whatever
//! the outcome of execution.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::broker::{Broker, ConnectionTarget};
use crate::dispatch::{self, Command, OperationDescriptor, OperationKind, Outcome};
use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics;

/// Transport-agnostic request: a connection target plus an operation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct GatewayRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<OperationDescriptor>,
}

impl GatewayRequest {
    pub fn from_slice(bytes: &[u8]) -> GatewayResult<Self> {
        serde_json::from_slice(bytes).map_err(invalid_request)
    }

    pub fn from_value(value: Value) -> GatewayResult<Self> {
        serde_json::from_value(value).map_err(invalid_request)
    }

    /// Metrics label for the declared operation.
    fn operation_label(&self) -> &'static str {
        self.query
            .as_ref()
            .and_then(|query| query.kind().ok())
            .map_or("unknown", |kind| kind.as_str())
    }

    /// Split into a target and a validated command, checking the operation
    /// is one the calling route accepts.
    fn into_call(self, accepts: &[OperationKind]) -> GatewayResult<(ConnectionTarget, Command)> {
        let (Some(uri), Some(query)) = (self.uri.filter(|uri| !uri.is_empty()), self.query) else {
            return Err(GatewayError::validation("Missing uri or query"));
        };

        let kind = query.kind()?;
        if !accepts.contains(&kind) {
            return Err(GatewayError::UnsupportedOperation(format!(
                "Unsupported operation: {kind} is not accepted here"
            )));
        }

        let command = query.validate()?;
        Ok((ConnectionTarget::new(uri), command))
    }
}

fn invalid_request(err: serde_json::Error) -> GatewayError {
    GatewayError::validation(format!("Invalid request: {err}"))
}

/// Composes the broker and dispatcher into one call.
#[derive(Clone)]
pub struct Gateway {
    broker: Arc<Broker>,
}

impl Gateway {
    pub fn new(broker: Broker) -> Self {
        Self {
            broker: Arc::new(broker),
        }
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Run one call end to end. Only operations in `accepts` are executed.
    pub async fn handle(&self, request: GatewayRequest, accepts: &[OperationKind]) -> Outcome {
        let started = Instant::now();
        let operation = request.operation_label();

        let outcome = self.run(request, accepts).await;

        match &outcome {
            Ok(_) => tracing::info!(
                operation,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Operation succeeded"
            ),
            Err(e) => tracing::warn!(
                operation,
                error_kind = %e.kind(),
                error = %e,
                "Operation failed"
            ),
        }
        metrics::record_operation(operation, &outcome, started);
        outcome
    }

    async fn run(&self, request: GatewayRequest, accepts: &[OperationKind]) -> Outcome {
        let (target, command) = request.into_call(accepts)?;
        tracing::debug!(
            uri = %target,
            operation = %command.kind(),
            namespace = %command.namespace(),
            "Request validated"
        );

        let handle = self
            .broker
            .acquire(&target)
            .await
            .map_err(|e| target.scrub_error(e))?;

        let outcome = dispatch::execute(handle.session(), command).await;
        self.broker.release(handle).await;

        outcome.map_err(|e| target.scrub_error(e))
    }
}
