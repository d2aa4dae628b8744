//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_operations_total` (counter): calls by operation, status
//! - `gateway_operation_duration_seconds` (histogram): call latency by operation
//! - `gateway_open_handles` (gauge): broker handles currently open
//! - `gateway_active_sessions` (gauge): open WebSocket sessions

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::dispatch::Outcome;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished gateway call.
pub fn record_operation(operation: &'static str, outcome: &Outcome, started: Instant) {
    let status = match outcome {
        Ok(_) => "success",
        Err(e) => e.kind().as_str(),
    };

    metrics::counter!(
        "gateway_operations_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);

    metrics::histogram!(
        "gateway_operation_duration_seconds",
        "operation" => operation
    )
    .record(started.elapsed().as_secs_f64());
}

pub fn set_open_handles(count: u64) {
    metrics::gauge!("gateway_open_handles").set(count as f64);
}

pub fn set_active_sessions(count: usize) {
    metrics::gauge!("gateway_active_sessions").set(count as f64);
}
