//! Metrics collection and exposition.
//!
//! # Metrics
//! - `slingshot_forward_requests_total` (counter): forwarded calls by endpoint, outcome
//! - `slingshot_forward_duration_seconds` (histogram): time spent per call
//! - `slingshot_loop_blocked_total` (counter): loop blocks by reason
//! - `slingshot_stream_bytes_total` (counter): event-stream bytes relayed
//!
//! `outcome` is `success` or the envelope's error type.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const FORWARD_REQUESTS_TOTAL: &str = "slingshot_forward_requests_total";
pub const FORWARD_DURATION_SECONDS: &str = "slingshot_forward_duration_seconds";
pub const LOOP_BLOCKED_TOTAL: &str = "slingshot_loop_blocked_total";
pub const STREAM_BYTES_TOTAL: &str = "slingshot_stream_bytes_total";

/// Install the Prometheus exporter with its own HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

/// Record one finished forwarded call.
pub fn record_forward(endpoint: &'static str, outcome: &str, started: Instant) {
    metrics::counter!(
        FORWARD_REQUESTS_TOTAL,
        "endpoint" => endpoint,
        "outcome" => outcome.to_string()
    )
    .increment(1);
    metrics::histogram!(FORWARD_DURATION_SECONDS, "endpoint" => endpoint)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_loop_blocked(reason: &'static str) {
    metrics::counter!(LOOP_BLOCKED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_stream_bytes(bytes: usize) {
    metrics::counter!(STREAM_BYTES_TOTAL).increment(bytes as u64);
}
