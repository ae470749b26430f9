//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_captured_total` (counter): finalized records by status, abnormal
//! - `gateway_capture_duration_seconds` (histogram): arrival-to-completion latency
//! - `gateway_capture_failures_total` (counter): body capture failures by kind
//! - `gateway_export_failures_total` (counter): sink failures by sink
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::capture::TrafficRecord;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_capture(record: &TrafficRecord) {
    counter!(
        "gateway_requests_captured_total",
        "status" => record.response_status.to_string(),
        "abnormal" => record.abnormal.to_string()
    )
    .increment(1);
    histogram!("gateway_capture_duration_seconds").record(record.elapsed_millis as f64 / 1000.0);
}

pub fn record_capture_failure(kind: &'static str) {
    counter!("gateway_capture_failures_total", "kind" => kind).increment(1);
}

pub fn record_export_failure(sink: &'static str) {
    counter!("gateway_export_failures_total", "sink" => sink).increment(1);
}
