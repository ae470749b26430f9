//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and the
//! relationships between fields. All errors are collected, not just the
//! first.

use std::fmt;
use std::net::SocketAddr;

use http::HeaderName;

use crate::config::schema::{GatewayConfig, SinkKind};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    let capture = &config.capture;
    if capture.latency_threshold_ms == 0 {
        errors.push(ValidationError::new(
            "capture.latency_threshold_ms",
            "must be greater than 0",
        ));
    }
    if capture.body_size_threshold_bytes == 0 {
        errors.push(ValidationError::new(
            "capture.body_size_threshold_bytes",
            "must be greater than 0",
        ));
    }
    // An uncaptured body must still be classifiable by size.
    if capture.max_capture_bytes <= capture.body_size_threshold_bytes {
        errors.push(ValidationError::new(
            "capture.max_capture_bytes",
            format!(
                "must exceed body_size_threshold_bytes ({})",
                capture.body_size_threshold_bytes
            ),
        ));
    }
    if HeaderName::from_bytes(capture.forwarded_header.as_bytes()).is_err() {
        errors.push(ValidationError::new(
            "capture.forwarded_header",
            format!("'{}' is not a valid header name", capture.forwarded_header),
        ));
    }

    if config.export.sink == SinkKind::JsonLines && config.export.path.is_none() {
        errors.push(ValidationError::new("export.path", "required by the json_lines sink"));
    }

    if config.export.queue_capacity == 0 {
        errors.push(ValidationError::new("export.queue_capacity", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "'{}' is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
