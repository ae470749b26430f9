//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::capture::classify::{DEFAULT_BODY_SIZE_THRESHOLD_BYTES, DEFAULT_LATENCY_THRESHOLD_MS};

/// Root configuration for the traffic gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Traffic capture policy.
    pub capture: CaptureConfig,

    /// Where finalized traffic records go.
    pub export: ExportConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Traffic capture configuration.
///
/// The two thresholds are policy constants: they are read once at startup
/// and apply to every request alike.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Enable the capture layer.
    pub enabled: bool,

    /// Exchanges slower than this are abnormal.
    pub latency_threshold_ms: u64,

    /// Request bodies larger than this are abnormal.
    pub body_size_threshold_bytes: usize,

    /// Ceiling on how much of a body is buffered. Larger bodies are
    /// forwarded as a stream without being captured.
    pub max_capture_bytes: usize,

    /// Header carrying the original client address behind a proxy.
    pub forwarded_header: String,

    /// Address of the service this gateway fronts.
    pub target_address: String,

    /// Exact paths that bypass capture.
    pub skip_paths: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            latency_threshold_ms: DEFAULT_LATENCY_THRESHOLD_MS,
            body_size_threshold_bytes: DEFAULT_BODY_SIZE_THRESHOLD_BYTES,
            max_capture_bytes: 2 * 1024 * 1024, // 2MB
            forwarded_header: "x-forwarded-for".to_string(),
            target_address: "127.0.0.1".to_string(),
            skip_paths: Vec::new(),
        }
    }
}

/// Which sink receives finalized records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// One structured log event per record.
    Log,
    /// Append one JSON object per line to `export.path`.
    JsonLines,
    /// Drop records.
    Discard,
}

/// Export configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExportConfig {
    pub sink: SinkKind,

    /// Output file for the `json_lines` sink.
    pub path: Option<PathBuf>,

    /// Records held for the background writer before new ones are dropped.
    pub queue_capacity: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::Log,
            path: None,
            queue_capacity: 10_000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.capture.latency_threshold_ms, 3000);
        assert_eq!(config.capture.body_size_threshold_bytes, 102_400);
        assert_eq!(config.export.sink, SinkKind::Log);
        assert_eq!(config.export.queue_capacity, 10_000);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [capture]
            latency_threshold_ms = 500
            skip_paths = ["/health"]

            [export]
            sink = "json_lines"
            path = "/tmp/traffic.jsonl"
            "#,
        )
        .unwrap();

        assert_eq!(config.capture.latency_threshold_ms, 500);
        assert_eq!(config.capture.body_size_threshold_bytes, 102_400);
        assert_eq!(config.capture.skip_paths, vec!["/health".to_string()]);
        assert_eq!(config.export.sink, SinkKind::JsonLines);
        assert_eq!(config.export.path, Some(PathBuf::from("/tmp/traffic.jsonl")));
    }
}
