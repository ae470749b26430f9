//! Traffic capture gateway (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request        ┌──────────────────────────────────────────────┐
//!     ──────────────────────┼─▶ request id ─▶ trace ─▶ capture ─▶ timeout ─┼─▶ handlers
//!                           │                            │                 │
//!     Client Response       │                            ▼                 │
//!     ◀─────────────────────┼──────────────────── export sink              │
//!                           └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use traffic_gateway::capture::{build_sink, BuiltSink};
use traffic_gateway::config::validation::validate_config;
use traffic_gateway::config::{load_config, ConfigError, GatewayConfig};
use traffic_gateway::lifecycle::{wait_for_termination, Shutdown};
use traffic_gateway::observability::{logging, metrics};
use traffic_gateway::GatewayServer;

/// How long queued records may take to reach disk after the server stops.
const EXPORT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "traffic-gateway", version, about = "HTTP traffic capture gateway")]
struct Cli {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    logging::init_logging(&config.observability);
    tracing::info!("traffic-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        latency_threshold_ms = config.capture.latency_threshold_ms,
        body_size_threshold_bytes = config.capture.body_size_threshold_bytes,
        sink = ?config.export.sink,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let BuiltSink { sink, writer } = build_sink(&config.export)?;
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = GatewayServer::new(config, sink)?;

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        wait_for_termination().await;
        shutdown.trigger();
    });

    server.run(listener, rx).await?;

    if let Some(writer) = writer {
        if tokio::time::timeout(EXPORT_DRAIN_TIMEOUT, writer).await.is_err() {
            tracing::warn!("Traffic writer did not drain before the deadline");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
