//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the health check and target service
//! - Wire up middleware (request ID, tracing, traffic capture, timeout)
//! - Bind the server to a listener with peer addresses attached
//! - Stop accepting on shutdown and drain in-flight exchanges

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, middleware, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::capture::{capture_middleware, CaptureState, TrafficSink};
use crate::config::GatewayConfig;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::target::{setup_target_router, TargetState};

/// Error type for server construction.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid forwarded header name: {0}")]
    ForwardedHeader(#[from] http::header::InvalidHeaderName),
}

/// HTTP server for the traffic gateway.
pub struct GatewayServer {
    router: Router,
    config: GatewayConfig,
}

impl GatewayServer {
    /// Create a server exporting captured traffic to `sink`.
    pub fn new(config: GatewayConfig, sink: Arc<dyn TrafficSink>) -> Result<Self, ServerError> {
        let capture = CaptureState::from_config(&config.capture, sink)?;
        let router = Self::build_router(&config, capture, TargetState::default());
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// The last layer added runs first. Panics are turned into 500s inside
    /// the capture layer so they are recorded like any other response.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, capture: CaptureState, target: TargetState) -> Router {
        Router::new()
            .route("/health", get(|| async { "ok" }))
            .merge(setup_target_router(target))
            .fallback(|| async { (StatusCode::NOT_FOUND, "Not Found") })
            .layer(CatchPanicLayer::new())
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(middleware::from_fn_with_state(capture, capture_middleware))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run the server until a shutdown signal arrives.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            capture_enabled = self.config.capture.enabled,
            "Traffic gateway starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("Traffic gateway stopped");
        Ok(())
    }
}
