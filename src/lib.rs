//! Traffic capture gateway library.
//!
//! Records every request/response exchange passing through an axum service:
//! who sent it, what was asked, the request body, the response status, how
//! long it took, and whether it looked abnormal.

pub mod capture;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod target;

pub use capture::{capture_middleware, CaptureState, TrafficRecord, TrafficSink};
pub use config::schema::GatewayConfig;
pub use self::http::GatewayServer;
pub use lifecycle::Shutdown;
