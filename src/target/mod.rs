//! Demo target service.
//!
//! Benign load targets the gateway fronts in the demo deployment: a cheap
//! ping, a CPU-bound computation, an I/O wait, a status page, and an echo
//! endpoint that returns the request body untouched.

pub mod handlers;
pub mod response;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};

use self::handlers::*;
pub use self::response::ApiResponse;
pub use self::state::{RequestCounter, TargetState};

pub fn setup_target_router(state: TargetState) -> Router {
    Router::new()
        .route("/target/ddos/ping", get(ping))
        .route("/target/ddos/compute-heavy", get(compute_heavy))
        .route("/target/ddos/io-delay", get(io_delay))
        .route("/target/ddos/status", get(status))
        .route("/target/echo", post(echo))
        .with_state(state)
}
