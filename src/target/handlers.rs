use std::time::{Duration, Instant};

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::response::ApiResponse;
use super::state::TargetState;

/// Input to the CPU-bound endpoint.
pub const FIBONACCI_N: u32 = 35;

pub const DEFAULT_IO_DELAY_MS: u64 = 1_000;
pub const MAX_IO_DELAY_MS: u64 = 10_000;

#[derive(Serialize)]
pub struct PingData {
    pub request_id: u64,
    pub timestamp: i64,
    pub total_requests: u64,
}

#[derive(Serialize)]
pub struct ComputeData {
    pub request_id: u64,
    pub calculation: String,
    pub result: u64,
    pub cost_time_ms: u64,
    pub total_requests: u64,
}

#[derive(Serialize)]
pub struct DelayData {
    pub request_id: u64,
    pub simulated_delay_ms: u64,
    pub total_requests: u64,
}

#[derive(Serialize)]
pub struct TargetEndpoint {
    pub method: &'static str,
    pub path: &'static str,
    pub desc: &'static str,
}

#[derive(Serialize)]
pub struct StatusData {
    pub total_requests_received: u64,
    pub available_targets: Vec<TargetEndpoint>,
}

#[derive(Debug, Deserialize)]
pub struct DelayParams {
    pub delay: Option<u64>,
}

pub async fn ping(State(state): State<TargetState>) -> ApiResponse<PingData> {
    let request_id = state.requests.increment();
    ApiResponse::ok(
        "pong",
        PingData {
            request_id,
            timestamp: Utc::now().timestamp_millis(),
            total_requests: state.requests.get(),
        },
    )
}

pub async fn compute_heavy(State(state): State<TargetState>) -> impl IntoResponse {
    let start = Instant::now();
    let request_id = state.requests.increment();
    tracing::debug!(request_id, "CPU-bound target request");

    let result = match tokio::task::spawn_blocking(|| fibonacci(FIBONACCI_N)).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(request_id, error = %e, "Computation task failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "computation failed").into_response();
        }
    };

    ApiResponse::ok(
        "computation finished",
        ComputeData {
            request_id,
            calculation: format!("fibonacci({FIBONACCI_N})"),
            result,
            cost_time_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            total_requests: state.requests.get(),
        },
    )
    .into_response()
}

pub async fn io_delay(
    State(state): State<TargetState>,
    Query(params): Query<DelayParams>,
) -> ApiResponse<DelayData> {
    let request_id = state.requests.increment();
    let delay_ms = clamp_delay(params.delay);
    tracing::debug!(request_id, delay_ms, "I/O delay target request");

    tokio::time::sleep(Duration::from_millis(delay_ms)).await;

    ApiResponse::ok(
        "simulated I/O finished",
        DelayData {
            request_id,
            simulated_delay_ms: delay_ms,
            total_requests: state.requests.get(),
        },
    )
}

pub async fn status(State(state): State<TargetState>) -> ApiResponse<StatusData> {
    ApiResponse::ok(
        "target status",
        StatusData {
            total_requests_received: state.requests.get(),
            available_targets: vec![
                TargetEndpoint {
                    method: "GET",
                    path: "/target/ddos/compute-heavy",
                    desc: "CPU-bound",
                },
                TargetEndpoint {
                    method: "GET",
                    path: "/target/ddos/io-delay?delay=5000",
                    desc: "I/O wait",
                },
                TargetEndpoint {
                    method: "GET",
                    path: "/target/ddos/ping",
                    desc: "flood",
                },
            ],
        },
    )
}

/// Return the request body as received, keeping its content type.
pub async fn echo(State(state): State<TargetState>, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    state.requests.increment();

    let mut response_headers = HeaderMap::new();
    if let Some(content_type) = headers.get(header::CONTENT_TYPE) {
        response_headers.insert(header::CONTENT_TYPE, content_type.clone());
    }
    (response_headers, body)
}

fn clamp_delay(requested: Option<u64>) -> u64 {
    requested.unwrap_or(DEFAULT_IO_DELAY_MS).min(MAX_IO_DELAY_MS)
}

fn fibonacci(n: u32) -> u64 {
    if n <= 1 {
        return u64::from(n);
    }
    fibonacci(n - 1) + fibonacci(n - 2)
}
