//! Traffic record types.
//!
//! A record starts life as a [`PendingRecord`]: the arrival snapshot plus the
//! captured body. The completion fields (status, elapsed time, abnormal flag)
//! do not exist on that type at all. They only appear on the [`TrafficRecord`]
//! produced by consuming the pending record in
//! [`PendingRecord::finalize`](crate::capture::record::PendingRecord::finalize), so each of them is
//! written exactly once.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// How the request body was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyCapture {
    /// The request carried no body bytes.
    Empty,
    /// The whole body was buffered and replayed downstream.
    Complete,
    /// The body crossed the capture ceiling and was streamed through uncaptured.
    Oversized,
    /// Reading the body failed; downstream received an empty body.
    Failed,
}

/// How the downstream exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// A response was produced and its body ran to completion or was
    /// released by the transport.
    Completed,
    /// A response was produced but its body stream failed.
    Failed,
    /// The request was dropped before any response existed.
    Cancelled,
}

/// What the body interceptor hands back for the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedBody {
    /// UTF-8 view of the body; lossy for binary payloads.
    pub text: String,
    /// Bytes observed. For oversized bodies this is a lower bound.
    pub bytes: usize,
    pub capture: BodyCapture,
}

impl CapturedBody {
    /// A capture that holds nothing.
    pub fn empty(capture: BodyCapture) -> Self {
        Self {
            text: String::new(),
            bytes: 0,
            capture,
        }
    }
}

/// A record whose request side is known but whose exchange is still running.
#[derive(Debug, Clone)]
pub struct PendingRecord {
    pub(crate) id: Uuid,
    pub(crate) request_id: Option<String>,
    pub(crate) source_address: String,
    pub(crate) target_address: String,
    pub(crate) method: String,
    pub(crate) path: String,
    pub(crate) query_string: String,
    pub(crate) captured_at: DateTime<Utc>,
    pub(crate) arrived: Instant,
    pub(crate) body: CapturedBody,
}

impl PendingRecord {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source_address(&self) -> &str {
        &self.source_address
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    pub fn body(&self) -> &CapturedBody {
        &self.body
    }

    /// Store the interceptor's view of the body.
    pub(crate) fn attach_body(&mut self, body: CapturedBody) {
        self.body = body;
    }
}

/// A finalized observation of one request/response exchange.
///
/// Only the capture layer constructs these; sinks receive them by reference.
#[derive(Debug, Clone, Serialize)]
#[non_exhaustive]
pub struct TrafficRecord {
    pub id: Uuid,
    /// Correlation ID from `x-request-id`, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub source_address: String,
    pub target_address: String,
    pub method: String,
    pub path: String,
    pub query_string: String,
    pub request_body: String,
    pub request_body_bytes: usize,
    pub body_capture: BodyCapture,
    pub response_status: u16,
    pub elapsed_millis: u64,
    pub abnormal: bool,
    pub outcome: Outcome,
    pub captured_at: DateTime<Utc>,
}
