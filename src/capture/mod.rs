//! Traffic capture subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → snapshot.rs (source address, request line, arrival time)
//!     → body.rs (drain body once, keep a copy, build replay body)
//!     → downstream handler chain (opaque)
//!     → classify.rs (status, elapsed time, abnormal flag)
//!     → sink.rs (export the finished record)
//! ```
//!
//! # Design Decisions
//! - One record per request, owned by that request's task; no shared table
//! - Completion fields are write-once: they only exist on the finalized type
//! - Capture problems are logged, never surfaced to the caller
//! - Export runs after the response body is done, exactly once

pub mod body;
pub mod classify;
pub mod middleware;
pub mod record;
pub mod sink;
pub mod snapshot;

pub use classify::Thresholds;
pub use middleware::{capture_middleware, CaptureState};
pub use record::{BodyCapture, Outcome, TrafficRecord};
pub use sink::{
    build_sink, BuiltSink, ChannelSink, DiscardSink, ExportError, JsonLinesSink, LogSink, MemorySink,
    TrafficSink,
};
