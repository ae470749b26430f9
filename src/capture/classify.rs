//! Completion classifier.
//!
//! Turns a [`PendingRecord`] into a finished [`TrafficRecord`] once the
//! downstream exchange is over, and decides whether the exchange was
//! abnormal.

use std::time::Duration;

use http::StatusCode;

use crate::capture::record::{Outcome, PendingRecord, TrafficRecord};

/// Exchanges slower than this many milliseconds are abnormal.
pub const DEFAULT_LATENCY_THRESHOLD_MS: u64 = 3_000;

/// Request bodies larger than this many bytes are abnormal.
pub const DEFAULT_BODY_SIZE_THRESHOLD_BYTES: usize = 100 * 1024;

/// Status recorded when the downstream chain produced none.
pub const FALLBACK_STATUS: StatusCode = StatusCode::INTERNAL_SERVER_ERROR;

/// Abnormal-traffic policy. Both limits are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub latency_ms: u64,
    pub body_bytes: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            latency_ms: DEFAULT_LATENCY_THRESHOLD_MS,
            body_bytes: DEFAULT_BODY_SIZE_THRESHOLD_BYTES,
        }
    }
}

impl Thresholds {
    /// Either limit exceeded makes the exchange abnormal.
    pub fn is_abnormal(&self, elapsed_millis: u64, body_bytes: usize) -> bool {
        elapsed_millis > self.latency_ms || body_bytes > self.body_bytes
    }
}

impl PendingRecord {
    /// Finalize using the time elapsed since arrival.
    pub fn finalize(
        self,
        status: Option<StatusCode>,
        outcome: Outcome,
        thresholds: &Thresholds,
    ) -> TrafficRecord {
        let elapsed = self.arrived.elapsed();
        self.finalize_after(elapsed, status, outcome, thresholds)
    }

    /// Finalize with an explicit elapsed duration.
    pub fn finalize_after(
        self,
        elapsed: Duration,
        status: Option<StatusCode>,
        outcome: Outcome,
        thresholds: &Thresholds,
    ) -> TrafficRecord {
        let elapsed_millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let abnormal = thresholds.is_abnormal(elapsed_millis, self.body.bytes);

        TrafficRecord {
            id: self.id,
            request_id: self.request_id,
            source_address: self.source_address,
            target_address: self.target_address,
            method: self.method,
            path: self.path,
            query_string: self.query_string,
            request_body: self.body.text,
            request_body_bytes: self.body.bytes,
            body_capture: self.body.capture,
            response_status: status.unwrap_or(FALLBACK_STATUS).as_u16(),
            elapsed_millis,
            abnormal,
            outcome,
            captured_at: self.captured_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::record::{BodyCapture, CapturedBody};
    use crate::capture::snapshot::Snapshotter;
    use axum::body::Body;
    use http::{HeaderName, Request};

    fn pending_with_body(bytes: usize) -> PendingRecord {
        let snapshotter = Snapshotter::new(HeaderName::from_static("x-forwarded-for"), "127.0.0.1");
        let mut pending = snapshotter.snapshot(&Request::new(Body::empty()));
        if bytes > 0 {
            pending.attach_body(CapturedBody {
                text: "x".repeat(bytes),
                bytes,
                capture: BodyCapture::Complete,
            });
        }
        pending
    }

    fn finalize(elapsed_ms: u64, body_bytes: usize) -> TrafficRecord {
        pending_with_body(body_bytes).finalize_after(
            Duration::from_millis(elapsed_ms),
            Some(StatusCode::OK),
            Outcome::Completed,
            &Thresholds::default(),
        )
    }

    #[test]
    fn latency_boundary_is_exclusive() {
        assert!(!finalize(3000, 0).abnormal);
        assert!(finalize(3001, 0).abnormal);
    }

    #[test]
    fn body_size_boundary_is_exclusive() {
        assert!(!finalize(0, 102_400).abnormal);
        assert!(finalize(0, 102_401).abnormal);
    }

    #[test]
    fn thresholds_are_evaluated_independently() {
        let thresholds = Thresholds::default();
        assert!(!thresholds.is_abnormal(2_999, 102_399));
        assert!(thresholds.is_abnormal(3_001, 0));
        assert!(thresholds.is_abnormal(0, 102_401));
        assert!(thresholds.is_abnormal(3_001, 102_401));
    }

    #[test]
    fn empty_body_is_classified_by_latency_alone() {
        let record = finalize(10, 0);
        assert_eq!(record.request_body, "");
        assert_eq!(record.body_capture, BodyCapture::Empty);
        assert!(!record.abnormal);
    }

    #[test]
    fn missing_status_falls_back_to_500() {
        let record = pending_with_body(0).finalize_after(
            Duration::from_millis(5),
            None,
            Outcome::Cancelled,
            &Thresholds::default(),
        );
        assert_eq!(record.response_status, 500);
        assert_eq!(record.outcome, Outcome::Cancelled);
    }

    #[test]
    fn finalize_carries_snapshot_and_body() {
        let record = finalize(42, 3);
        assert_eq!(record.response_status, 200);
        assert_eq!(record.elapsed_millis, 42);
        assert_eq!(record.request_body, "xxx");
        assert_eq!(record.request_body_bytes, 3);
        assert_eq!(record.source_address, "unknown");
        assert_eq!(record.method, "GET");
    }

    #[test]
    fn custom_thresholds_apply() {
        let thresholds = Thresholds {
            latency_ms: 100,
            body_bytes: 10,
        };
        let record = pending_with_body(0).finalize_after(
            Duration::from_millis(150),
            Some(StatusCode::OK),
            Outcome::Completed,
            &thresholds,
        );
        assert!(record.abnormal);
    }
}
