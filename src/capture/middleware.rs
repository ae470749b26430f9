//! Traffic capture middleware.
//!
//! Wires the three capture stages around the downstream handler chain:
//!
//! ```text
//! request ─▶ snapshot ─▶ intercept body ─▶ next.run(...) ─▶ response head
//!                                                             │
//!                       export ◀─ finalize ◀─ body finished / dropped
//! ```
//!
//! Finalization is owned by a drop guard. Once the downstream chain has
//! produced a response, the guard rides along inside the response body and
//! fires when the body reports its end or is released by the transport,
//! never while a frame is still on its way to the caller. If
//! the request future is dropped earlier, the guard fires from its own
//! `Drop`. Either way it fires once.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use http::header::InvalidHeaderName;
use http_body::{Body as HttpBody, Frame, SizeHint};
use pin_project_lite::pin_project;

use crate::capture::body::intercept;
use crate::capture::classify::Thresholds;
use crate::capture::record::{CapturedBody, Outcome, PendingRecord, TrafficRecord};
use crate::capture::sink::TrafficSink;
use crate::capture::snapshot::Snapshotter;
use crate::config::CaptureConfig;
use crate::observability::metrics;

struct CaptureInner {
    enabled: bool,
    snapshotter: Snapshotter,
    thresholds: Thresholds,
    max_capture_bytes: usize,
    skip_paths: Vec<String>,
    sink: Arc<dyn TrafficSink>,
}

/// Shared, read-only state for [`capture_middleware`].
#[derive(Clone)]
pub struct CaptureState {
    inner: Arc<CaptureInner>,
}

impl CaptureState {
    /// Capture state with default policy, exporting to `sink`.
    pub fn new(sink: Arc<dyn TrafficSink>) -> Self {
        let defaults = CaptureConfig::default();
        Self {
            inner: Arc::new(CaptureInner {
                enabled: defaults.enabled,
                snapshotter: Snapshotter::new(
                    HeaderName::from_static("x-forwarded-for"),
                    defaults.target_address,
                ),
                thresholds: Thresholds::default(),
                max_capture_bytes: defaults.max_capture_bytes,
                skip_paths: defaults.skip_paths,
                sink,
            }),
        }
    }

    /// Capture state from validated configuration.
    pub fn from_config(
        config: &CaptureConfig,
        sink: Arc<dyn TrafficSink>,
    ) -> Result<Self, InvalidHeaderName> {
        let forwarded_header = HeaderName::from_bytes(config.forwarded_header.as_bytes())?;
        Ok(Self {
            inner: Arc::new(CaptureInner {
                enabled: config.enabled,
                snapshotter: Snapshotter::new(forwarded_header, config.target_address.clone()),
                thresholds: Thresholds {
                    latency_ms: config.latency_threshold_ms,
                    body_bytes: config.body_size_threshold_bytes,
                },
                max_capture_bytes: config.max_capture_bytes,
                skip_paths: config.skip_paths.clone(),
                sink,
            }),
        })
    }

    pub fn thresholds(&self) -> Thresholds {
        self.inner.thresholds
    }

    fn should_capture(&self, path: &str) -> bool {
        self.inner.enabled && !self.inner.skip_paths.iter().any(|p| p == path)
    }

    /// Hand a finished record to the sink. Failures are logged and counted,
    /// never retried.
    fn export(&self, record: &TrafficRecord) {
        metrics::record_capture(record);

        let sink = &self.inner.sink;
        if let Err(e) = sink.export(record) {
            tracing::warn!(
                sink = sink.name(),
                record_id = %record.id,
                error = %e,
                "Traffic export failed"
            );
            metrics::record_export_failure(sink.name());
        }
    }
}

/// Middleware that records every request/response exchange.
///
/// Install with `axum::middleware::from_fn_with_state`.
pub async fn capture_middleware(
    State(state): State<CaptureState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.should_capture(request.uri().path()) {
        return next.run(request).await;
    }

    let pending = state.inner.snapshotter.snapshot(&request);
    tracing::debug!(
        record_id = %pending.id(),
        source = %pending.source_address(),
        method = %pending.method(),
        path = %pending.path(),
        "Capturing request"
    );

    let mut finalizer = Finalizer::new(pending, state.clone());

    let (parts, body) = request.into_parts();
    let (captured, replay) = intercept(body, state.inner.max_capture_bytes).await;
    finalizer.attach_body(captured);

    let response = next.run(Request::from_parts(parts, replay)).await;
    finalizer.set_status(response.status());

    let (parts, body) = response.into_parts();
    Response::from_parts(parts, Body::new(CompletionBody::new(body, finalizer)))
}

/// Drop guard that finalizes and exports a record exactly once.
struct Finalizer {
    pending: Option<PendingRecord>,
    status: Option<StatusCode>,
    state: CaptureState,
}

impl Finalizer {
    fn new(pending: PendingRecord, state: CaptureState) -> Self {
        Self {
            pending: Some(pending),
            status: None,
            state,
        }
    }

    fn attach_body(&mut self, body: CapturedBody) {
        if let Some(pending) = self.pending.as_mut() {
            pending.attach_body(body);
        }
    }

    fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    fn finish(&mut self, outcome: Outcome) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let record = pending.finalize(self.status, outcome, &self.state.inner.thresholds);
        self.state.export(&record);
    }
}

impl Drop for Finalizer {
    fn drop(&mut self) {
        let outcome = if self.status.is_some() {
            Outcome::Completed
        } else {
            Outcome::Cancelled
        };
        self.finish(outcome);
    }
}

pin_project! {
    /// Response body that finalizes its record when the stream ends.
    struct CompletionBody<B> {
        #[pin]
        inner: B,
        finalizer: Finalizer,
    }
}

impl<B> CompletionBody<B> {
    fn new(inner: B, finalizer: Finalizer) -> Self {
        Self { inner, finalizer }
    }
}

impl<B> HttpBody for CompletionBody<B>
where
    B: HttpBody,
{
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();
        let frame = ready!(this.inner.as_mut().poll_frame(cx));

        match &frame {
            None => this.finalizer.finish(Outcome::Completed),
            Some(Err(_)) => this.finalizer.finish(Outcome::Failed),
            Some(Ok(_)) => {}
        }

        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
