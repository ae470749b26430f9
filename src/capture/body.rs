//! Body interceptor.
//!
//! A request body is a one-shot stream, yet both the capture layer and the
//! downstream handler need all of it. The interceptor drains the stream once
//! into an owned buffer, keeps a UTF-8 view of it for the record, and hands
//! downstream a new body built over the same bytes. The transport stream is
//! never rewound.
//!
//! Failure policy: a drain error never reaches the caller. The record gets an
//! empty body and downstream gets an empty replay body. A body that crosses
//! the capture ceiling is still recoverable, so downstream receives the bytes
//! already read followed by the unread remainder of the original stream.
//!
//! Request trailers are read and discarded. The replay body carries data
//! frames only, so handlers behind the capture layer never see trailers.

use std::pin::Pin;

use axum::body::Body;
use axum::BoxError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures_util::{stream, StreamExt};
use http_body::Body as HttpBody;
use http_body_util::BodyExt;

use crate::capture::record::{BodyCapture, CapturedBody};
use crate::observability::metrics;

/// Error type for body capture.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to read request body: {0}")]
    Read(#[source] BoxError),

    #[error("request body exceeds capture limit of {limit} bytes")]
    Overflow { limit: usize },
}

impl CaptureError {
    /// Metrics label for this failure.
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureError::Read(_) => "read",
            CaptureError::Overflow { .. } => "overflow",
        }
    }
}

/// Result of draining a body stream.
#[derive(Debug)]
pub enum Drained<B> {
    /// The stream ended; every byte is in the buffer.
    Complete(Bytes),
    /// The stream crossed the limit. `prefix` holds everything read so far
    /// and `rest` is the unread remainder.
    Overflow { prefix: Bytes, rest: B },
}

/// Drain `body` into an owned buffer, stopping once more than `limit` bytes
/// have been read.
///
/// Each chunk is copied out and dropped before the next one is polled, so
/// buffers handed out by the transport go back to their allocator on every
/// path, including errors. Trailers are discarded.
pub async fn drain<B>(body: B, limit: usize) -> Result<Drained<Pin<Box<B>>>, CaptureError>
where
    B: HttpBody,
    B::Error: Into<BoxError>,
{
    let mut body = Box::pin(body);
    let mut buf = BytesMut::new();

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| CaptureError::Read(e.into()))?;
        let Ok(chunk) = frame.into_data() else {
            continue;
        };

        let overflow = buf.len() + chunk.remaining() > limit;
        buf.put(chunk);
        if overflow {
            return Ok(Drained::Overflow {
                prefix: buf.freeze(),
                rest: body,
            });
        }
    }

    Ok(Drained::Complete(buf.freeze()))
}

/// Capture a request body and build the body downstream will read.
///
/// Never fails: capture problems are logged and reflected in
/// [`CapturedBody::capture`].
pub async fn intercept(body: Body, limit: usize) -> (CapturedBody, Body) {
    match drain(body, limit).await {
        Ok(Drained::Complete(bytes)) if bytes.is_empty() => {
            (CapturedBody::empty(BodyCapture::Empty), Body::empty())
        }
        Ok(Drained::Complete(bytes)) => {
            let captured = CapturedBody {
                text: String::from_utf8_lossy(&bytes).into_owned(),
                bytes: bytes.len(),
                capture: BodyCapture::Complete,
            };
            (captured, Body::from(bytes))
        }
        Ok(Drained::Overflow { prefix, rest }) => {
            let err = CaptureError::Overflow { limit };
            tracing::warn!(
                error = %err,
                observed_bytes = prefix.len(),
                "Request body not captured; streaming it through"
            );
            metrics::record_capture_failure(err.kind());

            let captured = CapturedBody {
                text: String::new(),
                bytes: prefix.len(),
                capture: BodyCapture::Oversized,
            };
            (captured, resume(prefix, rest))
        }
        Err(err) => {
            tracing::error!(error = %err, "Failed to capture request body; forwarding an empty body");
            metrics::record_capture_failure(err.kind());
            (CapturedBody::empty(BodyCapture::Failed), Body::empty())
        }
    }
}

/// Rebuild a body from an already-read prefix and the unread remainder.
fn resume(prefix: Bytes, rest: Pin<Box<Body>>) -> Body {
    let head = stream::once(async move { Ok::<_, BoxError>(prefix) });
    let tail = BodyExt::into_data_stream(rest).map(|chunk| chunk.map_err(BoxError::from));
    Body::from_stream(head.chain(tail))
}
