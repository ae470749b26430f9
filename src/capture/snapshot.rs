//! Request snapshotter.
//!
//! Records the request line and the client address at arrival. Runs
//! synchronously and never touches the body.

use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::ConnectInfo;
use chrono::Utc;
use http::{HeaderMap, HeaderName, Method, Request};
use uuid::Uuid;

use crate::capture::record::{BodyCapture, CapturedBody, PendingRecord};
use crate::http::request::request_id;

/// Placeholder for an address that cannot be resolved.
pub const UNKNOWN_ADDRESS: &str = "unknown";

/// Sentinel for a method the transport could not supply.
pub const UNKNOWN_METHOD: &str = "UNKNOWN";

/// Builds [`PendingRecord`]s from inbound requests.
#[derive(Debug, Clone)]
pub struct Snapshotter {
    forwarded_header: HeaderName,
    target_address: String,
}

impl Snapshotter {
    pub fn new(forwarded_header: HeaderName, target_address: impl Into<String>) -> Self {
        Self {
            forwarded_header,
            target_address: target_address.into(),
        }
    }

    /// Take the arrival snapshot of `request`.
    ///
    /// The peer address comes from the `ConnectInfo<SocketAddr>` extension
    /// that axum installs when served with connect info.
    pub fn snapshot<B>(&self, request: &Request<B>) -> PendingRecord {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        PendingRecord {
            id: Uuid::new_v4(),
            request_id: request_id(request.headers()).map(str::to_string),
            source_address: resolve_source_address(
                request.headers(),
                &self.forwarded_header,
                peer,
            ),
            target_address: self.target_address.clone(),
            method: method_token(request.method()),
            path: request.uri().path().to_string(),
            query_string: request.uri().query().unwrap_or_default().to_string(),
            captured_at: Utc::now(),
            arrived: Instant::now(),
            body: CapturedBody::empty(BodyCapture::Empty),
        }
    }
}

/// Resolve the client address of a request.
///
/// The first entry of the forwarded-for header wins unless it is blank or
/// the `unknown` placeholder. Otherwise the transport peer is used, and
/// failing that, `unknown`.
pub fn resolve_source_address(
    headers: &HeaderMap,
    forwarded_header: &HeaderName,
    peer: Option<SocketAddr>,
) -> String {
    let forwarded = headers
        .get(forwarded_header)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty() && !first.eq_ignore_ascii_case(UNKNOWN_ADDRESS));

    match (forwarded, peer) {
        (Some(first), _) => first.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => UNKNOWN_ADDRESS.to_string(),
    }
}

/// Uppercase method token, or [`UNKNOWN_METHOD`] if there is none.
pub fn method_token(method: &Method) -> String {
    let token = method.as_str().trim();
    if token.is_empty() {
        UNKNOWN_METHOD.to_string()
    } else {
        token.to_ascii_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn xff() -> HeaderName {
        HeaderName::from_static("x-forwarded-for")
    }

    fn peer() -> Option<SocketAddr> {
        Some("10.0.0.7:51234".parse().unwrap())
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", value.parse().unwrap());
        headers
    }

    #[test]
    fn forwarded_header_first_entry_wins() {
        let headers = headers_with("1.2.3.4, 5.6.7.8");
        assert_eq!(resolve_source_address(&headers, &xff(), peer()), "1.2.3.4");
    }

    #[test]
    fn unknown_placeholder_falls_back_to_peer() {
        for value in ["unknown", "UNKNOWN", "  unknown  "] {
            let headers = headers_with(value);
            assert_eq!(resolve_source_address(&headers, &xff(), peer()), "10.0.0.7");
        }
    }

    #[test]
    fn blank_header_falls_back_to_peer() {
        let headers = headers_with(" , 5.6.7.8");
        assert_eq!(resolve_source_address(&headers, &xff(), peer()), "10.0.0.7");
    }

    #[test]
    fn no_header_and_no_peer_is_unknown() {
        assert_eq!(
            resolve_source_address(&HeaderMap::new(), &xff(), None),
            UNKNOWN_ADDRESS
        );
    }

    #[test]
    fn custom_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "9.9.9.9".parse().unwrap());
        headers.insert("x-real-ip", "4.4.4.4".parse().unwrap());

        let header = HeaderName::from_static("x-real-ip");
        assert_eq!(resolve_source_address(&headers, &header, peer()), "4.4.4.4");
    }

    #[test]
    fn method_is_uppercased() {
        assert_eq!(method_token(&Method::POST), "POST");
        let custom = Method::from_bytes(b"purge").unwrap();
        assert_eq!(method_token(&custom), "PURGE");
    }

    #[test]
    fn snapshot_captures_request_line() {
        let snapshotter = Snapshotter::new(xff(), "127.0.0.1");
        let mut request = Request::builder()
            .method(Method::GET)
            .uri("http://gateway.local/target/ddos/io-delay?delay=5000&x=1")
            .header("x-request-id", "req-42")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(peer().unwrap()));

        let pending = snapshotter.snapshot(&request);

        assert_eq!(pending.method(), "GET");
        assert_eq!(pending.path(), "/target/ddos/io-delay");
        assert_eq!(pending.query_string(), "delay=5000&x=1");
        assert_eq!(pending.source_address(), "10.0.0.7");
        assert_eq!(pending.request_id.as_deref(), Some("req-42"));
        assert_eq!(pending.target_address, "127.0.0.1");
        assert_eq!(pending.body().capture, BodyCapture::Empty);
    }

    #[test]
    fn snapshots_get_distinct_ids() {
        let snapshotter = Snapshotter::new(xff(), "127.0.0.1");
        let request = Request::new(Body::empty());
        assert_ne!(
            snapshotter.snapshot(&request).id(),
            snapshotter.snapshot(&request).id()
        );
    }
}
