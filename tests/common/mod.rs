//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use traffic_gateway::capture::{MemorySink, TrafficRecord};
use traffic_gateway::config::GatewayConfig;
use traffic_gateway::{GatewayServer, Shutdown};

/// Start a gateway on `addr` that exports into an in-memory sink.
pub async fn start_gateway(addr: SocketAddr, mut config: GatewayConfig) -> (Shutdown, MemorySink) {
    config.listener.bind_address = addr.to_string();

    let sink = MemorySink::new();
    let server = GatewayServer::new(config, Arc::new(sink.clone())).unwrap();
    let listener = TcpListener::bind(addr).await.unwrap();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    (shutdown, sink)
}

/// Client that never goes through a system proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Poll the sink until it holds at least `count` records.
///
/// Records are exported after the response body is released, which can land
/// just after the client has finished reading.
pub async fn wait_for_records(sink: &MemorySink, count: usize) -> Vec<TrafficRecord> {
    for _ in 0..100 {
        if sink.len() >= count {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    sink.records()
}

/// Send a raw request head announcing `content_length` bytes, write only
/// `partial`, then hang up.
#[allow(dead_code)]
pub async fn send_truncated_body(addr: SocketAddr, path: &str, content_length: usize, partial: &[u8]) {
    let mut socket = TcpStream::connect(addr).await.unwrap();
    let head = format!(
        "POST {} HTTP/1.1\r\nHost: {}\r\nContent-Length: {}\r\n\r\n",
        path, addr, content_length
    );
    socket.write_all(head.as_bytes()).await.unwrap();
    socket.write_all(partial).await.unwrap();
    socket.shutdown().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
}
