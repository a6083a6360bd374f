//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use caching_proxy::cache::ContentCache;
use caching_proxy::lifecycle::Shutdown;
use caching_proxy::{ProxyConfig, ProxyServer};

/// Start a mock origin that answers every request with `body` after `delay`.
pub async fn start_origin(body: &'static str, delay: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;
                        tokio::time::sleep(delay).await;
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a mock origin returning `len` bytes of filler.
#[allow(dead_code)]
pub async fn start_sized_origin(len: usize) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;
                        let head = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n"
                        );
                        let _ = socket.write_all(head.as_bytes()).await;
                        let _ = socket.write_all(&vec![b'x'; len]).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a mock origin that echoes every byte back, for tunnel tests.
#[allow(dead_code)]
pub async fn start_echo_origin() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let (mut read, mut write) = socket.split();
                        let _ = tokio::io::copy(&mut read, &mut write).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a proxy on ephemeral ports.
///
/// Returns the HTTP address, the raw address, a cache handle for
/// introspection, and the shutdown trigger.
pub async fn start_proxy(mut config: ProxyConfig) -> (SocketAddr, SocketAddr, ContentCache, Shutdown) {
    config.listener.bind_address = "127.0.0.1".to_string();
    config.listener.http_port = 0;

    let server = ProxyServer::new(config).unwrap();
    let cache = server.cache();
    let (http_listener, raw_listener) = server.bind().await.unwrap();
    let http_addr = http_listener.local_addr().unwrap();
    let raw_addr = raw_listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(http_listener, raw_listener, rx).await;
    });

    (http_addr, raw_addr, cache, shutdown)
}

/// Write `request` to `addr` and read the whole response.
///
/// Returns the parsed status code and the full response text.
pub async fn roundtrip(addr: SocketAddr, request: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let _ = stream.write_all(request.as_bytes()).await;

    // Tolerate an abortive close; whatever arrived before it still counts.
    let mut response = Vec::new();
    let _ = stream.read_to_end(&mut response).await;
    let text = String::from_utf8_lossy(&response).to_string();

    let status = text
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    (status, text)
}

/// Body portion of a response captured by [`roundtrip`].
#[allow(dead_code)]
pub fn body_of(response: &str) -> &str {
    response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body)
        .unwrap_or("")
}

/// An absolute-form GET for `path` against `origin`.
#[allow(dead_code)]
pub fn get_request(origin: SocketAddr, path: &str) -> String {
    format!("GET http://{origin}{path} HTTP/1.1\r\nHost: {origin}\r\n\r\n")
}
