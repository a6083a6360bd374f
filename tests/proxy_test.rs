//! End-to-end scenarios against live proxy instances.

use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use caching_proxy::{ProxyConfig, ProxyServer, Shutdown};

mod common;
use common::{body_of, get_request, roundtrip, start_echo_origin, start_origin, start_proxy, start_sized_origin};

#[tokio::test]
async fn test_cold_then_warm_cache() {
    let origin = start_origin("Hello from test server!", Duration::from_millis(300)).await;
    let (proxy, _raw, cache, _shutdown) = start_proxy(ProxyConfig::default()).await;
    let request = get_request(origin, "/");

    let cold_start = Instant::now();
    let (status, response) = roundtrip(proxy, &request).await;
    let cold = cold_start.elapsed();
    assert_eq!(status, 200);
    assert_eq!(body_of(&response), "Hello from test server!");
    assert!(cold >= Duration::from_millis(300));
    assert_eq!(cache.len(), 1);

    let warm_start = Instant::now();
    let (status, response) = roundtrip(proxy, &request).await;
    let warm = warm_start.elapsed();
    assert_eq!(status, 200);
    assert_eq!(body_of(&response), "Hello from test server!");
    // Served from cache: no origin round trip, no 300ms delay.
    assert!(warm < cold);
    assert!(warm < Duration::from_millis(300));

    // The cached playback preserves the origin's content type.
    assert!(response.contains("content-type: text/plain"));
}

#[tokio::test]
async fn test_oversize_response_rejected() {
    let origin = start_sized_origin(64 * 1024).await;

    let mut config = ProxyConfig::default();
    config.upstream.max_response_bytes = 4096;
    let (proxy, _raw, cache, _shutdown) = start_proxy(config).await;

    let (status, response) = roundtrip(proxy, &get_request(origin, "/big")).await;
    assert_eq!(status, 413);
    assert!(response.contains("413"));

    // Nothing was installed.
    assert_eq!(cache.len(), 0);
    assert_eq!(cache.bytes_in_use(), 0);
}

#[tokio::test]
async fn test_delayed_response_preserves_latency() {
    let origin = start_origin("Delayed response", Duration::from_millis(1000)).await;
    let (proxy, _raw, _cache, _shutdown) = start_proxy(ProxyConfig::default()).await;

    let started = Instant::now();
    let (status, response) = roundtrip(proxy, &get_request(origin, "/slow")).await;

    assert_eq!(status, 200);
    assert_eq!(body_of(&response), "Delayed response");
    assert!(started.elapsed() >= Duration::from_millis(1000));
}

#[tokio::test]
async fn test_post_rejected_with_canonical_body() {
    let origin = start_origin("unused", Duration::ZERO).await;
    let (proxy, _raw, _cache, _shutdown) = start_proxy(ProxyConfig::default()).await;

    let request = format!("POST http://{origin}/ HTTP/1.1\r\nHost: {origin}\r\n\r\n");
    let (status, response) = roundtrip(proxy, &request).await;

    assert_eq!(status, 501);
    assert!(response.contains("<h1>501 Not Implemented</h1>"));
    assert!(response.contains("Connection: close"));
}

#[tokio::test]
async fn test_old_version_rejected() {
    let origin = start_origin("unused", Duration::ZERO).await;
    let (proxy, _raw, _cache, _shutdown) = start_proxy(ProxyConfig::default()).await;

    let request = format!("GET http://{origin}/ HTTP/0.9\r\n\r\n");
    let (status, response) = roundtrip(proxy, &request).await;

    assert_eq!(status, 505);
    assert!(response.contains("505"));
}

#[tokio::test]
async fn test_unparseable_target_rejected() {
    let (proxy, _raw, _cache, _shutdown) = start_proxy(ProxyConfig::default()).await;

    let (status, _) = roundtrip(proxy, "GET /no-scheme HTTP/1.1\r\n\r\n").await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_admission_saturation_returns_503() {
    let origin = start_origin("slow", Duration::from_millis(2000)).await;

    let mut config = ProxyConfig::default();
    config.admission.max_clients = 4;
    config.admission.acquire_timeout_ms = 100;
    let (proxy, _raw, _cache, _shutdown) = start_proxy(config).await;

    // Pin four slots on the slow origin.
    let mut pinned = Vec::new();
    for i in 0..4 {
        let request = get_request(origin, &format!("/slow/{i}"));
        pinned.push(tokio::spawn(async move { roundtrip(proxy, &request).await }));
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    // The fifth request times out of the admission queue.
    let started = Instant::now();
    let (status, _) = roundtrip(proxy, &get_request(origin, "/fifth")).await;
    assert_eq!(status, 503);
    assert!(started.elapsed() < Duration::from_millis(1000));

    for task in pinned {
        let (status, _) = task.await.unwrap();
        assert_eq!(status, 200);
    }
}

#[tokio::test]
async fn test_connect_tunnel_relays_both_ways() {
    let echo = start_echo_origin().await;
    let (_proxy, raw, _cache, _shutdown) = start_proxy(ProxyConfig::default()).await;

    let mut stream = TcpStream::connect(raw).await.unwrap();
    stream
        .write_all(format!("CONNECT {echo} HTTP/1.1\r\n\r\n").as_bytes())
        .await
        .unwrap();

    let mut preamble = [0u8; 39];
    stream.read_exact(&mut preamble).await.unwrap();
    assert_eq!(&preamble[..], b"HTTP/1.1 200 Connection Established\r\n\r\n");

    for payload in [&b"ping-1"[..], &b"a second, longer payload"[..]] {
        stream.write_all(payload).await.unwrap();
        let mut relayed = vec![0u8; payload.len()];
        stream.read_exact(&mut relayed).await.unwrap();
        assert_eq!(relayed, payload);
    }
}

#[tokio::test]
async fn test_connect_to_dead_target_reports_status_line() {
    // Bind then drop to get a port nothing listens on.
    let dead = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let (_proxy, raw, _cache, _shutdown) = start_proxy(ProxyConfig::default()).await;

    let (_, response) = roundtrip(raw, &format!("CONNECT {dead_addr} HTTP/1.1\r\n\r\n")).await;
    assert!(response.starts_with("502 "), "got: {response:?}");
}

#[tokio::test]
async fn test_raw_port_forwards_plain_requests() {
    let origin = start_origin("via raw port", Duration::ZERO).await;
    let (_proxy, raw, cache, _shutdown) = start_proxy(ProxyConfig::default()).await;

    let (status, response) = roundtrip(raw, &get_request(origin, "/")).await;
    assert_eq!(status, 200);
    assert_eq!(body_of(&response), "via raw port");
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_raw_port_oversize_head_gets_plain_413() {
    let (_proxy, raw, _cache, _shutdown) = start_proxy(ProxyConfig::default()).await;

    let oversized = "X".repeat(5000);
    let (status, response) = roundtrip(raw, &oversized).await;
    assert_eq!(status, 0);
    assert_eq!(response, "413 Request Entity Too Large\r\n");
}

#[tokio::test]
async fn test_raw_port_garbage_line_gets_plain_400() {
    let (_proxy, raw, _cache, _shutdown) = start_proxy(ProxyConfig::default()).await;

    let (_, response) = roundtrip(raw, "GARBAGE\r\n\r\n").await;
    assert_eq!(response, "400 Bad Request\r\n");
}

#[tokio::test]
async fn test_raw_port_bad_version_token_gets_plain_400() {
    let (_proxy, raw, _cache, _shutdown) = start_proxy(ProxyConfig::default()).await;

    let (_, response) = roundtrip(raw, "GET http://example.com/ SMTP/1.0\r\n\r\n").await;
    assert_eq!(response, "400 Bad Request\r\n");
}

#[tokio::test]
async fn test_origin_error_status_passes_through() {
    // An origin that always answers 404.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let origin = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let body = "origin says no";
                let response = format!(
                    "HTTP/1.1 404 Not Found\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    let (proxy, _raw, cache, _shutdown) = start_proxy(ProxyConfig::default()).await;

    let (status, response) = roundtrip(proxy, &get_request(origin, "/missing")).await;
    assert_eq!(status, 404);
    assert_eq!(body_of(&response), "origin says no");
    // Only 200s are cached.
    assert_eq!(cache.len(), 0);
}

#[tokio::test]
async fn test_unreachable_origin_returns_502() {
    let dead = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let mut config = ProxyConfig::default();
    config.upstream.max_retries = 1;
    config.upstream.retry_step_ms = 10;
    let (proxy, _raw, _cache, _shutdown) = start_proxy(config).await;

    let (status, _) = roundtrip(proxy, &get_request(dead_addr, "/")).await;
    assert_eq!(status, 502);
}

#[tokio::test]
async fn test_shutdown_drains_in_flight_requests() {
    let origin = start_origin("drained", Duration::from_millis(500)).await;

    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1".to_string();
    config.listener.http_port = 0;
    let server = ProxyServer::new(config).unwrap();
    let (http_listener, raw_listener) = server.bind().await.unwrap();
    let proxy = http_listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    let running = tokio::spawn(async move {
        server.run(http_listener, raw_listener, rx).await;
    });

    let request = get_request(origin, "/");
    let in_flight = tokio::spawn(async move { roundtrip(proxy, &request).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    shutdown.trigger();

    // The pinned request outlives the signal and still completes.
    let (status, response) = in_flight.await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(body_of(&response), "drained");

    // run() returns once drained, with the listening sockets closed.
    running.await.unwrap();
    assert!(TcpStream::connect(proxy).await.is_err());
}

#[tokio::test]
async fn test_repeated_scheme_collapsed() {
    let origin = start_origin("collapsed", Duration::ZERO).await;
    let (proxy, _raw, cache, _shutdown) = start_proxy(ProxyConfig::default()).await;

    let request = format!("GET http://http://{origin}/ HTTP/1.1\r\n\r\n");
    let (status, response) = roundtrip(proxy, &request).await;
    assert_eq!(status, 200);
    assert_eq!(body_of(&response), "collapsed");

    // The collapsed and plain forms share one cache entry.
    let (status, _) = roundtrip(proxy, &get_request(origin, "/")).await;
    assert_eq!(status, 200);
    assert_eq!(cache.len(), 1);
}
