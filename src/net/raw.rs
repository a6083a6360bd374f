//! Raw socket service: CONNECT tunneling and line-based request forwarding.
//!
//! # Responsibilities
//! - Read the first request head off a fresh raw connection, bounded
//! - Route `CONNECT` to the tunnel
//! - Re-enter the HTTP pipeline in-process for any other method
//! - Answer protocol garbage with plain single-line statuses
//!
//! Errors on this port are plain text lines, not HTML pages; only requests
//! that reach the pipeline get the canonical error bodies.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::http::pipeline;
use crate::http::request::{read_request_head, HeadError};
use crate::server::ProxyState;

use super::tunnel;

const LINE_400: &str = "400 Bad Request\r\n";
const LINE_413: &str = "413 Request Entity Too Large\r\n";
const LINE_500: &str = "500 Internal Server Error\r\n";
const LINE_503: &str = "503 Service Unavailable\r\n";

/// Service one connection on the raw port.
pub async fn handle_raw_connection(state: Arc<ProxyState>, mut stream: TcpStream, peer: SocketAddr) {
    let permit = match state.gate.acquire().await {
        Ok(permit) => permit,
        Err(err) => {
            tracing::warn!(peer = %peer, error = %err, "Admission refused on raw port");
            write_line(&mut stream, LINE_503).await;
            return;
        }
    };

    let (head, remainder) =
        match read_request_head(&mut stream, state.config.listener.max_head_bytes).await {
            Ok(parsed) => parsed,
            Err(HeadError::TooLarge(limit)) => {
                tracing::debug!(peer = %peer, limit, "Raw request head over limit");
                write_line(&mut stream, LINE_413).await;
                return;
            }
            Err(HeadError::Io(err)) => {
                tracing::debug!(peer = %peer, error = %err, "Raw head read failed");
                write_line(&mut stream, LINE_500).await;
                return;
            }
            Err(err) => {
                tracing::debug!(peer = %peer, error = %err, "Malformed raw request");
                write_line(&mut stream, LINE_400).await;
                return;
            }
        };

    if !head.version.starts_with("HTTP/") {
        tracing::debug!(peer = %peer, version = %head.version, "Raw request with bad version token");
        write_line(&mut stream, LINE_400).await;
        return;
    }

    if head.method == "CONNECT" {
        if let Err(err) =
            tunnel::run(&state.config.tunnel, &mut stream, &head.target, &remainder).await
        {
            // The preamble never went out, so a status line is still useful.
            tracing::debug!(peer = %peer, target = %head.target, error = %err, "Tunnel not established");
            let status = err.status();
            let line = format!(
                "{} {}\r\n",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Error")
            );
            write_line(&mut stream, &line).await;
        }
        drop(permit);
    } else {
        pipeline::serve_request(state, stream, head, permit, peer).await;
    }
}

async fn write_line(stream: &mut TcpStream, line: &str) {
    if let Err(err) = stream.write_all(line.as_bytes()).await {
        tracing::debug!(error = %err, "Failed to write raw status line");
    }
    let _ = stream.flush().await;
}
