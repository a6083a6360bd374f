//! The request pipeline: admit, validate, consult cache, fetch, respond.
//!
//! # State Machine
//! ```text
//!            ┌──────── Admitted ────────┐
//! New ──► Admit ──► Validate ──► CacheCheck ──► Hit: RespondFromCache ──► Release
//!                     │                  └──► Miss: Fetch ──► Cache-if-ok ──► Respond ──► Release
//!                     └──► Invalid: RespondError ──► Release
//! ```
//!
//! # Design Decisions
//! - Every exit path writes exactly one response; failures after the head
//!   has been written only log and close
//! - The admission permit is an RAII guard dropped at the end of the
//!   handler, so the slot is released on every path including panics
//! - Cache failures degrade to pass-through and never fail the request

use http::{header, HeaderMap, HeaderValue, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpStream;

use crate::admission::AdmissionPermit;
use crate::error::ProxyError;
use crate::observability::metrics;
use crate::server::ProxyState;

use super::request::{self, read_request_head, RequestHead};
use super::response;

/// Service one connection on the HTTP port.
pub async fn handle_http_connection(state: Arc<ProxyState>, mut stream: TcpStream, peer: SocketAddr) {
    let started = Instant::now();

    let permit = match state.gate.acquire().await {
        Ok(permit) => permit,
        Err(err) => {
            tracing::warn!(peer = %peer, error = %err, "Admission refused");
            respond_error(&mut stream, StatusCode::SERVICE_UNAVAILABLE).await;
            metrics::record_request("-", 503, started);
            return;
        }
    };

    let head = match read_request_head(&mut stream, state.config.listener.max_head_bytes).await {
        Ok((head, _remainder)) => head,
        Err(err) => {
            tracing::debug!(peer = %peer, error = %err, "Unreadable request head");
            let status = ProxyError::from(err).status();
            respond_error(&mut stream, status).await;
            metrics::record_request("-", status.as_u16(), started);
            return;
        }
    };

    serve_request(state, stream, head, permit, peer).await;
}

/// Service one parsed request, releasing `permit` when done.
///
/// Also the re-entry point for non-CONNECT requests arriving on the raw
/// port, which admitted and parsed the head itself.
pub async fn serve_request(
    state: Arc<ProxyState>,
    mut stream: TcpStream,
    head: RequestHead,
    permit: AdmissionPermit,
    peer: SocketAddr,
) {
    let started = Instant::now();

    let status = match process(&state, &mut stream, &head).await {
        Ok(status) => status,
        Err(Failure::Before(err)) => {
            let status = err.status();
            tracing::debug!(
                peer = %peer,
                method = %head.method,
                target = %head.target,
                status = status.as_u16(),
                error = %err,
                "Request failed"
            );
            respond_error(&mut stream, status).await;
            status
        }
        Err(Failure::MidWrite(err)) => {
            // The head is already on the wire; close without a rewrite.
            tracing::warn!(peer = %peer, target = %head.target, error = %err, "Response write failed");
            metrics::record_request(&head.method, 0, started);
            return;
        }
    };

    tracing::info!(
        peer = %peer,
        method = %head.method,
        target = %head.target,
        status = status.as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Request serviced"
    );
    metrics::record_request(&head.method, status.as_u16(), started);
    drop(permit);
}

enum Failure {
    /// Nothing written yet; the caller answers with the canonical page.
    Before(ProxyError),
    /// The response head was (at least partially) written.
    MidWrite(std::io::Error),
}

async fn process(
    state: &ProxyState,
    stream: &mut TcpStream,
    head: &RequestHead,
) -> Result<StatusCode, Failure> {
    let url = request::validate(head).map_err(Failure::Before)?;
    let key = url.to_string();

    if let Some(cached) = state.cache.lookup(&key) {
        let mut headers = HeaderMap::new();
        let content_type = cached
            .content_type
            .as_deref()
            .and_then(|ct| HeaderValue::from_str(ct).ok())
            .unwrap_or_else(|| HeaderValue::from_static("text/html"));
        headers.insert(header::CONTENT_TYPE, content_type);

        response::write_response(stream, StatusCode::OK, &headers, &cached.body)
            .await
            .map_err(Failure::MidWrite)?;
        return Ok(StatusCode::OK);
    }

    let fetched = state
        .fetcher
        .fetch(&url, &head.headers)
        .await
        .map_err(Failure::Before)?;

    if fetched.status == StatusCode::OK {
        let content_type = fetched
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        match state.cache.insert(&key, fetched.body.clone(), content_type) {
            Ok(()) => tracing::debug!(key = %key, size = fetched.body.len(), "Cached upstream response"),
            Err(err) => tracing::debug!(key = %key, error = %err, "Response not cached"),
        }
    }

    response::write_response(stream, fetched.status, &fetched.headers, &fetched.body)
        .await
        .map_err(Failure::MidWrite)?;
    Ok(fetched.status)
}

async fn respond_error(stream: &mut TcpStream, status: StatusCode) {
    if let Err(err) = response::write_error(stream, status).await {
        tracing::debug!(error = %err, "Failed to write error response");
    }
}
