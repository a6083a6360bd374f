//! TCP listener wrapper.
//!
//! # Responsibilities
//! - Bind to configured address and port
//! - Accept incoming TCP connections
//! - Graceful handling of bind and accept errors
//!
//! Concurrency is bounded per-request by the admission gate, not here; the
//! listener accepts eagerly so over-limit clients receive a 503 instead of
//! hanging in the kernel backlog.

use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {}

/// A bound TCP listener for one of the proxy's inbound ports.
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    /// Bind to `bind_address:port`.
    pub async fn bind(bind_address: &str, port: u16) -> Result<Self, ListenerError> {
        let addr: SocketAddr = format!("{bind_address}:{port}")
            .parse()
            .map_err(|e| ListenerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;

        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(address = %local_addr, "Listener bound");

        Ok(Self { inner: listener })
    }

    /// Accept a new connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ListenerError> {
        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;
        tracing::debug!(peer_addr = %addr, "Connection accepted");
        Ok((stream, addr))
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }
}
