//! CONNECT tunneling: a bidirectional byte bridge between client and origin.
//!
//! # Responsibilities
//! - Resolve the CONNECT target (default port when omitted)
//! - Connect to the origin under the tunnel connect deadline
//! - Emit the established-tunnel preamble
//! - Copy bytes both ways until either side closes, errors, or goes idle
//!
//! Tunneled bytes are never interpreted or cached. When either direction
//! ends, both halves are torn down together: the losing branch of the select
//! is dropped and both sockets close on return.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::TunnelConfig;
use crate::error::ProxyError;

/// Preamble confirming the tunnel to the client.
pub const ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

/// Establish and drive a tunnel for `CONNECT target`.
///
/// `early_data` is anything the client pipelined behind its preamble; it is
/// forwarded to the origin before bridging begins. Errors are only returned
/// for failures before the preamble is written; once established, teardown
/// is silent.
pub async fn run(
    config: &TunnelConfig,
    client: &mut TcpStream,
    target: &str,
    early_data: &[u8],
) -> Result<(), ProxyError> {
    let (host, port) = split_target(target, config.default_port)?;

    let mut origin = match timeout(
        config.connect_timeout(),
        TcpStream::connect((host.as_str(), port)),
    )
    .await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(err)) => {
            return Err(ProxyError::UpstreamUnreachable(format!(
                "{host}:{port}: {err}"
            )))
        }
        Err(_) => {
            return Err(ProxyError::UpstreamTimeout(format!(
                "connecting tunnel to {host}:{port}"
            )))
        }
    };

    client.write_all(ESTABLISHED).await?;
    if !early_data.is_empty() {
        // The preamble is already out; a failure here is plain teardown.
        if let Err(err) = origin.write_all(early_data).await {
            tracing::debug!(error = %err, "Tunnel torn down before bridging");
            return Ok(());
        }
    }

    tracing::debug!(host = %host, port, "Tunnel established");
    bridge(client, origin, config.idle_timeout()).await;
    Ok(())
}

/// Split a `host[:port]` CONNECT target.
fn split_target(target: &str, default_port: u16) -> Result<(String, u16), ProxyError> {
    let target = target.trim();
    if let Some((host, port)) = target.rsplit_once(':') {
        if host.is_empty() {
            return Err(ProxyError::ClientBadRequest(format!(
                "tunnel target {target:?} has no host"
            )));
        }
        let port = port.parse().map_err(|_| {
            ProxyError::ClientBadRequest(format!("invalid tunnel port in {target:?}"))
        })?;
        Ok((host.to_string(), port))
    } else if target.is_empty() {
        Err(ProxyError::ClientBadRequest("empty tunnel target".to_string()))
    } else {
        Ok((target.to_string(), default_port))
    }
}

/// Copy both directions until one finishes; dropping the other tears it down.
async fn bridge(client: &mut TcpStream, mut origin: TcpStream, idle: Duration) {
    let (mut client_read, mut client_write) = client.split();
    let (mut origin_read, mut origin_write) = origin.split();

    let result = tokio::select! {
        res = copy_with_idle_timeout(&mut client_read, &mut origin_write, idle) => {
            res.map(|bytes| ("client-to-origin", bytes))
        }
        res = copy_with_idle_timeout(&mut origin_read, &mut client_write, idle) => {
            res.map(|bytes| ("origin-to-client", bytes))
        }
    };

    match result {
        Ok((direction, bytes)) => tracing::debug!(direction, bytes, "Tunnel closed"),
        Err(err) => tracing::debug!(error = %err, "Tunnel torn down"),
    }
}

/// Copy until EOF, failing if a single read idles past `idle`.
async fn copy_with_idle_timeout<R, W>(
    reader: &mut R,
    writer: &mut W,
    idle: Duration,
) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; 8192];
    let mut total = 0u64;
    loop {
        let n = match timeout(idle, reader.read(&mut buf)).await {
            Ok(read) => read?,
            Err(_) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "tunnel idle timeout",
                ))
            }
        };
        if n == 0 {
            return Ok(total);
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
    }
}
