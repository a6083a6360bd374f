//! Request-head reading and absolute-form target parsing.
//!
//! # Responsibilities
//! - Read a request head off a raw socket, bounded by the configured limit
//! - Split the request line and parse headers
//! - Normalize and validate the absolute-form request target
//!
//! Both listeners share this reader; they differ only in how they render its
//! errors (canonical HTML on the HTTP port, plain status lines on the raw
//! port).

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use url::Url;

use crate::error::ProxyError;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Error type for head reading and parsing.
#[derive(Debug, Error)]
pub enum HeadError {
    /// The head (or buffered request) outgrew the byte bound before the
    /// end-of-headers marker arrived.
    #[error("request head exceeds {0} bytes")]
    TooLarge(usize),

    /// Unparseable request line or header section.
    #[error("malformed request head: {0}")]
    Malformed(String),

    /// Peer closed before sending a complete head.
    #[error("connection closed before request head completed")]
    Closed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<HeadError> for ProxyError {
    fn from(err: HeadError) -> Self {
        match err {
            HeadError::Io(io) => ProxyError::Internal(io.to_string()),
            other => ProxyError::ClientBadRequest(other.to_string()),
        }
    }
}

/// A parsed HTTP/1.x request head.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: String,
    pub target: String,
    pub version: String,
    pub headers: HeaderMap,
}

/// Read one request head from `stream`, bounded by `max_bytes`.
///
/// Returns the parsed head and any bytes that arrived past the terminator
/// (a CONNECT client may pipeline tunnel data behind its preamble).
pub async fn read_request_head<R>(
    stream: &mut R,
    max_bytes: usize,
) -> Result<(RequestHead, Bytes), HeadError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);
    loop {
        if let Some(end) = find_terminator(&buf) {
            let mut head_bytes = buf.freeze();
            let remainder = head_bytes.split_off(end + HEAD_TERMINATOR.len());
            let head = parse_head(&head_bytes[..end])?;
            return Ok((head, remainder));
        }
        if buf.len() > max_bytes {
            return Err(HeadError::TooLarge(max_bytes));
        }
        let n = stream.read_buf(&mut buf).await?;
        if n == 0 {
            return if buf.is_empty() {
                Err(HeadError::Closed)
            } else {
                Err(HeadError::Malformed(
                    "connection closed mid-head".to_string(),
                ))
            };
        }
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
}

/// Parse the request line and header section (terminator excluded).
pub fn parse_head(head: &[u8]) -> Result<RequestHead, HeadError> {
    let text = std::str::from_utf8(head)
        .map_err(|_| HeadError::Malformed("request head is not valid UTF-8".to_string()))?;

    let mut lines = text.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut tokens = request_line.split_whitespace();
    let (method, target, version) = match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(m), Some(t), Some(v)) => (m, t, v),
        _ => {
            return Err(HeadError::Malformed(format!(
                "request line {request_line:?} is missing tokens"
            )))
        }
    };

    let mut headers = HeaderMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(HeadError::Malformed(format!("header line {line:?} has no colon")));
        };
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.trim()),
            HeaderValue::from_str(value.trim()),
        ) {
            headers.append(name, value);
        }
    }

    Ok(RequestHead {
        method: method.to_string(),
        target: target.to_string(),
        version: version.to_string(),
        headers,
    })
}

/// Collapse accidentally repeated scheme prefixes before parsing.
///
/// `http://http://host/path` becomes `http://host/path`.
pub fn collapse_repeated_scheme(target: &str) -> &str {
    let mut collapsed = target;
    while let Some(rest) = collapsed.strip_prefix("http://") {
        if rest.starts_with("http://") {
            collapsed = rest;
        } else {
            break;
        }
    }
    collapsed
}

/// Parse and validate an absolute-form request target.
pub fn parse_target(target: &str) -> Result<Url, ProxyError> {
    let collapsed = collapse_repeated_scheme(target.trim());
    let url = Url::parse(collapsed)
        .map_err(|e| ProxyError::ClientBadRequest(format!("invalid request target: {e}")))?;
    if url.scheme() != "http" {
        return Err(ProxyError::ClientBadRequest(format!(
            "unsupported scheme {:?} in request target",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(ProxyError::ClientBadRequest(
            "request target is missing a host".to_string(),
        ));
    }
    Ok(url)
}

/// Apply the pipeline's validation rules, yielding the resolved origin URL.
pub fn validate(head: &RequestHead) -> Result<Url, ProxyError> {
    if head.method != "GET" {
        return Err(ProxyError::MethodNotImplemented(head.method.clone()));
    }
    match head.version.as_str() {
        "HTTP/1.0" | "HTTP/1.1" => {}
        other => return Err(ProxyError::VersionUnsupported(other.to_string())),
    }
    parse_target(&head.target)
}
