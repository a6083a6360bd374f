//! Response writing and canonical error bodies.
//!
//! # Responsibilities
//! - Serialize a status line, headers, and body onto a raw stream
//! - Strip hop-by-hop headers from pass-through responses
//! - Render the canonical HTML error pages
//!
//! Every response is written with `Connection: close` and an exact
//! `Content-Length`; bodies are fully buffered upstream of this module.

use http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::time::SystemTime;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Server token advertised on synthesized responses.
pub const SERVER_TOKEN: &str = "NodeProxy/1.0";

/// Canonical HTML body for an error status.
pub fn error_body(status: StatusCode) -> String {
    let code = status.as_u16();
    let reason = status.canonical_reason().unwrap_or("Error");
    let detail = match code {
        400 => "The proxy could not understand the request.",
        403 => "Access to the requested resource is forbidden.",
        404 => "The requested resource was not found.",
        500 => "The proxy encountered an unexpected condition.",
        501 => "The proxy only services GET requests.",
        505 => "The proxy only speaks HTTP/1.0 and HTTP/1.1.",
        _ => "The proxy could not complete the request.",
    };
    format!(
        "<html><head><title>{code} {reason}</title></head>\n\
         <body><h1>{code} {reason}</h1>\n\
         <p>{detail}</p>\n\
         <hr><address>{SERVER_TOKEN}</address></body></html>\n"
    )
}

/// Write a synthesized error response for `status`.
pub async fn write_error<W>(stream: &mut W, status: StatusCode) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body = error_body(status);
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
    write_response(stream, status, &headers, body.as_bytes()).await
}

/// Write a complete response.
///
/// Forwards `headers` minus hop-by-hop and length fields, then appends
/// `Date` and `Server` (when absent), an exact `Content-Length`, and
/// `Connection: close`.
pub async fn write_response<W>(
    stream: &mut W,
    status: StatusCode,
    headers: &HeaderMap,
    body: &[u8],
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let reason = status.canonical_reason().unwrap_or("Unknown");
    let mut head = format!("HTTP/1.1 {} {}\r\n", status.as_u16(), reason);

    for (name, value) in headers {
        if skip_on_forward(name) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            head.push_str(name.as_str());
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
    }
    if !headers.contains_key(header::DATE) {
        head.push_str("Date: ");
        head.push_str(&httpdate::fmt_http_date(SystemTime::now()));
        head.push_str("\r\n");
    }
    if !headers.contains_key(header::SERVER) {
        head.push_str("Server: ");
        head.push_str(SERVER_TOKEN);
        head.push_str("\r\n");
    }
    head.push_str(&format!("Content-Length: {}\r\n", body.len()));
    head.push_str("Connection: close\r\n\r\n");

    stream.write_all(head.as_bytes()).await?;
    stream.write_all(body).await?;
    stream.flush().await
}

/// Headers never forwarded: hop-by-hop fields plus lengths we recompute.
fn skip_on_forward(name: &HeaderName) -> bool {
    name == header::CONNECTION
        || name == header::TRANSFER_ENCODING
        || name == header::CONTENT_LENGTH
        || name == header::TE
        || name == header::TRAILER
        || name == header::UPGRADE
        || name.as_str() == "keep-alive"
        || name.as_str() == "proxy-connection"
}
