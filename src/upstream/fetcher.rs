//! Single-request upstream HTTP client.
//!
//! # Responsibilities
//! - Perform one HTTP/1.x request per call with connect and response deadlines
//! - Forward client headers verbatim, forcing `Connection: close`
//! - Cap the response body size, aborting mid-stream when exceeded
//! - Retry transport failures with linear backoff; never retry HTTP statuses

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use http::{header, HeaderMap, HeaderValue, StatusCode};
use url::Url;

use crate::config::UpstreamConfig;
use crate::error::ProxyError;

use super::retry::{backoff_delay, is_transport_error};

/// A fully buffered upstream response.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Performs upstream GETs with retry on transport error.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    config: UpstreamConfig,
}

enum AttemptError {
    /// Refused, reset, DNS failure. Retried up to the configured budget.
    Transport(reqwest::Error),
    /// Mapped and surfaced immediately.
    Fatal(ProxyError),
}

impl Fetcher {
    pub fn new(config: UpstreamConfig) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.response_timeout())
            .redirect(reqwest::redirect::Policy::none())
            // Never chain through another proxy from the environment.
            .no_proxy()
            .build()
            .map_err(|e| ProxyError::Internal(format!("failed to build upstream client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Fetch `url`, forwarding `headers`.
    ///
    /// Transport failures retry `max_retries` times with linear backoff and
    /// then surface as [`ProxyError::UpstreamUnreachable`].
    pub async fn fetch(&self, url: &Url, headers: &HeaderMap) -> Result<FetchedResponse, ProxyError> {
        let mut attempt: u32 = 0;
        loop {
            match self.try_fetch(url, headers).await {
                Ok(response) => return Ok(response),
                Err(AttemptError::Transport(err)) if attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = backoff_delay(attempt, self.config.retry_step_ms);
                    tracing::warn!(
                        url = %url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transport error, retrying upstream fetch"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(AttemptError::Transport(err)) => {
                    tracing::error!(
                        url = %url,
                        retries = self.config.max_retries,
                        error = %err,
                        "Upstream unreachable after retries"
                    );
                    return Err(ProxyError::UpstreamUnreachable(err.to_string()));
                }
                Err(AttemptError::Fatal(err)) => return Err(err),
            }
        }
    }

    async fn try_fetch(&self, url: &Url, headers: &HeaderMap) -> Result<FetchedResponse, AttemptError> {
        let mut outgoing = headers.clone();
        outgoing.insert(header::CONNECTION, HeaderValue::from_static("close"));

        let response = self
            .client
            .get(url.as_str())
            .headers(outgoing)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        let response_headers = response.headers().clone();
        let body = self.read_body(response).await?;

        Ok(FetchedResponse {
            status,
            headers: response_headers,
            body,
        })
    }

    /// Buffer the body chunkwise, aborting past the configured cap.
    async fn read_body(&self, response: reqwest::Response) -> Result<Bytes, AttemptError> {
        let cap = self.config.max_response_bytes;
        let mut buf = BytesMut::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| {
                if err.is_timeout() {
                    AttemptError::Fatal(ProxyError::UpstreamTimeout(
                        "reading upstream response".into(),
                    ))
                } else {
                    AttemptError::Fatal(ProxyError::UpstreamUnreachable(err.to_string()))
                }
            })?;
            if (buf.len() + chunk.len()) as u64 > cap {
                return Err(AttemptError::Fatal(ProxyError::ResponseTooLarge { cap }));
            }
            buf.extend_from_slice(&chunk);
        }

        Ok(buf.freeze())
    }
}

fn classify_send_error(err: reqwest::Error) -> AttemptError {
    if err.is_timeout() {
        AttemptError::Fatal(ProxyError::UpstreamTimeout("awaiting upstream response".into()))
    } else if is_transport_error(&err) {
        AttemptError::Transport(err)
    } else {
        AttemptError::Fatal(ProxyError::Internal(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn test_config() -> UpstreamConfig {
        UpstreamConfig {
            connect_timeout_secs: 1,
            response_timeout_secs: 1,
            max_response_bytes: 1024,
            max_retries: 0,
            retry_step_ms: 10,
        }
    }

    async fn start_origin(status_line: &'static str, body: &'static str) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 {status_line}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        Url::parse(&format!("http://{addr}/")).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let url = start_origin("200 OK", "hello").await;
        let fetcher = Fetcher::new(test_config()).unwrap();

        let response = fetcher.fetch(&url, &HeaderMap::new()).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, Bytes::from_static(b"hello"));
        assert_eq!(
            response.headers.get(header::CONTENT_TYPE).unwrap(),
            "text/plain"
        );
    }

    #[tokio::test]
    async fn test_http_status_passed_through() {
        let url = start_origin("404 Not Found", "nope").await;
        let fetcher = Fetcher::new(test_config()).unwrap();

        let response = fetcher.fetch(&url, &HeaderMap::new()).await.unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.body, Bytes::from_static(b"nope"));
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("http://{addr}/")).unwrap();
        let fetcher = Fetcher::new(test_config()).unwrap();

        let err = fetcher.fetch(&url, &HeaderMap::new()).await.unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamUnreachable(_)));
    }

    #[tokio::test]
    async fn test_oversize_body_aborts() {
        let url = start_origin("200 OK", "this body is much longer than the configured cap").await;
        let mut config = test_config();
        config.max_response_bytes = 8;
        let fetcher = Fetcher::new(config).unwrap();

        let err = fetcher.fetch(&url, &HeaderMap::new()).await.unwrap_err();
        assert!(matches!(err, ProxyError::ResponseTooLarge { cap: 8 }));
    }

    #[tokio::test]
    async fn test_silent_origin_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                // Accept and hold the socket without ever responding.
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    drop(socket);
                });
            }
        });

        let url = Url::parse(&format!("http://{addr}/")).unwrap();
        let fetcher = Fetcher::new(test_config()).unwrap();

        let err = fetcher.fetch(&url, &HeaderMap::new()).await.unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamTimeout(_)));
    }
}
