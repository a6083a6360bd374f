//! Error kinds shared across the proxy subsystems.
//!
//! Every failure a request can hit maps onto exactly one external status
//! code. Cache failures never appear here; they degrade to pass-through and
//! surface only as observation events.

use http::StatusCode;
use thiserror::Error;

/// Errors that terminate a single proxied request.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Malformed URL, oversize request, or malformed request line.
    #[error("bad request: {0}")]
    ClientBadRequest(String),

    /// Any method other than GET on the proxied path.
    #[error("method {0} is not implemented")]
    MethodNotImplemented(String),

    /// HTTP version other than 1.0 or 1.1.
    #[error("HTTP version {0} is not supported")]
    VersionUnsupported(String),

    /// Admission queue timed out; the proxy is at its client limit.
    #[error("capacity exhausted: {0}")]
    CapacityExhausted(String),

    /// Upstream body exceeded the configured response cap.
    #[error("upstream response exceeds {cap} bytes")]
    ResponseTooLarge { cap: u64 },

    /// Upstream connect or read deadline elapsed.
    #[error("upstream timeout while {0}")]
    UpstreamTimeout(String),

    /// Transport failure that survived the retry budget.
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// Anything else. Logged and answered with a 500.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// The status code written to the client for this error kind.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::ClientBadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::MethodNotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            ProxyError::VersionUnsupported(_) => StatusCode::HTTP_VERSION_NOT_SUPPORTED,
            ProxyError::CapacityExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::ResponseTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        ProxyError::Internal(err.to_string())
    }
}
