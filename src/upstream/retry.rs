//! Retry policy for upstream transport failures.
//!
//! Only transport-level failures (refused, reset, DNS) are retried. Any
//! received HTTP status is returned as-is, and timeouts surface as their own
//! error kind without retry.

use std::time::Duration;

/// Linear backoff delay before retry `attempt` (1-based).
pub fn backoff_delay(attempt: u32, step_ms: u64) -> Duration {
    Duration::from_millis(step_ms.saturating_mul(attempt as u64))
}

/// Whether an outbound error is a transport failure worth retrying.
pub fn is_transport_error(err: &reqwest::Error) -> bool {
    if err.is_timeout() || err.is_builder() {
        return false;
    }
    err.is_connect() || err.is_request()
}
