//! Metrics collection and exposition.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter when an address is configured.
///
/// Without one the recording macros stay no-ops, so the helpers below are
/// always safe to call. An exporter that fails to install is logged and
/// skipped rather than taking the proxy down.
pub fn init_metrics(addr: Option<SocketAddr>) {
    let Some(addr) = addr else {
        tracing::debug!("Metrics exporter disabled");
        return;
    };

    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(err) => tracing::error!(error = %err, "Failed to install Prometheus exporter"),
    }
}

/// Helper to record a serviced request.
pub fn record_request(method: &str, status: u16, started: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];

    counter!("proxy_requests_total", &labels).increment(1);
    histogram!("proxy_request_duration_seconds", &labels).record(started.elapsed().as_secs_f64());
}

/// Helper to count a cache observation by kind.
pub fn record_cache_event(kind: &'static str) {
    counter!("proxy_cache_events_total", "event" => kind).increment(1);
}

/// Helper to track the cache byte total.
pub fn record_cache_bytes(bytes: u64) {
    gauge!("proxy_cache_bytes").set(bytes as f64);
}

/// Helper to count admission refusals.
pub fn record_admission_rejected() {
    counter!("proxy_admission_rejected_total").increment(1);
}
