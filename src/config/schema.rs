//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files, and
//! every field has a default so a minimal config (or none at all) works.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Root configuration for the caching proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, ports, head limits).
    pub listener: ListenerConfig,

    /// Admission gate settings (client limit, queue timeout).
    pub admission: AdmissionConfig,

    /// Content cache settings (capacity, per-entry cap, TTL, sweep cadence).
    pub cache: CacheConfig,

    /// Upstream fetch settings (timeouts, response cap, retry budget).
    pub upstream: UpstreamConfig,

    /// CONNECT tunnel settings.
    pub tunnel: TunnelConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ProxyConfig {
    /// How long shutdown waits for in-flight connections to finish.
    ///
    /// Derived from the per-stage deadlines: a request still queued for
    /// admission, connecting, and receiving a response is covered, as is a
    /// tunnel waiting out one idle period.
    pub fn drain_timeout(&self) -> Duration {
        self.admission.acquire_timeout()
            + self.upstream.connect_timeout()
            + self.upstream.response_timeout()
            + self.tunnel.idle_timeout()
    }
}

/// Listener configuration.
///
/// The proxy serves HTTP on `http_port` and raw socket connections (CONNECT
/// tunneling, line-based forwarding) on the port immediately above it.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Address both listeners bind to.
    pub bind_address: String,

    /// HTTP proxy port. The raw listener binds `http_port + 1`.
    pub http_port: u16,

    /// Upper bound on a buffered request head, in bytes.
    pub max_head_bytes: usize,
}

impl ListenerConfig {
    /// Port for the raw socket listener.
    ///
    /// Port 0 stays 0 so tests can bind both listeners ephemerally.
    pub fn raw_port(&self) -> u16 {
        if self.http_port == 0 {
            0
        } else {
            self.http_port.saturating_add(1)
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            http_port: 8080,
            max_head_bytes: 4096,
        }
    }
}

/// Admission gate configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Maximum simultaneously serviced clients.
    pub max_clients: usize,

    /// How long a waiter may queue for a slot before being refused.
    pub acquire_timeout_ms: u64,
}

impl AdmissionConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_clients: 64,
            acquire_timeout_ms: 10_000,
        }
    }
}

/// Content cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Total bytes the cache may hold.
    pub capacity_bytes: u64,

    /// Upper bound on a single entry (body plus key).
    pub max_entry_bytes: u64,

    /// Entries idle longer than this are removed by the sweeper.
    pub idle_ttl_secs: u64,

    /// Interval between sweeper runs.
    pub sweep_interval_secs: u64,
}

impl CacheConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: 64 * 1024 * 1024,
            max_entry_bytes: 10 * 1024 * 1024,
            idle_ttl_secs: 3600,
            sweep_interval_secs: 1800,
        }
    }
}

/// Upstream fetch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// TCP connect deadline for an origin.
    pub connect_timeout_secs: u64,

    /// Total deadline for receiving an origin response.
    pub response_timeout_secs: u64,

    /// Responses larger than this abort with 413.
    pub max_response_bytes: u64,

    /// Retry attempts after a transport failure.
    pub max_retries: u32,

    /// Linear backoff step; attempt `n` waits `n * retry_step_ms`.
    pub retry_step_ms: u64,
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            response_timeout_secs: 5,
            max_response_bytes: 10 * 1024 * 1024,
            max_retries: 3,
            retry_step_ms: 1000,
        }
    }
}

/// CONNECT tunnel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// TCP connect deadline for the tunnel target.
    pub connect_timeout_secs: u64,

    /// A tunnel direction idle longer than this tears the pair down.
    pub idle_timeout_secs: u64,

    /// Port used when the CONNECT target omits one.
    pub default_port: u16,
}

impl TunnelConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            idle_timeout_secs: 60,
            default_port: 443,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Address for the Prometheus exporter. Disabled when unset.
    pub metrics_address: Option<SocketAddr>,
}
