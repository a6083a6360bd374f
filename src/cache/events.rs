//! Cache observation events.
//!
//! The cache publishes a one-way notification stream of what happened to it.
//! Delivery is lossy: a slow subscriber drops events rather than ever
//! blocking a cache operation. Subscribers must not call back into the cache
//! synchronously from a handler.

/// What the cache just did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// A lookup found the key.
    Hit { key: String },
    /// A lookup missed.
    Miss { key: String },
    /// An entry was installed.
    Added { key: String, size: u64 },
    /// An entry was evicted under size pressure (or replaced).
    Removed { key: String, size: u64 },
    /// The sweeper removed an entry idle past the TTL.
    Expired { key: String, idle_secs: u64 },
    /// A cache-internal problem that was swallowed.
    Error { detail: String },
}

impl CacheEvent {
    /// Stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheEvent::Hit { .. } => "hit",
            CacheEvent::Miss { .. } => "miss",
            CacheEvent::Added { .. } => "added",
            CacheEvent::Removed { .. } => "removed",
            CacheEvent::Expired { .. } => "expired",
            CacheEvent::Error { .. } => "error",
        }
    }
}
