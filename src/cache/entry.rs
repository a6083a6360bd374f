//! Cached response bodies and their bookkeeping.

use bytes::Bytes;
use std::time::{Duration, Instant, SystemTime};

/// A single cached response.
///
/// Mutated only to touch `last_accessed` and `hits` on lookup; everything
/// else is fixed at insertion.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub(crate) body: Bytes,
    pub(crate) content_type: Option<String>,
    pub(crate) size: u64,
    pub(crate) inserted_at: Instant,
    pub(crate) last_accessed: SystemTime,
    pub(crate) hits: u64,
}

impl CacheEntry {
    pub(crate) fn new(key: &str, body: Bytes, content_type: Option<String>) -> Self {
        Self {
            size: (body.len() + key.len()) as u64,
            body,
            content_type,
            inserted_at: Instant::now(),
            last_accessed: SystemTime::now(),
            hits: 0,
        }
    }

    /// Accounted size: body length plus key length.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// How long the entry has been resident.
    pub fn age(&self) -> Duration {
        self.inserted_at.elapsed()
    }

    /// Time since the last lookup (or insertion, if never looked up).
    pub(crate) fn idle_for(&self, now: SystemTime) -> Duration {
        now.duration_since(self.last_accessed).unwrap_or_default()
    }
}

/// Read-only view of an entry handed out on a cache hit.
#[derive(Debug, Clone)]
pub struct CachedBody {
    /// The response body. `Bytes` clones share the allocation.
    pub body: Bytes,
    /// Content type recorded when the entry was installed.
    pub content_type: Option<String>,
    /// Lookup count including this hit.
    pub hits: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_counts_body_and_key() {
        let entry = CacheEntry::new("http://a/", Bytes::from_static(b"12345"), None);
        assert_eq!(entry.size(), 5 + 9);
    }

    #[test]
    fn test_idle_for_clock_skew_is_zero() {
        let entry = CacheEntry::new("k", Bytes::new(), None);
        let before_insert = entry.last_accessed - Duration::from_secs(10);
        assert_eq!(entry.idle_for(before_insert), Duration::ZERO);
    }
}
