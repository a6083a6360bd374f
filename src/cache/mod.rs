//! LRU content cache subsystem.
//!
//! # Data Flow
//! ```text
//! pipeline lookup(key)
//!     → hit: touch recency + hit count, hand out body view
//!     → miss: pipeline fetches, then insert(key, body)
//!         → per-entry cap check
//!         → evict least-recently-accessed until the entry fits
//! sweeper (periodic)
//!     → sweep(): drop entries idle past the TTL
//! every operation
//!     → events.rs (lossy broadcast to subscribers)
//! ```
//!
//! # Design Decisions
//! - One exclusive lock over map + byte total; lookups touch recency and are
//!   therefore writers too
//! - `lru::LruCache` gives O(1) lookup, insert, and pop-of-least-recent
//! - Lookup touches keep recency order identical to last-accessed order, so
//!   both eviction and expiry pop from the LRU end and stop at the first
//!   entry that still fits / is still fresh
//! - Size accounting changes in the same critical section as the map

pub mod entry;
pub mod events;
pub mod sweeper;

pub use entry::{CacheEntry, CachedBody};
pub use events::CacheEvent;
pub use sweeper::spawn_sweeper;

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::config::CacheConfig;
use crate::observability::metrics;

/// Capacity of the event fan-out channel; laggards lose events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Why an insert was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InsertRejected {
    /// Entry is bigger than the per-entry cap; nothing was evicted for it.
    #[error("entry of {size} bytes exceeds per-entry cap of {cap} bytes")]
    TooLarge { size: u64, cap: u64 },
}

/// Size-bounded LRU cache of response bodies keyed by request target.
///
/// Cheap to clone; clones share the same underlying cache.
#[derive(Clone)]
pub struct ContentCache {
    state: Arc<CacheState>,
}

struct CacheState {
    inner: Mutex<CacheInner>,
    events: broadcast::Sender<CacheEvent>,
    capacity_bytes: u64,
    max_entry_bytes: u64,
    idle_ttl: Duration,
}

struct CacheInner {
    lru: LruCache<String, CacheEntry>,
    bytes_in_use: u64,
}

impl ContentCache {
    pub fn new(config: &CacheConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(CacheState {
                inner: Mutex::new(CacheInner {
                    lru: LruCache::unbounded(),
                    bytes_in_use: 0,
                }),
                events,
                capacity_bytes: config.capacity_bytes,
                max_entry_bytes: config.max_entry_bytes,
                idle_ttl: config.idle_ttl(),
            }),
        }
    }

    /// Subscribe to the observation stream.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.state.events.subscribe()
    }

    /// Look up `key`, touching recency and the hit count on success.
    pub fn lookup(&self, key: &str) -> Option<CachedBody> {
        let view = {
            let mut inner = self.state.inner.lock();
            inner.lru.get_mut(key).map(|entry| {
                entry.hits += 1;
                entry.last_accessed = SystemTime::now();
                CachedBody {
                    body: entry.body.clone(),
                    content_type: entry.content_type.clone(),
                    hits: entry.hits,
                }
            })
        };

        match &view {
            Some(_) => self.emit(CacheEvent::Hit {
                key: key.to_string(),
            }),
            None => self.emit(CacheEvent::Miss {
                key: key.to_string(),
            }),
        }
        view
    }

    /// Install `body` under `key`, evicting least-recently-accessed entries
    /// until it fits.
    ///
    /// Replacing an existing key accounts only the size delta. The byte total
    /// never exceeds capacity between public operations.
    pub fn insert(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<String>,
    ) -> Result<(), InsertRejected> {
        let entry = CacheEntry::new(key, body, content_type);
        let size = entry.size();
        if size > self.state.max_entry_bytes {
            self.emit(CacheEvent::Error {
                detail: format!("rejected {key}: {size} bytes over per-entry cap"),
            });
            return Err(InsertRejected::TooLarge {
                size,
                cap: self.state.max_entry_bytes,
            });
        }

        let mut evicted = Vec::new();
        let bytes_in_use = {
            let mut inner = self.state.inner.lock();
            if let Some(old) = inner.lru.pop(key) {
                inner.bytes_in_use -= old.size();
                evicted.push((key.to_string(), old.size()));
            }
            while inner.bytes_in_use + size > self.state.capacity_bytes {
                match inner.lru.pop_lru() {
                    Some((victim_key, victim)) => {
                        inner.bytes_in_use -= victim.size();
                        evicted.push((victim_key, victim.size()));
                    }
                    None => break,
                }
            }
            inner.bytes_in_use += size;
            inner.lru.put(key.to_string(), entry);
            inner.bytes_in_use
        };

        for (victim_key, victim_size) in evicted {
            self.emit(CacheEvent::Removed {
                key: victim_key,
                size: victim_size,
            });
        }
        self.emit(CacheEvent::Added {
            key: key.to_string(),
            size,
        });
        metrics::record_cache_bytes(bytes_in_use);
        Ok(())
    }

    /// Remove every entry whose last-accessed age exceeds the idle TTL.
    ///
    /// Returns the number of entries removed. Victims are collected and
    /// deleted under a single lock acquisition; the LRU end holds the oldest
    /// last-access, so the scan stops at the first fresh entry.
    pub fn sweep(&self) -> usize {
        let now = SystemTime::now();
        let mut expired = Vec::new();
        {
            let mut inner = self.state.inner.lock();
            loop {
                let stale = inner
                    .lru
                    .peek_lru()
                    .map(|(_, entry)| entry.idle_for(now) > self.state.idle_ttl)
                    .unwrap_or(false);
                if !stale {
                    break;
                }
                if let Some((key, entry)) = inner.lru.pop_lru() {
                    inner.bytes_in_use -= entry.size();
                    expired.push((key, entry.idle_for(now)));
                }
            }
        }

        let count = expired.len();
        for (key, idle) in expired {
            self.emit(CacheEvent::Expired {
                key,
                idle_secs: idle.as_secs(),
            });
        }
        if count > 0 {
            metrics::record_cache_bytes(self.bytes_in_use());
        }
        count
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.state.inner.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current byte total (bodies plus keys).
    pub fn bytes_in_use(&self) -> u64 {
        self.state.inner.lock().bytes_in_use
    }

    fn emit(&self, event: CacheEvent) {
        metrics::record_cache_event(event.kind());
        let _ = self.state.events.send(event);
    }
}
