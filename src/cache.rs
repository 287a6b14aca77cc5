//! Process-local, bounded LRU cache of completed idempotency records.
//!
//! This is purely a latency optimization: it lets a warm re-invocation within
//! the same process skip the store round-trip entirely. Correctness never
//! depends on its contents — disabling it must yield identical observable
//! responses (just slower ones), so every write here also has a durable
//! counterpart in the persistence store.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;

use crate::record::DataRecord;
use crate::time::now_secs;

/// Default bound used when a caller does not specify one.
pub const DEFAULT_MAX_ITEMS: usize = 256;

/// Thread-safe, capacity-bounded LRU cache of `COMPLETED` records.
pub struct LocalCache {
    entries: Mutex<LruCache<String, DataRecord>>,
    stats: CacheStats,
}

/// Cache statistics tracked atomically.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Total cache hits (entries served from cache).
    pub hits: AtomicU64,
    /// Total cache misses (entry absent, or present but expired).
    pub misses: AtomicU64,
    /// Total evictions (expired-on-lookup or LRU capacity evictions).
    pub evictions: AtomicU64,
}

impl CacheStats {
    fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

/// Point-in-time snapshot of [`CacheStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    /// Total cache hits.
    pub hits: u64,
    /// Total cache misses.
    pub misses: u64,
    /// Total evictions.
    pub evictions: u64,
    /// Current number of entries.
    pub size: usize,
}

impl LocalCache {
    /// Create a new empty cache bounded at `max_items` entries. Falls back to
    /// [`DEFAULT_MAX_ITEMS`] if `max_items` is zero.
    #[must_use]
    pub fn new(max_items: usize) -> Self {
        let capacity = NonZeroUsize::new(max_items)
            .unwrap_or_else(|| NonZeroUsize::new(DEFAULT_MAX_ITEMS).expect("nonzero default"));
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            stats: CacheStats::default(),
        }
    }

    /// Look up a completed record by idempotency key.
    ///
    /// Returns `None` on a miss or when the cached row's TTL has elapsed
    /// (the stale entry is evicted in that case). A hit bumps the entry to
    /// most-recently-used.
    pub fn get(&self, key: &str) -> Option<DataRecord> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(record) if record.expiry_ts > now_secs() => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(record.clone())
            }
            Some(_) => {
                entries.pop(key);
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert (or refresh) a completed record. If the cache is at capacity,
    /// the least-recently-used entry is evicted first.
    pub fn put(&self, record: DataRecord) {
        let mut entries = self.entries.lock();
        if entries.len() == entries.cap().get() && !entries.contains(&record.idempotency_key) {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
        entries.put(record.idempotency_key.clone(), record);
    }

    /// Remove `key`, e.g. after detecting a payload-validation mismatch.
    pub fn invalidate(&self, key: &str) {
        self.entries.lock().pop(key);
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Current number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// `true` when the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of hit/miss/eviction counters and current size.
    #[must_use]
    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.stats.hits(),
            misses: self.stats.misses(),
            evictions: self.stats.evictions(),
            size: self.len(),
        }
    }
}
