//! Thread-safe LRU store for values that own releasable resources
//!
//! The store holds the authoritative `Arc` of each value. When an entry is
//! displaced (eviction, replacement, `remove`, `clear`) its value is released
//! exactly once, after the internal lock has been dropped.

use super::util::{CacheKey, LruCache, LruCacheConfig};
use crate::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// A value whose resources can be freed explicitly
pub trait Releasable: Send + Sync {
    /// Free the resources held by this value.
    ///
    /// Called once by the store when the value leaves it. Other holders of
    /// the same `Arc` may still observe the released value.
    fn release(&self) -> Result<()>;

    /// Approximate retained size in bytes (for the byte budget)
    fn size_hint(&self) -> usize {
        0
    }
}

/// Snapshot of store counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub entries: usize,
    pub capacity: usize,
    pub peak_entries: usize,
    pub total_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub release_failures: u64,
}

struct StoreInner<V> {
    lru: LruCache<CacheKey, Arc<V>>,
    peak_entries: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// LRU store keyed by [`CacheKey`]
pub struct LruStore<V: Releasable> {
    inner: Mutex<StoreInner<V>>,
    release_failures: Mutex<u64>,
}

impl<V: Releasable> LruStore<V> {
    pub fn new(capacity: usize) -> Self {
        Self::with_memory_limit(capacity, 0)
    }

    /// `max_bytes == 0` disables the byte budget
    pub fn with_memory_limit(capacity: usize, max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                lru: LruCache::with_config(LruCacheConfig::with_memory(capacity, max_bytes)),
                peak_entries: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            release_failures: Mutex::new(0),
        }
    }

    /// Lookup with promotion; counts a hit or a miss
    pub fn get(&self, key: &CacheKey) -> Option<Arc<V>> {
        let mut inner = self.inner.lock();
        match inner.lru.get(key).cloned() {
            Some(value) => {
                inner.hits += 1;
                Some(value)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Lookup without promotion or counters
    pub fn peek(&self, key: &CacheKey) -> Option<Arc<V>> {
        self.inner.lock().lru.peek(key).cloned()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.lock().lru.contains(key)
    }

    /// Insert `value`, releasing whatever it displaces
    pub fn put(&self, key: CacheKey, value: Arc<V>) {
        let size = value.size_hint();
        let kept = Arc::clone(&value);

        let displaced = {
            let mut inner = self.inner.lock();
            let displaced = inner.lru.insert_with_size(key, value, size);
            let evicted = displaced.iter().filter(|(k, _)| *k != key).count() as u64;
            inner.evictions += evicted;
            inner.peak_entries = inner.peak_entries.max(inner.lru.len());
            displaced
        };

        for (old_key, old_value) in displaced {
            if Arc::ptr_eq(&old_value, &kept) {
                continue;
            }
            debug!(key = %old_key, "releasing displaced cache entry");
            self.release_value(&old_key, &old_value);
        }
    }

    /// Remove and release a single entry
    pub fn remove(&self, key: &CacheKey) -> bool {
        let removed = self.inner.lock().lru.remove(key);
        match removed {
            Some(value) => {
                self.release_value(key, &value);
                true
            }
            None => false,
        }
    }

    /// Release every entry and empty the store
    pub fn clear(&self) {
        let drained = self.inner.lock().lru.drain();
        for (key, value) in drained {
            self.release_value(&key, &value);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().lru.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().lru.capacity()
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.lock();
        StoreStats {
            entries: inner.lru.len(),
            capacity: inner.lru.capacity(),
            peak_entries: inner.peak_entries,
            total_bytes: inner.lru.current_bytes(),
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            release_failures: *self.release_failures.lock(),
        }
    }

    fn release_value(&self, key: &CacheKey, value: &Arc<V>) {
        if let Err(e) = value.release() {
            *self.release_failures.lock() += 1;
            warn!(key = %key, error = %e, "failed to release cache entry");
        }
    }
}
