//! Lightweight LRU Cache implementation
//!
//! Eviction hands the displaced entries back to the caller so that values
//! owning external resources can be released outside any lock.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Instant;

/// Configuration for LRU cache with memory limits
#[derive(Debug, Clone)]
pub struct LruCacheConfig {
    /// Maximum number of entries
    pub max_entries: usize,
    /// Maximum memory in bytes (0 = unlimited)
    pub max_bytes: usize,
}

impl Default for LruCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10,
            max_bytes: 0,
        }
    }
}

impl LruCacheConfig {
    /// Create config with entry limit only
    pub fn with_entries(max_entries: usize) -> Self {
        Self {
            max_entries,
            ..Default::default()
        }
    }

    /// Create config with memory limit
    pub fn with_memory(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            max_entries,
            max_bytes,
        }
    }
}

/// A simple LRU (Least Recently Used) cache
///
/// Recency is an access counter per entry; eviction scans for the minimum.
/// Capacities here are small (tens of entries) so the scan is cheap.
#[derive(Debug)]
pub struct LruCache<K, V> {
    entries: HashMap<K, LruEntry<V>>,
    config: LruCacheConfig,
    /// Access counter for LRU tracking
    access_counter: u64,
    current_bytes: usize,
}

#[derive(Debug)]
struct LruEntry<V> {
    value: V,
    last_access: u64,
    created_at: Instant,
    size_bytes: usize,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    /// Create a new LRU cache with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self::with_config(LruCacheConfig::with_entries(capacity))
    }

    /// Create a new LRU cache with configuration
    ///
    /// A capacity of zero is raised to one.
    pub fn with_config(mut config: LruCacheConfig) -> Self {
        config.max_entries = config.max_entries.max(1);
        Self {
            entries: HashMap::with_capacity(config.max_entries),
            config,
            access_counter: 0,
            current_bytes: 0,
        }
    }

    /// Get a reference to a cached value, promoting it to most recent
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.access_counter += 1;
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_access = self.access_counter;
            Some(&entry.value)
        } else {
            None
        }
    }

    /// Look at a value without updating access time
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|e| &e.value)
    }

    /// Check if a key exists without updating access time
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert a value into the cache
    ///
    /// Returns every value pushed out by this insert: the previous value of
    /// `key` if it was present, followed by evicted LRU entries.
    pub fn insert(&mut self, key: K, value: V) -> Vec<(K, V)> {
        self.insert_with_size(key, value, 0)
    }

    /// Insert a value with a known size (for memory tracking)
    pub fn insert_with_size(&mut self, key: K, value: V, size_bytes: usize) -> Vec<(K, V)> {
        self.access_counter += 1;
        let mut displaced = Vec::new();

        // Replace in place
        if let Some(entry) = self.entries.get_mut(&key) {
            let old_size = entry.size_bytes;
            let old_value = std::mem::replace(&mut entry.value, value);
            entry.last_access = self.access_counter;
            entry.size_bytes = size_bytes;
            self.current_bytes = self.current_bytes.saturating_sub(old_size) + size_bytes;
            displaced.push((key.clone(), old_value));
            self.evict_over_budget(Some(&key), &mut displaced);
            return displaced;
        }

        // Evict if at entry capacity
        while self.entries.len() >= self.config.max_entries {
            match self.evict_lru(None) {
                Some(evicted) => displaced.push(evicted),
                None => break,
            }
        }

        // Evict if at memory capacity
        if self.config.max_bytes > 0 {
            while self.current_bytes + size_bytes > self.config.max_bytes && !self.entries.is_empty()
            {
                match self.evict_lru(None) {
                    Some(evicted) => displaced.push(evicted),
                    None => break,
                }
            }
        }

        self.current_bytes += size_bytes;
        self.entries.insert(
            key,
            LruEntry {
                value,
                last_access: self.access_counter,
                created_at: Instant::now(),
                size_bytes,
            },
        );

        displaced
    }

    /// Remove a specific key from the cache
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|e| {
            self.current_bytes = self.current_bytes.saturating_sub(e.size_bytes);
            e.value
        })
    }

    /// Remove every entry and return them
    pub fn drain(&mut self) -> Vec<(K, V)> {
        self.current_bytes = 0;
        self.entries.drain().map(|(k, e)| (k, e.value)).collect()
    }

    /// Get the number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the capacity
    pub fn capacity(&self) -> usize {
        self.config.max_entries
    }

    /// Get the maximum memory limit in bytes (0 = unlimited)
    pub fn max_bytes(&self) -> usize {
        self.config.max_bytes
    }

    /// Get total memory usage in bytes
    pub fn current_bytes(&self) -> usize {
        self.current_bytes
    }

    fn evict_over_budget(&mut self, keep: Option<&K>, displaced: &mut Vec<(K, V)>) {
        if self.config.max_bytes == 0 {
            return;
        }
        while self.current_bytes > self.config.max_bytes && self.entries.len() > 1 {
            match self.evict_lru(keep) {
                Some(evicted) => displaced.push(evicted),
                None => break,
            }
        }
    }

    /// Evict the least recently used entry, never `keep`
    fn evict_lru(&mut self, keep: Option<&K>) -> Option<(K, V)> {
        let lru_key = self.find_lru_key(keep)?;
        let entry = self.entries.remove(&lru_key)?;
        self.current_bytes = self.current_bytes.saturating_sub(entry.size_bytes);
        Some((lru_key, entry.value))
    }

    /// Find the key with the oldest access time
    fn find_lru_key(&self, keep: Option<&K>) -> Option<K> {
        self.entries
            .iter()
            .filter(|(k, _)| Some(*k) != keep)
            .min_by_key(|(_, e)| e.last_access)
            .map(|(k, _)| k.clone())
    }

    /// Get cache statistics
    pub fn stats(&self) -> LruCacheStats {
        let oldest = self.entries.values().map(|e| e.created_at).min();
        LruCacheStats {
            entries: self.entries.len(),
            capacity: self.config.max_entries,
            total_bytes: self.current_bytes,
            max_bytes: self.config.max_bytes,
            oldest_entry: oldest,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct LruCacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub total_bytes: usize,
    pub max_bytes: usize,
    pub oldest_entry: Option<Instant>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_basic() {
        let mut cache = LruCache::new(3);

        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("c", 3);

        assert_eq!(cache.get(&"a"), Some(&1));
        assert_eq!(cache.get(&"b"), Some(&2));
        assert_eq!(cache.get(&"c"), Some(&3));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_lru_eviction_returns_displaced() {
        let mut cache = LruCache::new(2);

        cache.insert("a", 1);
        cache.insert("b", 2);

        // Access "a" to make it more recent
        cache.get(&"a");

        // Insert "c", should evict "b" (least recently used)
        let displaced = cache.insert("c", 3);
        assert_eq!(displaced, vec![("b", 2)]);

        assert_eq!(cache.get(&"a"), Some(&1));
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"c"), Some(&3));
    }

    #[test]
    fn test_lru_update_returns_old_value() {
        let mut cache = LruCache::new(2);

        cache.insert("a", 1);
        let displaced = cache.insert("a", 10);

        assert_eq!(displaced, vec![("a", 1)]);
        assert_eq!(cache.get(&"a"), Some(&10));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_peek_does_not_promote() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);

        assert_eq!(cache.peek(&"a"), Some(&1));
        let displaced = cache.insert("c", 3);
        assert_eq!(displaced, vec![("a", 1)]);
    }

    #[test]
    fn test_memory_limit_eviction() {
        let mut cache: LruCache<&str, String> =
            LruCache::with_config(LruCacheConfig::with_memory(10, 100));

        cache.insert_with_size("a", "value_a".to_string(), 50);
        cache.insert_with_size("b", "value_b".to_string(), 40);
        assert_eq!(cache.current_bytes(), 90);

        // 60 more bytes: "a" goes, 40 + 60 = 100
        let displaced = cache.insert_with_size("c", "value_c".to_string(), 60);
        assert_eq!(displaced.len(), 1);
        assert_eq!(displaced[0].0, "a");
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.current_bytes(), 100);
    }

    #[test]
    fn test_drain_empties_cache() {
        let mut cache = LruCache::new(4);
        cache.insert_with_size(1, "x", 3);
        cache.insert_with_size(2, "y", 4);

        let mut drained = cache.drain();
        drained.sort();
        assert_eq!(drained, vec![(1, "x"), (2, "y")]);
        assert!(cache.is_empty());
        assert_eq!(cache.current_bytes(), 0);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let mut cache = LruCache::new(0);
        cache.insert("a", 1);
        assert_eq!(cache.capacity(), 1);
        assert_eq!(cache.len(), 1);
    }
}
