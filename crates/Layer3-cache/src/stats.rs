//! Cache statistics

use serde::Serialize;

/// Snapshot of [`crate::ParserCache`] activity
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Document queries, cacheable or not
    pub total_queries: u64,
    /// Queries that bypassed the LRU (`cache == false` or body too large)
    pub do_not_cache: u64,
    pub hits: u64,
    pub misses: u64,
    /// Queries that waited for an identical in-flight parse
    pub inflight_waits: u64,
    pub tag_queries: u64,

    // LRU
    pub lru_entries: usize,
    pub lru_peak: usize,
    pub lru_capacity: usize,
    pub evictions: u64,

    // Workers
    pub dispatches: u64,
    pub timeouts: u64,
    pub worker_deaths: u64,
}

impl CacheStats {
    /// Hits over cacheable lookups, 0.0 when there were none
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "queries={} do_not_cache={} hits={} misses={} hit_rate={:.1}% waits={} lru={}/{} (peak {}) evictions={} dispatches={} timeouts={}",
            self.total_queries,
            self.do_not_cache,
            self.hits,
            self.misses,
            self.hit_rate() * 100.0,
            self.inflight_waits,
            self.lru_entries,
            self.lru_capacity,
            self.lru_peak,
            self.evictions,
            self.dispatches,
            self.timeouts,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);

        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert!(stats.to_string().contains("hit_rate=75.0%"));
    }
}
