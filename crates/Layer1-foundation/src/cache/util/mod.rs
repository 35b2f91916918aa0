//! Cache utilities
//!
//! - `LruCache`: Simple LRU cache (eviction hands back displaced entries)
//! - `CacheKey`: content fingerprint of an HTTP response

mod hash;
mod lru;

pub use hash::{compute_key, CacheKey};
pub use lru::{LruCache, LruCacheConfig, LruCacheStats};
