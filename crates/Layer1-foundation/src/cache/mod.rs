//! # docpool cache primitives
//!
//! ```text
//! (url, body) ──compute_key──▶ CacheKey ──▶ LruStore<V: Releasable>
//!                                            │
//!                                            └─ evicted value ──▶ release()
//! ```
//!
//! - [`util`] - LRU cache, hashing
//! - [`store`] - thread-safe store with release-on-evict

pub mod store;
pub mod util;

pub use store::{LruStore, Releasable, StoreStats};
pub use util::{compute_key, CacheKey, LruCache, LruCacheConfig, LruCacheStats};
