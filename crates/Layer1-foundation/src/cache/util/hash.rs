//! Hashing utilities for cache keys
//!
//! A [`CacheKey`] is two independent 64-bit digests of the same input, so a
//! collision needs both XXH3 and SipHash to collide at once.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use xxhash_rust::xxh3::Xxh3;

/// Content fingerprint of a `(url, body)` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    primary: u64,
    checksum: u64,
}

impl CacheKey {
    /// Derive a new key for a query on the same content (e.g. a tag filter).
    pub fn mix(&self, extra: &[u8]) -> CacheKey {
        let mut xxh = Xxh3::new();
        xxh.update(&self.primary.to_le_bytes());
        xxh.update(&self.checksum.to_le_bytes());
        xxh.update(extra);

        let mut sip = DefaultHasher::new();
        self.hash(&mut sip);
        sip.write(extra);

        CacheKey {
            primary: xxh.digest(),
            checksum: sip.finish(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.primary, self.checksum)
    }
}

/// Compute the cache key of an HTTP response.
///
/// The URL length is hashed first so that moving bytes between URL and body
/// always yields a different key.
pub fn compute_key(url: &str, body: &[u8]) -> CacheKey {
    let url_len = (url.len() as u64).to_le_bytes();

    let mut xxh = Xxh3::new();
    xxh.update(&url_len);
    xxh.update(url.as_bytes());
    xxh.update(body);

    let mut sip = DefaultHasher::new();
    sip.write(&url_len);
    sip.write(url.as_bytes());
    sip.write(body);

    CacheKey {
        primary: xxh.digest(),
        checksum: sip.finish(),
    }
}
