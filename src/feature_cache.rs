// src/feature_cache.rs

use lru::LruCache;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use crate::models::RawFeatureSet;

// Default cache size - can be configured via environment variable
const DEFAULT_CACHE_SIZE: usize = 10_000;

/// LRU cache of encoded vectors keyed by a signature of the normalized
/// attribute map. Encoding is deterministic for a fixed encoder, so entries
/// stay valid until the encoder is replaced; retraining and reset clear the
/// cache wholesale.
pub struct EncodedFeatureCache {
    cache: LruCache<String, Vec<f64>>,
    hits: u64,
    misses: u64,
}

impl std::fmt::Debug for EncodedFeatureCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedFeatureCache")
            .field("len", &self.cache.len())
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}

impl Default for EncodedFeatureCache {
    fn default() -> Self {
        let size = std::env::var("AMICOOKED_FEATURE_CACHE_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_CACHE_SIZE);
        Self::with_capacity(size)
    }
}

impl EncodedFeatureCache {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, key: &str) -> Option<Vec<f64>> {
        match self.cache.get(key) {
            Some(encoded) => {
                self.hits += 1;
                Some(encoded.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn put(&mut self, key: String, encoded: Vec<f64>) {
        self.cache.put(key, encoded);
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

/// Stable signature of an attribute map: attributes are canonicalized into
/// sorted order before hashing, so insertion order never changes the key.
pub fn signature(features: &RawFeatureSet) -> String {
    let canonical: BTreeMap<&str, String> = features
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_text()))
        .collect();

    let mut hasher = Sha256::new();
    for (name, value) in &canonical {
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b";");
    }
    hex::encode(hasher.finalize())
}
