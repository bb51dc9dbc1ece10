//! Bloom filters for penetration protection.
//!
//! A bloom filter answers "definitely absent" or "maybe present". The guard
//! uses the first answer to skip storage and loader calls for keys that were
//! never written. There are no false negatives: once a key is added,
//! `might_contain` returns `true` until the filter is cleared.

use crate::config::BloomConfig;
use crate::error::StorageError;
use core::fmt;
use core::hash::Hasher;
use parking_lot::RwLock;
use rustc_hash::FxHasher;
use std::sync::Arc;

#[cfg(feature = "hashbrown")]
use hashbrown::HashMap;
#[cfg(not(feature = "hashbrown"))]
use std::collections::HashMap;

/// Bit count and hash count of a filter.
///
/// Bit positions come from an `FxHasher` digest of the key, spread over the
/// `k` hash functions with the splitmix64 finalizer. Neither depends on a
/// random seed or on the std hasher, so every process computes the same
/// positions for the same key. Shared backends (a Redis bitmap) rely on that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BloomGeometry {
    num_bits: u64,
    num_hashes: u32,
}

impl BloomGeometry {
    /// Sizes a filter for `n` insertions at false positive rate `p`.
    pub fn optimal(n: u64, p: f64) -> Self {
        let n = n.max(1);
        // m = -n * ln(p) / (ln(2)^2)
        let m = (-(n as f64) * p.ln() / (core::f64::consts::LN_2 * core::f64::consts::LN_2)).ceil();
        let num_bits = (m as u64).max(64);
        // k = (m/n) * ln(2)
        let k = (num_bits as f64 / n as f64) * core::f64::consts::LN_2;
        Self {
            num_bits,
            num_hashes: (k.ceil() as u32).max(1),
        }
    }

    /// Geometry for a [`BloomConfig`].
    pub fn from_config(config: &BloomConfig) -> Self {
        Self::optimal(config.expected_insertions(), config.false_positive_rate())
    }

    /// Number of bits (m).
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    /// Number of hash functions (k).
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Bit positions for `key`.
    pub fn positions(&self, key: &str) -> impl Iterator<Item = u64> {
        let num_bits = self.num_bits;
        let mut hasher = FxHasher::default();
        hasher.write(key.as_bytes());
        let digest = hasher.finish();
        (0..self.num_hashes).map(move |i| mix64(digest ^ u64::from(i).wrapping_mul(GOLDEN_GAMMA)) % num_bits)
    }
}

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

/// splitmix64 finalizer.
fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// In-memory bloom filter over a `u64` word array.
pub struct BloomFilter {
    bits: RwLock<Vec<u64>>,
    geometry: BloomGeometry,
}

impl BloomFilter {
    /// Creates an empty filter with the given geometry.
    pub fn new(geometry: BloomGeometry) -> Self {
        let words = geometry.num_bits.div_ceil(64) as usize;
        Self {
            bits: RwLock::new(vec![0u64; words]),
            geometry,
        }
    }

    /// Adds a key.
    pub fn insert(&self, key: &str) {
        let mut bits = self.bits.write();
        for bit in self.geometry.positions(key) {
            bits[(bit / 64) as usize] |= 1u64 << (bit % 64);
        }
    }

    /// Returns `false` only if `key` was definitely never added.
    pub fn contains(&self, key: &str) -> bool {
        let bits = self.bits.read();
        self.geometry
            .positions(key)
            .all(|bit| bits[(bit / 64) as usize] & (1u64 << (bit % 64)) != 0)
    }

    /// Clears all bits.
    pub fn clear(&self) {
        self.bits.write().iter_mut().for_each(|w| *w = 0);
    }

    /// Fraction of bits set.
    pub fn fill_ratio(&self) -> f64 {
        let set: u64 = self.bits.read().iter().map(|w| u64::from(w.count_ones())).sum();
        set as f64 / self.geometry.num_bits as f64
    }

    /// Geometry of this filter.
    pub fn geometry(&self) -> BloomGeometry {
        self.geometry
    }
}

impl fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BloomFilter")
            .field("geometry", &self.geometry)
            .field("fill_ratio", &self.fill_ratio())
            .finish()
    }
}

/// Per-cache-name approximate membership store.
pub trait BloomFilterBackend: Send + Sync + fmt::Debug {
    /// Returns `false` only if `key` was definitely never added to `cache`.
    fn might_contain(&self, cache: &str, key: &str) -> Result<bool, StorageError>;

    /// Records `key` as present in `cache`.
    fn add(&self, cache: &str, key: &str) -> Result<(), StorageError>;

    /// Forgets every key of `cache`.
    fn clear(&self, cache: &str) -> Result<(), StorageError>;
}

/// In-process filters, one per cache name, created on first use.
#[derive(Debug)]
pub struct LocalBloomFilters {
    geometry: BloomGeometry,
    filters: RwLock<HashMap<String, Arc<BloomFilter>>>,
}

impl LocalBloomFilters {
    /// Creates an empty set of filters sized by `config`.
    pub fn new(config: &BloomConfig) -> Self {
        Self {
            geometry: BloomGeometry::from_config(config),
            filters: RwLock::new(HashMap::new()),
        }
    }

    fn filter(&self, cache: &str) -> Option<Arc<BloomFilter>> {
        self.filters.read().get(cache).cloned()
    }

    fn filter_or_create(&self, cache: &str) -> Arc<BloomFilter> {
        if let Some(filter) = self.filter(cache) {
            return filter;
        }
        let mut filters = self.filters.write();
        Arc::clone(
            filters
                .entry(cache.to_string())
                .or_insert_with(|| Arc::new(BloomFilter::new(self.geometry))),
        )
    }

    /// Names of caches that have a filter.
    pub fn cache_names(&self) -> Vec<String> {
        self.filters.read().keys().cloned().collect()
    }
}

impl Default for LocalBloomFilters {
    fn default() -> Self {
        Self::new(&BloomConfig::default())
    }
}

impl BloomFilterBackend for LocalBloomFilters {
    fn might_contain(&self, cache: &str, key: &str) -> Result<bool, StorageError> {
        Ok(self.filter(cache).is_some_and(|f| f.contains(key)))
    }

    fn add(&self, cache: &str, key: &str) -> Result<(), StorageError> {
        self.filter_or_create(cache).insert(key);
        Ok(())
    }

    fn clear(&self, cache: &str) -> Result<(), StorageError> {
        if let Some(filter) = self.filter(cache) {
            filter.clear();
        }
        Ok(())
    }
}
