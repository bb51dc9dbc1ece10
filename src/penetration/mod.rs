//! Penetration protection.
//!
//! Penetration is the same lookup for a key that does not exist, over and
//! over, each one falling through the cache to the source of truth. Two
//! defenses live here:
//!
//! * a per-cache-name bloom filter. A definite "never written" answer
//!   short-circuits the read.
//! * the null placeholder ([`StoredValue::Null`](crate::value::StoredValue)),
//!   which caches "confirmed absent" for a short TTL.
//!
//! Keys are validated by [`KeyPolicy`] before either is consulted. Bloom
//! backend errors fail open: an unreachable filter lets traffic through
//! rather than blocking it.

mod bloom;
mod key;

pub use bloom::{BloomFilter, BloomFilterBackend, BloomGeometry, LocalBloomFilters};
pub use key::KeyPolicy;

use crate::error::KeyViolation;
use std::sync::Arc;
use tracing::warn;

/// Bloom filter plus key validation.
#[derive(Debug, Clone)]
pub struct PenetrationGuard {
    backend: Arc<dyn BloomFilterBackend>,
    policy: KeyPolicy,
}

impl PenetrationGuard {
    /// Creates a guard over `backend`.
    pub fn new(backend: Arc<dyn BloomFilterBackend>, policy: KeyPolicy) -> Self {
        Self { backend, policy }
    }

    /// Returns `false` only if the backend is certain `key` was never added.
    /// Backend errors are logged and answered with `true`.
    pub fn might_contain(&self, cache: &str, key: &str) -> bool {
        match self.backend.might_contain(cache, key) {
            Ok(present) => present,
            Err(e) => {
                warn!(cache = cache, key = %key, error = %e, "bloom filter check failed, allowing request");
                true
            }
        }
    }

    /// Records `key` in the filter for `cache`.
    pub fn add(&self, cache: &str, key: &str) {
        if let Err(e) = self.backend.add(cache, key) {
            warn!(cache = cache, key = %key, error = %e, "failed to add key to bloom filter");
        }
    }

    /// Clears the filter for `cache`.
    pub fn clear(&self, cache: &str) {
        if let Err(e) = self.backend.clear(cache) {
            warn!(cache = cache, error = %e, "failed to clear bloom filter");
        }
    }

    /// Validates a business key. See [`KeyPolicy::validate`].
    pub fn validate_key(&self, key: &str, allow_wildcards: bool) -> Result<(), KeyViolation> {
        self.policy.validate(key, allow_wildcards)
    }

    /// The key policy.
    pub fn policy(&self) -> &KeyPolicy {
        &self.policy
    }
}

impl Default for PenetrationGuard {
    fn default() -> Self {
        Self::new(Arc::new(LocalBloomFilters::default()), KeyPolicy::default())
    }
}
