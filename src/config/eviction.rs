//! Configuration for the two-list eviction list.

use core::num::NonZeroUsize;
use serde::{Deserialize, Serialize};

pub(crate) const fn non_zero(n: usize) -> NonZeroUsize {
    match NonZeroUsize::new(n) {
        Some(n) => n,
        None => panic!("value must be non-zero"),
    }
}

const DEFAULT_MAX_ACTIVE: NonZeroUsize = non_zero(1024);
const DEFAULT_MAX_INACTIVE: NonZeroUsize = non_zero(4096);

/// Returns the default number of shards based on available parallelism.
pub(crate) fn default_shard_count() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(16)
        .clamp(4, 64)
}

/// Configuration for an [`EvictionList`](crate::EvictionList).
///
/// # Examples
///
/// ```
/// use cache_shield::config::EvictionListConfig;
/// use core::num::NonZeroUsize;
///
/// let config = EvictionListConfig::new(
///     NonZeroUsize::new(2).unwrap(),
///     NonZeroUsize::new(4).unwrap(),
/// );
/// assert_eq!(config.max_active().get(), 2);
/// assert_eq!(config.max_inactive().get(), 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionListConfig {
    /// Bound on the protected (recently promoted) segment.
    max_active: NonZeroUsize,
    /// Bound on the candidate segment.
    max_inactive: NonZeroUsize,
}

impl EvictionListConfig {
    /// Creates a new configuration.
    pub fn new(max_active: NonZeroUsize, max_inactive: NonZeroUsize) -> Self {
        Self {
            max_active,
            max_inactive,
        }
    }

    /// Maximum number of entries in the active segment.
    pub fn max_active(&self) -> NonZeroUsize {
        self.max_active
    }

    /// Maximum number of entries in the inactive segment.
    pub fn max_inactive(&self) -> NonZeroUsize {
        self.max_inactive
    }

    /// Nominal total capacity (`max_active + max_inactive`).
    pub fn capacity(&self) -> usize {
        self.max_active.get() + self.max_inactive.get()
    }
}

impl Default for EvictionListConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ACTIVE, DEFAULT_MAX_INACTIVE)
    }
}

/// Configuration for a [`ConcurrentEvictionList`](crate::ConcurrentEvictionList).
///
/// The segment bounds in `base` apply to the whole list and are split evenly
/// across shards (at least one slot per segment per shard).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrentEvictionListConfig {
    base: EvictionListConfig,
    shards: usize,
}

impl ConcurrentEvictionListConfig {
    /// Creates a configuration with the default shard count.
    pub fn new(max_active: NonZeroUsize, max_inactive: NonZeroUsize) -> Self {
        let shards = default_shard_count().min(max_inactive.get());
        Self {
            base: EvictionListConfig::new(max_active, max_inactive),
            shards,
        }
    }

    /// Sets the number of shards.
    ///
    /// # Panics
    ///
    /// Panics if `shards` is zero.
    #[must_use]
    pub fn with_shards(mut self, shards: usize) -> Self {
        assert!(shards > 0, "shards must be > 0");
        self.shards = shards;
        self
    }

    /// Whole-list segment bounds.
    pub fn base(&self) -> &EvictionListConfig {
        &self.base
    }

    /// Number of shards.
    pub fn shards(&self) -> usize {
        self.shards
    }

    /// Per-shard bounds derived from the whole-list bounds.
    pub(crate) fn shard_config(&self) -> EvictionListConfig {
        let per = |n: NonZeroUsize| {
            NonZeroUsize::new((n.get() / self.shards).max(1)).unwrap_or(NonZeroUsize::MIN)
        };
        EvictionListConfig::new(per(self.base.max_active), per(self.base.max_inactive))
    }
}

impl Default for ConcurrentEvictionListConfig {
    fn default() -> Self {
        let base = EvictionListConfig::default();
        Self::new(base.max_active(), base.max_inactive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_config_splits_capacity() {
        let config = ConcurrentEvictionListConfig::new(
            NonZeroUsize::new(64).unwrap(),
            NonZeroUsize::new(256).unwrap(),
        )
        .with_shards(8);
        let shard = config.shard_config();
        assert_eq!(shard.max_active().get(), 8);
        assert_eq!(shard.max_inactive().get(), 32);
    }

    #[test]
    fn test_shard_config_never_zero() {
        let config = ConcurrentEvictionListConfig::new(
            NonZeroUsize::new(1).unwrap(),
            NonZeroUsize::new(2).unwrap(),
        )
        .with_shards(16);
        let shard = config.shard_config();
        assert_eq!(shard.max_active().get(), 1);
        assert_eq!(shard.max_inactive().get(), 1);
    }

    #[test]
    #[should_panic(expected = "shards must be > 0")]
    fn test_zero_shards_rejected() {
        let _ = ConcurrentEvictionListConfig::default().with_shards(0);
    }
}
