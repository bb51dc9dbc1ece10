//! Configuration for the per-key lock pool.

use super::eviction::{non_zero, ConcurrentEvictionListConfig};
use core::num::NonZeroUsize;
use serde::{Deserialize, Serialize};

/// Configuration for a [`LockPool`](crate::lock::LockPool).
///
/// `max_active_locks` and `max_inactive_locks` are soft bounds: a mutex that
/// is held or waited on is never evicted, so the pool may transiently hold
/// more entries under heavy contention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockPoolConfig {
    max_active_locks: NonZeroUsize,
    max_inactive_locks: NonZeroUsize,
    shards: Option<usize>,
}

impl LockPoolConfig {
    /// Creates a new lock pool configuration.
    pub fn new(max_active_locks: NonZeroUsize, max_inactive_locks: NonZeroUsize) -> Self {
        Self {
            max_active_locks,
            max_inactive_locks,
            shards: None,
        }
    }

    /// Overrides the shard count of the underlying eviction list.
    #[must_use]
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = Some(shards);
        self
    }

    /// Bound on frequently used locks.
    pub fn max_active_locks(&self) -> NonZeroUsize {
        self.max_active_locks
    }

    /// Bound on one-off locks.
    pub fn max_inactive_locks(&self) -> NonZeroUsize {
        self.max_inactive_locks
    }

    /// Configured shard count, if overridden.
    pub fn shards(&self) -> Option<usize> {
        self.shards
    }

    pub(crate) fn list_config(&self) -> ConcurrentEvictionListConfig {
        let config =
            ConcurrentEvictionListConfig::new(self.max_active_locks, self.max_inactive_locks);
        match self.shards {
            Some(shards) if shards > 0 => config.with_shards(shards),
            _ => config,
        }
    }
}

impl Default for LockPoolConfig {
    fn default() -> Self {
        Self::new(non_zero(1024), non_zero(4096))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_pool_config_defaults() {
        let config = LockPoolConfig::default();
        assert_eq!(config.max_active_locks().get(), 1024);
        assert_eq!(config.max_inactive_locks().get(), 4096);
        assert!(config.shards().is_none());
    }

    #[test]
    fn test_lock_pool_config_shards_flow_into_list() {
        let config = LockPoolConfig::new(non_zero(8), non_zero(8)).with_shards(2);
        assert_eq!(config.list_config().shards(), 2);
        assert_eq!(config.list_config().shard_config().max_active().get(), 4);
    }
}
