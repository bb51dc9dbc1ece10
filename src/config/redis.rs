//! Configuration for the Redis adapters.

use core::time::Duration;
use serde::{Deserialize, Serialize};

/// Connection settings shared by the Redis storage, lock and bloom adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfig {
    url: String,
    pool_size: usize,
    connect_timeout_ms: u64,
    command_timeout_ms: u64,
    lock_prefix: String,
    lock_lease_ms: u64,
    lock_retry_interval_ms: u64,
    bloom_prefix: String,
}

impl RedisConfig {
    /// Creates a configuration for `url` (e.g. `redis://127.0.0.1:6379/0`).
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Sets the maximum number of pooled connections.
    #[must_use]
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the per-command read/write timeout.
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the key prefix of distributed lock keys.
    #[must_use]
    pub fn with_lock_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.lock_prefix = prefix.into();
        self
    }

    /// Sets how long a distributed lock lives if its holder disappears.
    #[must_use]
    pub fn with_lock_lease(mut self, lease: Duration) -> Self {
        self.lock_lease_ms = lease.as_millis() as u64;
        self
    }

    /// Sets the poll interval while waiting for a busy lock.
    #[must_use]
    pub fn with_lock_retry_interval(mut self, interval: Duration) -> Self {
        self.lock_retry_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Sets the key prefix of bloom filter bitmaps.
    #[must_use]
    pub fn with_bloom_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.bloom_prefix = prefix.into();
        self
    }

    /// Connection URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Maximum pooled connections.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Command timeout.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Lock key prefix.
    pub fn lock_prefix(&self) -> &str {
        &self.lock_prefix
    }

    /// Lock lease.
    pub fn lock_lease(&self) -> Duration {
        Duration::from_millis(self.lock_lease_ms)
    }

    /// Lock poll interval.
    pub fn lock_retry_interval(&self) -> Duration {
        Duration::from_millis(self.lock_retry_interval_ms)
    }

    /// Bloom bitmap key prefix.
    pub fn bloom_prefix(&self) -> &str {
        &self.bloom_prefix
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            pool_size: 8,
            connect_timeout_ms: 2_000,
            command_timeout_ms: 1_000,
            lock_prefix: "lock:".to_string(),
            lock_lease_ms: 30_000,
            lock_retry_interval_ms: 50,
            bloom_prefix: "bloom:".to_string(),
        }
    }
}
