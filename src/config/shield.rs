//! Top-level configuration for a resilience pipeline.

use super::{BloomConfig, KeyPolicyConfig, LockPoolConfig, PreRefreshConfig};
use crate::error::{Result, ShieldError};
use core::time::Duration;
use serde::{Deserialize, Serialize};

/// Configuration for a [`ResiliencePipeline`](crate::pipeline::ResiliencePipeline).
///
/// # Examples
///
/// ```
/// use cache_shield::config::ShieldConfig;
/// use core::time::Duration;
///
/// let config = ShieldConfig::default()
///     .with_null_value_ttl(Duration::from_secs(30))
///     .with_default_lock_timeout(Duration::from_secs(1));
/// assert_eq!(config.null_value_ttl(), Duration::from_secs(30));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShieldConfig {
    key_prefix: String,
    null_value_ttl_secs: u64,
    default_lock_timeout_secs: u64,
    event_queue_capacity: usize,
    lock_pool: LockPoolConfig,
    pre_refresh: PreRefreshConfig,
    bloom: BloomConfig,
    key_policy: KeyPolicyConfig,
}

impl ShieldConfig {
    /// Sets the prefix prepended to every storage key.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Sets the lifetime of null placeholders.
    #[must_use]
    pub fn with_null_value_ttl(mut self, ttl: Duration) -> Self {
        self.null_value_ttl_secs = ttl.as_secs();
        self
    }

    /// Sets the lock wait used when an operation does not specify one.
    #[must_use]
    pub fn with_default_lock_timeout(mut self, timeout: Duration) -> Self {
        self.default_lock_timeout_secs = timeout.as_secs();
        self
    }

    /// Sets the capacity of the asynchronous event queue.
    #[must_use]
    pub fn with_event_queue_capacity(mut self, capacity: usize) -> Self {
        self.event_queue_capacity = capacity;
        self
    }

    /// Replaces the lock pool configuration.
    #[must_use]
    pub fn with_lock_pool(mut self, lock_pool: LockPoolConfig) -> Self {
        self.lock_pool = lock_pool;
        self
    }

    /// Replaces the pre-refresh configuration.
    #[must_use]
    pub fn with_pre_refresh(mut self, pre_refresh: PreRefreshConfig) -> Self {
        self.pre_refresh = pre_refresh;
        self
    }

    /// Replaces the bloom filter configuration.
    #[must_use]
    pub fn with_bloom(mut self, bloom: BloomConfig) -> Self {
        self.bloom = bloom;
        self
    }

    /// Replaces the key policy configuration.
    #[must_use]
    pub fn with_key_policy(mut self, key_policy: KeyPolicyConfig) -> Self {
        self.key_policy = key_policy;
        self
    }

    /// Storage key prefix.
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Lifetime of null placeholders.
    pub fn null_value_ttl(&self) -> Duration {
        Duration::from_secs(self.null_value_ttl_secs)
    }

    /// Default lock wait.
    pub fn default_lock_timeout(&self) -> Duration {
        Duration::from_secs(self.default_lock_timeout_secs)
    }

    /// Event queue capacity.
    pub fn event_queue_capacity(&self) -> usize {
        self.event_queue_capacity
    }

    /// Lock pool configuration.
    pub fn lock_pool(&self) -> &LockPoolConfig {
        &self.lock_pool
    }

    /// Pre-refresh configuration.
    pub fn pre_refresh(&self) -> &PreRefreshConfig {
        &self.pre_refresh
    }

    /// Bloom filter configuration.
    pub fn bloom(&self) -> &BloomConfig {
        &self.bloom
    }

    /// Key policy configuration.
    pub fn key_policy(&self) -> &KeyPolicyConfig {
        &self.key_policy
    }

    /// Validates this configuration and every nested one.
    pub fn validate(&self) -> Result<()> {
        if self.event_queue_capacity == 0 {
            return Err(ShieldError::config("event_queue_capacity must be > 0"));
        }
        if self.null_value_ttl_secs == 0 {
            return Err(ShieldError::config("null_value_ttl must be at least 1s"));
        }
        self.pre_refresh.validate()?;
        self.bloom.validate()
    }
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            key_prefix: "cache:".to_string(),
            null_value_ttl_secs: 60,
            default_lock_timeout_secs: 3,
            event_queue_capacity: 1024,
            lock_pool: LockPoolConfig::default(),
            pre_refresh: PreRefreshConfig::default(),
            bloom: BloomConfig::default(),
            key_policy: KeyPolicyConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shield_config_defaults() {
        let config = ShieldConfig::default();
        assert_eq!(config.key_prefix(), "cache:");
        assert_eq!(config.null_value_ttl(), Duration::from_secs(60));
        assert_eq!(config.default_lock_timeout(), Duration::from_secs(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_nested_validation_propagates() {
        let config = ShieldConfig::default().with_pre_refresh(PreRefreshConfig::new(5, 1));
        assert!(matches!(config.validate(), Err(ShieldError::Config(_))));
    }

    #[test]
    fn test_config_serde_shape() {
        let config = ShieldConfig::default().with_key_prefix("svc:");
        let json = serde_json::to_string(&config).unwrap();
        let back: ShieldConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
