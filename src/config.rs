//! Shield Configuration Module
//!
//! One configuration struct per component, in the same shape throughout:
//! required parameters go through `new`, optional ones through `with_*`
//! builder methods, and every struct has sensible `Default` values.
//!
//! All structs derive `serde::{Serialize, Deserialize}` so a host can load
//! them from whatever configuration format it already uses. Validation
//! happens once, when a component is constructed, and reports
//! [`ShieldError::Config`](crate::ShieldError::Config).
//!
//! | Config | Component |
//! |--------|-----------|
//! | [`EvictionListConfig`] | [`EvictionList`](crate::EvictionList) |
//! | [`ConcurrentEvictionListConfig`] | [`ConcurrentEvictionList`](crate::ConcurrentEvictionList) |
//! | [`LockPoolConfig`] | [`LockPool`](crate::lock::LockPool) |
//! | [`PreRefreshConfig`] | [`PreRefreshScheduler`](crate::refresh::PreRefreshScheduler) |
//! | [`BloomConfig`] | [`LocalBloomFilters`](crate::penetration::LocalBloomFilters) |
//! | [`KeyPolicyConfig`] | [`KeyPolicy`](crate::penetration::KeyPolicy) |
//! | [`RedisConfig`] | Redis storage, lock and bloom adapters |
//! | [`ShieldConfig`] | [`ResiliencePipeline`](crate::pipeline::ResiliencePipeline) |
//!
//! # Sizing the lock pool
//!
//! The lock pool holds one mutex per recently used cache key. `max_active`
//! bounds keys that were locked more than once recently, `max_inactive`
//! bounds one-off keys. Memory is roughly
//! `(max_active + max_inactive) × ~120 bytes` plus key strings.
//!
//! ```
//! use cache_shield::config::{LockPoolConfig, ShieldConfig};
//! use core::num::NonZeroUsize;
//!
//! let config = ShieldConfig::default()
//!     .with_key_prefix("app:")
//!     .with_lock_pool(LockPoolConfig::new(
//!         NonZeroUsize::new(256).unwrap(),
//!         NonZeroUsize::new(1024).unwrap(),
//!     ));
//! assert_eq!(config.key_prefix(), "app:");
//! ```

pub mod bloom;
pub mod eviction;
pub mod key;
pub mod lock_pool;
#[cfg(feature = "redis")]
pub mod redis;
pub mod refresh;
pub mod shield;

pub use bloom::BloomConfig;
pub use eviction::{ConcurrentEvictionListConfig, EvictionListConfig};
pub use key::KeyPolicyConfig;
pub use lock_pool::LockPoolConfig;
#[cfg(feature = "redis")]
pub use self::redis::RedisConfig;
pub use refresh::PreRefreshConfig;
pub use shield::ShieldConfig;
