//! Redis adapters.
//!
//! All three adapters share one [`RedisPool`]:
//!
//! ```no_run
//! use cache_shield::config::{BloomConfig, RedisConfig};
//! use cache_shield::redis_backend::{RedisBloomFilters, RedisLockManager, RedisPool, RedisStorage};
//! use std::sync::Arc;
//!
//! let pool = Arc::new(RedisPool::new(RedisConfig::new("redis://127.0.0.1:6379")).unwrap());
//! let storage = RedisStorage::new(Arc::clone(&pool));
//! let locks = RedisLockManager::new(Arc::clone(&pool));
//! let bloom = RedisBloomFilters::new(pool, &BloomConfig::default());
//! ```

mod bloom;
mod lock;
mod pool;
mod storage;

pub use bloom::RedisBloomFilters;
pub use lock::{RedisLockHandle, RedisLockManager};
pub use pool::{PoolStatus, PooledConnection, RedisPool};
pub use storage::RedisStorage;
