//! Distributed lock on a single Redis key.
//!
//! Acquire is `SET key token NX PX lease`, polled until the wait runs out.
//! Release deletes the key only if it still holds our token, so a holder
//! whose lease expired cannot release somebody else's lock.

use super::pool::RedisPool;
use crate::clock::deadline_after;
use crate::error::{LockError, StorageError};
use crate::lock::{DistributedLockManager, LockHandle};
use core::time::Duration;
use redis::Script;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::debug;
use uuid::Uuid;

const RELEASE_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

/// [`DistributedLockManager`] backed by Redis.
#[derive(Debug, Clone)]
pub struct RedisLockManager {
    name: String,
    order: i32,
    pool: Arc<RedisPool>,
}

impl RedisLockManager {
    /// Creates a manager named `"redis"` over a shared pool.
    pub fn new(pool: Arc<RedisPool>) -> Self {
        Self {
            name: "redis".to_string(),
            order: 0,
            pool,
        }
    }

    /// Renames the manager.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the acquisition order.
    #[must_use]
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    fn lock_key(&self, key: &str) -> String {
        format!("{}{}", self.pool.config().lock_prefix(), key)
    }

    fn backend_error(&self, e: StorageError) -> LockError {
        LockError::backend(self.name.clone(), e.to_string())
    }

    fn try_set(&self, lock_key: &str, token: &str) -> Result<bool, LockError> {
        let lease = u64::try_from(self.pool.config().lock_lease().as_millis()).unwrap_or(u64::MAX);
        let reply: Option<String> = self
            .pool
            .run("SET", |conn| {
                redis::cmd("SET")
                    .arg(lock_key)
                    .arg(token)
                    .arg("NX")
                    .arg("PX")
                    .arg(lease)
                    .query(conn)
            })
            .map_err(|e| self.backend_error(e))?;
        Ok(reply.is_some())
    }
}

impl DistributedLockManager for RedisLockManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn try_acquire(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<Box<dyn LockHandle>>, LockError> {
        let lock_key = self.lock_key(key);
        let token = Uuid::new_v4().to_string();
        let deadline = deadline_after(timeout);
        let retry = self.pool.config().lock_retry_interval();

        loop {
            if self.try_set(&lock_key, &token)? {
                debug!(key = %lock_key, manager = %self.name, "acquired redis lock");
                return Ok(Some(Box::new(RedisLockHandle {
                    pool: Arc::clone(&self.pool),
                    manager: self.name.clone(),
                    lock_key,
                    token,
                })));
            }
            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    retry.min(deadline - now)
                }
                None => retry,
            };
            thread::sleep(wait);
        }
    }
}

/// A held Redis lock.
#[derive(Debug)]
pub struct RedisLockHandle {
    pool: Arc<RedisPool>,
    manager: String,
    lock_key: String,
    token: String,
}

impl LockHandle for RedisLockHandle {
    fn release(self: Box<Self>) -> Result<(), LockError> {
        let script = Script::new(RELEASE_SCRIPT);
        let deleted: i64 = self
            .pool
            .run("EVALSHA", |conn| script.key(&self.lock_key).arg(&self.token).invoke(conn))
            .map_err(|e| LockError::backend(self.manager.clone(), e.to_string()))?;
        if deleted == 0 {
            debug!(key = %self.lock_key, "redis lock lease expired before release");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;

    #[test]
    fn test_lock_keys_use_prefix() {
        let pool = Arc::new(RedisPool::new(RedisConfig::default().with_lock_prefix("l:")).unwrap());
        let manager = RedisLockManager::new(pool).with_name("primary").with_order(3);
        assert_eq!(manager.lock_key("cache:users::1"), "l:cache:users::1");
        assert_eq!(manager.name(), "primary");
        assert_eq!(manager.order(), 3);
    }

    #[test]
    #[ignore = "requires a Redis server on 127.0.0.1:6379"]
    fn test_lock_round_trip() {
        let pool = Arc::new(RedisPool::new(RedisConfig::default()).unwrap());
        let manager = RedisLockManager::new(pool);
        let handle = manager
            .try_acquire("shield-test", Duration::from_millis(100))
            .unwrap()
            .unwrap();
        assert!(manager
            .try_acquire("shield-test", Duration::from_millis(50))
            .unwrap()
            .is_none());
        handle.release().unwrap();
        assert!(manager
            .try_acquire("shield-test", Duration::from_millis(50))
            .unwrap()
            .is_some());
    }
}
