//! [`Storage`] over Redis strings.

use super::pool::RedisPool;
use crate::error::StorageError;
use crate::storage::{RemainingTtl, Storage};
use core::time::Duration;
use std::sync::Arc;
use tracing::debug;

const DELETE_BATCH: usize = 500;

fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Redis-backed storage. Values are stored as plain strings, expiries with
/// millisecond precision (`PX`).
#[derive(Debug, Clone)]
pub struct RedisStorage {
    pool: Arc<RedisPool>,
}

impl RedisStorage {
    /// Creates storage over a shared pool.
    pub fn new(pool: Arc<RedisPool>) -> Self {
        Self { pool }
    }

    /// The connection pool.
    pub fn pool(&self) -> &Arc<RedisPool> {
        &self.pool
    }
}

impl Storage for RedisStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.pool
            .run("GET", |conn| redis::cmd("GET").arg(key).query(conn))
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StorageError> {
        self.pool.run("SET", |conn| {
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(value);
            if let Some(ttl) = ttl {
                cmd.arg("PX").arg(millis(ttl));
            }
            cmd.query(conn)
        })
    }

    fn set_if_absent(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<bool, StorageError> {
        let reply: Option<String> = self.pool.run("SET", |conn| {
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(value).arg("NX");
            if let Some(ttl) = ttl {
                cmd.arg("PX").arg(millis(ttl));
            }
            cmd.query(conn)
        })?;
        Ok(reply.is_some())
    }

    fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let removed: i64 = self.pool.run("DEL", |conn| redis::cmd("DEL").arg(key).query(conn))?;
        Ok(removed > 0)
    }

    fn delete_pattern(&self, pattern: &str) -> Result<u64, StorageError> {
        let keys: Vec<String> = self.pool.run("SCAN", |conn| {
            let mut cmd = redis::cmd("SCAN");
            cmd.cursor_arg(0).arg("MATCH").arg(pattern).arg("COUNT").arg(DELETE_BATCH);
            let keys = cmd.iter::<String>(conn)?.collect();
            Ok(keys)
        })?;

        let mut removed = 0u64;
        for batch in keys.chunks(DELETE_BATCH) {
            let n: u64 = self.pool.run("DEL", |conn| redis::cmd("DEL").arg(batch).query(conn))?;
            removed += n;
        }
        debug!(pattern = %pattern, removed, "deleted keys by pattern");
        Ok(removed)
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StorageError> {
        let updated: i64 = self
            .pool
            .run("PEXPIRE", |conn| redis::cmd("PEXPIRE").arg(key).arg(millis(ttl)).query(conn))?;
        Ok(updated == 1)
    }

    fn remaining_ttl(&self, key: &str) -> Result<RemainingTtl, StorageError> {
        let reply: i64 = self.pool.run("TTL", |conn| redis::cmd("TTL").arg(key).query(conn))?;
        Ok(RemainingTtl::from_reply(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_never_zero() {
        assert_eq!(millis(Duration::ZERO), 1);
        assert_eq!(millis(Duration::from_secs(2)), 2_000);
    }
}
