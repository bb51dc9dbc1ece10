//! Bloom filters stored as Redis bitmaps.
//!
//! Every process computes the same bit positions (see
//! [`BloomGeometry::positions`]), so all of them share one filter per cache
//! name. Bits are set and tested in a Lua script to keep each call a single
//! round trip.

use super::pool::RedisPool;
use crate::config::BloomConfig;
use crate::error::StorageError;
use crate::penetration::{BloomFilterBackend, BloomGeometry};
use redis::Script;
use std::sync::Arc;

const ADD_SCRIPT: &str = r"
for i = 1, #ARGV do
    redis.call('SETBIT', KEYS[1], ARGV[i], 1)
end
return 1
";

const CONTAINS_SCRIPT: &str = r"
for i = 1, #ARGV do
    if redis.call('GETBIT', KEYS[1], ARGV[i]) == 0 then
        return 0
    end
end
return 1
";

/// [`BloomFilterBackend`] over Redis `SETBIT`/`GETBIT`.
#[derive(Debug)]
pub struct RedisBloomFilters {
    pool: Arc<RedisPool>,
    geometry: BloomGeometry,
    add: Script,
    contains: Script,
}

impl RedisBloomFilters {
    /// Creates filters sized by `config` over a shared pool.
    pub fn new(pool: Arc<RedisPool>, config: &BloomConfig) -> Self {
        Self {
            pool,
            geometry: BloomGeometry::from_config(config),
            add: Script::new(ADD_SCRIPT),
            contains: Script::new(CONTAINS_SCRIPT),
        }
    }

    fn bitmap_key(&self, cache: &str) -> String {
        format!("{}{}", self.pool.config().bloom_prefix(), cache)
    }
}

impl BloomFilterBackend for RedisBloomFilters {
    fn might_contain(&self, cache: &str, key: &str) -> Result<bool, StorageError> {
        let bitmap = self.bitmap_key(cache);
        let positions: Vec<u64> = self.geometry.positions(key).collect();
        let found: i64 = self
            .pool
            .run("EVALSHA", |conn| self.contains.key(&bitmap).arg(positions).invoke(conn))?;
        Ok(found == 1)
    }

    fn add(&self, cache: &str, key: &str) -> Result<(), StorageError> {
        let bitmap = self.bitmap_key(cache);
        let positions: Vec<u64> = self.geometry.positions(key).collect();
        let _: i64 = self
            .pool
            .run("EVALSHA", |conn| self.add.key(&bitmap).arg(positions).invoke(conn))?;
        Ok(())
    }

    fn clear(&self, cache: &str) -> Result<(), StorageError> {
        let bitmap = self.bitmap_key(cache);
        let _: i64 = self.pool.run("DEL", |conn| redis::cmd("DEL").arg(&bitmap).query(conn))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;

    #[test]
    fn test_bitmap_keys_use_prefix() {
        let pool = Arc::new(RedisPool::new(RedisConfig::default().with_bloom_prefix("bf:")).unwrap());
        let filters = RedisBloomFilters::new(pool, &BloomConfig::default());
        assert_eq!(filters.bitmap_key("users"), "bf:users");
    }
}
