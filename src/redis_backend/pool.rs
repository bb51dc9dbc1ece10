//! Blocking Redis connection pool.

use crate::clock::deadline_after;
use crate::config::RedisConfig;
use crate::error::StorageError;
use core::fmt;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicUsize, Ordering};
use parking_lot::{Condvar, Mutex};
use redis::{Client, Connection, ConnectionLike, RedisError, RedisResult};
use tracing::{debug, info, warn};

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Open connections, idle or checked out.
    pub open: usize,
    /// Idle connections.
    pub idle: usize,
    /// Upper bound on open connections.
    pub max: usize,
}

/// Pool of synchronous Redis connections.
///
/// Connections are opened lazily up to `pool_size`. A checkout that finds
/// the pool exhausted waits up to the connect timeout for a connection to
/// be returned. Connections that hit an I/O error are discarded instead of
/// being returned.
pub struct RedisPool {
    client: Client,
    config: RedisConfig,
    idle: Mutex<Vec<Connection>>,
    returned: Condvar,
    open: AtomicUsize,
}

impl RedisPool {
    /// Validates the URL. No connection is opened until first use.
    pub fn new(config: RedisConfig) -> Result<Self, StorageError> {
        if config.pool_size() == 0 {
            return Err(StorageError::Connection("redis pool_size must be > 0".into()));
        }
        let client = Client::open(config.url()).map_err(|e| StorageError::Connection(e.to_string()))?;
        info!(url = %config.url(), pool_size = config.pool_size(), "redis pool created");
        Ok(Self {
            client,
            config,
            idle: Mutex::new(Vec::new()),
            returned: Condvar::new(),
            open: AtomicUsize::new(0),
        })
    }

    /// Adapter configuration.
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Checks out a connection.
    pub fn get(&self) -> Result<PooledConnection<'_>, StorageError> {
        let deadline = deadline_after(self.config.connect_timeout());
        let mut idle = self.idle.lock();
        loop {
            if let Some(conn) = idle.pop() {
                return Ok(PooledConnection::new(self, conn));
            }
            if self.reserve_slot() {
                drop(idle);
                return match self.connect() {
                    Ok(conn) => Ok(PooledConnection::new(self, conn)),
                    Err(e) => {
                        self.release_slot();
                        Err(StorageError::Connection(e.to_string()))
                    }
                };
            }
            let Some(deadline) = deadline else {
                self.returned.wait(&mut idle);
                continue;
            };
            if self.returned.wait_until(&mut idle, deadline).timed_out() {
                return Err(StorageError::Connection("redis pool exhausted".into()));
            }
        }
    }

    /// Checks out a connection, runs `f` and maps the Redis error.
    pub fn run<T>(&self, command: &'static str, f: impl FnOnce(&mut Connection) -> RedisResult<T>) -> Result<T, StorageError> {
        let mut conn = self.get()?;
        f(&mut *conn).map_err(|e| {
            if is_connection_error(&e) {
                conn.mark_broken();
                StorageError::Connection(e.to_string())
            } else {
                StorageError::command(command, e.to_string())
            }
        })
    }

    /// Current occupancy.
    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            open: self.open.load(Ordering::Acquire),
            idle: self.idle.lock().len(),
            max: self.config.pool_size(),
        }
    }

    fn reserve_slot(&self) -> bool {
        let max = self.config.pool_size();
        self.open
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .is_ok()
    }

    fn release_slot(&self) {
        self.open.fetch_sub(1, Ordering::AcqRel);
        self.returned.notify_one();
    }

    fn connect(&self) -> RedisResult<Connection> {
        let conn = self.client.get_connection_with_timeout(self.config.connect_timeout())?;
        let timeout = Some(self.config.command_timeout()).filter(|t| !t.is_zero());
        conn.set_read_timeout(timeout)?;
        conn.set_write_timeout(timeout)?;
        debug!(url = %self.config.url(), "opened redis connection");
        Ok(conn)
    }

    fn put_back(&self, conn: Connection) {
        self.idle.lock().push(conn);
        self.returned.notify_one();
    }
}

impl fmt::Debug for RedisPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisPool")
            .field("url", &self.config.url())
            .field("status", &self.status())
            .finish()
    }
}

pub(crate) fn is_connection_error(e: &RedisError) -> bool {
    e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
}

/// A checked-out connection, returned to the pool on drop.
pub struct PooledConnection<'a> {
    pool: &'a RedisPool,
    conn: Option<Connection>,
    broken: bool,
}

impl<'a> PooledConnection<'a> {
    fn new(pool: &'a RedisPool, conn: Connection) -> Self {
        Self {
            pool,
            conn: Some(conn),
            broken: false,
        }
    }

    /// Discards the connection instead of returning it.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // Only `None` after drop.
        self.conn.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if self.broken || !conn.is_open() {
            warn!(url = %self.pool.config.url(), "discarding broken redis connection");
            drop(conn);
            self.pool.release_slot();
        } else {
            self.pool.put_back(conn);
        }
    }
}

impl fmt::Debug for PooledConnection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("broken", &self.broken)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pool_is_lazy() {
        let pool = RedisPool::new(RedisConfig::new("redis://127.0.0.1:1")).unwrap();
        assert_eq!(pool.status(), PoolStatus { open: 0, idle: 0, max: 8 });
    }

    #[test]
    fn test_refused_connection_frees_its_slot() {
        let config = RedisConfig::new("redis://127.0.0.1:1")
            .with_pool_size(1)
            .with_connect_timeout(Duration::from_millis(200));
        let pool = RedisPool::new(config).unwrap();
        for _ in 0..2 {
            assert!(matches!(pool.get(), Err(StorageError::Connection(_))));
        }
        assert_eq!(pool.status().open, 0);
    }

    #[test]
    fn test_bad_url_is_rejected() {
        assert!(RedisPool::new(RedisConfig::new("not a url")).is_err());
        assert!(RedisPool::new(RedisConfig::default().with_pool_size(0)).is_err());
    }
}
