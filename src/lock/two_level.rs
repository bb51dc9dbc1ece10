//! Local plus distributed locking around a loader call.
//!
//! The local mutex serializes callers inside this process, the distributed
//! managers serialize processes. Acquisition is all-or-nothing: if any level
//! cannot be taken within the timeout, everything already taken is released
//! and the loader runs unprotected. A caller is never refused an answer
//! because a lock was unavailable.

use super::distributed::{DistributedLockManager, LockHandle};
use super::pool::{LockPool, PooledLockGuard};
use crate::error::LockError;
use core::fmt;
use core::time::Duration;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Why a call ran without full protection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradeReason {
    /// The local mutex was not obtained in time.
    LocalTimeout,
    /// A distributed lock stayed busy for the whole wait.
    RemoteUnavailable(String),
    /// A distributed manager failed.
    RemoteError(String),
    /// A wait was interrupted.
    Interrupted(String),
}

/// How a two-level call was protected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    /// Every level was held while the loader ran.
    Protected,
    /// The loader ran unprotected.
    Degraded(DegradeReason),
}

impl LockOutcome {
    /// Returns `true` if the loader ran unprotected.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }
}

/// Locks held for one call. Dropping releases distributed handles in
/// reverse acquisition order, then the local mutex.
struct HeldLocks<'a> {
    key: &'a str,
    local: Option<PooledLockGuard>,
    remote: Vec<(&'a str, Box<dyn LockHandle>)>,
}

impl Drop for HeldLocks<'_> {
    fn drop(&mut self) {
        while let Some((name, handle)) = self.remote.pop() {
            if let Err(e) = handle.release() {
                warn!(key = %self.key, manager = name, error = %e, "failed to release distributed lock");
            }
        }
        self.local.take();
    }
}

/// Two-level lock: a pooled local mutex plus ordered distributed managers.
pub struct TwoLevelLock {
    pool: Arc<LockPool>,
    managers: Vec<Arc<dyn DistributedLockManager>>,
}

impl TwoLevelLock {
    /// Creates a lock with only the local level.
    pub fn new(pool: Arc<LockPool>) -> Self {
        Self {
            pool,
            managers: Vec::new(),
        }
    }

    /// Registers a distributed manager. Managers are kept sorted by
    /// [`order`](DistributedLockManager::order), stable on registration.
    #[must_use]
    pub fn with_manager(mut self, manager: Arc<dyn DistributedLockManager>) -> Self {
        self.managers.push(manager);
        self.managers.sort_by_key(|m| m.order());
        self
    }

    /// The local lock pool.
    pub fn pool(&self) -> &Arc<LockPool> {
        &self.pool
    }

    /// Names of the registered managers in acquisition order.
    pub fn manager_names(&self) -> Vec<&str> {
        self.managers.iter().map(|m| m.name()).collect()
    }

    /// Runs `loader` under both lock levels, degrading to an unprotected
    /// call when a level cannot be taken.
    pub fn execute_sync<T, F>(&self, key: &str, loader: F, timeout: Duration) -> T
    where
        F: FnOnce() -> T,
    {
        self.execute_sync_with_outcome(key, loader, timeout).0
    }

    /// Like [`execute_sync`](Self::execute_sync), also reporting how the
    /// call was protected.
    pub fn execute_sync_with_outcome<T, F>(
        &self,
        key: &str,
        loader: F,
        timeout: Duration,
    ) -> (T, LockOutcome)
    where
        F: FnOnce() -> T,
    {
        match self.acquire_all(key, timeout) {
            Ok(held) => {
                let value = loader();
                drop(held);
                (value, LockOutcome::Protected)
            }
            Err(reason) => (loader(), LockOutcome::Degraded(reason)),
        }
    }

    fn acquire_all<'a>(&'a self, key: &'a str, timeout: Duration) -> Result<HeldLocks<'a>, DegradeReason> {
        let Some(local) = self.pool.lock(key, timeout) else {
            warn!(key = %key, timeout_ms = timeout.as_millis() as u64, "local lock unavailable, running loader unprotected");
            return Err(DegradeReason::LocalTimeout);
        };

        let mut held = HeldLocks {
            key,
            local: Some(local),
            remote: Vec::with_capacity(self.managers.len()),
        };

        for manager in &self.managers {
            match manager.try_acquire(key, timeout) {
                Ok(Some(handle)) => held.remote.push((manager.name(), handle)),
                Ok(None) => {
                    warn!(key = %key, manager = manager.name(), "distributed lock unavailable, running loader unprotected");
                    return Err(DegradeReason::RemoteUnavailable(manager.name().to_string()));
                }
                Err(LockError::Interrupted(_)) => {
                    error!(key = %key, manager = manager.name(), "interrupted while waiting for distributed lock, running loader unprotected");
                    return Err(DegradeReason::Interrupted(manager.name().to_string()));
                }
                Err(e) => {
                    warn!(key = %key, manager = manager.name(), error = %e, "distributed lock failed, running loader unprotected");
                    return Err(DegradeReason::RemoteError(manager.name().to_string()));
                }
            }
        }

        debug!(key = %key, levels = held.remote.len() + 1, "all lock levels acquired");
        Ok(held)
    }
}

impl fmt::Debug for TwoLevelLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwoLevelLock")
            .field("pool", &self.pool)
            .field("managers", &self.manager_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::InMemoryLockManager;
    use parking_lot::Mutex;

    #[derive(Debug)]
    struct Recording {
        name: &'static str,
        order: i32,
        log: Arc<Mutex<Vec<String>>>,
        fail: Option<LockError>,
    }

    struct RecordingHandle {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl LockHandle for RecordingHandle {
        fn release(self: Box<Self>) -> Result<(), LockError> {
            self.log.lock().push(format!("release {}", self.name));
            Ok(())
        }
    }

    impl DistributedLockManager for Recording {
        fn name(&self) -> &str {
            self.name
        }

        fn order(&self) -> i32 {
            self.order
        }

        fn try_acquire(
            &self,
            _key: &str,
            _timeout: Duration,
        ) -> Result<Option<Box<dyn LockHandle>>, LockError> {
            match &self.fail {
                Some(LockError::Interrupted(k)) => Err(LockError::Interrupted(k.clone())),
                Some(LockError::Backend { backend, message }) => {
                    Err(LockError::backend(backend.clone(), message.clone()))
                }
                None => {
                    self.log.lock().push(format!("acquire {}", self.name));
                    Ok(Some(Box::new(RecordingHandle {
                        name: self.name,
                        log: Arc::clone(&self.log),
                    })))
                }
            }
        }
    }

    fn recording(
        name: &'static str,
        order: i32,
        log: &Arc<Mutex<Vec<String>>>,
        fail: Option<LockError>,
    ) -> Arc<dyn DistributedLockManager> {
        Arc::new(Recording {
            name,
            order,
            log: Arc::clone(log),
            fail,
        })
    }

    #[test]
    fn test_acquires_in_order_and_releases_lifo() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let lock = TwoLevelLock::new(Arc::new(LockPool::default()))
            .with_manager(recording("second", 2, &log, None))
            .with_manager(recording("first", 1, &log, None));
        assert_eq!(lock.manager_names(), vec!["first", "second"]);

        let (value, outcome) = lock.execute_sync_with_outcome(
            "k",
            || {
                log.lock().push("load".to_string());
                7
            },
            Duration::from_millis(50),
        );
        assert_eq!(value, 7);
        assert_eq!(outcome, LockOutcome::Protected);
        assert_eq!(
            *log.lock(),
            vec![
                "acquire first",
                "acquire second",
                "load",
                "release second",
                "release first"
            ]
        );
    }

    #[test]
    fn test_failed_manager_releases_earlier_ones_before_loading() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let lock = TwoLevelLock::new(Arc::new(LockPool::default()))
            .with_manager(recording("ok", 0, &log, None))
            .with_manager(recording("broken", 1, &log, Some(LockError::backend("broken", "down"))));

        let (value, outcome) = lock.execute_sync_with_outcome(
            "k",
            || {
                log.lock().push("load".to_string());
                1
            },
            Duration::from_millis(50),
        );
        assert_eq!(value, 1);
        assert_eq!(
            outcome,
            LockOutcome::Degraded(DegradeReason::RemoteError("broken".to_string()))
        );
        assert_eq!(*log.lock(), vec!["acquire ok", "release ok", "load"]);
        // Local mutex is free again.
        assert!(lock.pool().lock("k", Duration::from_millis(10)).is_some());
    }

    #[test]
    fn test_interrupt_degrades() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let lock = TwoLevelLock::new(Arc::new(LockPool::default())).with_manager(recording(
            "intr",
            0,
            &log,
            Some(LockError::Interrupted("k".into())),
        ));
        let (value, outcome) = lock.execute_sync_with_outcome("k", || "v", Duration::from_millis(10));
        assert_eq!(value, "v");
        assert!(matches!(
            outcome,
            LockOutcome::Degraded(DegradeReason::Interrupted(_))
        ));
    }

    #[test]
    fn test_local_timeout_degrades() {
        let pool = Arc::new(LockPool::default());
        let _held = pool.lock("k", Duration::from_millis(10)).unwrap();
        let lock = TwoLevelLock::new(Arc::clone(&pool));
        let (value, outcome) = lock.execute_sync_with_outcome("k", || 3, Duration::from_millis(10));
        assert_eq!(value, 3);
        assert_eq!(outcome, LockOutcome::Degraded(DegradeReason::LocalTimeout));
    }

    #[test]
    fn test_release_happens_on_panic() {
        let manager = InMemoryLockManager::new("mem");
        let lock = TwoLevelLock::new(Arc::new(LockPool::default()))
            .with_manager(Arc::new(manager.clone()));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            lock.execute_sync("k", || panic!("loader exploded"), Duration::from_millis(10))
        }));
        assert!(result.is_err());
        assert!(!manager.is_held("k"));
        assert!(lock.pool().lock("k", Duration::from_millis(10)).is_some());
    }
}
