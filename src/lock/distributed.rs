//! Distributed lock manager abstraction.
//!
//! A manager serializes a key across processes. The two-level lock asks
//! every registered manager for the key in a fixed order and releases the
//! handles in reverse.

use crate::clock::deadline_after;
use crate::error::LockError;
use core::fmt;
use core::time::Duration;
use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::sync::Arc;

/// Lock held in some backend. Released explicitly or on drop, depending on
/// the implementation.
pub trait LockHandle: Send {
    /// Releases the lock.
    fn release(self: Box<Self>) -> Result<(), LockError>;
}

/// A cross-process lock backend.
pub trait DistributedLockManager: Send + Sync + fmt::Debug {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Acquisition order. Lower values are acquired first; ties keep
    /// registration order.
    fn order(&self) -> i32 {
        0
    }

    /// Tries to take the lock for `key`, waiting at most `timeout`.
    ///
    /// `Ok(None)` means the lock was busy for the whole wait.
    fn try_acquire(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<Box<dyn LockHandle>>, LockError>;
}

#[derive(Debug, Default)]
struct Registry {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

/// Lock manager backed by an in-process registry.
///
/// Useful as a stand-in for a real backend in tests and in single-process
/// deployments that still want the two-level protocol. Clones share the same
/// registry, which lets tests model several "processes" contending on one
/// backend.
#[derive(Debug, Clone)]
pub struct InMemoryLockManager {
    name: String,
    order: i32,
    registry: Arc<Registry>,
}

impl InMemoryLockManager {
    /// Creates a manager with an empty registry.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: 0,
            registry: Arc::new(Registry::default()),
        }
    }

    /// Sets the acquisition order.
    #[must_use]
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Returns `true` if `key` is currently held.
    pub fn is_held(&self, key: &str) -> bool {
        self.registry.held.lock().contains(key)
    }
}

struct InMemoryHandle {
    key: String,
    registry: Arc<Registry>,
}

impl LockHandle for InMemoryHandle {
    fn release(self: Box<Self>) -> Result<(), LockError> {
        self.registry.held.lock().remove(&self.key);
        self.registry.released.notify_all();
        Ok(())
    }
}

impl DistributedLockManager for InMemoryLockManager {
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
        let deadline = deadline_after(timeout);
        let mut held = self.registry.held.lock();
        while held.contains(key) {
            let Some(deadline) = deadline else {
                self.registry.released.wait(&mut held);
                continue;
            };
            if self
                .registry
                .released
                .wait_until(&mut held, deadline)
                .timed_out()
            {
                if held.contains(key) {
                    return Ok(None);
                }
                break;
            }
        }
        held.insert(key.to_string());
        Ok(Some(Box::new(InMemoryHandle {
            key: key.to_string(),
            registry: Arc::clone(&self.registry),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_acquire_release_cycle() {
        let manager = InMemoryLockManager::new("mem");
        let handle = manager
            .try_acquire("k", Duration::from_millis(10))
            .unwrap()
            .unwrap();
        assert!(manager.is_held("k"));
        assert!(manager
            .try_acquire("k", Duration::from_millis(10))
            .unwrap()
            .is_none());
        handle.release().unwrap();
        assert!(!manager.is_held("k"));
    }

    #[test]
    fn test_clones_share_registry() {
        let a = InMemoryLockManager::new("mem");
        let b = a.clone();
        let _handle = a.try_acquire("k", Duration::from_millis(10)).unwrap();
        assert!(b.is_held("k"));
    }

    #[test]
    fn test_waiter_wakes_on_release() {
        let manager = InMemoryLockManager::new("mem");
        let handle = manager
            .try_acquire("k", Duration::from_millis(10))
            .unwrap()
            .unwrap();
        let waiter = {
            let manager = manager.clone();
            thread::spawn(move || {
                manager
                    .try_acquire("k", Duration::from_secs(5))
                    .unwrap()
                    .is_some()
            })
        };
        thread::sleep(Duration::from_millis(20));
        handle.release().unwrap();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_unbounded_timeout_waits_without_deadline() {
        let manager = InMemoryLockManager::new("mem");
        let handle = manager
            .try_acquire("k", Duration::MAX)
            .unwrap()
            .unwrap();
        let waiter = {
            let manager = manager.clone();
            thread::spawn(move || {
                manager
                    .try_acquire("k", Duration::from_secs(u64::MAX))
                    .unwrap()
                    .is_some()
            })
        };
        thread::sleep(Duration::from_millis(20));
        handle.release().unwrap();
        assert!(waiter.join().unwrap());
    }
}
