//! Bounded pool of per-key mutexes.
//!
//! Creating a mutex per cache key is cheap, but keeping one for every key
//! ever seen is not. The pool keeps mutexes in a
//! [`ConcurrentEvictionList`] so hot keys reuse theirs while one-off keys
//! age out. A mutex is only ever evicted when nobody holds it, nobody waits
//! on it and no caller still has a reference to it.

use crate::config::LockPoolConfig;
use crate::metrics::{CacheMetrics, LockPoolStats};
use crate::ConcurrentEvictionList;
use core::fmt;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use core::time::Duration;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One pooled mutex plus the bookkeeping the eviction predicate needs.
pub struct LockEntry {
    key: String,
    mutex: Arc<Mutex<()>>,
    waiters: AtomicUsize,
}

impl LockEntry {
    fn new(key: String) -> Self {
        Self {
            key,
            mutex: Arc::new(Mutex::new(())),
            waiters: AtomicUsize::new(0),
        }
    }

    /// Key this mutex guards.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns `true` while some thread holds the mutex.
    pub fn is_locked(&self) -> bool {
        self.mutex.is_locked()
    }

    /// Threads currently blocked waiting for the mutex.
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::Acquire)
    }
}

impl fmt::Debug for LockEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockEntry")
            .field("key", &self.key)
            .field("locked", &self.is_locked())
            .field("waiters", &self.waiters())
            .finish()
    }
}

/// An entry is idle when only the pool references it and nobody holds or
/// waits on its mutex.
fn is_idle(entry: &Arc<LockEntry>) -> bool {
    Arc::strong_count(entry) == 1 && !entry.is_locked() && entry.waiters() == 0
}

#[derive(Debug, Default)]
struct Counters {
    acquires: AtomicU64,
    releases: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    timeouts: AtomicU64,
}

/// Held pooled mutex. Dropping the guard releases it.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct PooledLockGuard {
    _guard: ArcMutexGuard<RawMutex, ()>,
    entry: Arc<LockEntry>,
    counters: Arc<Counters>,
}

impl PooledLockGuard {
    /// Key this guard protects.
    pub fn key(&self) -> &str {
        self.entry.key()
    }
}

impl Drop for PooledLockGuard {
    fn drop(&mut self) {
        self.counters.releases.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Debug for PooledLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledLockGuard")
            .field("key", &self.entry.key)
            .finish()
    }
}

/// Bounded pool of reusable per-key mutexes.
///
/// # Examples
///
/// ```
/// use cache_shield::lock::LockPool;
/// use cache_shield::config::LockPoolConfig;
/// use core::time::Duration;
///
/// let pool = LockPool::new(LockPoolConfig::default());
/// let guard = pool.lock("user:1", Duration::from_millis(50)).unwrap();
/// assert!(pool.lock("user:1", Duration::from_millis(10)).is_none());
/// drop(guard);
/// assert!(pool.lock("user:1", Duration::from_millis(10)).is_some());
/// ```
pub struct LockPool {
    entries: ConcurrentEvictionList<String, Arc<LockEntry>>,
    counters: Arc<Counters>,
}

impl LockPool {
    /// Creates a pool from a configuration.
    pub fn new(config: LockPoolConfig) -> Self {
        Self {
            entries: ConcurrentEvictionList::with_eviction_predicate(
                config.list_config(),
                Arc::new(is_idle),
            ),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Returns the mutex entry for `key`, creating it on first use.
    ///
    /// The returned `Arc` pins the entry in the pool. Drop it (or the guard
    /// built from it) once done.
    pub fn acquire(&self, key: &str) -> Arc<LockEntry> {
        self.counters.acquires.fetch_add(1, Ordering::Relaxed);
        let (entry, hit) = self
            .entries
            .get_or_insert_with(key.to_string(), || Arc::new(LockEntry::new(key.to_string())));
        if hit {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }
        entry
    }

    /// Acquires the mutex for `key`, waiting at most `timeout`.
    ///
    /// Returns `None` on timeout.
    pub fn lock(&self, key: &str, timeout: Duration) -> Option<PooledLockGuard> {
        let entry = self.acquire(key);
        self.lock_entry(entry, timeout)
    }

    /// Waits for an entry obtained from [`acquire`](Self::acquire).
    pub fn lock_entry(&self, entry: Arc<LockEntry>, timeout: Duration) -> Option<PooledLockGuard> {
        let guard = match entry.mutex.try_lock_arc() {
            Some(guard) => Some(guard),
            None => {
                entry.waiters.fetch_add(1, Ordering::AcqRel);
                let guard = entry.mutex.try_lock_arc_for(timeout);
                entry.waiters.fetch_sub(1, Ordering::AcqRel);
                guard
            }
        };
        match guard {
            Some(guard) => Some(PooledLockGuard {
                _guard: guard,
                entry,
                counters: Arc::clone(&self.counters),
            }),
            None => {
                self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Releases a held guard. Equivalent to dropping it.
    pub fn release(&self, guard: PooledLockGuard) {
        drop(guard);
    }

    /// Purges the entry for `key` if it is idle. Returns `true` if removed.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove_if(key, is_idle).is_some()
    }

    /// Number of pooled mutexes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the pool holds no mutexes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Retries eviction of overflow left behind by busy mutexes.
    pub fn evict_idle_overflow(&self) -> usize {
        self.entries.evict_overflow()
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> LockPoolStats {
        LockPoolStats {
            acquires: self.counters.acquires.load(Ordering::Relaxed),
            releases: self.counters.releases.load(Ordering::Relaxed),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
            pool: self.entries.stats(),
        }
    }
}

impl Default for LockPool {
    fn default() -> Self {
        Self::new(LockPoolConfig::default())
    }
}

impl CacheMetrics for LockPool {
    fn metrics(&self) -> BTreeMap<String, f64> {
        self.stats().to_btreemap()
    }

    fn component_name(&self) -> &'static str {
        "LockPool"
    }
}

impl fmt::Debug for LockPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockPool")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::eviction::non_zero;
    use std::thread;

    fn small_pool() -> LockPool {
        LockPool::new(LockPoolConfig::new(non_zero(1), non_zero(2)).with_shards(1))
    }

    #[test]
    fn test_acquire_reuses_entry() {
        let pool = LockPool::default();
        let a = pool.acquire("k");
        let b = pool.acquire("k");
        assert!(Arc::ptr_eq(&a, &b));

        let stats = pool.stats();
        assert_eq!(stats.acquires, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_lock_times_out_and_counts() {
        let pool = LockPool::default();
        let _held = pool.lock("k", Duration::from_millis(10)).unwrap();
        assert!(pool.lock("k", Duration::from_millis(20)).is_none());
        assert_eq!(pool.stats().timeouts, 1);
    }

    #[test]
    fn test_release_counts() {
        let pool = LockPool::default();
        let guard = pool.lock("k", Duration::from_millis(10)).unwrap();
        assert_eq!(guard.key(), "k");
        pool.release(guard);
        assert_eq!(pool.stats().releases, 1);
    }

    #[test]
    fn test_held_mutex_is_never_evicted() {
        let pool = small_pool();
        let held = pool.lock("held", Duration::from_millis(10)).unwrap();
        for i in 0..10 {
            let _ = pool.lock(&format!("k{i}"), Duration::from_millis(10));
        }
        assert!(pool.acquire("held").is_locked());
        // A second locker must contend on the very same mutex.
        assert!(pool.lock("held", Duration::from_millis(10)).is_none());
        drop(held);
        assert!(pool.lock("held", Duration::from_millis(10)).is_some());
    }

    #[test]
    fn test_idle_entries_are_evicted() {
        let pool = small_pool();
        for i in 0..10 {
            let _ = pool.lock(&format!("k{i}"), Duration::from_millis(10));
        }
        let stats = pool.stats();
        assert!(stats.pool.total_evictions > 0);
        assert!(pool.len() <= 3);
    }

    #[test]
    fn test_remove_skips_busy_entry() {
        let pool = LockPool::default();
        let guard = pool.lock("k", Duration::from_millis(10)).unwrap();
        assert!(!pool.remove("k"));
        drop(guard);
        assert!(pool.remove("k"));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_waiter_blocks_eviction() {
        let pool = Arc::new(small_pool());
        let guard = pool.lock("w", Duration::from_millis(10)).unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.lock("w", Duration::from_secs(5)).is_some())
        };
        while pool.acquire("w").waiters() == 0 {
            thread::yield_now();
        }
        drop(guard);
        assert!(waiter.join().unwrap());
    }
}
