//! Locking for breakdown protection.
//!
//! | Type | Role |
//! |------|------|
//! | [`LockPool`] | bounded pool of per-key in-process mutexes |
//! | [`DistributedLockManager`] | cross-process lock backend |
//! | [`TwoLevelLock`] | local mutex plus ordered distributed locks around a loader |
//!
//! Every wait is bounded. On timeout or backend failure the loader still
//! runs, just without protection.

mod distributed;
mod pool;
mod two_level;

pub use distributed::{DistributedLockManager, InMemoryLockManager, LockHandle};
pub use pool::{LockEntry, LockPool, PooledLockGuard};
pub use two_level::{DegradeReason, LockOutcome, TwoLevelLock};
