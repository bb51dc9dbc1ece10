//! Concurrent Eviction List
//!
//! Thread-safe counterpart of [`EvictionList`](crate::EvictionList) using the
//! shared segment pattern: the key space is partitioned across shards by
//! hash, and each shard is an independent eviction list behind its own
//! `parking_lot::Mutex`. Operations only lock the shard that owns the key,
//! so unrelated keys proceed in parallel.
//!
//! ## Locking
//!
//! A `get` on an eviction list is a write: it moves the entry to the head of
//! its segment and may promote it. Every access takes the shard mutex.
//!
//! ## Trade-offs
//!
//! Segment bounds are per shard. A key that is hot in shard A does not
//! protect anything in shard B, and the whole-list bounds reported by
//! [`stats`](ConcurrentEvictionList::stats) are the sum of the shard bounds.
//!
//! # Example
//!
//! ```
//! use cache_shield::ConcurrentEvictionList;
//! use cache_shield::config::ConcurrentEvictionListConfig;
//! use core::num::NonZeroUsize;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let config = ConcurrentEvictionListConfig::new(
//!     NonZeroUsize::new(64).unwrap(),
//!     NonZeroUsize::new(256).unwrap(),
//! );
//! let list = Arc::new(ConcurrentEvictionList::init(config, None));
//!
//! let handles: Vec<_> = (0..4)
//!     .map(|t| {
//!         let list = Arc::clone(&list);
//!         thread::spawn(move || {
//!             for i in 0..50 {
//!                 list.put(format!("key_{t}_{i}"), i);
//!             }
//!         })
//!     })
//!     .collect();
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//! assert!(list.len() > 0);
//! ```

mod eviction;

pub use self::eviction::ConcurrentEvictionList;
