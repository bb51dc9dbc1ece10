#![doc = include_str!("../README.md")]
//!
//! ---
//!
//! # Code Reference
//!
//! ## Which Guard Handles What?
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                        What is hurting the backend?                      │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │                                                                          │
//! │  Lookups for keys that do not exist  ──▶ PenetrationGuard                │
//! │    (bloom filter + null placeholders)        use_bloom_filter,           │
//! │                                              cache_null_values           │
//! │                                                                          │
//! │  A hot key expiring under load       ──▶ TwoLevelLock                    │
//! │    (many loaders for one key)                sync = true                 │
//! │                                                                          │
//! │  Many keys expiring together         ──▶ TtlJitter                       │
//! │    (same TTL, same write time)               random_ttl + variance       │
//! │                                                                          │
//! │  Latency spikes at expiry            ──▶ PreRefreshScheduler             │
//! │                                              enable_pre_refresh          │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Reference
//!
//! | Type | Role |
//! |------|------|
//! | [`ResiliencePipeline`] | runs Get / Put / PutIfAbsent / Evict / Clear through the guards |
//! | [`EvictionList`] | two-segment LRU index, used to bound the lock pool |
//! | [`ConcurrentEvictionList`] | sharded, thread-safe eviction list |
//! | [`lock::LockPool`] | bounded pool of per-key mutexes |
//! | [`lock::TwoLevelLock`] | local mutex plus distributed locks around a loader |
//! | [`ttl::TtlJitter`] | Gaussian TTL jitter |
//! | [`refresh::PreRefreshScheduler`] | deduplicating background refresh pool |
//! | [`penetration::PenetrationGuard`] | bloom filter and key validation |
//!
//! ## Read-Through with Breakdown Protection
//!
//! ```rust
//! use cache_shield::operation::CacheOperation;
//! use cache_shield::storage::MemoryStorage;
//! use cache_shield::ResiliencePipeline;
//! use std::sync::Arc;
//!
//! let pipeline = ResiliencePipeline::<u64>::builder()
//!     .with_storage(Arc::new(MemoryStorage::new()))
//!     .build()
//!     .unwrap();
//!
//! let op = CacheOperation::new(300).with_sync(true).with_random_ttl(0.1);
//! let balance = pipeline.get("accounts", "7", &op, || Ok(Some(120))).unwrap();
//! assert_eq!(balance, Some(120));
//! assert_eq!(pipeline.stats().loads, 1);
//! ```
//!
//! ## Eviction List
//!
//! Entries enter the inactive segment and move to the active segment on
//! their second access. One-off keys never push out repeatedly used ones.
//!
//! ```rust
//! use cache_shield::EvictionList;
//! use cache_shield::config::EvictionListConfig;
//! use core::num::NonZeroUsize;
//!
//! let config = EvictionListConfig::new(
//!     NonZeroUsize::new(2).unwrap(),
//!     NonZeroUsize::new(2).unwrap(),
//! );
//! let mut list = EvictionList::init(config, None);
//! list.put(0, "hot");
//! list.get(&0);
//! for key in 1..=10 {
//!     list.put(key, "scan");
//! }
//! assert!(list.contains(&0));
//! assert_eq!(list.len(), 3);
//! ```
//!
//! ## Modules
//!
//! - [`pipeline`]: the resilience pipeline and its stages
//! - [`lock`]: lock pool, distributed lock managers, two-level lock
//! - [`ttl`]: TTL jitter and expiry arithmetic
//! - [`refresh`]: background pre-refresh scheduler
//! - [`penetration`]: bloom filters and key validation
//! - [`storage`]: storage adapter trait and the in-memory adapter
//! - [`config`]: configuration structures for every component
//! - [`metrics`]: metrics snapshots for every component
//! - `redis_backend`: Redis storage, lock and bloom adapters (requires the `redis` feature)

/// Index-linked doubly linked list backing the eviction segments.
pub(crate) mod list;

/// Two-segment LRU eviction list.
///
/// Entries start in the inactive segment and are promoted to the active
/// segment on their second access.
pub mod eviction;

/// Thread-safe eviction list sharded across mutex-protected segments.
pub mod concurrent;

/// Configuration structures.
pub mod config;

/// Crate error types.
pub mod error;

/// Time source abstraction.
pub mod clock;

/// Metrics snapshots and the [`CacheMetrics`](metrics::CacheMetrics) trait.
pub mod metrics;

/// Per-key lock pool and the two-level lock.
pub mod lock;

/// TTL jitter, expiry and pre-refresh arithmetic.
pub mod ttl;

/// Cached value envelope and codecs.
pub mod value;

/// Background pre-refresh scheduler.
pub mod refresh;

/// Penetration protection: bloom filters and key validation.
pub mod penetration;

/// Storage adapters.
pub mod storage;

/// Cache event bus.
pub mod event;

/// Operation descriptors and cache keys.
pub mod operation;

/// The resilience pipeline.
pub mod pipeline;

/// Redis adapters.
///
/// Available when the `redis` feature is enabled.
#[cfg(feature = "redis")]
pub mod redis_backend;

pub use concurrent::ConcurrentEvictionList;
pub use error::{Result, ShieldError};
pub use eviction::EvictionList;
pub use operation::{CacheOperation, OperationKind};
pub use pipeline::ResiliencePipeline;
