//! Stress Tests for the Resilience Pipeline
//!
//! These tests verify thread safety and bookkeeping under high contention.

use cache_shield::config::{LockPoolConfig, ShieldConfig};
use cache_shield::lock::LockPool;
use cache_shield::metrics::CacheMetrics;
use cache_shield::operation::CacheOperation;
use cache_shield::refresh::RefreshMode;
use cache_shield::storage::MemoryStorage;
use cache_shield::ResiliencePipeline;
use scoped_threadpool::Pool;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const NUM_THREADS: u32 = 16;
const OPS_PER_THREAD: usize = 2_000;

fn small_pool_config() -> ShieldConfig {
    ShieldConfig::default().with_lock_pool(LockPoolConfig::new(
        NonZeroUsize::new(8).unwrap(),
        NonZeroUsize::new(16).unwrap(),
    ))
}

/// Test many threads hammering a small key space through the sync path
#[test]
fn stress_pipeline_high_contention() {
    let pipeline: ResiliencePipeline<usize> = ResiliencePipeline::builder()
        .with_storage(Arc::new(MemoryStorage::new()))
        .with_config(small_pool_config())
        .build()
        .unwrap();
    let op = CacheOperation::new(300).with_sync(true).with_random_ttl(0.2);

    let mut pool = Pool::new(NUM_THREADS);
    pool.scoped(|scope| {
        for t in 0..NUM_THREADS as usize {
            let pipeline = &pipeline;
            let op = &op;
            scope.execute(move || {
                for i in 0..OPS_PER_THREAD {
                    let key = ((t + i) % 64).to_string();
                    let expected = (t + i) % 64;
                    let value = pipeline
                        .get("stress", &key, op, move || Ok(Some(expected)))
                        .unwrap();
                    assert_eq!(value, Some(expected));
                }
            });
        }
    });

    let stats = pipeline.stats();
    // Every key is loaded exactly once; every other call is a hit.
    assert_eq!(stats.loads, 64);
    assert_eq!(stats.hits + stats.misses, NUM_THREADS as u64 * OPS_PER_THREAD as u64);
    assert_eq!(stats.degraded, 0);

    // The lock pool stays near its bounds once the load settles.
    let pool_size = pipeline.lock().pool().len();
    assert!(pool_size <= 64, "lock pool grew to {pool_size}");
}

/// Test mixed reads, writes and evictions without panics or poisoned state
#[test]
fn stress_pipeline_mixed_operations() {
    let pipeline: ResiliencePipeline<String> = ResiliencePipeline::builder()
        .with_storage(Arc::new(MemoryStorage::new()))
        .with_config(small_pool_config())
        .build()
        .unwrap();
    let op = CacheOperation::new(300)
        .with_sync(true)
        .with_pre_refresh(0.3, RefreshMode::Async);

    let mut pool = Pool::new(NUM_THREADS);
    pool.scoped(|scope| {
        for t in 0..NUM_THREADS as usize {
            let pipeline = &pipeline;
            let op = &op;
            scope.execute(move || {
                for i in 0..OPS_PER_THREAD / 4 {
                    let key = (i % 32).to_string();
                    match (t + i) % 4 {
                        0 => {
                            pipeline
                                .put("mixed", &key, op, move || Ok(Some(format!("{t}-{i}"))))
                                .unwrap();
                        }
                        1 => pipeline.evict("mixed", &key).unwrap(),
                        _ => {
                            let value = pipeline
                                .get("mixed", &key, op, || Ok(Some("loaded".to_string())))
                                .unwrap();
                            assert!(value.is_some());
                        }
                    }
                }
            });
        }
    });

    let metrics = pipeline.metrics();
    assert!(metrics.contains_key("hits"));
    assert!(metrics.contains_key("lock_acquires"));
    assert_eq!(metrics.get("fallbacks"), Some(&0.0));
    pipeline.shutdown();
}

/// Test that the lock pool never hands two threads the same mutex at once
#[test]
fn stress_lock_pool_mutual_exclusion() {
    let lock_pool = LockPool::new(LockPoolConfig::new(
        NonZeroUsize::new(4).unwrap(),
        NonZeroUsize::new(4).unwrap(),
    ));
    let inside: Vec<AtomicUsize> = (0..8).map(|_| AtomicUsize::new(0)).collect();

    let mut pool = Pool::new(NUM_THREADS);
    pool.scoped(|scope| {
        for t in 0..NUM_THREADS as usize {
            let lock_pool = &lock_pool;
            let inside = &inside;
            scope.execute(move || {
                for i in 0..OPS_PER_THREAD / 4 {
                    let slot = (t * 7 + i) % inside.len();
                    let key = format!("key-{slot}");
                    let guard = lock_pool.lock(&key, Duration::from_secs(5)).unwrap();
                    assert_eq!(inside[slot].fetch_add(1, Ordering::SeqCst), 0);
                    inside[slot].fetch_sub(1, Ordering::SeqCst);
                    drop(guard);
                }
            });
        }
    });

    let stats = lock_pool.stats();
    assert_eq!(stats.timeouts, 0);
    assert_eq!(stats.acquires, stats.releases);
}
