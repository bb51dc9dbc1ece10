//! Concurrent Benchmarks
//!
//! Throughput of the sharded eviction list, the lock pool and the sync
//! pipeline path as the thread count grows.

use cache_shield::config::{ConcurrentEvictionListConfig, LockPoolConfig};
use cache_shield::lock::LockPool;
use cache_shield::operation::CacheOperation;
use cache_shield::storage::MemoryStorage;
use cache_shield::{ConcurrentEvictionList, ResiliencePipeline};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const KEY_SPACE: usize = 10_000;
const OPS_PER_THREAD: usize = 1_000;
const THREAD_COUNTS: [usize; 4] = [1, 2, 4, 8];

fn run_threads<F>(threads: usize, work: F)
where
    F: Fn(usize) + Send + Sync + 'static,
{
    let work = Arc::new(work);
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let work = Arc::clone(&work);
            thread::spawn(move || work(t))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

/// Benchmark mixed reads and writes on the sharded eviction list
fn concurrent_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("Concurrent Eviction List");

    for &threads in &THREAD_COUNTS {
        group.throughput(Throughput::Elements((threads * OPS_PER_THREAD) as u64));
        let list: Arc<ConcurrentEvictionList<usize, usize>> =
            Arc::new(ConcurrentEvictionList::init(
                ConcurrentEvictionListConfig::new(
                    NonZeroUsize::new(KEY_SPACE / 4).unwrap(),
                    NonZeroUsize::new(KEY_SPACE).unwrap(),
                ),
                None,
            ));
        for i in 0..KEY_SPACE {
            list.put(i, i);
        }

        group.bench_with_input(BenchmarkId::new("80/20 get/put", threads), &threads, |b, &threads| {
            b.iter(|| {
                let list = Arc::clone(&list);
                run_threads(threads, move |t| {
                    for i in 0..OPS_PER_THREAD {
                        let key = (t * 7919 + i * 31) % KEY_SPACE;
                        if i % 5 == 0 {
                            list.put(key, i);
                        } else {
                            black_box(list.get(&key));
                        }
                    }
                });
            });
        });
    }

    group.finish();
}

/// Benchmark lock/unlock cycles on the lock pool
fn concurrent_lock_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("Lock Pool");

    for &threads in &THREAD_COUNTS {
        group.throughput(Throughput::Elements((threads * OPS_PER_THREAD) as u64));
        let pool = Arc::new(LockPool::new(LockPoolConfig::default()));

        group.bench_with_input(BenchmarkId::new("lock/unlock", threads), &threads, |b, &threads| {
            b.iter(|| {
                let pool = Arc::clone(&pool);
                run_threads(threads, move |t| {
                    for i in 0..OPS_PER_THREAD {
                        let key = format!("key-{}", (t * 7919 + i) % 512);
                        black_box(pool.lock(&key, Duration::from_secs(1)));
                    }
                });
            });
        });
    }

    group.finish();
}

/// Benchmark the sync read-through path on a warm cache
fn concurrent_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("Pipeline Sync Get");
    let pipeline: Arc<ResiliencePipeline<u64>> = Arc::new(
        ResiliencePipeline::builder()
            .with_storage(Arc::new(MemoryStorage::new()))
            .build()
            .unwrap(),
    );
    let op = CacheOperation::new(3600).with_sync(true);
    for i in 0..1_000u64 {
        pipeline.put("bench", &i.to_string(), &op, move || Ok(Some(i))).unwrap();
    }

    for &threads in &THREAD_COUNTS {
        group.throughput(Throughput::Elements((threads * OPS_PER_THREAD) as u64));
        group.bench_with_input(BenchmarkId::new("warm", threads), &threads, |b, &threads| {
            b.iter(|| {
                let pipeline = Arc::clone(&pipeline);
                let op = op.clone();
                run_threads(threads, move |t| {
                    for i in 0..OPS_PER_THREAD {
                        let key = ((t * 7919 + i) % 1_000).to_string();
                        black_box(pipeline.get("bench", &key, &op, || Ok(None)).unwrap());
                    }
                });
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    concurrent_list,
    concurrent_lock_pool,
    concurrent_pipeline
);
criterion_main!(benches);
