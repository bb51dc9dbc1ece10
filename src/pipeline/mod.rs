//! Resilience Pipeline
//!
//! Composes the guards around one cache operation. Every operation runs a
//! fixed, ordered slice of [`Stage`]s:
//!
//! ```text
//!  KeyGen ─▶ Read ─▶ PenetrationCheck ─▶ BreakdownGuard ─▶ Write ─▶ AvalancheGuard
//!    │         │            │                  │              │
//!  invalid    hit        bloom miss        double-checked   evict / clear
//!  key ─▶ None ─▶ value   ─▶ None           hit ─▶ value      ─▶ done
//! ```
//!
//! | Operation | Stages |
//! |-----------|--------|
//! | Get, PutIfAbsent | all six |
//! | Put | KeyGen, BreakdownGuard, Write, AvalancheGuard |
//! | Evict, Clear | KeyGen, Write |
//!
//! With `sync` set, the BreakdownGuard takes the two-level lock and runs the
//! loader and the remaining stages while the lock is held. Get and
//! PutIfAbsent re-read storage first, so the next caller for the key finds
//! the written value. Put always reloads.
//!
//! Failure policy: invalid keys are blocked and answered with `None`.
//! Storage and encode errors are logged and treated as misses (reads) or
//! dropped (writes). Lock trouble degrades to an unprotected load. Any other
//! stage error is logged at the chain boundary and answered with the
//! loader's direct result. Loader errors go back to the caller unchanged.
//!
//! # Example
//!
//! ```
//! use cache_shield::operation::CacheOperation;
//! use cache_shield::pipeline::ResiliencePipeline;
//! use cache_shield::storage::MemoryStorage;
//! use std::sync::Arc;
//!
//! let pipeline = ResiliencePipeline::<String>::builder()
//!     .with_storage(Arc::new(MemoryStorage::new()))
//!     .build()
//!     .unwrap();
//!
//! let op = CacheOperation::new(60).with_sync(true);
//! let first = pipeline.get("users", "42", &op, || Ok(Some("alice".to_string()))).unwrap();
//! let second = pipeline.get("users", "42", &op, || panic!("served from cache")).unwrap();
//! assert_eq!(first, second);
//! ```

mod builder;
mod stage;

pub use builder::ResiliencePipelineBuilder;
pub use stage::{Flow, Stage};

use crate::clock::Clock;
use crate::config::ShieldConfig;
use crate::error::{LoaderError, Result, ShieldError};
use crate::event::{CacheEvent, CacheEventKind, EventBus};
use crate::lock::TwoLevelLock;
use crate::metrics::{CacheMetrics, PipelineStats};
use crate::operation::{CacheKey, CacheOperation, OperationKind};
use crate::penetration::PenetrationGuard;
use crate::refresh::{PreRefreshScheduler, RefreshMode};
use crate::storage::{glob_match, RemainingTtl, Storage};
use crate::ttl::TtlJitter;
use crate::value::{CacheEntry, CachedValue, StoredValue, ValueCodec};
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// What a loader returns: the value, `None` for "does not exist", or the
/// caller's own error.
pub type LoadResult<V> = core::result::Result<Option<V>, LoaderError>;

/// Loader type used by operations that never load.
type NoLoader<V> = fn() -> LoadResult<V>;

/// Write veto: returning `true` keeps the loaded value out of the cache.
pub type Unless<'a, V> = &'a dyn Fn(Option<&V>) -> bool;

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    writes: AtomicU64,
    blocked: AtomicU64,
    degraded: AtomicU64,
    fallbacks: AtomicU64,
    pre_refresh_triggers: AtomicU64,
    evictions: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Counters {
    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            pre_refresh_triggers: self.pre_refresh_triggers.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

fn expiry(ttl_seconds: i64) -> Option<Duration> {
    u64::try_from(ttl_seconds)
        .ok()
        .filter(|&secs| secs > 0)
        .map(Duration::from_secs)
}

/// State shared with background refresh jobs.
struct Inner<V> {
    config: ShieldConfig,
    storage: Arc<dyn Storage>,
    codec: Arc<dyn ValueCodec<V>>,
    guard: PenetrationGuard,
    jitter: TtlJitter,
    events: EventBus,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl<V> Inner<V> {
    fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    fn emit(&self, kind: CacheEventKind, key: &CacheKey, extra: Option<String>) {
        if !self.events.is_enabled() {
            return;
        }
        let mut event = CacheEvent::new(kind, key.cache_name(), key.key(), self.now());
        event.extra = extra;
        self.events.publish(event);
    }

    /// Reads and decodes a live entry. Storage errors read as a miss; a
    /// decode failure is returned.
    fn read_entry(&self, key: &CacheKey) -> Result<Option<CacheEntry<V>>> {
        let bytes = match self.storage.get(key.storage_key()) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!(key = %key, error = %e, "storage read failed, treating as miss");
                return Ok(None);
            }
        };
        let entry = self.codec.decode(&bytes)?;
        if entry.is_expired(self.now()) {
            return Ok(None);
        }
        Ok(Some(entry))
    }

    fn needs_refresh(&self, entry: &CacheEntry<V>, op: &CacheOperation) -> bool {
        op.enable_pre_refresh
            && !entry.value.is_null_placeholder()
            && entry.should_pre_refresh(op.pre_refresh_threshold, self.now())
    }

    /// `Some(answer)` if the entry can answer a read under `op`.
    fn answer(entry: CacheEntry<V>, op: &CacheOperation) -> Option<Option<V>> {
        match entry.value {
            StoredValue::Present(v) => Some(Some(v)),
            StoredValue::Null if op.cache_null_values => Some(None),
            StoredValue::Null => None,
        }
    }

    /// Returns `Some(written)` or `None` when storage failed.
    fn write_bytes(&self, key: &CacheKey, bytes: &[u8], ttl: Option<Duration>, if_absent: bool) -> Option<bool> {
        let result = if if_absent {
            self.storage.set_if_absent(key.storage_key(), bytes, ttl)
        } else {
            self.storage.set(key.storage_key(), bytes, ttl).map(|()| true)
        };
        match result {
            Ok(written) => Some(written),
            Err(e) => {
                warn!(key = %key, error = %e, "storage write failed, value not cached");
                None
            }
        }
    }

    /// Writes a loaded value with a jittered TTL. Returns the value to hand
    /// back and the expiry that was written, if any. A value that cannot be
    /// encoded is handed back unwritten.
    fn write_present(
        &self,
        key: &CacheKey,
        op: &CacheOperation,
        value: V,
        if_absent: bool,
    ) -> (Option<V>, Option<Duration>) {
        if op.use_bloom_filter {
            self.guard.add(key.cache_name(), key.key());
        }
        let ttl = self
            .jitter
            .calculate_final_ttl(op.ttl_seconds, op.random_ttl, op.variance);
        let entry = CachedValue::new(StoredValue::Present(value), self.now(), ttl);
        let bytes = match self.codec.encode(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to encode value, not cached");
                self.emit(CacheEventKind::Error, key, Some(e.to_string()));
                return (entry.value.from_store_value(), None);
            }
        };
        let ttl = expiry(ttl);
        let written = self.write_bytes(key, &bytes, ttl, if_absent);
        let value = entry.value.from_store_value();

        match written {
            Some(true) => {
                bump(&self.counters.writes);
                self.emit(CacheEventKind::Put, key, None);
                (value, ttl)
            }
            Some(false) => {
                debug!(key = %key, "key already present, keeping existing value");
                match self.read_entry(key) {
                    Ok(Some(existing)) => (existing.value.from_store_value(), None),
                    Ok(None) => (value, None),
                    Err(e) => {
                        warn!(key = %key, error = %e, "existing value unreadable, returning loaded value");
                        (value, None)
                    }
                }
            }
            None => (value, None),
        }
    }

    /// Re-applies `ttl` if the stored entry ended up without an expiry.
    fn enforce_expiry(&self, key: &CacheKey, ttl: Duration) {
        match self.storage.remaining_ttl(key.storage_key()) {
            Ok(RemainingTtl::NeverExpires) => {
                warn!(key = %key, ttl_secs = ttl.as_secs(), "cached value has no expiry, reapplying ttl");
                if let Err(e) = self.storage.expire(key.storage_key(), ttl) {
                    warn!(key = %key, error = %e, "failed to reapply ttl");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(key = %key, error = %e, "failed to read remaining ttl"),
        }
    }

    /// Caches a confirmed-absent key for the configured null TTL.
    fn write_null(&self, key: &CacheKey, op: &CacheOperation, if_absent: bool) {
        if op.use_bloom_filter {
            self.guard.add(key.cache_name(), key.key());
        }
        let ttl = self.config.null_value_ttl();
        let entry: CacheEntry<V> = CachedValue::new(
            StoredValue::Null,
            self.now(),
            i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
        );
        let bytes = match self.codec.encode(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to encode null placeholder");
                return;
            }
        };
        if self.write_bytes(key, &bytes, Some(ttl), if_absent) == Some(true) {
            bump(&self.counters.writes);
            debug!(key = %key, ttl_secs = ttl.as_secs(), "cached null placeholder");
        }
    }

    /// Write path used by background refreshes.
    fn store(&self, key: &CacheKey, op: &CacheOperation, loaded: Option<V>) {
        match loaded {
            Some(value) => {
                if let (_, Some(ttl)) = self.write_present(key, op, value, false) {
                    self.enforce_expiry(key, ttl);
                }
            }
            None if op.cache_null_values => self.write_null(key, op, false),
            None => {}
        }
    }
}

/// Per-call state threaded through the stages.
struct Call<'a, V, F> {
    kind: OperationKind,
    op: &'a CacheOperation,
    key: CacheKey,
    stage: Stage,
    loader: Option<F>,
    unless: Option<Unless<'a, V>>,
    loaded: Option<Option<V>>,
    written: Option<Duration>,
}

/// Cache resilience pipeline. Build one with [`ResiliencePipeline::builder`].
pub struct ResiliencePipeline<V> {
    refresher: PreRefreshScheduler,
    lock: TwoLevelLock,
    inner: Arc<Inner<V>>,
}

impl<V: Send + 'static> ResiliencePipeline<V> {
    /// Starts a builder.
    pub fn builder() -> ResiliencePipelineBuilder<V> {
        ResiliencePipelineBuilder::new()
    }

    /// Reads through the cache, calling `loader` on a miss.
    pub fn get<F>(&self, cache_name: &str, key: &str, op: &CacheOperation, loader: F) -> Result<Option<V>>
    where
        F: FnOnce() -> LoadResult<V> + Send + 'static,
    {
        self.execute(OperationKind::Get, cache_name, key, op, Some(loader), None)
    }

    /// Always calls `loader` and writes its result.
    pub fn put<F>(&self, cache_name: &str, key: &str, op: &CacheOperation, loader: F) -> Result<Option<V>>
    where
        F: FnOnce() -> LoadResult<V> + Send + 'static,
    {
        self.execute(OperationKind::Put, cache_name, key, op, Some(loader), None)
    }

    /// Like [`get`](Self::get), but the write only happens if the key is
    /// still absent. When another writer won, its value is returned.
    pub fn put_if_absent<F>(&self, cache_name: &str, key: &str, op: &CacheOperation, loader: F) -> Result<Option<V>>
    where
        F: FnOnce() -> LoadResult<V> + Send + 'static,
    {
        self.execute(OperationKind::PutIfAbsent, cache_name, key, op, Some(loader), None)
    }

    /// Deletes `key`, or every matching key when it is `*` or a glob, and
    /// cancels pending refreshes for it.
    pub fn evict(&self, cache_name: &str, key: &str) -> Result<()> {
        self.execute::<NoLoader<V>>(OperationKind::Evict, cache_name, key, &CacheOperation::default(), None, None)
            .map(|_| ())
    }

    /// Deletes every entry of `cache_name` and resets its bloom filter.
    pub fn clear(&self, cache_name: &str) -> Result<()> {
        self.execute::<NoLoader<V>>(
            OperationKind::Clear,
            cache_name,
            CacheKey::ALL,
            &CacheOperation::default(),
            None,
            None,
        )
        .map(|_| ())
    }

    /// Runs one operation through its stage chain.
    ///
    /// `loader` may be `None` for a pure lookup. `unless` vetoes the write
    /// of a loaded value.
    pub fn execute<F>(
        &self,
        kind: OperationKind,
        cache_name: &str,
        key: &str,
        op: &CacheOperation,
        loader: Option<F>,
        unless: Option<Unless<'_, V>>,
    ) -> Result<Option<V>>
    where
        F: FnOnce() -> LoadResult<V> + Send + 'static,
    {
        let key = if kind == OperationKind::Clear { CacheKey::ALL } else { key };
        let mut call = Call {
            kind,
            op,
            key: CacheKey::new(self.inner.config.key_prefix(), cache_name, key),
            stage: Stage::KeyGen,
            loader,
            unless,
            loaded: None,
            written: None,
        };
        match self.run_chain(Stage::chain(kind), &mut call) {
            Ok(value) => Ok(value),
            Err(e @ ShieldError::Loader(_)) => Err(e),
            Err(e) => self.fallback(&mut call, e),
        }
    }

    fn run_chain<F>(&self, stages: &[Stage], call: &mut Call<'_, V, F>) -> Result<Option<V>>
    where
        F: FnOnce() -> LoadResult<V> + Send + 'static,
    {
        for (i, &stage) in stages.iter().enumerate() {
            call.stage = stage;
            let flow = match stage {
                Stage::KeyGen => self.key_gen(call),
                Stage::Read => self.read(call)?,
                Stage::PenetrationCheck => self.penetration_check(call),
                Stage::BreakdownGuard if call.op.sync => {
                    return self.guarded(call, &stages[i + 1..]);
                }
                Stage::BreakdownGuard => self.load(call)?,
                Stage::Write => self.write(call),
                Stage::AvalancheGuard => self.avalanche_guard(call),
            };
            match flow {
                Flow::Continue => {}
                Flow::Handled(value) => return Ok(value),
                Flow::Blocked => {
                    bump(&self.inner.counters.blocked);
                    return Ok(None);
                }
            }
        }
        Ok(call.loaded.take().flatten())
    }

    fn key_gen<F>(&self, call: &Call<'_, V, F>) -> Flow<V> {
        let wildcards = matches!(call.kind, OperationKind::Evict | OperationKind::Clear);
        let guard = &self.inner.guard;
        let checked = guard
            .validate_key(call.key.cache_name(), false)
            .and_then(|()| guard.validate_key(call.key.key(), wildcards));
        match checked {
            Ok(()) => Flow::Continue,
            Err(violation) => {
                debug!(cache = call.key.cache_name(), error = %violation, "rejected cache key");
                self.inner.emit(CacheEventKind::Error, &call.key, Some(violation.to_string()));
                Flow::Blocked
            }
        }
    }

    fn read<F>(&self, call: &mut Call<'_, V, F>) -> Result<Flow<V>>
    where
        F: FnOnce() -> LoadResult<V> + Send + 'static,
    {
        let inner = &self.inner;
        let Some(entry) = inner.read_entry(&call.key)? else {
            return Ok(self.miss(&call.key));
        };

        if inner.needs_refresh(&entry, call.op) {
            bump(&inner.counters.pre_refresh_triggers);
            match call.op.pre_refresh_mode {
                RefreshMode::Sync => {
                    inner.emit(CacheEventKind::PreRefreshTriggered, &call.key, Some("sync".into()));
                    debug!(key = %call.key, "value close to expiry, reloading in foreground");
                    return Ok(self.miss(&call.key));
                }
                RefreshMode::Async => {
                    inner.emit(CacheEventKind::PreRefreshTriggered, &call.key, Some("async".into()));
                    if let Some(loader) = call.loader.take() {
                        self.schedule_refresh(call.key.clone(), call.op.clone(), loader);
                    }
                    bump(&inner.counters.hits);
                    inner.emit(CacheEventKind::Hit, &call.key, None);
                    return Ok(Flow::Handled(entry.value.from_store_value()));
                }
            }
        }

        match Inner::answer(entry, call.op) {
            Some(value) => {
                bump(&inner.counters.hits);
                trace!(key = %call.key, null = value.is_none(), "cache hit");
                inner.emit(CacheEventKind::Hit, &call.key, None);
                Ok(Flow::Handled(value))
            }
            None => Ok(self.miss(&call.key)),
        }
    }

    fn miss(&self, key: &CacheKey) -> Flow<V> {
        bump(&self.inner.counters.misses);
        self.inner.emit(CacheEventKind::Miss, key, None);
        Flow::Continue
    }

    fn schedule_refresh<F>(&self, key: CacheKey, op: CacheOperation, loader: F)
    where
        F: FnOnce() -> LoadResult<V> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let storage_key = key.storage_key().to_string();
        let outcome = self.refresher.submit(&storage_key, move |ctx| {
            if ctx.is_cancelled() {
                return Ok(());
            }
            let loaded = loader()?;
            bump(&inner.counters.loads);
            if ctx.is_cancelled() {
                return Ok(());
            }
            inner.store(&key, &op, loaded);
            inner.emit(CacheEventKind::PreRefreshCompleted, &key, None);
            Ok(())
        });
        debug!(key = %storage_key, ?outcome, "pre-refresh submitted");
    }

    fn penetration_check<F>(&self, call: &Call<'_, V, F>) -> Flow<V> {
        if call.op.use_bloom_filter && !self.inner.guard.might_contain(call.key.cache_name(), call.key.key()) {
            debug!(key = %call.key, "bloom filter has never seen key, skipping load");
            return Flow::Blocked;
        }
        Flow::Continue
    }

    fn load<F>(&self, call: &mut Call<'_, V, F>) -> Result<Flow<V>>
    where
        F: FnOnce() -> LoadResult<V>,
    {
        let Some(loader) = call.loader.take() else {
            return Ok(Flow::Handled(None));
        };
        bump(&self.inner.counters.loads);
        call.loaded = Some(loader().map_err(ShieldError::Loader)?);
        Ok(Flow::Continue)
    }

    /// Load under the two-level lock, double-checked against storage except
    /// for Put. The remaining stages run before the lock is released.
    fn guarded<F>(&self, call: &mut Call<'_, V, F>, rest: &[Stage]) -> Result<Option<V>>
    where
        F: FnOnce() -> LoadResult<V> + Send + 'static,
    {
        let timeout = call.op.sync_timeout_or(self.inner.config.default_lock_timeout());
        let lock_key = call.key.storage_key().to_string();
        let (result, outcome) = self.lock.execute_sync_with_outcome(
            &lock_key,
            || -> Result<Option<V>> {
                if call.kind != OperationKind::Put {
                    if let Some(entry) = self.inner.read_entry(&call.key)? {
                        if !self.inner.needs_refresh(&entry, call.op) {
                            if let Some(value) = Inner::answer(entry, call.op) {
                                trace!(key = %call.key, "value loaded by another caller");
                                return Ok(value);
                            }
                        }
                    }
                }
                match self.load(call)? {
                    Flow::Continue => self.run_chain(rest, call),
                    Flow::Handled(value) => Ok(value),
                    Flow::Blocked => Ok(None),
                }
            },
            timeout,
        );
        if outcome.is_degraded() {
            bump(&self.inner.counters.degraded);
        }
        result
    }

    fn write<F>(&self, call: &mut Call<'_, V, F>) -> Flow<V> {
        match call.kind {
            OperationKind::Evict => {
                self.evict_keys(&call.key);
                return Flow::Handled(None);
            }
            OperationKind::Clear => {
                self.evict_keys(&call.key);
                self.inner.guard.clear(call.key.cache_name());
                return Flow::Handled(None);
            }
            OperationKind::Get | OperationKind::Put | OperationKind::PutIfAbsent => {}
        }

        let Some(loaded) = call.loaded.take() else {
            return Flow::Handled(None);
        };
        if call.unless.is_some_and(|veto| veto(loaded.as_ref())) {
            debug!(key = %call.key, "write vetoed");
            return Flow::Handled(loaded);
        }
        if let Some(value) = loaded {
            let if_absent = call.kind == OperationKind::PutIfAbsent;
            let (value, written) = self.inner.write_present(&call.key, call.op, value, if_absent);
            call.written = written;
            call.loaded = Some(value);
        } else {
            call.loaded = Some(None);
        }
        Flow::Continue
    }

    fn avalanche_guard<F>(&self, call: &mut Call<'_, V, F>) -> Flow<V> {
        match (&call.loaded, call.written) {
            (Some(Some(_)), Some(ttl)) => self.inner.enforce_expiry(&call.key, ttl),
            (Some(None), _) if call.op.cache_null_values => {
                let if_absent = call.kind == OperationKind::PutIfAbsent;
                self.inner.write_null(&call.key, call.op, if_absent);
            }
            _ => {}
        }
        Flow::Handled(call.loaded.take().flatten())
    }

    fn evict_keys(&self, key: &CacheKey) {
        let inner = &self.inner;
        bump(&inner.counters.evictions);
        if key.is_pattern() {
            let pattern = key.storage_pattern();
            match inner.storage.delete_pattern(&pattern) {
                Ok(removed) => debug!(pattern = %pattern, removed, "evicted matching keys"),
                Err(e) => warn!(pattern = %pattern, error = %e, "pattern eviction failed"),
            }
            self.refresher.cancel_matching(|k| glob_match(&pattern, k));
        } else {
            if let Err(e) = inner.storage.delete(key.storage_key()) {
                warn!(key = %key, error = %e, "eviction failed");
            }
            self.refresher.cancel(key.storage_key());
        }
        let kind = if key.is_all() { CacheEventKind::Clear } else { CacheEventKind::Evict };
        inner.emit(kind, key, None);
    }

    fn fallback<F>(&self, call: &mut Call<'_, V, F>, err: ShieldError) -> Result<Option<V>>
    where
        F: FnOnce() -> LoadResult<V>,
    {
        bump(&self.inner.counters.fallbacks);
        error!(key = %call.key, stage = call.stage.name(), error = %err, "cache stage failed, falling back to loader");
        self.inner.emit(CacheEventKind::Error, &call.key, Some(err.to_string()));
        match call.loader.take() {
            Some(loader) => {
                bump(&self.inner.counters.loads);
                loader().map_err(ShieldError::Loader)
            }
            None => Ok(call.loaded.take().flatten()),
        }
    }

    /// The bloom filter and key policy.
    pub fn penetration_guard(&self) -> &PenetrationGuard {
        &self.inner.guard
    }

    /// The two-level lock.
    pub fn lock(&self) -> &TwoLevelLock {
        &self.lock
    }

    /// The background refresh scheduler.
    pub fn refresher(&self) -> &PreRefreshScheduler {
        &self.refresher
    }

    /// The event bus.
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// The storage adapter.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.inner.storage
    }

    /// The configuration.
    pub fn config(&self) -> &ShieldConfig {
        &self.inner.config
    }

    /// Snapshot of the request counters.
    pub fn stats(&self) -> PipelineStats {
        self.inner.counters.snapshot()
    }

    /// Stops background refreshes and flushes pending events.
    pub fn shutdown(&self) {
        self.refresher.shutdown();
        self.inner.events.shutdown();
    }
}

impl<V: Send + 'static> CacheMetrics for ResiliencePipeline<V> {
    fn metrics(&self) -> BTreeMap<String, f64> {
        let mut metrics = self.stats().to_btreemap();
        for (name, value) in self.lock.pool().metrics() {
            metrics.insert(format!("lock_{name}"), value);
        }
        for (name, value) in self.refresher.metrics() {
            metrics.insert(format!("refresh_{name}"), value);
        }
        metrics.insert("events_dropped".to_string(), self.inner.events.dropped() as f64);
        metrics
    }

    fn component_name(&self) -> &'static str {
        "ResiliencePipeline"
    }
}

impl<V> fmt::Debug for ResiliencePipeline<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResiliencePipeline")
            .field("key_prefix", &self.inner.config.key_prefix())
            .field("storage", &self.inner.storage)
            .field("lock", &self.lock)
            .field("refresher", &self.refresher)
            .field("stats", &self.inner.counters.snapshot())
            .finish()
    }
}
