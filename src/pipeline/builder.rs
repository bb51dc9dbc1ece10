use super::{Counters, Inner, ResiliencePipeline};
use crate::clock::{Clock, SystemClock};
use crate::config::ShieldConfig;
use crate::error::{Result, ShieldError};
use crate::event::{CacheEventListener, EventBus};
use crate::lock::{DistributedLockManager, LockPool, TwoLevelLock};
use crate::penetration::{BloomFilterBackend, KeyPolicy, LocalBloomFilters, PenetrationGuard};
use crate::refresh::PreRefreshScheduler;
use crate::storage::Storage;
use crate::ttl::TtlJitter;
use crate::value::{JsonCodec, ValueCodec};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Wires a [`ResiliencePipeline`] from its parts.
///
/// Only the storage adapter is required. Defaults: [`JsonCodec`], a local
/// bloom filter per cache name, no distributed lock managers, no event
/// listeners, the system clock.
pub struct ResiliencePipelineBuilder<V> {
    config: ShieldConfig,
    storage: Option<Arc<dyn Storage>>,
    codec: Option<Arc<dyn ValueCodec<V>>>,
    bloom: Option<Arc<dyn BloomFilterBackend>>,
    managers: Vec<Arc<dyn DistributedLockManager>>,
    listeners: Vec<Arc<dyn CacheEventListener>>,
    clock: Option<Arc<dyn Clock>>,
    jitter: Option<TtlJitter>,
}

impl<V> ResiliencePipelineBuilder<V> {
    pub(super) fn new() -> Self {
        Self {
            config: ShieldConfig::default(),
            storage: None,
            codec: None,
            bloom: None,
            managers: Vec::new(),
            listeners: Vec::new(),
            clock: None,
            jitter: None,
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ShieldConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the storage adapter.
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Sets the value codec.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn ValueCodec<V>>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Sets the bloom filter backend.
    #[must_use]
    pub fn with_bloom_backend(mut self, backend: Arc<dyn BloomFilterBackend>) -> Self {
        self.bloom = Some(backend);
        self
    }

    /// Adds a distributed lock manager. Managers are acquired in
    /// [`order`](DistributedLockManager::order).
    #[must_use]
    pub fn with_lock_manager(mut self, manager: Arc<dyn DistributedLockManager>) -> Self {
        self.managers.push(manager);
        self
    }

    /// Adds an event listener.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn CacheEventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Sets the clock used for entry timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the TTL jitter source.
    #[must_use]
    pub fn with_jitter(mut self, jitter: TtlJitter) -> Self {
        self.jitter = Some(jitter);
        self
    }
}

impl<V> ResiliencePipelineBuilder<V>
where
    V: Serialize + DeserializeOwned + Send + 'static,
{
    /// Validates the configuration and starts the background workers.
    pub fn build(self) -> Result<ResiliencePipeline<V>> {
        let config = self.config;
        config.validate()?;
        let storage = self
            .storage
            .ok_or_else(|| ShieldError::config("a storage adapter is required"))?;

        let codec = self.codec.unwrap_or_else(|| Arc::new(JsonCodec::new()));
        let bloom = self
            .bloom
            .unwrap_or_else(|| Arc::new(LocalBloomFilters::new(config.bloom())));
        let guard = PenetrationGuard::new(bloom, KeyPolicy::new(config.key_policy()));

        let lock = self
            .managers
            .into_iter()
            .fold(TwoLevelLock::new(Arc::new(LockPool::new(*config.lock_pool()))), |lock, m| {
                lock.with_manager(m)
            });
        let refresher = PreRefreshScheduler::new(*config.pre_refresh())?;
        let events = EventBus::new(config.event_queue_capacity(), self.listeners)?;

        info!(
            key_prefix = config.key_prefix(),
            lock_managers = ?lock.manager_names(),
            events = events.is_enabled(),
            "resilience pipeline started"
        );

        Ok(ResiliencePipeline {
            refresher,
            lock,
            inner: Arc::new(Inner {
                config,
                storage,
                codec,
                guard,
                jitter: self.jitter.unwrap_or_default(),
                events,
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                counters: Counters::default(),
            }),
        })
    }
}
