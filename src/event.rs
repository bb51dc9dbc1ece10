//! Cache events.
//!
//! The pipeline publishes an event for every hit, miss, write, eviction and
//! background refresh. Publishing never blocks: events go into a bounded
//! channel and a dispatcher thread hands them to the listeners. When the
//! channel is full the event is dropped and counted.

use crate::error::Result;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use crossbeam_channel::{Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheEventKind {
    /// A read was answered from storage.
    Hit,
    /// A read found nothing usable in storage.
    Miss,
    /// A value was written.
    Put,
    /// A key (or every key of a cache) was evicted.
    Evict,
    /// A cache was cleared.
    Clear,
    /// A background refresh was submitted.
    PreRefreshTriggered,
    /// A background refresh wrote its result.
    PreRefreshCompleted,
    /// Something was swallowed on the caller's behalf. `extra` carries the
    /// message.
    Error,
}

/// One cache event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEvent {
    /// Event type.
    pub kind: CacheEventKind,
    /// Cache name.
    pub cache_name: String,
    /// Business key, `*` for whole-cache operations.
    pub key: String,
    /// Epoch milliseconds.
    pub timestamp_ms: i64,
    /// Free-form detail, such as an error message.
    pub extra: Option<String>,
}

impl CacheEvent {
    /// Creates an event without detail.
    pub fn new(kind: CacheEventKind, cache_name: impl Into<String>, key: impl Into<String>, timestamp_ms: i64) -> Self {
        Self {
            kind,
            cache_name: cache_name.into(),
            key: key.into(),
            timestamp_ms,
            extra: None,
        }
    }

    /// Attaches detail.
    #[must_use]
    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }
}

/// Receives events on the dispatcher thread.
pub trait CacheEventListener: Send + Sync {
    /// Handles one event. Panics are caught and logged.
    fn on_event(&self, event: &CacheEvent);
}

impl<F> CacheEventListener for F
where
    F: Fn(&CacheEvent) + Send + Sync,
{
    fn on_event(&self, event: &CacheEvent) {
        self(event)
    }
}

/// Bounded fire-and-forget event channel.
///
/// ```
/// use cache_shield::event::{CacheEvent, CacheEventKind, EventBus};
/// use std::sync::{Arc, Mutex};
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&seen);
/// let bus = EventBus::new(16, vec![Arc::new(move |e: &CacheEvent| sink.lock().unwrap().push(e.kind))]).unwrap();
/// bus.publish(CacheEvent::new(CacheEventKind::Hit, "users", "1", 0));
/// bus.shutdown();
/// assert_eq!(*seen.lock().unwrap(), vec![CacheEventKind::Hit]);
/// ```
pub struct EventBus {
    sender: Mutex<Option<Sender<CacheEvent>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl EventBus {
    /// Starts a dispatcher for `listeners`. With no listeners nothing is
    /// spawned and publishing is a no-op.
    pub fn new(capacity: usize, listeners: Vec<Arc<dyn CacheEventListener>>) -> Result<Self> {
        if listeners.is_empty() {
            return Ok(Self::disabled());
        }
        let (sender, receiver) = crossbeam_channel::bounded::<CacheEvent>(capacity.max(1));
        let dispatcher = thread::Builder::new()
            .name("cache-events".to_string())
            .spawn(move || {
                for event in receiver {
                    for listener in &listeners {
                        if catch_unwind(AssertUnwindSafe(|| listener.on_event(&event))).is_err() {
                            error!(kind = ?event.kind, cache = %event.cache_name, "cache event listener panicked");
                        }
                    }
                }
                debug!("cache event dispatcher stopped");
            })?;
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            dispatcher: Mutex::new(Some(dispatcher)),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    /// A bus that discards every event.
    pub fn disabled() -> Self {
        Self {
            sender: Mutex::new(None),
            dispatcher: Mutex::new(None),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Returns `true` if events reach listeners.
    pub fn is_enabled(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Queues an event without blocking. Returns `false` if it was dropped.
    pub fn publish(&self, event: CacheEvent) -> bool {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return false;
        };
        match sender.try_send(event) {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Events accepted onto the channel.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Events dropped because the channel was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Closes the channel and waits for queued events to be delivered.
    pub fn shutdown(&self) {
        self.sender.lock().take();
        if let Some(handle) = self.dispatcher.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("enabled", &self.is_enabled())
            .field("published", &self.published())
            .field("dropped", &self.dropped())
            .finish()
    }
}
