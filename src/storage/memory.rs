//! In-process storage with Redis expiry semantics.

use super::{glob_match, RemainingTtl, Storage};
use crate::clock::{Clock, SystemClock};
use crate::error::StorageError;
use core::time::Duration;
use parking_lot::Mutex;
use std::sync::Arc;

#[cfg(feature = "hashbrown")]
use hashbrown::HashMap;
#[cfg(not(feature = "hashbrown"))]
use std::collections::HashMap;

#[derive(Debug)]
struct Slot {
    bytes: Vec<u8>,
    expires_at_ms: Option<i64>,
}

impl Slot {
    fn is_live(&self, now_ms: i64) -> bool {
        self.expires_at_ms.map_or(true, |at| now_ms < at)
    }
}

/// Thread-safe in-memory [`Storage`].
///
/// Expired keys are dropped lazily on access. Time comes from a [`Clock`],
/// so tests can expire entries by advancing a
/// [`ManualClock`](crate::clock::ManualClock).
///
/// ```
/// use cache_shield::storage::{MemoryStorage, RemainingTtl, Storage};
/// use core::time::Duration;
///
/// let storage = MemoryStorage::new();
/// storage.set("k", b"v", Some(Duration::from_secs(30))).unwrap();
/// assert_eq!(storage.get("k").unwrap().as_deref(), Some(&b"v"[..]));
/// assert_eq!(storage.remaining_ttl("k").unwrap(), RemainingTtl::Seconds(30));
/// ```
#[derive(Debug)]
pub struct MemoryStorage {
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl MemoryStorage {
    /// Storage on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Storage on the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now_millis();
        self.slots.lock().values().filter(|s| s.is_live(now)).count()
    }

    /// Returns `true` if no live keys remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expiry(&self, ttl: Option<Duration>) -> Option<i64> {
        ttl.map(|ttl| {
            let ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
            self.clock.now_millis().saturating_add(ms)
        })
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let now = self.clock.now_millis();
        let mut slots = self.slots.lock();
        match slots.get(key) {
            Some(slot) if slot.is_live(now) => Ok(Some(slot.bytes.clone())),
            Some(_) => {
                slots.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StorageError> {
        let slot = Slot {
            bytes: value.to_vec(),
            expires_at_ms: self.expiry(ttl),
        };
        self.slots.lock().insert(key.to_string(), slot);
        Ok(())
    }

    fn set_if_absent(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<bool, StorageError> {
        let now = self.clock.now_millis();
        let expires_at_ms = self.expiry(ttl);
        let mut slots = self.slots.lock();
        if slots.get(key).is_some_and(|s| s.is_live(now)) {
            return Ok(false);
        }
        slots.insert(
            key.to_string(),
            Slot {
                bytes: value.to_vec(),
                expires_at_ms,
            },
        );
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let now = self.clock.now_millis();
        Ok(self.slots.lock().remove(key).is_some_and(|s| s.is_live(now)))
    }

    fn delete_pattern(&self, pattern: &str) -> Result<u64, StorageError> {
        let now = self.clock.now_millis();
        let mut removed = 0;
        self.slots.lock().retain(|key, slot| {
            if glob_match(pattern, key) {
                if slot.is_live(now) {
                    removed += 1;
                }
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StorageError> {
        let now = self.clock.now_millis();
        let expires_at_ms = self.expiry(Some(ttl));
        let mut slots = self.slots.lock();
        match slots.get_mut(key) {
            Some(slot) if slot.is_live(now) => {
                slot.expires_at_ms = expires_at_ms;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn remaining_ttl(&self, key: &str) -> Result<RemainingTtl, StorageError> {
        let now = self.clock.now_millis();
        let slots = self.slots.lock();
        Ok(match slots.get(key) {
            Some(slot) if slot.is_live(now) => match slot.expires_at_ms {
                // Redis rounds to the nearest second.
                Some(at) => RemainingTtl::Seconds(((at - now + 500) / 1000) as u64),
                None => RemainingTtl::NeverExpires,
            },
            _ => RemainingTtl::Absent,
        })
    }
}
