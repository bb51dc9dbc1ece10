//! Cached value envelope and the codec that puts it on the wire.

use crate::error::CodecError;
use crate::ttl;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// What a cache entry holds: a real value or the "confirmed absent" marker.
///
/// `Null` is distinct from having no entry at all. No entry means the key
/// has not been looked up (or has expired); `Null` means the source of truth
/// was asked and had nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StoredValue<V> {
    /// A value produced by the loader.
    Present(V),
    /// Placeholder for a confirmed-absent key.
    Null,
}

impl<V> StoredValue<V> {
    /// Wraps a loader result for storage.
    pub fn to_store_value(value: Option<V>) -> Self {
        match value {
            Some(v) => Self::Present(v),
            None => Self::Null,
        }
    }

    /// Unwraps a stored value back into a loader-shaped result.
    pub fn from_store_value(self) -> Option<V> {
        match self {
            Self::Present(v) => Some(v),
            Self::Null => None,
        }
    }

    /// Returns `true` for the null placeholder.
    pub fn is_null_placeholder(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrows the present value, if any.
    pub fn as_option(&self) -> Option<&V> {
        match self {
            Self::Present(v) => Some(v),
            Self::Null => None,
        }
    }
}

/// A value plus the metadata needed for expiry and pre-refresh decisions.
///
/// `ttl_seconds <= 0` means the value never expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedValue<V> {
    /// Payload.
    pub value: V,
    /// Creation time in epoch milliseconds.
    pub created_at_ms: i64,
    /// Time to live in seconds.
    pub ttl_seconds: i64,
}

impl<V> CachedValue<V> {
    /// Creates an envelope stamped at `created_at_ms`.
    pub fn new(value: V, created_at_ms: i64, ttl_seconds: i64) -> Self {
        Self {
            value,
            created_at_ms,
            ttl_seconds,
        }
    }

    /// Returns `true` if the value has no expiry.
    pub fn never_expires(&self) -> bool {
        self.ttl_seconds <= 0
    }

    /// Returns `true` once the TTL has elapsed at `now_ms`.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        ttl::is_expired(self.created_at_ms, self.ttl_seconds, now_ms)
    }

    /// Remaining whole seconds at `now_ms`, `None` if it never expires.
    pub fn remaining_ttl(&self, now_ms: i64) -> Option<i64> {
        ttl::remaining_ttl(self.created_at_ms, self.ttl_seconds, now_ms)
    }

    /// Pre-refresh trigger at `now_ms` for the given threshold.
    pub fn should_pre_refresh(&self, threshold: f64, now_ms: i64) -> bool {
        ttl::should_pre_refresh(self.created_at_ms, self.ttl_seconds, threshold, now_ms)
    }
}

/// Entry type written to storage by the pipeline.
pub type CacheEntry<V> = CachedValue<StoredValue<V>>;

/// Converts cache entries to and from storage bytes.
pub trait ValueCodec<V>: Send + Sync {
    /// Encodes an entry.
    fn encode(&self, entry: &CacheEntry<V>) -> Result<Vec<u8>, CodecError>;

    /// Decodes an entry.
    fn decode(&self, bytes: &[u8]) -> Result<CacheEntry<V>, CodecError>;
}

/// JSON codec built on `serde_json`.
pub struct JsonCodec<V> {
    _marker: PhantomData<fn() -> V>,
}

impl<V> JsonCodec<V> {
    /// Creates a JSON codec.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<V> Default for JsonCodec<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for JsonCodec<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<V> ValueCodec<V> for JsonCodec<V>
where
    V: Serialize + DeserializeOwned,
{
    fn encode(&self, entry: &CacheEntry<V>) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(entry).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<CacheEntry<V>, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
