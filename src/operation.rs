//! Operation descriptors and cache keys.

use crate::refresh::RefreshMode;
use core::fmt;
use core::time::Duration;
use serde::{Deserialize, Serialize};

/// What the pipeline is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Read through the cache, loading on miss.
    Get,
    /// Always load and write.
    Put,
    /// Load on miss and write only if still absent.
    PutIfAbsent,
    /// Delete one key, or every key for `*`.
    Evict,
    /// Delete every key of the cache and reset its bloom filter.
    Clear,
}

/// Per-operation caching policy.
///
/// ```
/// use cache_shield::operation::CacheOperation;
/// use cache_shield::refresh::RefreshMode;
///
/// let op = CacheOperation::new(60)
///     .with_sync(true)
///     .with_random_ttl(0.2)
///     .with_pre_refresh(0.3, RefreshMode::Async);
/// assert!(op.sync);
/// assert!(op.random_ttl);
/// assert_eq!(op.pre_refresh_mode, RefreshMode::Async);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOperation {
    /// Base TTL in seconds; `<= 0` means never expire.
    pub ttl_seconds: i64,
    /// Serialize loads for one key across threads and processes.
    pub sync: bool,
    /// Wait bound for each lock level, in seconds. `0` uses the pipeline
    /// default. A bound too large to represent waits without a deadline.
    pub sync_timeout_seconds: u64,
    /// Store a short-lived placeholder when the loader finds nothing.
    pub cache_null_values: bool,
    /// Short-circuit keys the bloom filter has never seen.
    pub use_bloom_filter: bool,
    /// Jitter the TTL of written values.
    pub random_ttl: bool,
    /// Jitter spread as a fraction of the base TTL, in `(0, 1]`.
    pub variance: f64,
    /// Refresh values before they expire.
    pub enable_pre_refresh: bool,
    /// Remaining-lifetime fraction below which a refresh starts.
    pub pre_refresh_threshold: f64,
    /// How a read that needs refresh is answered.
    pub pre_refresh_mode: RefreshMode,
}

impl CacheOperation {
    /// A plain operation with the given TTL.
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            ttl_seconds,
            ..Self::default()
        }
    }

    /// Enables or disables load serialization.
    #[must_use]
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Sets the lock wait bound.
    #[must_use]
    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout_seconds = timeout.as_secs();
        self
    }

    /// Enables or disables null placeholders.
    #[must_use]
    pub fn with_cache_null_values(mut self, cache: bool) -> Self {
        self.cache_null_values = cache;
        self
    }

    /// Enables or disables the bloom filter check.
    #[must_use]
    pub fn with_bloom_filter(mut self, enabled: bool) -> Self {
        self.use_bloom_filter = enabled;
        self
    }

    /// Enables TTL jitter with the given variance.
    #[must_use]
    pub fn with_random_ttl(mut self, variance: f64) -> Self {
        self.random_ttl = true;
        self.variance = variance;
        self
    }

    /// Enables pre-refresh.
    #[must_use]
    pub fn with_pre_refresh(mut self, threshold: f64, mode: RefreshMode) -> Self {
        self.enable_pre_refresh = true;
        self.pre_refresh_threshold = threshold;
        self.pre_refresh_mode = mode;
        self
    }

    /// Lock wait bound, falling back to `default` when unset.
    pub fn sync_timeout_or(&self, default: Duration) -> Duration {
        if self.sync_timeout_seconds == 0 {
            default
        } else {
            Duration::from_secs(self.sync_timeout_seconds)
        }
    }
}

impl Default for CacheOperation {
    fn default() -> Self {
        Self {
            ttl_seconds: 0,
            sync: false,
            sync_timeout_seconds: 0,
            cache_null_values: true,
            use_bloom_filter: false,
            random_ttl: false,
            variance: 0.0,
            enable_pre_refresh: false,
            pre_refresh_threshold: 0.3,
            pre_refresh_mode: RefreshMode::Sync,
        }
    }
}

/// `(cache_name, key)` with its storage identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    cache_name: String,
    key: String,
    storage_key: String,
}

impl CacheKey {
    /// Key meaning "every entry of the cache".
    pub const ALL: &'static str = "*";

    /// Builds the key `"{prefix}{cache_name}::{key}"`.
    pub fn new(prefix: &str, cache_name: &str, key: &str) -> Self {
        Self {
            cache_name: cache_name.to_string(),
            key: key.to_string(),
            storage_key: format!("{prefix}{cache_name}::{key}"),
        }
    }

    /// Cache name.
    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// Business key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Storage key, also used as the lock and pre-refresh identity.
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Returns `true` for the whole-cache key.
    pub fn is_all(&self) -> bool {
        self.key == Self::ALL
    }

    /// Returns `true` if the business key contains glob metacharacters.
    pub fn is_pattern(&self) -> bool {
        self.key.chars().any(|c| matches!(c, '*' | '?' | '['))
    }

    /// Storage glob for this key: the prefix and cache name escaped, the
    /// business key kept as written. For `*` this matches the whole cache.
    pub fn storage_pattern(&self) -> String {
        let prefix_len = self.storage_key.len() - self.key.len();
        format!("{}{}", escape_glob(&self.storage_key[..prefix_len]), self.key)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key)
    }
}

fn escape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_format() {
        let key = CacheKey::new("cache:", "users", "42");
        assert_eq!(key.storage_key(), "cache:users::42");
        assert_eq!(key.to_string(), "cache:users::42");
        assert!(!key.is_all());
        assert!(!key.is_pattern());

        let all = CacheKey::new("cache:", "users", "*");
        assert!(all.is_all());
        assert_eq!(all.storage_pattern(), "cache:users::*");
        assert!(CacheKey::new("cache:", "users", "4?").is_pattern());
    }

    #[test]
    fn test_pattern_escapes_cache_name() {
        let key = CacheKey::new("", "odd[1]", "*");
        assert_eq!(key.storage_pattern(), "odd\\[1\\]::*");
    }

    #[test]
    fn test_operation_defaults_and_serde() {
        let op = CacheOperation::default();
        assert!(op.cache_null_values);
        assert_eq!(op.sync_timeout_or(Duration::from_secs(3)), Duration::from_secs(3));

        let op: CacheOperation = serde_json::from_str(r#"{"ttl_seconds":30,"sync":true}"#).unwrap();
        assert_eq!(op.ttl_seconds, 30);
        assert!(op.sync);
        assert_eq!(op.pre_refresh_mode, RefreshMode::Sync);
        assert_eq!(
            op.with_sync_timeout(Duration::from_secs(9)).sync_timeout_or(Duration::from_secs(3)),
            Duration::from_secs(9)
        );
    }
}
