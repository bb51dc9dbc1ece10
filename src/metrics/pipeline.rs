//! Resilience pipeline metrics.

use super::ratio;
use serde::Serialize;
use std::collections::BTreeMap;

/// Snapshot of a pipeline's request counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Reads answered from storage (including null placeholders).
    pub hits: u64,
    /// Reads that found nothing in storage.
    pub misses: u64,
    /// Loader invocations.
    pub loads: u64,
    /// Values written to storage.
    pub writes: u64,
    /// Requests stopped by key validation or the bloom filter.
    pub blocked: u64,
    /// Loads that ran without lock protection.
    pub degraded: u64,
    /// Stage failures converted to the fallback path.
    pub fallbacks: u64,
    /// Pre-refresh decisions that fired.
    pub pre_refresh_triggers: u64,
    /// Evict and clear operations.
    pub evictions: u64,
}

impl PipelineStats {
    /// `hits / (hits + misses)`.
    pub fn hit_rate(&self) -> f64 {
        ratio(self.hits, self.hits + self.misses)
    }

    /// Converts the snapshot to a sorted metrics map.
    pub fn to_btreemap(&self) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();
        metrics.insert("blocked".to_string(), self.blocked as f64);
        metrics.insert("degraded".to_string(), self.degraded as f64);
        metrics.insert("evictions".to_string(), self.evictions as f64);
        metrics.insert("fallbacks".to_string(), self.fallbacks as f64);
        metrics.insert("hit_rate".to_string(), self.hit_rate());
        metrics.insert("hits".to_string(), self.hits as f64);
        metrics.insert("loads".to_string(), self.loads as f64);
        metrics.insert("misses".to_string(), self.misses as f64);
        metrics.insert(
            "pre_refresh_triggers".to_string(),
            self.pre_refresh_triggers as f64,
        );
        metrics.insert("writes".to_string(), self.writes as f64);
        metrics
    }
}
