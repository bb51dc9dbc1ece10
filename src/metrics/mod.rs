//! Component Metrics
//!
//! Every long-lived component reports its counters through the same
//! [`CacheMetrics`] trait so a host can scrape them uniformly, whatever
//! exporter it uses. Metric names come out of a `BTreeMap`, in stable order.
//!
//! Components keep their live counters in atomics (or under the shard lock
//! they already hold) and hand out plain snapshot structs:
//!
//! | Snapshot | Produced by |
//! |----------|-------------|
//! | [`EvictionStats`] | [`EvictionList`](crate::EvictionList), [`ConcurrentEvictionList`](crate::ConcurrentEvictionList) |
//! | [`LockPoolStats`] | [`LockPool`](crate::lock::LockPool) |
//! | [`RefreshStats`] | [`PreRefreshScheduler`](crate::refresh::PreRefreshScheduler) |
//! | [`PipelineStats`] | [`ResiliencePipeline`](crate::pipeline::ResiliencePipeline) |

use std::collections::BTreeMap;

pub mod eviction;
pub mod lock_pool;
pub mod pipeline;
pub mod refresh;

pub use eviction::EvictionStats;
pub use lock_pool::LockPoolStats;
pub use pipeline::PipelineStats;
pub use refresh::RefreshStats;

/// Ratio helper shared by the snapshot types. Returns 0.0 for an empty
/// denominator.
pub(crate) fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator > 0 {
        numerator as f64 / denominator as f64
    } else {
        0.0
    }
}

/// Trait that every component implements for metrics reporting.
pub trait CacheMetrics {
    /// Returns all metrics as key-value pairs in deterministic order.
    fn metrics(&self) -> BTreeMap<String, f64>;

    /// Component name for identification (e.g. `"EvictionList"`, `"LockPool"`).
    fn component_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_handles_zero() {
        assert_eq!(ratio(0, 0), 0.0);
        assert_eq!(ratio(1, 4), 0.25);
    }
}
