//! Lock pool metrics.

use super::{ratio, EvictionStats};
use serde::Serialize;
use std::collections::BTreeMap;

/// Snapshot of a lock pool's counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LockPoolStats {
    /// Calls to `acquire`.
    pub acquires: u64,
    /// Guards released.
    pub releases: u64,
    /// Acquires that reused a pooled mutex.
    pub hits: u64,
    /// Acquires that had to create a mutex.
    pub misses: u64,
    /// Bounded waits that gave up.
    pub timeouts: u64,
    /// Underlying eviction list.
    pub pool: EvictionStats,
}

impl LockPoolStats {
    /// `hits / (hits + misses)`.
    pub fn hit_rate(&self) -> f64 {
        ratio(self.hits, self.hits + self.misses)
    }

    /// Live mutexes held by the pool.
    pub fn size(&self) -> usize {
        self.pool.total
    }

    /// Converts the snapshot to a sorted metrics map.
    pub fn to_btreemap(&self) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();
        metrics.insert("acquires".to_string(), self.acquires as f64);
        metrics.insert("hit_rate".to_string(), self.hit_rate());
        metrics.insert("hits".to_string(), self.hits as f64);
        metrics.insert("misses".to_string(), self.misses as f64);
        metrics.insert("releases".to_string(), self.releases as f64);
        metrics.insert("timeouts".to_string(), self.timeouts as f64);
        for (name, value) in self.pool.to_btreemap() {
            metrics.insert(format!("pool_{name}"), value);
        }
        metrics
    }
}
