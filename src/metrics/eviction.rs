//! Eviction list metrics.

use super::ratio;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::AddAssign;

/// Snapshot of an eviction list's segment sizes and counters.
///
/// `total_evictions` counts only entries actually removed. Attempts the
/// eviction predicate refused are reported separately in
/// `blocked_evictions`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EvictionStats {
    /// Entries across both segments.
    pub total: usize,
    /// Entries in the active segment.
    pub active: usize,
    /// Entries in the inactive segment.
    pub inactive: usize,
    /// Active segment bound.
    pub max_active: usize,
    /// Inactive segment bound.
    pub max_inactive: usize,
    /// Entries removed to make room.
    pub total_evictions: u64,
    /// Overflow passes that found no evictable entry.
    pub blocked_evictions: u64,
    /// Inactive to active moves.
    pub promotions: u64,
    /// Active to inactive moves.
    pub demotions: u64,
    /// Lookups that found the key.
    pub hits: u64,
    /// Lookups that did not.
    pub misses: u64,
}

impl EvictionStats {
    /// `hits / (hits + misses)`.
    pub fn hit_rate(&self) -> f64 {
        ratio(self.hits, self.hits + self.misses)
    }

    /// Entries above the nominal bounds, caused by blocked evictions.
    pub fn overflow(&self) -> usize {
        self.inactive.saturating_sub(self.max_inactive)
    }

    /// Converts the snapshot to a sorted metrics map.
    pub fn to_btreemap(&self) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();
        metrics.insert("active".to_string(), self.active as f64);
        metrics.insert("blocked_evictions".to_string(), self.blocked_evictions as f64);
        metrics.insert("demotions".to_string(), self.demotions as f64);
        metrics.insert("hit_rate".to_string(), self.hit_rate());
        metrics.insert("hits".to_string(), self.hits as f64);
        metrics.insert("inactive".to_string(), self.inactive as f64);
        metrics.insert("max_active".to_string(), self.max_active as f64);
        metrics.insert("max_inactive".to_string(), self.max_inactive as f64);
        metrics.insert("misses".to_string(), self.misses as f64);
        metrics.insert("promotions".to_string(), self.promotions as f64);
        metrics.insert("total".to_string(), self.total as f64);
        metrics.insert("total_evictions".to_string(), self.total_evictions as f64);
        metrics
    }
}

/// Sums per-shard snapshots into a whole-list snapshot.
impl AddAssign for EvictionStats {
    fn add_assign(&mut self, rhs: Self) {
        self.total += rhs.total;
        self.active += rhs.active;
        self.inactive += rhs.inactive;
        self.max_active += rhs.max_active;
        self.max_inactive += rhs.max_inactive;
        self.total_evictions += rhs.total_evictions;
        self.blocked_evictions += rhs.blocked_evictions;
        self.promotions += rhs.promotions;
        self.demotions += rhs.demotions;
        self.hits += rhs.hits;
        self.misses += rhs.misses;
    }
}
