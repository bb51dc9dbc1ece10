//! Pre-refresh scheduler metrics.

use serde::Serialize;
use std::collections::BTreeMap;

/// Snapshot of a pre-refresh scheduler.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefreshStats {
    /// Jobs currently in flight (queued or running).
    pub active: usize,
    /// Live worker threads.
    pub workers: usize,
    /// Jobs accepted onto the queue.
    pub scheduled: u64,
    /// Submits dropped because the key already had a job.
    pub deduplicated: u64,
    /// Jobs run on the submitting thread because the pool was saturated.
    pub caller_runs: u64,
    /// Submits refused after shutdown.
    pub rejected: u64,
    /// Jobs that returned `Ok`.
    pub completed: u64,
    /// Jobs that returned an error or panicked.
    pub failed: u64,
    /// Jobs cancelled before or while running.
    pub cancelled: u64,
}

impl RefreshStats {
    /// Converts the snapshot to a sorted metrics map.
    pub fn to_btreemap(&self) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();
        metrics.insert("active".to_string(), self.active as f64);
        metrics.insert("caller_runs".to_string(), self.caller_runs as f64);
        metrics.insert("cancelled".to_string(), self.cancelled as f64);
        metrics.insert("completed".to_string(), self.completed as f64);
        metrics.insert("deduplicated".to_string(), self.deduplicated as f64);
        metrics.insert("failed".to_string(), self.failed as f64);
        metrics.insert("rejected".to_string(), self.rejected as f64);
        metrics.insert("scheduled".to_string(), self.scheduled as f64);
        metrics.insert("workers".to_string(), self.workers as f64);
        metrics
    }
}
