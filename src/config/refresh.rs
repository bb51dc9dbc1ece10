//! Configuration for the pre-refresh worker pool.

use crate::error::{Result, ShieldError};
use core::time::Duration;
use serde::{Deserialize, Serialize};

/// Configuration for a [`PreRefreshScheduler`](crate::refresh::PreRefreshScheduler).
///
/// The pool keeps `core_workers` threads alive, grows up to `max_workers`
/// when the queue is full, and runs the job on the submitting thread once
/// both are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreRefreshConfig {
    core_workers: usize,
    max_workers: usize,
    queue_capacity: usize,
    keep_alive_secs: u64,
    shutdown_timeout_secs: u64,
}

impl PreRefreshConfig {
    /// Creates a configuration with the given worker bounds.
    pub fn new(core_workers: usize, max_workers: usize) -> Self {
        Self {
            core_workers,
            max_workers,
            ..Self::default()
        }
    }

    /// Sets the bounded queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets how long an idle extra worker lingers before exiting.
    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive_secs = keep_alive.as_secs();
        self
    }

    /// Sets how long `shutdown()` waits for the queue to drain.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_secs = timeout.as_secs();
        self
    }

    /// Always-on worker threads.
    pub fn core_workers(&self) -> usize {
        self.core_workers
    }

    /// Upper bound on worker threads.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Queue capacity.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Idle lifetime of extra workers.
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Drain timeout for shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Checks worker and queue bounds.
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(ShieldError::config("pre-refresh max_workers must be > 0"));
        }
        if self.core_workers > self.max_workers {
            return Err(ShieldError::config(format!(
                "pre-refresh core_workers ({}) exceeds max_workers ({})",
                self.core_workers, self.max_workers
            )));
        }
        if self.queue_capacity == 0 {
            return Err(ShieldError::config(
                "pre-refresh queue_capacity must be > 0",
            ));
        }
        Ok(())
    }
}

impl Default for PreRefreshConfig {
    fn default() -> Self {
        Self {
            core_workers: 2,
            max_workers: 10,
            queue_capacity: 100,
            keep_alive_secs: 60,
            shutdown_timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_shape() {
        let config = PreRefreshConfig::default();
        assert_eq!(config.core_workers(), 2);
        assert_eq!(config.max_workers(), 10);
        assert_eq!(config.queue_capacity(), 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_core_above_max_rejected() {
        let err = PreRefreshConfig::new(4, 2).validate().unwrap_err();
        assert!(err.to_string().contains("core_workers (4) exceeds max_workers (2)"));
    }

    #[test]
    fn test_zero_queue_rejected() {
        assert!(PreRefreshConfig::default()
            .with_queue_capacity(0)
            .validate()
            .is_err());
    }
}
