//! Configuration for bloom filters.

use crate::error::{Result, ShieldError};
use serde::{Deserialize, Serialize};

/// Sizing for the per-cache-name bloom filters.
///
/// Each cache name gets its own filter sized for `expected_insertions` at
/// the target `false_positive_rate`. The bit count is
/// `m = -n·ln(p) / ln(2)²` and the hash count `k = (m/n)·ln(2)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BloomConfig {
    expected_insertions: u64,
    false_positive_rate: f64,
}

impl BloomConfig {
    /// Creates a bloom configuration.
    pub fn new(expected_insertions: u64, false_positive_rate: f64) -> Self {
        Self {
            expected_insertions,
            false_positive_rate,
        }
    }

    /// Expected number of distinct keys per cache name.
    pub fn expected_insertions(&self) -> u64 {
        self.expected_insertions
    }

    /// Target false positive rate.
    pub fn false_positive_rate(&self) -> f64 {
        self.false_positive_rate
    }

    /// Checks that the parameters describe a usable filter.
    pub fn validate(&self) -> Result<()> {
        if self.expected_insertions == 0 {
            return Err(ShieldError::config("bloom expected_insertions must be > 0"));
        }
        if !(self.false_positive_rate > 0.0 && self.false_positive_rate < 1.0) {
            return Err(ShieldError::config(
                "bloom false_positive_rate must be in (0, 1)",
            ));
        }
        Ok(())
    }
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self::new(100_000, 0.01)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bloom_config_validation() {
        assert!(BloomConfig::default().validate().is_ok());
        assert!(BloomConfig::new(0, 0.01).validate().is_err());
        assert!(BloomConfig::new(10, 0.0).validate().is_err());
        assert!(BloomConfig::new(10, 1.0).validate().is_err());
    }
}
