//! Configuration for cache key validation.

use serde::{Deserialize, Serialize};

/// Rules used by [`KeyPolicy`](crate::penetration::KeyPolicy) to reject
/// malformed or hostile keys before they reach storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPolicyConfig {
    max_key_length: usize,
    blocked_patterns: Vec<String>,
}

impl KeyPolicyConfig {
    /// Creates a policy with the given length limit and no blocked patterns.
    pub fn new(max_key_length: usize) -> Self {
        Self {
            max_key_length,
            blocked_patterns: Vec::new(),
        }
    }

    /// Adds a case-insensitive substring that makes a key invalid.
    #[must_use]
    pub fn with_blocked_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.blocked_patterns.push(pattern.into());
        self
    }

    /// Longest accepted business key, in bytes.
    pub fn max_key_length(&self) -> usize {
        self.max_key_length
    }

    /// Blocked substrings.
    pub fn blocked_patterns(&self) -> &[String] {
        &self.blocked_patterns
    }
}

impl Default for KeyPolicyConfig {
    fn default() -> Self {
        Self {
            max_key_length: 512,
            blocked_patterns: vec![
                "../".to_string(),
                "<script".to_string(),
                "' or '1'='1".to_string(),
                "union select".to_string(),
            ],
        }
    }
}
