//! Cache key validation.

use crate::config::KeyPolicyConfig;
use crate::error::KeyViolation;

const WILDCARDS: [char; 4] = ['*', '?', '[', ']'];

/// Rejects keys that are malformed or look like injection attempts.
///
/// ```
/// use cache_shield::penetration::KeyPolicy;
/// use cache_shield::error::KeyViolation;
///
/// let policy = KeyPolicy::default();
/// assert!(policy.validate("user:42", false).is_ok());
/// assert_eq!(policy.validate("  ", false), Err(KeyViolation::Empty));
/// assert_eq!(policy.validate("user:*", false), Err(KeyViolation::Wildcard('*')));
/// assert!(policy.validate("user:*", true).is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct KeyPolicy {
    max_key_length: usize,
    blocked: Vec<(String, String)>,
}

impl KeyPolicy {
    /// Builds a policy from its configuration.
    pub fn new(config: &KeyPolicyConfig) -> Self {
        Self {
            max_key_length: config.max_key_length(),
            blocked: config
                .blocked_patterns()
                .iter()
                .map(|p| (p.clone(), p.to_lowercase()))
                .collect(),
        }
    }

    /// Checks `key`. Glob metacharacters are only accepted when
    /// `allow_wildcards` is set (pattern evictions).
    pub fn validate(&self, key: &str, allow_wildcards: bool) -> Result<(), KeyViolation> {
        if key.trim().is_empty() {
            return Err(KeyViolation::Empty);
        }
        if key.len() > self.max_key_length {
            return Err(KeyViolation::TooLong {
                len: key.len(),
                max: self.max_key_length,
            });
        }
        if let Some(c) = key.chars().find(|c| c.is_control()) {
            return Err(KeyViolation::ControlCharacter(c));
        }
        if !allow_wildcards {
            if let Some(c) = key.chars().find(|c| WILDCARDS.contains(c)) {
                return Err(KeyViolation::Wildcard(c));
            }
        }
        if !self.blocked.is_empty() {
            let lowered = key.to_lowercase();
            if let Some((original, _)) = self.blocked.iter().find(|(_, p)| lowered.contains(p.as_str())) {
                return Err(KeyViolation::BlockedPattern(original.clone()));
            }
        }
        Ok(())
    }
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self::new(&KeyPolicyConfig::default())
    }
}
