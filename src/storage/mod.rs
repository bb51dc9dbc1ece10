//! Key/value storage behind the pipeline.
//!
//! The [`Storage`] trait is the subset of Redis the pipeline needs. Values
//! are opaque bytes; encoding is the codec's job. Every method reports
//! backend trouble as [`StorageError`] and the pipeline decides what that
//! means (reads become misses, writes are dropped).

mod memory;

pub use memory::MemoryStorage;

use crate::error::StorageError;
use core::fmt;
use core::time::Duration;

/// Remaining lifetime of a stored key, as reported by Redis `TTL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemainingTtl {
    /// Seconds until expiry.
    Seconds(u64),
    /// The key exists without an expiry (`-1`).
    NeverExpires,
    /// The key does not exist (`-2`).
    Absent,
}

impl RemainingTtl {
    /// Maps a Redis `TTL` reply.
    pub fn from_reply(reply: i64) -> Self {
        match reply {
            -1 => Self::NeverExpires,
            n if n < 0 => Self::Absent,
            n => Self::Seconds(n as u64),
        }
    }

    /// The Redis `TTL` reply for this value.
    pub fn as_reply(&self) -> i64 {
        match self {
            Self::Seconds(n) => i64::try_from(*n).unwrap_or(i64::MAX),
            Self::NeverExpires => -1,
            Self::Absent => -2,
        }
    }

    /// Seconds left, if the key exists and expires.
    pub fn seconds(&self) -> Option<u64> {
        match self {
            Self::Seconds(n) => Some(*n),
            _ => None,
        }
    }
}

/// Byte-oriented key/value store with expiry.
pub trait Storage: Send + Sync + fmt::Debug {
    /// Reads a key.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Writes a key, replacing any previous value. `None` means no expiry.
    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StorageError>;

    /// Writes a key only if it does not exist. Returns `true` if written.
    fn set_if_absent(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<bool, StorageError>;

    /// Deletes a key. Returns `true` if it existed.
    fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Deletes every key matching a Redis glob pattern. Returns the count.
    fn delete_pattern(&self, pattern: &str) -> Result<u64, StorageError>;

    /// Sets the expiry of an existing key. Returns `false` if absent.
    fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StorageError>;

    /// Reports the remaining lifetime of a key.
    fn remaining_ttl(&self, key: &str) -> Result<RemainingTtl, StorageError>;
}

/// One element of a parsed glob pattern.
#[derive(Debug, PartialEq)]
enum Glob {
    Star,
    Any,
    Class { negate: bool, ranges: Vec<(char, char)> },
    Literal(char),
}

impl Glob {
    fn matches(&self, c: char) -> bool {
        match self {
            Self::Star | Self::Any => true,
            Self::Class { negate, ranges } => ranges.iter().any(|&(lo, hi)| (lo..=hi).contains(&c)) != *negate,
            Self::Literal(l) => *l == c,
        }
    }
}

fn parse_glob(pattern: &str) -> Vec<Glob> {
    let p: Vec<char> = pattern.chars().collect();
    let mut out = Vec::with_capacity(p.len());
    let mut i = 0;
    while i < p.len() {
        match p[i] {
            '*' => {
                if out.last() != Some(&Glob::Star) {
                    out.push(Glob::Star);
                }
                i += 1;
            }
            '?' => {
                out.push(Glob::Any);
                i += 1;
            }
            '[' => match p[i + 1..].iter().position(|&c| c == ']') {
                Some(len) => {
                    let mut class = &p[i + 1..i + 1 + len];
                    let negate = class.first() == Some(&'^');
                    if negate {
                        class = &class[1..];
                    }
                    let mut ranges = Vec::new();
                    let mut j = 0;
                    while j < class.len() {
                        if j + 2 < class.len() && class[j + 1] == '-' {
                            ranges.push((class[j], class[j + 2]));
                            j += 3;
                        } else {
                            ranges.push((class[j], class[j]));
                            j += 1;
                        }
                    }
                    out.push(Glob::Class { negate, ranges });
                    i += len + 2;
                }
                None => {
                    out.push(Glob::Literal('['));
                    i += 1;
                }
            },
            '\\' if i + 1 < p.len() => {
                out.push(Glob::Literal(p[i + 1]));
                i += 2;
            }
            c => {
                out.push(Glob::Literal(c));
                i += 1;
            }
        }
    }
    out
}

/// Redis-style glob match supporting `*`, `?`, `[...]` and `\` escapes.
///
/// Runs in `O(pattern * text)`: only the most recent `*` is ever resumed.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let globs = parse_glob(pattern);
    let text: Vec<char> = text.chars().collect();
    let (mut g, mut t) = (0, 0);
    // Glob index after the last star, and the text index it resumes from.
    let mut resume: Option<(usize, usize)> = None;

    while t < text.len() {
        match globs.get(g) {
            Some(Glob::Star) => {
                g += 1;
                resume = Some((g, t));
            }
            Some(glob) if glob.matches(text[t]) => {
                g += 1;
                t += 1;
            }
            _ => match resume {
                Some((after_star, from)) => {
                    g = after_star;
                    t = from + 1;
                    resume = Some((after_star, from + 1));
                }
                None => return false,
            },
        }
    }
    globs[g..].iter().all(|glob| *glob == Glob::Star)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_ttl_reply_codes() {
        assert_eq!(RemainingTtl::from_reply(-1), RemainingTtl::NeverExpires);
        assert_eq!(RemainingTtl::from_reply(-2), RemainingTtl::Absent);
        assert_eq!(RemainingTtl::from_reply(42), RemainingTtl::Seconds(42));
        assert_eq!(RemainingTtl::Absent.as_reply(), -2);
        assert_eq!(RemainingTtl::Seconds(3).seconds(), Some(3));
    }

    #[test]
    fn test_glob() {
        assert!(glob_match("cache:users::*", "cache:users::42"));
        assert!(!glob_match("cache:users::*", "cache:orders::42"));
        assert!(glob_match("a?c", "abc"));
        assert!(!glob_match("a?c", "ac"));
        assert!(glob_match("k[0-9]", "k7"));
        assert!(!glob_match("k[^0-9]", "k7"));
        assert!(glob_match("a\\*", "a*"));
        assert!(!glob_match("a\\*", "ab"));
        assert!(glob_match("*", ""));
        assert!(glob_match("a*b*c", "aXXbYYc"));
        assert!(!glob_match("a*b", "a"));
        assert!(glob_match("*?", "x"));
        assert!(!glob_match("*?", ""));
        assert!(glob_match("k[", "k["));
        assert!(!glob_match("k[]", "k"));
        assert!(glob_match("a**b", "ab"));
    }

    #[test]
    fn test_glob_backtracking_is_linear() {
        let text = "a".repeat(40);
        let pattern = format!("{}b", "*a".repeat(12));
        let started = std::time::Instant::now();
        assert!(!glob_match(&pattern, &text));
        assert!(glob_match(&format!("{}a", "*a".repeat(12)), &text));
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }
}
