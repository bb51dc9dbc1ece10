//! TTL jitter and expiry arithmetic.
//!
//! Writing many keys with the same TTL makes them expire together, and the
//! reload spike that follows is a cache avalanche. [`TtlJitter`] spreads
//! expirations with a clipped Gaussian: most TTLs land near the base, none
//! land further than `variance × base` away.
//!
//! ```text
//! sample  z ~ N(0, 1), clipped to [-3, 3]
//! offset  = base × z × variance / 3
//! ttl     = clamp(base + offset, 1, 2 × base)
//! ```
//!
//! The same module owns the time arithmetic for cached values: expiry,
//! remaining TTL and the pre-refresh trigger.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};

/// Largest absolute normal sample before clipping.
const SIGMA_CLIP: f64 = 3.0;

/// Computes `base_ttl` perturbed by clipped Gaussian jitter using `rng`.
///
/// Returns `base_ttl` unchanged when `randomize` is false, `variance <= 0`
/// or `base_ttl <= 0`. Variance above 1 is treated as 1.
pub fn jittered_ttl<R: Rng + ?Sized>(rng: &mut R, base_ttl: i64, randomize: bool, variance: f64) -> i64 {
    if !randomize || variance.is_nan() || variance <= 0.0 || base_ttl <= 0 {
        return base_ttl;
    }
    let variance = variance.min(1.0);
    let z: f64 = StandardNormal.sample(rng);
    let scaled = z.clamp(-SIGMA_CLIP, SIGMA_CLIP) * variance / SIGMA_CLIP;
    let base = base_ttl as f64;
    let ttl = (base + base * scaled).round() as i64;
    ttl.clamp(1, base_ttl.saturating_mul(2))
}

/// Returns `true` once a value has used up `1 - threshold` of its TTL.
///
/// Always `false` for non-expiring values (`ttl_seconds <= 0`) and for a
/// threshold outside `(0, 1)`.
pub fn should_pre_refresh(created_at_ms: i64, ttl_seconds: i64, threshold: f64, now_ms: i64) -> bool {
    if ttl_seconds <= 0 || !(threshold > 0.0 && threshold < 1.0) {
        return false;
    }
    let elapsed = now_ms.saturating_sub(created_at_ms) as f64;
    let ratio = elapsed / (ttl_seconds as f64 * 1000.0);
    ratio >= 1.0 - threshold
}

/// Returns `true` once more than `ttl_seconds` have elapsed.
pub fn is_expired(created_at_ms: i64, ttl_seconds: i64, now_ms: i64) -> bool {
    ttl_seconds > 0 && now_ms.saturating_sub(created_at_ms) > ttl_seconds.saturating_mul(1000)
}

/// Remaining whole seconds, or `None` for a value that never expires.
pub fn remaining_ttl(created_at_ms: i64, ttl_seconds: i64, now_ms: i64) -> Option<i64> {
    if ttl_seconds <= 0 {
        return None;
    }
    let elapsed_secs = now_ms.saturating_sub(created_at_ms) / 1000;
    Some((ttl_seconds - elapsed_secs).max(0))
}

/// Shared TTL jitter source.
///
/// Uses the thread-local RNG by default. A seeded instance gives
/// reproducible TTLs for tests.
#[derive(Debug, Default)]
pub struct TtlJitter {
    seeded: Option<Mutex<StdRng>>,
}

impl TtlJitter {
    /// Jitter backed by the thread-local RNG.
    pub fn new() -> Self {
        Self::default()
    }

    /// Jitter backed by a deterministic RNG.
    pub fn seeded(seed: u64) -> Self {
        Self {
            seeded: Some(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    /// See [`jittered_ttl`].
    pub fn calculate_final_ttl(&self, base_ttl: i64, randomize: bool, variance: f64) -> i64 {
        match &self.seeded {
            Some(rng) => jittered_ttl(&mut *rng.lock(), base_ttl, randomize, variance),
            None => jittered_ttl(&mut rand::thread_rng(), base_ttl, randomize, variance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_stays_within_bounds() {
        let jitter = TtlJitter::seeded(7);
        for base in [1_i64, 2, 60, 3600] {
            for variance in [0.01, 0.3, 0.5, 1.0, 5.0] {
                for _ in 0..500 {
                    let ttl = jitter.calculate_final_ttl(base, true, variance);
                    assert!((1..=2 * base).contains(&ttl), "{ttl} out of range for {base}");
                }
            }
        }
    }

    #[test]
    fn test_zero_variance_is_identity() {
        let jitter = TtlJitter::new();
        assert_eq!(jitter.calculate_final_ttl(60, true, 0.0), 60);
        assert_eq!(jitter.calculate_final_ttl(60, false, 0.5), 60);
        assert_eq!(jitter.calculate_final_ttl(0, true, 0.5), 0);
        assert_eq!(jitter.calculate_final_ttl(-1, true, 0.5), -1);
    }

    #[test]
    fn test_jitter_actually_spreads() {
        let jitter = TtlJitter::seeded(42);
        let distinct: std::collections::HashSet<i64> =
            (0..200).map(|_| jitter.calculate_final_ttl(3600, true, 0.5)).collect();
        assert!(distinct.len() > 10);
    }

    #[test]
    fn test_should_pre_refresh_ratio() {
        // 60s TTL, threshold 0.2 → fires once 48s have elapsed.
        assert!(!should_pre_refresh(0, 60, 0.2, 47_999));
        assert!(should_pre_refresh(0, 60, 0.2, 48_000));
        assert!(!should_pre_refresh(0, 0, 0.2, 100_000));
        assert!(!should_pre_refresh(0, 60, 0.0, 59_000));
        assert!(!should_pre_refresh(0, 60, 1.0, 59_000));
    }

    #[test]
    fn test_expiry_arithmetic() {
        assert!(!is_expired(0, 60, 60_000));
        assert!(is_expired(0, 60, 60_001));
        assert!(!is_expired(0, -1, i64::MAX));
        assert_eq!(remaining_ttl(0, 60, 0), Some(60));
        assert_eq!(remaining_ttl(0, 60, 12_500), Some(48));
        assert_eq!(remaining_ttl(0, 60, 120_000), Some(0));
        assert_eq!(remaining_ttl(0, 0, 5), None);
    }
}
