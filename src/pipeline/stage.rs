//! Pipeline stages and the order they run in.

use crate::operation::OperationKind;

/// One step of the resilience chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Validates the key and builds its storage identity.
    KeyGen,
    /// Answers from storage when a usable entry exists.
    Read,
    /// Short-circuits keys the bloom filter has never seen.
    PenetrationCheck,
    /// Runs the loader, under the two-level lock when `sync` is set.
    BreakdownGuard,
    /// Persists the loaded value, or performs the eviction.
    Write,
    /// Ensures written values expire and caches confirmed nulls.
    AvalancheGuard,
}

/// What a stage decided.
#[derive(Debug, PartialEq, Eq)]
pub enum Flow<V> {
    /// Run the next stage.
    Continue,
    /// Stop with this result.
    Handled(Option<V>),
    /// Stop without loading; the caller sees `None`.
    Blocked,
}

const READ_CHAIN: &[Stage] = &[
    Stage::KeyGen,
    Stage::Read,
    Stage::PenetrationCheck,
    Stage::BreakdownGuard,
    Stage::Write,
    Stage::AvalancheGuard,
];

const PUT_CHAIN: &[Stage] = &[
    Stage::KeyGen,
    Stage::BreakdownGuard,
    Stage::Write,
    Stage::AvalancheGuard,
];

const EVICT_CHAIN: &[Stage] = &[Stage::KeyGen, Stage::Write];

impl Stage {
    /// Stages run for `kind`, in order.
    pub fn chain(kind: OperationKind) -> &'static [Stage] {
        match kind {
            OperationKind::Get | OperationKind::PutIfAbsent => READ_CHAIN,
            OperationKind::Put => PUT_CHAIN,
            OperationKind::Evict | OperationKind::Clear => EVICT_CHAIN,
        }
    }

    /// Stable name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::KeyGen => "key_gen",
            Self::Read => "read",
            Self::PenetrationCheck => "penetration_check",
            Self::BreakdownGuard => "breakdown_guard",
            Self::Write => "write",
            Self::AvalancheGuard => "avalanche_guard",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chains_keep_fixed_order() {
        let full = Stage::chain(OperationKind::Get);
        assert_eq!(full.len(), 6);
        assert_eq!(full, Stage::chain(OperationKind::PutIfAbsent));

        for kind in [OperationKind::Put, OperationKind::Evict, OperationKind::Clear] {
            let chain = Stage::chain(kind);
            let positions: Vec<usize> = chain
                .iter()
                .map(|s| full.iter().position(|f| f == s).unwrap())
                .collect();
            assert!(positions.windows(2).all(|w| w[0] < w[1]), "{kind:?}");
        }
        assert!(!Stage::chain(OperationKind::Put).contains(&Stage::Read));
    }
}
