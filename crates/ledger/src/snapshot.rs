//! Ledger persistence
//!
//! A snapshot is the full ledger state in bincode form. Restoring one
//! re-checks the round against the ledger limits and re-checks
//! conservation: per-candidate counts sum to the total, and the total
//! equals the number of consumed nullifiers.

use std::collections::HashSet;

use crypto::Principal;
use serde::{Deserialize, Serialize};
use zk::Nullifier;

use crate::ledger::LedgerState;
use crate::state::{LedgerConfig, NullifierSet, RelayerRegistry, RoundConfig, Tally};
use crate::LedgerError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub admin: Principal,
    pub config: Option<RoundConfig>,
    pub paused: bool,
    pub tally: Vec<u64>,
    pub total_votes: u64,
    /// Sorted
    pub nullifiers: Vec<Nullifier>,
    /// Sorted
    pub relayers: Vec<Principal>,
}

impl LedgerSnapshot {
    pub(crate) fn capture(admin: Principal, state: &LedgerState) -> Self {
        Self {
            admin,
            config: state.config,
            paused: state.paused,
            tally: state.tally.counts().to_vec(),
            total_votes: state.tally.total(),
            nullifiers: state.nullifiers.to_sorted_vec(),
            relayers: state.relayers.to_sorted_vec(),
        }
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }

    /// Check internal consistency and that the round fits `limits`
    pub fn validate(&self, limits: &LedgerConfig) -> Result<(), LedgerError> {
        let corrupt = |msg: String| Err(LedgerError::CorruptSnapshot(msg));

        match &self.config {
            Some(config) => {
                if let Err(e) = config.validate_shape(limits) {
                    return corrupt(format!("invalid round: {}", e));
                }
                if self.tally.len() != config.candidate_count as usize {
                    return corrupt(format!(
                        "tally has {} entries for {} candidates",
                        self.tally.len(),
                        config.candidate_count
                    ));
                }
            }
            None => {
                if !self.tally.is_empty() || !self.nullifiers.is_empty() || self.total_votes != 0 {
                    return corrupt("votes recorded without a round".to_string());
                }
            }
        }

        let sum = self
            .tally
            .iter()
            .try_fold(0u64, |acc, c| acc.checked_add(*c));
        if sum != Some(self.total_votes) {
            return corrupt(format!(
                "tally sum {:?} does not match total {}",
                sum, self.total_votes
            ));
        }

        if self.nullifiers.len() as u64 != self.total_votes {
            return corrupt(format!(
                "{} nullifiers for {} votes",
                self.nullifiers.len(),
                self.total_votes
            ));
        }

        let unique: HashSet<_> = self.nullifiers.iter().collect();
        if unique.len() != self.nullifiers.len() {
            return corrupt("duplicate nullifier".to_string());
        }

        let unique: HashSet<_> = self.relayers.iter().collect();
        if unique.len() != self.relayers.len() {
            return corrupt("duplicate relayer".to_string());
        }

        Ok(())
    }

    pub(crate) fn into_state(self, limits: &LedgerConfig) -> Result<LedgerState, LedgerError> {
        self.validate(limits)?;

        let mut nullifiers = NullifierSet::new();
        for n in self.nullifiers {
            nullifiers.insert(n);
        }
        let mut relayers = RelayerRegistry::new();
        for r in self.relayers {
            relayers.insert(r);
        }

        Ok(LedgerState {
            config: self.config,
            paused: self.paused,
            tally: Tally::from_parts(self.tally, self.total_votes),
            nullifiers,
            relayers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zk::FieldElement;

    fn snapshot() -> LedgerSnapshot {
        LedgerSnapshot {
            admin: Principal::from_bytes([1u8; 32]),
            config: Some(RoundConfig::new(FieldElement::from_u64(9), 100, 200, 2)),
            paused: false,
            tally: vec![2, 1],
            total_votes: 3,
            nullifiers: vec![Nullifier::from(1), Nullifier::from(2), Nullifier::from(3)],
            relayers: vec![Principal::from_bytes([2u8; 32])],
        }
    }

    #[test]
    fn test_consistent_snapshot() {
        let snap = snapshot();
        assert!(snap.validate(&LedgerConfig::default()).is_ok());

        let bytes = snap.to_bytes().unwrap();
        assert_eq!(LedgerSnapshot::from_bytes(&bytes).unwrap(), snap);
    }

    #[test]
    fn test_tally_sum_mismatch() {
        let mut snap = snapshot();
        snap.tally = vec![2, 2];
        assert!(matches!(snap.validate(&LedgerConfig::default()), Err(LedgerError::CorruptSnapshot(_))));
    }

    #[test]
    fn test_nullifier_count_mismatch() {
        let mut snap = snapshot();
        snap.nullifiers.pop();
        assert!(matches!(snap.validate(&LedgerConfig::default()), Err(LedgerError::CorruptSnapshot(_))));
    }

    #[test]
    fn test_duplicate_nullifier() {
        let mut snap = snapshot();
        snap.nullifiers[2] = Nullifier::from(1);
        assert!(matches!(snap.validate(&LedgerConfig::default()), Err(LedgerError::CorruptSnapshot(_))));
    }

    #[test]
    fn test_tally_length_must_match_round() {
        let mut snap = snapshot();
        snap.tally = vec![3];
        assert!(matches!(snap.validate(&LedgerConfig::default()), Err(LedgerError::CorruptSnapshot(_))));
    }

    #[test]
    fn test_votes_without_round() {
        let mut snap = snapshot();
        snap.config = None;
        assert!(matches!(snap.validate(&LedgerConfig::default()), Err(LedgerError::CorruptSnapshot(_))));
    }

    fn empty_round(config: RoundConfig) -> LedgerSnapshot {
        LedgerSnapshot {
            config: Some(config),
            tally: vec![0; config.candidate_count as usize],
            total_votes: 0,
            nullifiers: Vec::new(),
            ..snapshot()
        }
    }

    fn assert_corrupt(snap: &LedgerSnapshot, limits: &LedgerConfig) {
        assert!(matches!(snap.validate(limits), Err(LedgerError::CorruptSnapshot(_))));
        assert!(matches!(
            snap.clone().into_state(limits),
            Err(LedgerError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn test_inverted_window_rejected() {
        let limits = LedgerConfig::default();
        let snap = empty_round(RoundConfig::new(FieldElement::from_u64(9), 200, 100, 2));
        assert_corrupt(&snap, &limits);

        let snap = empty_round(RoundConfig::new(FieldElement::from_u64(9), 100, 100, 2));
        assert_corrupt(&snap, &limits);
    }

    #[test]
    fn test_zero_candidates_rejected() {
        let snap = empty_round(RoundConfig::new(FieldElement::from_u64(9), 100, 200, 0));
        assert!(snap.tally.is_empty());
        assert_corrupt(&snap, &LedgerConfig::default());
    }

    #[test]
    fn test_zero_depth_rejected() {
        let config = RoundConfig::new(FieldElement::from_u64(9), 100, 200, 2).with_tree_depth(0);
        assert_corrupt(&empty_round(config), &LedgerConfig::default());
    }

    #[test]
    fn test_limits_applied() {
        let snap = snapshot();
        let strict = LedgerConfig {
            max_candidates: 1,
            ..LedgerConfig::default()
        };
        assert_corrupt(&snap, &strict);

        let exact = LedgerConfig {
            max_candidates: 2,
            ..LedgerConfig::default()
        };
        assert!(snap.validate(&exact).is_ok());
    }

    #[test]
    fn test_into_state() {
        let state = snapshot().into_state(&LedgerConfig::default()).unwrap();
        assert_eq!(state.tally.total(), 3);
        assert!(state.nullifiers.contains(&Nullifier::from(2)));
        assert_eq!(state.relayers.len(), 1);
    }
}
