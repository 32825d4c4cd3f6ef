//! Ledger State Types
//!
//! The ledger holds four entities:
//!
//! ```text
//! RoundConfig      set once by the administrator, never mutated
//! Tally            per-candidate counts + total, only ever incremented
//! NullifierSet     consumed nullifiers, only ever inserted
//! RelayerRegistry  principals allowed to submit votes
//! ```
//!
//! ## Round Phases
//!
//! Phases are not stored; they are a pure function of the clock:
//!
//! ```text
//! now < start_time               Pending
//! start_time <= now < end_time   Open
//! end_time <= now                Closed
//! ```

use std::collections::HashSet;

use crypto::Principal;
use serde::{Deserialize, Serialize};
use zk::{FieldElement, Nullifier};

use crate::LedgerError;

/// Default Merkle depth of the commitment group
pub const DEFAULT_TREE_DEPTH: u8 = 20;

/// Default limit on candidates per round
pub const DEFAULT_MAX_CANDIDATES: u32 = 1024;

/// Ledger-wide limits
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Smallest commitment-group depth a round may declare
    pub min_tree_depth: u8,
    /// Largest commitment-group depth a round may declare
    pub max_tree_depth: u8,
    /// Upper bound on `candidate_count`; the tally is allocated up front
    pub max_candidates: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            min_tree_depth: 16,
            max_tree_depth: 32,
            max_candidates: DEFAULT_MAX_CANDIDATES,
        }
    }
}

/// Parameters of the single voting round
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundConfig {
    /// Commitment group the voters belong to; doubles as the round's
    /// external nullifier
    pub group_id: FieldElement,
    /// Voting opens at this unix timestamp (inclusive)
    pub start_time: u64,
    /// Voting closes at this unix timestamp (exclusive)
    pub end_time: u64,
    pub candidate_count: u32,
    /// Merkle depth of the commitment group, forwarded to the verifier
    pub tree_depth: u8,
}

impl RoundConfig {
    pub fn new(group_id: FieldElement, start_time: u64, end_time: u64, candidate_count: u32) -> Self {
        Self {
            group_id,
            start_time,
            end_time,
            candidate_count,
            tree_depth: DEFAULT_TREE_DEPTH,
        }
    }

    pub fn with_tree_depth(mut self, tree_depth: u8) -> Self {
        self.tree_depth = tree_depth;
        self
    }

    /// External nullifier every ballot of this round must carry
    pub fn external_nullifier(&self) -> FieldElement {
        self.group_id
    }

    /// Check the configuration against the clock and ledger limits
    pub fn validate(&self, now: u64, limits: &LedgerConfig) -> Result<(), LedgerError> {
        self.validate_shape(limits)?;
        if self.start_time <= now {
            return Err(LedgerError::StartNotInFuture {
                start: self.start_time,
                now,
            });
        }
        Ok(())
    }

    /// Checks that hold for the lifetime of the round, independent of time
    pub fn validate_shape(&self, limits: &LedgerConfig) -> Result<(), LedgerError> {
        if self.candidate_count == 0 {
            return Err(LedgerError::ZeroCandidates);
        }
        if self.candidate_count > limits.max_candidates {
            return Err(LedgerError::TooManyCandidates {
                count: self.candidate_count,
                max: limits.max_candidates,
            });
        }
        if self.start_time >= self.end_time {
            return Err(LedgerError::InvalidTimeRange {
                start: self.start_time,
                end: self.end_time,
            });
        }
        if self.tree_depth < limits.min_tree_depth || self.tree_depth > limits.max_tree_depth {
            return Err(LedgerError::InvalidTreeDepth {
                depth: self.tree_depth,
                min: limits.min_tree_depth,
                max: limits.max_tree_depth,
            });
        }
        Ok(())
    }

    pub fn phase_at(&self, now: u64) -> RoundPhase {
        if now < self.start_time {
            RoundPhase::Pending
        } else if now < self.end_time {
            RoundPhase::Open
        } else {
            RoundPhase::Closed
        }
    }

    pub fn duration_secs(&self) -> u64 {
        self.end_time.saturating_sub(self.start_time)
    }
}

/// Time-derived phase of the ledger
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundPhase {
    /// No round configured yet; the ledger is inert
    Uninitialized,
    /// Configured, voting not started
    Pending,
    /// Voting window is open
    Open,
    /// Voting window has ended
    Closed,
}

impl std::fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RoundPhase::Uninitialized => "uninitialized",
            RoundPhase::Pending => "pending",
            RoundPhase::Open => "open",
            RoundPhase::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Per-candidate vote counts
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    counts: Vec<u64>,
    total: u64,
}

impl Tally {
    pub fn new(candidate_count: u32) -> Self {
        Self {
            counts: vec![0; candidate_count as usize],
            total: 0,
        }
    }

    pub(crate) fn from_parts(counts: Vec<u64>, total: u64) -> Self {
        Self { counts, total }
    }

    pub fn get(&self, candidate: u32) -> Option<u64> {
        self.counts.get(candidate as usize).copied()
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Sum of the per-candidate counts, `None` on overflow
    pub fn sum(&self) -> Option<u64> {
        self.counts.iter().try_fold(0u64, |acc, c| acc.checked_add(*c))
    }

    /// Counts after one more vote for `candidate`, without applying them
    pub(crate) fn incremented(&self, candidate: u32) -> Result<(u64, u64), LedgerError> {
        let current = self
            .get(candidate)
            .ok_or(LedgerError::CandidateOutOfRange {
                candidate,
                count: self.counts.len() as u32,
            })?;
        let count = current.checked_add(1).ok_or(LedgerError::TallyOverflow)?;
        let total = self.total.checked_add(1).ok_or(LedgerError::TallyOverflow)?;
        Ok((count, total))
    }

    pub(crate) fn apply(&mut self, candidate: u32, count: u64, total: u64) {
        self.counts[candidate as usize] = count;
        self.total = total;
    }
}

/// Set of consumed nullifiers
#[derive(Clone, Debug, Default)]
pub struct NullifierSet {
    nullifiers: HashSet<Nullifier>,
}

impl NullifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a nullifier has been consumed
    pub fn contains(&self, nullifier: &Nullifier) -> bool {
        self.nullifiers.contains(nullifier)
    }

    /// Consume a nullifier.
    /// Returns false if it was already consumed (double vote).
    pub fn insert(&mut self, nullifier: Nullifier) -> bool {
        self.nullifiers.insert(nullifier)
    }

    pub fn len(&self) -> usize {
        self.nullifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nullifiers.is_empty()
    }

    /// Sorted copy of the set
    pub fn to_sorted_vec(&self) -> Vec<Nullifier> {
        let mut out: Vec<_> = self.nullifiers.iter().copied().collect();
        out.sort();
        out
    }
}

/// Principals authorized to submit votes
#[derive(Clone, Debug, Default)]
pub struct RelayerRegistry {
    relayers: HashSet<Principal>,
}

impl RelayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, relayer: &Principal) -> bool {
        self.relayers.contains(relayer)
    }

    /// Returns false if already registered
    pub fn insert(&mut self, relayer: Principal) -> bool {
        self.relayers.insert(relayer)
    }

    /// Returns false if not registered
    pub fn remove(&mut self, relayer: &Principal) -> bool {
        self.relayers.remove(relayer)
    }

    pub fn len(&self) -> usize {
        self.relayers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relayers.is_empty()
    }

    /// Members in an order with no relation to registration time
    pub fn to_sorted_vec(&self) -> Vec<Principal> {
        let mut out: Vec<_> = self.relayers.iter().copied().collect();
        out.sort();
        out
    }
}

/// Public audit record of one accepted vote
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub candidate_id: u32,
    pub nullifier: Nullifier,
    pub relayer: Principal,
    /// Ledger time at which the vote was committed
    pub timestamp: u64,
}
