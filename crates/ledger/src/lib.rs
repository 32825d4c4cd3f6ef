//! Anonymous vote ledger
//!
//! Holds the round configuration, the tally, the set of consumed
//! nullifiers and the relayer registry, and decides whether each
//! submitted ballot is counted.
//!
//! ## Architecture
//!
//! ```text
//! ledger/
//!  ├─ state.rs     # RoundConfig, Tally, NullifierSet, RelayerRegistry
//!  ├─ clock.rs     # Clock, SystemClock, ManualClock
//!  ├─ ledger.rs    # VoteLedger, LedgerEvent
//!  └─ snapshot.rs  # LedgerSnapshot (persist / restore)
//! ```
//!
//! ## Acceptance rules
//!
//! A ballot is counted only if, at commit time, the round is configured
//! and open, the ledger is not paused, the caller is a registered
//! relayer, the candidate is in range and bound by the proof, the
//! nullifier is fresh, and the proof verifies. A counted ballot adds
//! exactly one to one candidate and to the total; anything else changes
//! nothing.

use crypto::Principal;
use zk::{FieldElement, Nullifier};

pub mod clock;
pub mod ledger;
pub mod snapshot;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ledger::{LedgerEvent, VoteLedger};
pub use snapshot::LedgerSnapshot;
pub use state::{
    LedgerConfig, NullifierSet, RelayerRegistry, RoundConfig, RoundPhase, Tally, VoteRecord,
    DEFAULT_MAX_CANDIDATES, DEFAULT_TREE_DEPTH,
};

/// Errors returned by the ledger
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    // Configuration
    #[error("Round is not configured")]
    NotConfigured,

    #[error("Round is already configured")]
    AlreadyConfigured,

    #[error("Invalid time range: start {start} must be before end {end}")]
    InvalidTimeRange { start: u64, end: u64 },

    #[error("Start time {start} is not in the future (now {now})")]
    StartNotInFuture { start: u64, now: u64 },

    #[error("Round needs at least one candidate")]
    ZeroCandidates,

    #[error("{count} candidates exceeds the limit of {max}")]
    TooManyCandidates { count: u32, max: u32 },

    #[error("Tree depth {depth} outside supported range {min}..={max}")]
    InvalidTreeDepth { depth: u8, min: u8, max: u8 },

    #[error("Ledger is already paused")]
    AlreadyPaused,

    #[error("Ledger is not paused")]
    NotPaused,

    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    // Temporal
    #[error("Voting has not started (starts at {starts_at}, now {now})")]
    NotStarted { starts_at: u64, now: u64 },

    #[error("Voting closed at {ended_at}")]
    Closed { ended_at: u64 },

    #[error("Voting is paused")]
    Paused,

    // Authorization
    #[error("{0} is not the administrator")]
    NotAdmin(Principal),

    #[error("{0} is not a registered relayer")]
    NotRelayer(Principal),

    #[error("Invalid relayer signature")]
    InvalidSignature,

    #[error("Relayer {0} is already registered")]
    RelayerAlreadyRegistered(Principal),

    #[error("Relayer {0} is not registered")]
    RelayerNotRegistered(Principal),

    // Validation
    #[error("Candidate {candidate} out of range (round has {count})")]
    CandidateOutOfRange { candidate: u32, count: u32 },

    #[error("Proof signal {signal} does not bind candidate {candidate}")]
    SignalMismatch { candidate: u32, signal: FieldElement },

    #[error("Ballot nullifier differs from the proof's nullifier")]
    NullifierMismatch,

    #[error("Proof was generated for a different round")]
    ExternalNullifierMismatch,

    #[error("Invalid proof")]
    InvalidProof,

    #[error("Proof verification did not complete")]
    VerificationAborted,

    #[error("Tally overflow")]
    TallyOverflow,

    // Double vote
    #[error("Nullifier {0} already used")]
    NullifierAlreadyUsed(Nullifier),
}

/// Coarse grouping of ledger errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Configuration,
    Temporal,
    Authorization,
    Validation,
    DoubleVote,
}

impl LedgerError {
    pub fn class(&self) -> ErrorClass {
        use LedgerError::*;
        match self {
            NotConfigured | AlreadyConfigured | InvalidTimeRange { .. }
            | StartNotInFuture { .. } | ZeroCandidates | TooManyCandidates { .. }
            | InvalidTreeDepth { .. } | AlreadyPaused | NotPaused | CorruptSnapshot(_) => {
                ErrorClass::Configuration
            }
            NotStarted { .. } | Closed { .. } | Paused => ErrorClass::Temporal,
            NotAdmin(_) | NotRelayer(_) | InvalidSignature | RelayerAlreadyRegistered(_)
            | RelayerNotRegistered(_) => ErrorClass::Authorization,
            CandidateOutOfRange { .. } | SignalMismatch { .. } | NullifierMismatch
            | ExternalNullifierMismatch | InvalidProof | VerificationAborted | TallyOverflow => {
                ErrorClass::Validation
            }
            NullifierAlreadyUsed(_) => ErrorClass::DoubleVote,
        }
    }

    /// Whether resubmitting the same ballot later could succeed.
    ///
    /// `Closed` is temporal but final; only a pending or paused round can
    /// still accept the ballot.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::NotStarted { .. } | LedgerError::Paused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(LedgerError::Paused.class(), ErrorClass::Temporal);
        assert_eq!(
            LedgerError::NullifierAlreadyUsed(Nullifier::from(1)).class(),
            ErrorClass::DoubleVote
        );
        assert_eq!(LedgerError::InvalidProof.class(), ErrorClass::Validation);
        assert_eq!(LedgerError::ZeroCandidates.class(), ErrorClass::Configuration);
        assert_eq!(
            LedgerError::TooManyCandidates { count: 5, max: 4 }.class(),
            ErrorClass::Configuration
        );
    }

    #[test]
    fn test_retryable() {
        assert!(LedgerError::Paused.is_retryable());
        assert!(LedgerError::NotStarted { starts_at: 2, now: 1 }.is_retryable());
        assert!(!LedgerError::Closed { ended_at: 1 }.is_retryable());
        assert!(!LedgerError::NullifierAlreadyUsed(Nullifier::from(1)).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = LedgerError::CandidateOutOfRange { candidate: 4, count: 3 };
        assert_eq!(err.to_string(), "Candidate 4 out of range (round has 3)");
    }
}
