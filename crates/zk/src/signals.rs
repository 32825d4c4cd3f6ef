//! Public signals of a vote proof.
//!
//! The ordering is fixed and shared by the circuit, the verifier and the
//! ledger's binding checks:
//!
//! ```text
//! index 0  candidate_signal    vote choice the proof attests to
//! index 1  nullifier           per-identity, per-round token
//! index 2  merkle_root         root of the commitment group
//! index 3  external_nullifier  round identifier
//! ```

use crate::field::FieldElement;
use crate::nullifier::Nullifier;
use serde::{Deserialize, Serialize};

pub const NUM_PUBLIC_SIGNALS: usize = 4;

pub const CANDIDATE_SIGNAL_INDEX: usize = 0;
pub const NULLIFIER_INDEX: usize = 1;
pub const MERKLE_ROOT_INDEX: usize = 2;
pub const EXTERNAL_NULLIFIER_INDEX: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicSignals {
    pub candidate_signal: FieldElement,
    pub nullifier: Nullifier,
    pub merkle_root: FieldElement,
    pub external_nullifier: FieldElement,
}

impl PublicSignals {
    pub fn new(
        candidate: u32,
        nullifier: Nullifier,
        merkle_root: FieldElement,
        external_nullifier: FieldElement,
    ) -> Self {
        Self {
            candidate_signal: FieldElement::from_u64(candidate as u64),
            nullifier,
            merkle_root,
            external_nullifier,
        }
    }

    /// Signals in verifier order
    pub fn to_array(&self) -> [FieldElement; NUM_PUBLIC_SIGNALS] {
        let mut out = [FieldElement::ZERO; NUM_PUBLIC_SIGNALS];
        out[CANDIDATE_SIGNAL_INDEX] = self.candidate_signal;
        out[NULLIFIER_INDEX] = self.nullifier.to_field();
        out[MERKLE_ROOT_INDEX] = self.merkle_root;
        out[EXTERNAL_NULLIFIER_INDEX] = self.external_nullifier;
        out
    }

    pub fn from_array(signals: [FieldElement; NUM_PUBLIC_SIGNALS]) -> Self {
        Self {
            candidate_signal: signals[CANDIDATE_SIGNAL_INDEX],
            nullifier: Nullifier::from(signals[NULLIFIER_INDEX]),
            merkle_root: signals[MERKLE_ROOT_INDEX],
            external_nullifier: signals[EXTERNAL_NULLIFIER_INDEX],
        }
    }

    /// Whether the proof's signal selects `candidate`
    pub fn binds_candidate(&self, candidate: u32) -> bool {
        self.candidate_signal == FieldElement::from_u64(candidate as u64)
    }
}
