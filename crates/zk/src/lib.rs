//! Zero-knowledge side of anonymous voting
//!
//! This crate holds everything the ledger needs to know about proofs,
//! without the ledger ever looking inside one:
//! - 256-bit field values and nullifiers
//! - The pinned public-signal layout
//! - The `ProofVerifier` oracle and its Groth16 implementation
//! - The commitment group interface used by clients
//! - A demo circuit used to exercise the verifier end to end
//!
//! ## Architecture
//!
//! ```text
//! zk/
//!  ├─ field.rs      # FieldElement (opaque 256-bit values)
//!  ├─ nullifier.rs  # Nullifier
//!  ├─ signals.rs    # PublicSignals, fixed ordering
//!  ├─ proof.rs      # VoteProof (a, b, c), demo setup + proving
//!  ├─ verifier.rs   # ProofVerifier, Groth16Verifier, mocks
//!  ├─ group.rs      # CommitmentGroup
//!  └─ circuit.rs    # DemoVoteCircuit (R1CS)
//! ```

pub mod circuit;
pub mod field;
pub mod group;
pub mod nullifier;
pub mod proof;
pub mod signals;
pub mod verifier;

pub use circuit::{DemoVoteCircuit, IdentitySecret};
pub use field::FieldElement;
pub use group::{CommitmentGroup, StaticGroup};
pub use nullifier::Nullifier;
pub use proof::{VoteKeys, VoteProof};
pub use signals::PublicSignals;
pub use verifier::{AcceptAll, Groth16Verifier, ProofVerifier, RejectAll};

#[derive(Debug, thiserror::Error)]
pub enum ZkError {
    #[error("Malformed proof encoding: {0}")]
    ProofEncoding(String),
}
