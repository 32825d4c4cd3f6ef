//! Ballot message types
//!
//! A `Ballot` is the anonymized payload a participant hands to a relayer.
//! The relayer wraps it in a `SignedBallot` so the ledger can tell which
//! registered relayer is submitting it. Nothing in either message links
//! the ballot to the participant.
//!
//! Messages use bincode serialization.

use crypto::{verify_signature, Identity, Principal};
use ed25519_dalek::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;
use sha2::{Digest, Sha256};
use zk::{Nullifier, PublicSignals, VoteProof};

/// Anonymized vote payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub candidate_id: u32,
    pub nullifier: Nullifier,
    pub proof: VoteProof,
    pub signals: PublicSignals,
}

impl Ballot {
    /// Domain-separated digest covering every field of the ballot
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"zkvote-ballot-v1");
        hasher.update(self.candidate_id.to_le_bytes());
        hasher.update(self.nullifier.as_bytes());
        for part in [&self.proof.a, &self.proof.b, &self.proof.c] {
            hasher.update((part.len() as u32).to_le_bytes());
            hasher.update(part);
        }
        for signal in self.signals.to_array() {
            hasher.update(signal.as_bytes());
        }
        hasher.finalize().into()
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

/// A ballot countersigned by the relayer submitting it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedBallot {
    pub ballot: Ballot,
    /// Relayer's Ed25519 public key
    pub relayer_pubkey: [u8; 32],
    /// Signature over `ballot.digest()`
    #[serde(with = "BigArray")]
    pub signature: [u8; 64],
}

impl SignedBallot {
    pub fn sign(identity: &Identity, ballot: Ballot) -> Self {
        let signature = identity.sign(&ballot.digest()).to_bytes();
        Self {
            ballot,
            relayer_pubkey: identity.verifying_key().to_bytes(),
            signature,
        }
    }

    /// Check the signature and return the signing relayer's principal
    pub fn verify(&self) -> anyhow::Result<Principal> {
        let pubkey = VerifyingKey::from_bytes(&self.relayer_pubkey)?;
        let signature = Signature::from_bytes(&self.signature);
        verify_signature(&pubkey, &self.ballot.digest(), &signature)?;
        Ok(Principal::from_ed25519_pubkey(&pubkey))
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}
