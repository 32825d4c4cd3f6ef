//! Nullifiers for double-vote prevention
//!
//! A nullifier is derived off-chain from the voter's anonymous identity
//! and the round's external nullifier:
//! N = H(identity_secret, external_nullifier)
//!
//! Properties:
//! - One identity yields exactly one nullifier per round
//! - Nullifiers reveal nothing about the identity
//! - The same identity yields unrelated nullifiers across rounds

use crate::field::FieldElement;
use serde::{Deserialize, Serialize};

/// A consumed-once vote token
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Nullifier(pub [u8; 32]);

impl Nullifier {
    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation for logs
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[28..])
    }

    /// Parse from hex string; short values are left-padded
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        FieldElement::from_hex(s).map(Self::from)
    }

    pub fn to_field(&self) -> FieldElement {
        FieldElement(self.0)
    }
}

impl From<FieldElement> for Nullifier {
    fn from(fe: FieldElement) -> Self {
        Self(fe.0)
    }
}

impl From<u64> for Nullifier {
    fn from(value: u64) -> Self {
        Self(FieldElement::from_u64(value).0)
    }
}

impl std::fmt::Display for Nullifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}
