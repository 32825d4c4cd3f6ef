//! 256-bit public values exchanged with the proof system.
//!
//! Group ids, Merkle roots, external nullifiers and signals are carried
//! as opaque 32-byte big-endian integers. They only become BN254 scalars
//! at the verifier boundary, where values at or above the field modulus
//! are refused instead of being silently reduced.

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use serde::{Deserialize, Serialize};

/// An opaque 256-bit value, big-endian
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldElement(pub [u8; 32]);

impl FieldElement {
    pub const ZERO: FieldElement = FieldElement([0u8; 32]);

    pub fn from_u64(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }

    /// The value as a `u64`, if it fits
    pub fn to_u64(&self) -> Option<u64> {
        if self.0[..24].iter().any(|b| *b != 0) {
            return None;
        }
        let mut low = [0u8; 8];
        low.copy_from_slice(&self.0[24..]);
        Some(u64::from_be_bytes(low))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Canonical BN254 scalar for this value, `None` if it is not reduced
    pub fn to_fr(&self) -> Option<Fr> {
        let fr = Fr::from_be_bytes_mod_order(&self.0);
        let canonical = fr.into_bigint().to_bytes_be();
        (canonical.as_slice() == self.0.as_slice()).then_some(fr)
    }

    pub fn from_fr(fr: &Fr) -> Self {
        let bytes = fr.into_bigint().to_bytes_be();
        let mut out = [0u8; 32];
        out[32 - bytes.len()..].copy_from_slice(&bytes);
        Self(out)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex, accepting an optional `0x` prefix and short input
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        if s.is_empty() {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let padded = if s.len() % 2 == 1 { format!("0{s}") } else { s.to_string() };
        let bytes = hex::decode(padded)?;
        if bytes.len() > 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut out = [0u8; 32];
        out[32 - bytes.len()..].copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl From<u64> for FieldElement {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl std::fmt::Display for FieldElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u64_encoding_is_big_endian() {
        let fe = FieldElement::from_u64(0x0102);
        assert_eq!(fe.0[30], 0x01);
        assert_eq!(fe.0[31], 0x02);
        assert_eq!(fe.to_u64(), Some(0x0102));
    }

    #[test]
    fn test_wide_value_has_no_u64() {
        let mut bytes = [0u8; 32];
        bytes[0] = 1;
        assert_eq!(FieldElement(bytes).to_u64(), None);
    }

    #[test]
    fn test_fr_conversion() {
        let fe = FieldElement::from_u64(12345);
        let fr = fe.to_fr().unwrap();
        assert_eq!(fr, Fr::from(12345u64));
        assert_eq!(FieldElement::from_fr(&fr), fe);
    }

    #[test]
    fn test_non_canonical_value_rejected() {
        // 2^256 - 1 is far above the BN254 scalar modulus
        let fe = FieldElement([0xff; 32]);
        assert!(fe.to_fr().is_none());
    }

    #[test]
    fn test_hex_parsing() {
        let fe = FieldElement::from_hex("0xAA").unwrap();
        assert_eq!(fe, FieldElement::from_u64(0xaa));
        assert_eq!(FieldElement::from_hex(&fe.to_hex()).unwrap(), fe);
        assert!(FieldElement::from_hex(&"ff".repeat(33)).is_err());
    }

    #[test]
    fn test_empty_hex_rejected() {
        assert_eq!(FieldElement::from_hex(""), Err(hex::FromHexError::InvalidStringLength));
        assert_eq!(FieldElement::from_hex("0x"), Err(hex::FromHexError::InvalidStringLength));
        assert!(crate::nullifier::Nullifier::from_hex("").is_err());
    }
}
