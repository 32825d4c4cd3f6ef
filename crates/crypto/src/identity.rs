//! Principal identities for ledger callers.
//!
//! Administrators and relayers are identified by a `Principal`, the
//! SHA256 digest of their Ed25519 verifying key. A relayer proves it is
//! the caller of a vote submission by signing the ballot digest.
//!
//! Principal = SHA256("zkvote-principal-v1" || ed25519_pubkey)

use anyhow::{Context, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Identifier of an administrator or relayer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Principal([u8; 32]);

impl Principal {
    /// Derive a principal from an Ed25519 public key
    pub fn from_ed25519_pubkey(pubkey: &VerifyingKey) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"zkvote-principal-v1");
        hasher.update(pubkey.as_bytes());
        Principal(hasher.finalize().into())
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Principal(bytes)
    }

    /// Encode as hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 chars)
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Decode from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).context("invalid hex")?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("principal must be 32 bytes"))?;
        Ok(Principal(arr))
    }

    /// Encode as base58 string
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    /// Decode from base58 string
    pub fn from_base58(s: &str) -> Result<Self> {
        let bytes = bs58::decode(s).into_vec().context("invalid base58")?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("principal must be 32 bytes"))?;
        Ok(Principal(arr))
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

/// Signing identity of an administrator or relayer
#[derive(Clone)]
pub struct Identity {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    principal: Principal,
}

impl Identity {
    /// Generate a new random identity
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    /// Derive identity from a 32-byte seed
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let verifying_key = signing_key.verifying_key();
        let principal = Principal::from_ed25519_pubkey(&verifying_key);

        Identity {
            signing_key,
            verifying_key,
            principal,
        }
    }

    pub fn principal(&self) -> Principal {
        self.principal
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Sign a message with Ed25519
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("principal", &self.principal)
            .finish_non_exhaustive()
    }
}

/// Verify an Ed25519 signature
pub fn verify_signature(
    public_key: &VerifyingKey,
    message: &[u8],
    signature: &Signature,
) -> Result<()> {
    public_key
        .verify(message, signature)
        .context("signature verification failed")
}
