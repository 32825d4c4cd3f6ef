//! Groth16 vote proofs
//!
//! This module provides:
//! - `VoteProof`, the `(a, b, c)` proof points in compressed wire form
//! - Trusted setup for the demo vote circuit
//! - Proof generation for the demo vote circuit

use ark_bn254::{Bn254, G1Affine, G2Affine};
use ark_groth16::{
    prepare_verifying_key, Groth16, PreparedVerifyingKey, Proof, ProvingKey, VerifyingKey,
};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use ark_std::rand::{CryptoRng, Rng};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::circuit::{DemoVoteCircuit, IdentitySecret};
use crate::field::FieldElement;
use crate::signals::PublicSignals;
use crate::ZkError;

/// Groth16 proof points, each compressed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteProof {
    /// G1 point
    pub a: Vec<u8>,
    /// G2 point
    pub b: Vec<u8>,
    /// G1 point
    pub c: Vec<u8>,
}

impl VoteProof {
    pub fn from_ark(proof: &Proof<Bn254>) -> Result<Self, ZkError> {
        let mut a = Vec::new();
        let mut b = Vec::new();
        let mut c = Vec::new();
        proof
            .a
            .serialize_compressed(&mut a)
            .map_err(|e| ZkError::ProofEncoding(format!("a: {e}")))?;
        proof
            .b
            .serialize_compressed(&mut b)
            .map_err(|e| ZkError::ProofEncoding(format!("b: {e}")))?;
        proof
            .c
            .serialize_compressed(&mut c)
            .map_err(|e| ZkError::ProofEncoding(format!("c: {e}")))?;
        Ok(Self { a, b, c })
    }

    pub fn to_ark(&self) -> Result<Proof<Bn254>, ZkError> {
        let a = G1Affine::deserialize_compressed(self.a.as_slice())
            .map_err(|e| ZkError::ProofEncoding(format!("a: {e}")))?;
        let b = G2Affine::deserialize_compressed(self.b.as_slice())
            .map_err(|e| ZkError::ProofEncoding(format!("b: {e}")))?;
        let c = G1Affine::deserialize_compressed(self.c.as_slice())
            .map_err(|e| ZkError::ProofEncoding(format!("c: {e}")))?;
        Ok(Proof { a, b, c })
    }

    /// A syntactically well-formed but meaningless proof, for tests and mocks
    pub fn dummy() -> Self {
        Self {
            a: vec![0u8; 32],
            b: vec![0u8; 64],
            c: vec![0u8; 32],
        }
    }
}

/// Proving and verifying keys for the demo vote circuit
pub struct VoteKeys {
    pub proving_key: ProvingKey<Bn254>,
    pub verifying_key: VerifyingKey<Bn254>,
    pub prepared_vk: PreparedVerifyingKey<Bn254>,
}

impl VoteKeys {
    /// Generate keys for the demo circuit (trusted setup)
    pub fn setup<R: Rng + CryptoRng>(rng: &mut R) -> Result<Self> {
        let circuit = DemoVoteCircuit::empty();

        let (proving_key, verifying_key) = Groth16::<Bn254>::circuit_specific_setup(circuit, rng)
            .map_err(|e| anyhow::anyhow!("setup failed: {:?}", e))?;

        let prepared_vk = prepare_verifying_key(&verifying_key);

        Ok(Self {
            proving_key,
            verifying_key,
            prepared_vk,
        })
    }

    /// Serialize verifying key to bytes
    pub fn verifying_key_to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.verifying_key
            .serialize_compressed(&mut bytes)
            .context("failed to serialize verifying key")?;
        Ok(bytes)
    }

    /// Deserialize verifying key from bytes
    pub fn verifying_key_from_bytes(bytes: &[u8]) -> Result<VerifyingKey<Bn254>> {
        VerifyingKey::deserialize_compressed(bytes).context("failed to deserialize verifying key")
    }

    /// Prove a vote for `candidate` in the round `external_nullifier`
    pub fn prove<R: Rng + CryptoRng>(
        &self,
        secret: &IdentitySecret,
        candidate: u32,
        external_nullifier: &FieldElement,
        rng: &mut R,
    ) -> Result<(VoteProof, PublicSignals)> {
        let external = external_nullifier
            .to_fr()
            .ok_or_else(|| anyhow::anyhow!("external nullifier is not a field element"))?;

        let (circuit, signals) = DemoVoteCircuit::new(secret, candidate, external);

        let proof = Groth16::<Bn254>::prove(&self.proving_key, circuit, rng)
            .map_err(|e| anyhow::anyhow!("proof generation failed: {:?}", e))?;

        Ok((VoteProof::from_ark(&proof)?, signals))
    }
}
