//! Demo vote circuit (R1CS)
//!
//! A stand-in for the real membership circuit, small enough to run a full
//! Groth16 setup in tests and in the simulator. It exposes the same four
//! public inputs, in the same order, as the production circuit.
//!
//! Public inputs:
//! - candidate_signal
//! - nullifier
//! - merkle_root
//! - external_nullifier
//!
//! Private inputs (witness):
//! - identity_secret
//!
//! Constraints:
//! - merkle_root == identity_secret^2   (one-member "group")
//! - nullifier == identity_secret * external_nullifier
//! - candidate_signal is bound through a squaring constraint

use ark_bn254::Fr;
use ark_ff::UniformRand;
use ark_r1cs_std::{alloc::AllocVar, eq::EqGadget, fields::fp::FpVar};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use ark_std::rand::Rng;

use crate::field::FieldElement;
use crate::nullifier::Nullifier;
use crate::signals::PublicSignals;

/// Secret half of an anonymous voter identity
#[derive(Clone, Copy)]
pub struct IdentitySecret(Fr);

impl IdentitySecret {
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self(Fr::rand(rng))
    }

    pub fn from_u64(value: u64) -> Self {
        Self(Fr::from(value))
    }

    /// Commitment published to the group
    pub fn commitment(&self) -> FieldElement {
        FieldElement::from_fr(&(self.0 * self.0))
    }

    /// Nullifier for the round identified by `external_nullifier`
    pub fn nullifier(&self, external_nullifier: &FieldElement) -> Option<Nullifier> {
        let external = external_nullifier.to_fr()?;
        Some(Nullifier::from(FieldElement::from_fr(&(self.0 * external))))
    }

    pub(crate) fn scalar(&self) -> Fr {
        self.0
    }
}

#[derive(Clone)]
pub struct DemoVoteCircuit {
    pub candidate_signal: Option<Fr>,
    pub nullifier: Option<Fr>,
    pub merkle_root: Option<Fr>,
    pub external_nullifier: Option<Fr>,
    pub identity_secret: Option<Fr>,
}

impl DemoVoteCircuit {
    /// Create an empty circuit (for setup)
    pub fn empty() -> Self {
        Self {
            candidate_signal: None,
            nullifier: None,
            merkle_root: None,
            external_nullifier: None,
            identity_secret: None,
        }
    }

    /// Build an assigned circuit and the public signals it proves
    pub fn new(
        secret: &IdentitySecret,
        candidate: u32,
        external_nullifier: Fr,
    ) -> (Self, PublicSignals) {
        let s = secret.scalar();
        let candidate_signal = Fr::from(candidate as u64);
        let nullifier = s * external_nullifier;
        let merkle_root = s * s;

        let signals = PublicSignals::new(
            candidate,
            Nullifier::from(FieldElement::from_fr(&nullifier)),
            FieldElement::from_fr(&merkle_root),
            FieldElement::from_fr(&external_nullifier),
        );

        let circuit = Self {
            candidate_signal: Some(candidate_signal),
            nullifier: Some(nullifier),
            merkle_root: Some(merkle_root),
            external_nullifier: Some(external_nullifier),
            identity_secret: Some(s),
        };

        (circuit, signals)
    }
}

impl ConstraintSynthesizer<Fr> for DemoVoteCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        // Public inputs, allocated in signal order
        let signal_var = FpVar::new_input(cs.clone(), || {
            self.candidate_signal.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let nullifier_var = FpVar::new_input(cs.clone(), || {
            self.nullifier.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let root_var = FpVar::new_input(cs.clone(), || {
            self.merkle_root.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let external_var = FpVar::new_input(cs.clone(), || {
            self.external_nullifier.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let secret_var = FpVar::new_witness(cs.clone(), || {
            self.identity_secret.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let commitment = &secret_var * &secret_var;
        root_var.enforce_equal(&commitment)?;

        let expected_nullifier = &secret_var * &external_var;
        nullifier_var.enforce_equal(&expected_nullifier)?;

        // Without a constraint touching it the signal would be malleable
        let _signal_square = &signal_var * &signal_var;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_relations::r1cs::ConstraintSystem;

    #[test]
    fn test_demo_circuit_valid() {
        let secret = IdentitySecret::from_u64(99);
        let (circuit, signals) = DemoVoteCircuit::new(&secret, 1, Fr::from(42u64));

        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit.generate_constraints(cs.clone()).unwrap();

        assert!(cs.is_satisfied().unwrap());
        assert!(signals.binds_candidate(1));
        assert_eq!(
            Some(signals.nullifier),
            secret.nullifier(&FieldElement::from_u64(42))
        );
        assert_eq!(signals.merkle_root, secret.commitment());
    }

    #[test]
    fn test_demo_circuit_wrong_nullifier() {
        let secret = IdentitySecret::from_u64(99);
        let (mut circuit, _) = DemoVoteCircuit::new(&secret, 1, Fr::from(42u64));
        circuit.nullifier = Some(Fr::from(1u64));

        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit.generate_constraints(cs.clone()).unwrap();

        assert!(!cs.is_satisfied().unwrap());
    }

    #[test]
    fn test_nullifier_differs_across_rounds() {
        let secret = IdentitySecret::from_u64(5);
        let n1 = secret.nullifier(&FieldElement::from_u64(1)).unwrap();
        let n2 = secret.nullifier(&FieldElement::from_u64(2)).unwrap();
        assert_ne!(n1, n2);
    }
}
