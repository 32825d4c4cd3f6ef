//! Proof verifier oracle.
//!
//! The ledger consumes verification as a pure predicate over a proof and
//! its four public signals. It never looks inside the proof.

use std::collections::HashMap;

use ark_bn254::Bn254;
use ark_groth16::{prepare_verifying_key, Groth16, PreparedVerifyingKey, VerifyingKey};
use ark_snark::SNARK;
use tracing::debug;

use crate::proof::VoteProof;
use crate::signals::PublicSignals;

/// Pure, side-effect free proof check
pub trait ProofVerifier: Send + Sync {
    fn verify(&self, proof: &VoteProof, signals: &PublicSignals, tree_depth: u8) -> bool;
}

impl<F> ProofVerifier for F
where
    F: Fn(&VoteProof, &PublicSignals, u8) -> bool + Send + Sync,
{
    fn verify(&self, proof: &VoteProof, signals: &PublicSignals, tree_depth: u8) -> bool {
        self(proof, signals, tree_depth)
    }
}

/// Groth16 verifier over BN254 with one verifying key per tree depth
#[derive(Default)]
pub struct Groth16Verifier {
    keys: HashMap<u8, PreparedVerifyingKey<Bn254>>,
}

impl Groth16Verifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, tree_depth: u8, vk: &VerifyingKey<Bn254>) -> Self {
        self.insert_key(tree_depth, vk);
        self
    }

    pub fn insert_key(&mut self, tree_depth: u8, vk: &VerifyingKey<Bn254>) {
        self.keys.insert(tree_depth, prepare_verifying_key(vk));
    }

    pub fn supports_depth(&self, tree_depth: u8) -> bool {
        self.keys.contains_key(&tree_depth)
    }
}

impl ProofVerifier for Groth16Verifier {
    fn verify(&self, proof: &VoteProof, signals: &PublicSignals, tree_depth: u8) -> bool {
        let Some(pvk) = self.keys.get(&tree_depth) else {
            debug!("no verifying key for tree depth {}", tree_depth);
            return false;
        };

        let proof = match proof.to_ark() {
            Ok(p) => p,
            Err(e) => {
                debug!("undecodable proof: {}", e);
                return false;
            }
        };

        let mut inputs = Vec::with_capacity(signals.to_array().len());
        for signal in signals.to_array() {
            match signal.to_fr() {
                Some(fr) => inputs.push(fr),
                None => {
                    debug!("public signal {} is not a canonical field element", signal);
                    return false;
                }
            }
        }

        match Groth16::<Bn254>::verify_with_processed_vk(pvk, &inputs, &proof) {
            Ok(valid) => valid,
            Err(e) => {
                debug!("verification error: {:?}", e);
                false
            }
        }
    }
}

/// Accepts every proof. Test double.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl ProofVerifier for AcceptAll {
    fn verify(&self, _proof: &VoteProof, _signals: &PublicSignals, _tree_depth: u8) -> bool {
        true
    }
}

/// Rejects every proof. Test double.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectAll;

impl ProofVerifier for RejectAll {
    fn verify(&self, _proof: &VoteProof, _signals: &PublicSignals, _tree_depth: u8) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::IdentitySecret;
    use crate::field::FieldElement;
    use crate::proof::VoteKeys;
    use rand::thread_rng;

    const DEPTH: u8 = 20;

    fn setup() -> (VoteKeys, Groth16Verifier) {
        let mut rng = thread_rng();
        let keys = VoteKeys::setup(&mut rng).unwrap();
        let verifier = Groth16Verifier::new().with_key(DEPTH, &keys.verifying_key);
        (keys, verifier)
    }

    #[test]
    fn test_valid_proof_accepted() {
        let mut rng = thread_rng();
        let (keys, verifier) = setup();
        let secret = IdentitySecret::random(&mut rng);
        let (proof, signals) = keys
            .prove(&secret, 1, &FieldElement::from_u64(9), &mut rng)
            .unwrap();

        assert!(verifier.verify(&proof, &signals, DEPTH));
    }

    #[test]
    fn test_tampered_signal_rejected() {
        let mut rng = thread_rng();
        let (keys, verifier) = setup();
        let secret = IdentitySecret::random(&mut rng);
        let (proof, mut signals) = keys
            .prove(&secret, 1, &FieldElement::from_u64(9), &mut rng)
            .unwrap();

        // Claim a different candidate than the one proven
        signals.candidate_signal = FieldElement::from_u64(0);
        assert!(!verifier.verify(&proof, &signals, DEPTH));
    }

    #[test]
    fn test_swapped_signal_order_rejected() {
        let mut rng = thread_rng();
        let (keys, verifier) = setup();
        let secret = IdentitySecret::random(&mut rng);
        let (proof, signals) = keys
            .prove(&secret, 1, &FieldElement::from_u64(9), &mut rng)
            .unwrap();

        let mut arr = signals.to_array();
        arr.swap(0, 1);
        let swapped = PublicSignals::from_array(arr);
        assert!(!verifier.verify(&proof, &swapped, DEPTH));
    }

    #[test]
    fn test_unknown_depth_rejected() {
        let mut rng = thread_rng();
        let (keys, verifier) = setup();
        let secret = IdentitySecret::random(&mut rng);
        let (proof, signals) = keys
            .prove(&secret, 1, &FieldElement::from_u64(9), &mut rng)
            .unwrap();

        assert!(!verifier.supports_depth(DEPTH + 1));
        assert!(!verifier.verify(&proof, &signals, DEPTH + 1));
    }

    #[test]
    fn test_non_canonical_signal_rejected() {
        let mut rng = thread_rng();
        let (keys, verifier) = setup();
        let secret = IdentitySecret::random(&mut rng);
        let (proof, mut signals) = keys
            .prove(&secret, 1, &FieldElement::from_u64(9), &mut rng)
            .unwrap();

        signals.merkle_root = FieldElement([0xff; 32]);
        assert!(!verifier.verify(&proof, &signals, DEPTH));
    }

    #[test]
    fn test_mock_verifiers() {
        let signals = PublicSignals::from_array([FieldElement::ZERO; 4]);
        assert!(AcceptAll.verify(&VoteProof::dummy(), &signals, DEPTH));
        assert!(!RejectAll.verify(&VoteProof::dummy(), &signals, DEPTH));

        let only_depth_20 = |_: &VoteProof, _: &PublicSignals, depth: u8| depth == 20;
        assert!(only_depth_20.verify(&VoteProof::dummy(), &signals, 20));
        assert!(!only_depth_20.verify(&VoteProof::dummy(), &signals, 21));
    }
}
