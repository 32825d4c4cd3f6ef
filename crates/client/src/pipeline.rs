//! Vote submission pipeline
//!
//! Stages run in order and the first failure aborts the submission:
//!
//! ```text
//! 1. round open           ledger window + pause flag
//! 2. candidate bound      in range, proof signal selects it
//! 3. group current        optional commitment-group check
//! 4. seen cache           mark nullifier in flight
//! 5. pre-verification     proof checked locally, bounded by a timeout
//! 6. relayer selection    uniform over registered relayers
//! 7. dispatch             relayer signs and submits
//! 8. verdict              ledger accepts or names the rejection
//! ```
//!
//! Stages 1-5 are local and can be skipped with
//! `PipelineConfig::skip_prechecks`; the ledger call never is. Nothing
//! outside this client changes before stage 7.

use std::sync::Arc;
use std::time::Duration;

use ledger::{LedgerError, RoundConfig, VoteRecord};
use protocol::Ballot;
use rand::{CryptoRng, Rng};
use relay::{RelayError, RelayerPool};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zk::{CommitmentGroup, FieldElement, IdentitySecret, Nullifier, ProofVerifier, VoteKeys};

use crate::seen::{SeenCache, SeenState};

/// Default bound on local proof verification
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on local proof verification
    pub verify_timeout: Duration,
    /// Go straight to relayer selection
    pub skip_prechecks: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            verify_timeout: DEFAULT_VERIFY_TIMEOUT,
            skip_prechecks: false,
        }
    }
}

/// Submission errors, one per stage
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("Round is not accepting votes: {0}")]
    RoundNotOpen(LedgerError),

    #[error("Candidate {candidate} out of range (round has {count})")]
    CandidateOutOfRange { candidate: u32, count: u32 },

    #[error("Proof does not bind candidate {0}")]
    CandidateNotBound(u32),

    #[error("Commitment group does not match the round")]
    StaleGroup,

    #[error("Proof root {proof_root} differs from group root {group_root}")]
    RootMismatch {
        proof_root: FieldElement,
        group_root: FieldElement,
    },

    #[error("Nullifier {0} is already being submitted")]
    DuplicateInFlight(Nullifier),

    #[error("Nullifier {0} was already accepted")]
    DuplicateSubmission(Nullifier),

    #[error("Proof failed local verification")]
    PreVerificationFailed,

    #[error("Local verification timed out after {0:?}")]
    PreVerificationTimedOut(Duration),

    #[error("No relayer available")]
    NoRelayer,

    #[error("Ledger rejected the ballot: {0}")]
    Rejected(LedgerError),
}

impl SubmitError {
    /// Whether the same ballot may succeed if submitted again later
    pub fn is_retryable(&self) -> bool {
        match self {
            SubmitError::RoundNotOpen(e) | SubmitError::Rejected(e) => e.is_retryable(),
            SubmitError::DuplicateInFlight(_)
            | SubmitError::PreVerificationTimedOut(_)
            | SubmitError::NoRelayer => true,
            _ => false,
        }
    }
}

/// Prove a vote and package it as a ballot for `round`
pub fn build_ballot<R: Rng + CryptoRng>(
    keys: &VoteKeys,
    secret: &IdentitySecret,
    candidate: u32,
    round: &RoundConfig,
    rng: &mut R,
) -> anyhow::Result<Ballot> {
    let (proof, signals) = keys.prove(secret, candidate, &round.external_nullifier(), rng)?;
    Ok(Ballot {
        candidate_id: candidate,
        nullifier: signals.nullifier,
        proof,
        signals,
    })
}

/// Client-side submission of ballots through a relayer pool
pub struct SubmissionPipeline {
    pool: Arc<RelayerPool>,
    verifier: Arc<dyn ProofVerifier>,
    group: Option<Arc<dyn CommitmentGroup>>,
    config: PipelineConfig,
    seen: SeenCache,
}

impl SubmissionPipeline {
    pub fn new(pool: Arc<RelayerPool>, verifier: Arc<dyn ProofVerifier>) -> Self {
        Self {
            pool,
            verifier,
            group: None,
            config: PipelineConfig::default(),
            seen: SeenCache::new(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Check the commitment group before submitting
    pub fn with_group(mut self, group: Arc<dyn CommitmentGroup>) -> Self {
        self.group = Some(group);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn seen(&self) -> &SeenCache {
        &self.seen
    }

    /// Run a ballot through every stage and return the ledger's verdict
    pub async fn submit(&self, ballot: Ballot) -> Result<VoteRecord, SubmitError> {
        let nullifier = ballot.nullifier;

        let mark = if self.config.skip_prechecks {
            debug!("Skipping local checks for {}", nullifier.short_hex());
            None
        } else {
            let round = self.check_round().await?;
            Self::check_candidate(&round, &ballot)?;
            self.check_group(&round, &ballot)?;

            let mark = self.seen.try_mark(nullifier).map_err(|state| match state {
                SeenState::InFlight => SubmitError::DuplicateInFlight(nullifier),
                SeenState::Settled => SubmitError::DuplicateSubmission(nullifier),
            })?;

            self.pre_verify(&ballot, round.tree_depth).await?;
            Some(mark)
        };

        let relayer = self.pool.select_relayer().await.map_err(|e| {
            warn!("Relayer selection failed: {}", e);
            SubmitError::NoRelayer
        })?;

        match self.pool.dispatch_via(relayer, ballot).await {
            Ok(record) => {
                if let Some(mark) = mark {
                    mark.settle();
                }
                info!(
                    "Ballot {} accepted for candidate {}",
                    nullifier.short_hex(),
                    record.candidate_id
                );
                Ok(record)
            }
            Err(RelayError::Ledger(e)) => {
                if let (Some(mark), LedgerError::NullifierAlreadyUsed(_)) = (mark, &e) {
                    mark.settle();
                }
                Err(SubmitError::Rejected(e))
            }
            // Relayer left the registry between selection and dispatch
            Err(RelayError::UnknownRelayer(_)) | Err(RelayError::NoRelayerAvailable) => {
                Err(SubmitError::NoRelayer)
            }
        }
    }

    async fn check_round(&self) -> Result<RoundConfig, SubmitError> {
        let ledger = self.pool.ledger();
        ledger.ensure_open().await.map_err(SubmitError::RoundNotOpen)?;
        ledger
            .round_config()
            .await
            .ok_or(SubmitError::RoundNotOpen(LedgerError::NotConfigured))
    }

    fn check_candidate(round: &RoundConfig, ballot: &Ballot) -> Result<(), SubmitError> {
        if ballot.candidate_id >= round.candidate_count {
            return Err(SubmitError::CandidateOutOfRange {
                candidate: ballot.candidate_id,
                count: round.candidate_count,
            });
        }
        if !ballot.signals.binds_candidate(ballot.candidate_id) {
            return Err(SubmitError::CandidateNotBound(ballot.candidate_id));
        }
        Ok(())
    }

    fn check_group(&self, round: &RoundConfig, ballot: &Ballot) -> Result<(), SubmitError> {
        let Some(group) = &self.group else {
            return Ok(());
        };
        if !group.is_valid_for(&round.group_id, round.tree_depth) {
            return Err(SubmitError::StaleGroup);
        }
        let group_root = group.root();
        if ballot.signals.merkle_root != group_root {
            return Err(SubmitError::RootMismatch {
                proof_root: ballot.signals.merkle_root,
                group_root,
            });
        }
        Ok(())
    }

    async fn pre_verify(&self, ballot: &Ballot, tree_depth: u8) -> Result<(), SubmitError> {
        let verifier = Arc::clone(&self.verifier);
        let proof = ballot.proof.clone();
        let signals = ballot.signals;
        let task = tokio::task::spawn_blocking(move || verifier.verify(&proof, &signals, tree_depth));

        match tokio::time::timeout(self.config.verify_timeout, task).await {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => {
                warn!("Ballot {} failed local verification", ballot.nullifier.short_hex());
                Err(SubmitError::PreVerificationFailed)
            }
            Ok(Err(e)) => {
                warn!("Local verification aborted: {}", e);
                Err(SubmitError::PreVerificationFailed)
            }
            Err(_) => {
                warn!(
                    "Local verification of {} exceeded {:?}",
                    ballot.nullifier.short_hex(),
                    self.config.verify_timeout
                );
                Err(SubmitError::PreVerificationTimedOut(self.config.verify_timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto::Identity;
    use ledger::{ManualClock, VoteLedger};
    use zk::{AcceptAll, Groth16Verifier, PublicSignals, RejectAll, StaticGroup, VoteProof};

    const T: u64 = 1_700_000_000;
    const ROUND: u64 = 42;

    struct Fixture {
        pool: Arc<RelayerPool>,
        clock: Arc<ManualClock>,
        admin: Identity,
    }

    fn ballot(candidate: u32, nullifier: u64) -> Ballot {
        Ballot {
            candidate_id: candidate,
            nullifier: Nullifier::from(nullifier),
            proof: VoteProof::dummy(),
            signals: PublicSignals::new(
                candidate,
                Nullifier::from(nullifier),
                FieldElement::from_u64(7),
                FieldElement::from_u64(ROUND),
            ),
        }
    }

    async fn fixture_with(ledger_verifier: Arc<dyn ProofVerifier>, relayers: usize) -> Fixture {
        let admin = Identity::generate();
        let clock = Arc::new(ManualClock::new(T - 10));
        let ledger = VoteLedger::new(admin.principal(), ledger_verifier).with_clock(clock.clone());
        ledger
            .initialize_round(
                &admin.principal(),
                RoundConfig::new(FieldElement::from_u64(ROUND), T, T + 600, 3),
            )
            .await
            .unwrap();
        clock.set(T + 1);

        let pool = RelayerPool::new(Arc::new(ledger));
        for _ in 0..relayers {
            pool.register(&admin.principal(), Identity::generate()).await.unwrap();
        }

        Fixture {
            pool: Arc::new(pool),
            clock,
            admin,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(Arc::new(AcceptAll), 2).await
    }

    fn slow_verifier(delay: Duration) -> Arc<dyn ProofVerifier> {
        Arc::new(move |_: &VoteProof, _: &PublicSignals, _: u8| {
            std::thread::sleep(delay);
            true
        })
    }

    #[tokio::test]
    async fn test_accepted_submission() {
        let f = fixture().await;
        let pipeline = SubmissionPipeline::new(f.pool.clone(), Arc::new(AcceptAll));

        let record = pipeline.submit(ballot(2, 0xAA)).await.unwrap();
        assert_eq!(record.candidate_id, 2);
        assert_eq!(f.pool.ledger().tally_of(2).await.unwrap(), 1);
        assert_eq!(pipeline.seen().state(&Nullifier::from(0xAA)), Some(SeenState::Settled));
    }

    #[tokio::test]
    async fn test_local_duplicate_never_reaches_ledger() {
        let f = fixture().await;
        let pipeline = SubmissionPipeline::new(f.pool.clone(), Arc::new(AcceptAll));

        pipeline.submit(ballot(0, 1)).await.unwrap();
        assert_eq!(
            pipeline.submit(ballot(1, 1)).await,
            Err(SubmitError::DuplicateSubmission(Nullifier::from(1)))
        );
        assert_eq!(f.pool.stats().await.dispatched, 1);
    }

    #[tokio::test]
    async fn test_skip_prechecks_still_hits_ledger() {
        let f = fixture().await;
        let config = PipelineConfig {
            skip_prechecks: true,
            ..Default::default()
        };
        // Local verifier would reject, but it is never consulted
        let pipeline =
            SubmissionPipeline::new(f.pool.clone(), Arc::new(RejectAll)).with_config(config);

        pipeline.submit(ballot(0, 1)).await.unwrap();
        assert_eq!(
            pipeline.submit(ballot(0, 1)).await,
            Err(SubmitError::Rejected(LedgerError::NullifierAlreadyUsed(
                Nullifier::from(1)
            )))
        );
    }

    #[tokio::test]
    async fn test_round_check_runs_first() {
        let f = fixture().await;
        let pipeline = SubmissionPipeline::new(f.pool.clone(), Arc::new(RejectAll));

        // Out-of-range candidate and a failing proof, but the round is not open yet
        f.clock.set(T - 1);
        let err = pipeline.submit(ballot(9, 1)).await.unwrap_err();
        assert!(matches!(err, SubmitError::RoundNotOpen(LedgerError::NotStarted { .. })));
        assert!(err.is_retryable());

        f.clock.set(T + 1);
        f.pool.ledger().pause(&f.admin.principal()).await.unwrap();
        assert_eq!(
            pipeline.submit(ballot(9, 1)).await,
            Err(SubmitError::RoundNotOpen(LedgerError::Paused))
        );

        f.clock.set(T + 600);
        let err = pipeline.submit(ballot(0, 1)).await.unwrap_err();
        assert!(matches!(err, SubmitError::RoundNotOpen(LedgerError::Closed { .. })));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_candidate_checks_precede_verification() {
        let f = fixture().await;
        let pipeline = SubmissionPipeline::new(f.pool.clone(), Arc::new(RejectAll));

        assert_eq!(
            pipeline.submit(ballot(3, 1)).await,
            Err(SubmitError::CandidateOutOfRange { candidate: 3, count: 3 })
        );

        let mut b = ballot(0, 1);
        b.candidate_id = 2;
        assert_eq!(pipeline.submit(b).await, Err(SubmitError::CandidateNotBound(2)));

        assert_eq!(
            pipeline.submit(ballot(0, 1)).await,
            Err(SubmitError::PreVerificationFailed)
        );
        assert!(pipeline.seen().is_empty());
        assert_eq!(f.pool.stats().await.dispatched, 0);
    }

    #[tokio::test]
    async fn test_group_checks() {
        let f = fixture().await;
        let stale = StaticGroup::new(FieldElement::from_u64(ROUND + 1), 20, FieldElement::from_u64(7));
        let pipeline =
            SubmissionPipeline::new(f.pool.clone(), Arc::new(AcceptAll)).with_group(Arc::new(stale));
        assert_eq!(pipeline.submit(ballot(0, 1)).await, Err(SubmitError::StaleGroup));

        let moved = StaticGroup::new(FieldElement::from_u64(ROUND), 20, FieldElement::from_u64(8));
        let pipeline =
            SubmissionPipeline::new(f.pool.clone(), Arc::new(AcceptAll)).with_group(Arc::new(moved));
        assert_eq!(
            pipeline.submit(ballot(0, 1)).await,
            Err(SubmitError::RootMismatch {
                proof_root: FieldElement::from_u64(7),
                group_root: FieldElement::from_u64(8),
            })
        );

        let current = StaticGroup::new(FieldElement::from_u64(ROUND), 20, FieldElement::from_u64(7));
        let pipeline =
            SubmissionPipeline::new(f.pool.clone(), Arc::new(AcceptAll)).with_group(Arc::new(current));
        assert!(pipeline.submit(ballot(0, 1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_verification_timeout_releases_mark() {
        let f = fixture().await;
        let config = PipelineConfig {
            verify_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let pipeline = SubmissionPipeline::new(f.pool.clone(), slow_verifier(Duration::from_millis(500)))
            .with_config(config);

        let err = pipeline.submit(ballot(1, 5)).await.unwrap_err();
        assert_eq!(err, SubmitError::PreVerificationTimedOut(Duration::from_millis(20)));
        assert!(err.is_retryable());
        assert_eq!(pipeline.seen().state(&Nullifier::from(5)), None);
        assert_eq!(f.pool.ledger().total_votes().await, 0);
    }

    #[tokio::test]
    async fn test_in_flight_duplicate_detected() {
        let f = fixture().await;
        let pipeline = SubmissionPipeline::new(f.pool.clone(), slow_verifier(Duration::from_millis(100)));

        let (first, second) = tokio::join!(pipeline.submit(ballot(0, 9)), pipeline.submit(ballot(0, 9)));

        assert!(first.is_ok());
        assert_eq!(second, Err(SubmitError::DuplicateInFlight(Nullifier::from(9))));
        assert_eq!(f.pool.ledger().total_votes().await, 1);
    }

    #[tokio::test]
    async fn test_cancelled_submission_has_no_effect() {
        let f = fixture().await;
        let pipeline = SubmissionPipeline::new(f.pool.clone(), slow_verifier(Duration::from_millis(300)));

        let outcome = tokio::time::timeout(Duration::from_millis(20), pipeline.submit(ballot(0, 3))).await;
        assert!(outcome.is_err());

        assert_eq!(pipeline.seen().state(&Nullifier::from(3)), None);
        assert!(!f.pool.ledger().is_nullifier_used(&Nullifier::from(3)).await);
    }

    #[tokio::test]
    async fn test_no_relayer() {
        let f = fixture_with(Arc::new(AcceptAll), 0).await;
        let pipeline = SubmissionPipeline::new(f.pool.clone(), Arc::new(AcceptAll));

        assert_eq!(pipeline.submit(ballot(0, 1)).await, Err(SubmitError::NoRelayer));
        assert!(pipeline.seen().is_empty());
    }

    #[tokio::test]
    async fn test_ledger_rejection_releases_mark() {
        // Local verifier accepts, ledger verifier does not
        let f = fixture_with(Arc::new(RejectAll), 1).await;
        let pipeline = SubmissionPipeline::new(f.pool.clone(), Arc::new(AcceptAll));

        assert_eq!(
            pipeline.submit(ballot(0, 1)).await,
            Err(SubmitError::Rejected(LedgerError::InvalidProof))
        );
        assert_eq!(pipeline.seen().state(&Nullifier::from(1)), None);
    }

    #[tokio::test]
    async fn test_groth16_end_to_end() {
        let mut rng = rand::thread_rng();
        let keys = VoteKeys::setup(&mut rng).unwrap();
        let verifier: Arc<dyn ProofVerifier> =
            Arc::new(Groth16Verifier::new().with_key(ledger::DEFAULT_TREE_DEPTH, &keys.verifying_key));

        let f = fixture_with(verifier.clone(), 2).await;
        let round = f.pool.ledger().round_config().await.unwrap();

        let alice = IdentitySecret::random(&mut rng);
        let bob = IdentitySecret::random(&mut rng);
        let alice_ballot = build_ballot(&keys, &alice, 1, &round, &mut rng).unwrap();
        let bob_ballot = build_ballot(&keys, &bob, 2, &round, &mut rng).unwrap();
        let alice_again = build_ballot(&keys, &alice, 0, &round, &mut rng).unwrap();

        // Proof for candidate 2 with its signal rewritten to candidate 0
        let mut forged = bob_ballot.clone();
        forged.candidate_id = 0;
        forged.signals = PublicSignals::new(
            0,
            forged.signals.nullifier,
            forged.signals.merkle_root,
            forged.signals.external_nullifier,
        );

        let group = StaticGroup::new(round.group_id, round.tree_depth, alice.commitment());
        let pipeline = SubmissionPipeline::new(f.pool.clone(), verifier.clone())
            .with_group(Arc::new(group));
        pipeline.submit(alice_ballot).await.unwrap();

        let pipeline = SubmissionPipeline::new(f.pool.clone(), verifier);
        assert_eq!(pipeline.submit(forged).await, Err(SubmitError::PreVerificationFailed));
        pipeline.submit(bob_ballot).await.unwrap();

        // Same identity, same round: same nullifier regardless of candidate
        assert_eq!(
            pipeline.submit(alice_again).await,
            Err(SubmitError::Rejected(LedgerError::NullifierAlreadyUsed(
                alice.nullifier(&round.external_nullifier()).unwrap()
            )))
        );

        assert_eq!(f.pool.ledger().tally().await, vec![0, 1, 1]);
    }
}
