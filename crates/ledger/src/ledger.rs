//! Vote Ledger
//!
//! The single authority on whether a vote is accepted. All state lives
//! behind one `RwLock`; a submission is checked under a read lock, its
//! proof is verified on a blocking worker with no lock held, and the
//! commit re-checks everything under the write lock before mutating.
//! Two submissions carrying the same nullifier therefore resolve to one
//! success and one `NullifierAlreadyUsed`, whatever their interleaving.

use std::sync::Arc;
use std::time::Duration;

use crypto::Principal;
use protocol::{Ballot, SignedBallot};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use zk::{Nullifier, ProofVerifier};

use crate::clock::{Clock, SystemClock};
use crate::snapshot::LedgerSnapshot;
use crate::state::{
    LedgerConfig, NullifierSet, RelayerRegistry, RoundConfig, RoundPhase, Tally, VoteRecord,
};
use crate::LedgerError;

/// Events emitted by the ledger
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerEvent {
    /// Round configuration set
    RoundInitialized(RoundConfig),
    /// Relayer added to the registry
    RelayerRegistered(Principal),
    /// Relayer removed from the registry
    RelayerDeregistered(Principal),
    /// Voting suspended
    Paused,
    /// Voting resumed
    Unpaused,
    /// Vote accepted
    VoteCast(VoteRecord),
}

#[derive(Debug, Default)]
pub(crate) struct LedgerState {
    pub(crate) config: Option<RoundConfig>,
    pub(crate) paused: bool,
    pub(crate) tally: Tally,
    pub(crate) nullifiers: NullifierSet,
    pub(crate) relayers: RelayerRegistry,
}

impl LedgerState {
    fn phase(&self, now: u64) -> RoundPhase {
        match &self.config {
            Some(config) => config.phase_at(now),
            None => RoundPhase::Uninitialized,
        }
    }

    /// Every check a ballot must pass apart from its proof
    fn admit(&self, caller: &Principal, ballot: &Ballot, now: u64) -> Result<RoundConfig, LedgerError> {
        let config = self.config.ok_or(LedgerError::NotConfigured)?;

        match config.phase_at(now) {
            RoundPhase::Pending => {
                return Err(LedgerError::NotStarted {
                    starts_at: config.start_time,
                    now,
                })
            }
            RoundPhase::Closed => {
                return Err(LedgerError::Closed {
                    ended_at: config.end_time,
                })
            }
            RoundPhase::Open | RoundPhase::Uninitialized => {}
        }

        if self.paused {
            return Err(LedgerError::Paused);
        }

        if !self.relayers.contains(caller) {
            return Err(LedgerError::NotRelayer(*caller));
        }

        if ballot.candidate_id >= config.candidate_count {
            return Err(LedgerError::CandidateOutOfRange {
                candidate: ballot.candidate_id,
                count: config.candidate_count,
            });
        }

        if !ballot.signals.binds_candidate(ballot.candidate_id) {
            return Err(LedgerError::SignalMismatch {
                candidate: ballot.candidate_id,
                signal: ballot.signals.candidate_signal,
            });
        }

        if ballot.signals.nullifier != ballot.nullifier {
            return Err(LedgerError::NullifierMismatch);
        }

        if ballot.signals.external_nullifier != config.external_nullifier() {
            return Err(LedgerError::ExternalNullifierMismatch);
        }

        if self.nullifiers.contains(&ballot.nullifier) {
            return Err(LedgerError::NullifierAlreadyUsed(ballot.nullifier));
        }

        Ok(config)
    }

    /// Apply an admitted vote. Nothing is mutated unless every step succeeds.
    fn commit(&mut self, candidate: u32, nullifier: Nullifier) -> Result<(), LedgerError> {
        let (count, total) = self.tally.incremented(candidate)?;
        if !self.nullifiers.insert(nullifier) {
            return Err(LedgerError::NullifierAlreadyUsed(nullifier));
        }
        self.tally.apply(candidate, count, total);
        Ok(())
    }
}

/// Authoritative vote ledger for one round
pub struct VoteLedger {
    /// Administrator principal
    admin: Principal,
    /// Ledger limits
    config: LedgerConfig,
    /// Mutable state, one lock for the whole ledger
    state: RwLock<LedgerState>,
    /// Proof oracle
    verifier: Arc<dyn ProofVerifier>,
    /// Time source for round phases
    clock: Arc<dyn Clock>,
    /// Event sender
    event_tx: Option<mpsc::UnboundedSender<LedgerEvent>>,
}

impl VoteLedger {
    /// Create an empty, unconfigured ledger
    pub fn new(admin: Principal, verifier: Arc<dyn ProofVerifier>) -> Self {
        Self {
            admin,
            config: LedgerConfig::default(),
            state: RwLock::new(LedgerState::default()),
            verifier,
            clock: Arc::new(SystemClock),
            event_tx: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: LedgerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set event channel for receiving notifications
    pub fn with_event_channel(mut self, tx: mpsc::UnboundedSender<LedgerEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn admin(&self) -> Principal {
        self.admin
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Emit an event
    fn emit_event(&self, event: LedgerEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    fn ensure_admin(&self, caller: &Principal) -> Result<(), LedgerError> {
        if *caller != self.admin {
            warn!("Rejecting admin operation from {}", caller.short_hex());
            return Err(LedgerError::NotAdmin(*caller));
        }
        Ok(())
    }

    // ========================================
    // Administration
    // ========================================

    /// Configure the round. Succeeds at most once.
    pub async fn initialize_round(
        &self,
        caller: &Principal,
        round: RoundConfig,
    ) -> Result<RoundConfig, LedgerError> {
        let mut state = self.state.write().await;

        if state.config.is_some() {
            warn!("Rejecting second round initialization");
            return Err(LedgerError::AlreadyConfigured);
        }
        self.ensure_admin(caller)?;
        round.validate(self.clock.now(), &self.config)?;

        state.config = Some(round);
        state.tally = Tally::new(round.candidate_count);

        self.emit_event(LedgerEvent::RoundInitialized(round));
        info!(
            "Round {} initialized: {} candidates, window [{}, {}), depth {}",
            round.group_id, round.candidate_count, round.start_time, round.end_time, round.tree_depth
        );

        Ok(round)
    }

    pub async fn register_relayer(
        &self,
        caller: &Principal,
        relayer: Principal,
    ) -> Result<(), LedgerError> {
        self.ensure_admin(caller)?;
        let mut state = self.state.write().await;

        if !state.relayers.insert(relayer) {
            warn!("Relayer {} already registered", relayer.short_hex());
            return Err(LedgerError::RelayerAlreadyRegistered(relayer));
        }

        self.emit_event(LedgerEvent::RelayerRegistered(relayer));
        info!(
            "Registered relayer {} (total: {})",
            relayer.short_hex(),
            state.relayers.len()
        );
        Ok(())
    }

    pub async fn deregister_relayer(
        &self,
        caller: &Principal,
        relayer: Principal,
    ) -> Result<(), LedgerError> {
        self.ensure_admin(caller)?;
        let mut state = self.state.write().await;

        if !state.relayers.remove(&relayer) {
            warn!("Relayer {} is not registered", relayer.short_hex());
            return Err(LedgerError::RelayerNotRegistered(relayer));
        }

        self.emit_event(LedgerEvent::RelayerDeregistered(relayer));
        info!(
            "Deregistered relayer {} (total: {})",
            relayer.short_hex(),
            state.relayers.len()
        );
        Ok(())
    }

    pub async fn pause(&self, caller: &Principal) -> Result<(), LedgerError> {
        self.ensure_admin(caller)?;
        let mut state = self.state.write().await;
        if state.paused {
            return Err(LedgerError::AlreadyPaused);
        }
        state.paused = true;
        self.emit_event(LedgerEvent::Paused);
        info!("Voting paused");
        Ok(())
    }

    pub async fn unpause(&self, caller: &Principal) -> Result<(), LedgerError> {
        self.ensure_admin(caller)?;
        let mut state = self.state.write().await;
        if !state.paused {
            return Err(LedgerError::NotPaused);
        }
        state.paused = false;
        self.emit_event(LedgerEvent::Unpaused);
        info!("Voting resumed");
        Ok(())
    }

    // ========================================
    // Voting
    // ========================================

    /// Accept or reject one ballot submitted by `caller`.
    ///
    /// A rejected ballot leaves the ledger untouched. Dropping the future
    /// before it resolves has no effect either: the commit happens in a
    /// single critical section with no await point inside it.
    pub async fn submit_vote(
        &self,
        caller: Principal,
        ballot: Ballot,
    ) -> Result<VoteRecord, LedgerError> {
        let tree_depth = {
            let state = self.state.read().await;
            match state.admit(&caller, &ballot, self.clock.now()) {
                Ok(config) => config.tree_depth,
                Err(e) => {
                    debug!(
                        "Ballot {} rejected before verification: {}",
                        ballot.nullifier.short_hex(),
                        e
                    );
                    return Err(e);
                }
            }
        };

        let verifier = Arc::clone(&self.verifier);
        let proof = ballot.proof.clone();
        let signals = ballot.signals;
        let valid = tokio::task::spawn_blocking(move || verifier.verify(&proof, &signals, tree_depth))
            .await
            .map_err(|e| {
                warn!("Proof verification aborted: {}", e);
                LedgerError::VerificationAborted
            })?;

        if !valid {
            warn!("Invalid proof for ballot {}", ballot.nullifier.short_hex());
            return Err(LedgerError::InvalidProof);
        }

        let mut state = self.state.write().await;
        let now = self.clock.now();

        // State may have moved while the proof was being checked
        state.admit(&caller, &ballot, now)?;
        state.commit(ballot.candidate_id, ballot.nullifier)?;

        let record = VoteRecord {
            candidate_id: ballot.candidate_id,
            nullifier: ballot.nullifier,
            relayer: caller,
            timestamp: now,
        };
        self.emit_event(LedgerEvent::VoteCast(record.clone()));

        info!(
            "Vote accepted for candidate {} via {} (total: {})",
            record.candidate_id,
            caller.short_hex(),
            state.tally.total()
        );

        Ok(record)
    }

    /// Submit a relayer-signed ballot; the signer is the caller
    pub async fn submit_signed_vote(&self, signed: SignedBallot) -> Result<VoteRecord, LedgerError> {
        let caller = signed.verify().map_err(|e| {
            warn!("Rejecting ballot with bad relayer signature: {}", e);
            LedgerError::InvalidSignature
        })?;
        self.submit_vote(caller, signed.ballot).await
    }

    // ========================================
    // Queries
    // ========================================

    pub async fn round_config(&self) -> Option<RoundConfig> {
        self.state.read().await.config
    }

    pub async fn phase(&self) -> RoundPhase {
        self.state.read().await.phase(self.clock.now())
    }

    pub async fn is_paused(&self) -> bool {
        self.state.read().await.paused
    }

    /// Configured, inside the window and not paused
    pub async fn is_voting_open(&self) -> bool {
        let state = self.state.read().await;
        !state.paused && state.phase(self.clock.now()) == RoundPhase::Open
    }

    /// Why voting is not open right now, if it isn't
    pub async fn ensure_open(&self) -> Result<(), LedgerError> {
        let state = self.state.read().await;
        let config = state.config.ok_or(LedgerError::NotConfigured)?;
        let now = self.clock.now();
        match config.phase_at(now) {
            RoundPhase::Pending => Err(LedgerError::NotStarted {
                starts_at: config.start_time,
                now,
            }),
            RoundPhase::Closed => Err(LedgerError::Closed {
                ended_at: config.end_time,
            }),
            _ if state.paused => Err(LedgerError::Paused),
            _ => Ok(()),
        }
    }

    /// Time until the voting window ends; zero once it has
    pub async fn time_remaining(&self) -> Result<Duration, LedgerError> {
        let config = self.round_config().await.ok_or(LedgerError::NotConfigured)?;
        Ok(Duration::from_secs(
            config.end_time.saturating_sub(self.clock.now()),
        ))
    }

    pub async fn tally_of(&self, candidate: u32) -> Result<u64, LedgerError> {
        let state = self.state.read().await;
        let config = state.config.ok_or(LedgerError::NotConfigured)?;
        state.tally.get(candidate).ok_or(LedgerError::CandidateOutOfRange {
            candidate,
            count: config.candidate_count,
        })
    }

    /// Full tally vector, empty before configuration
    pub async fn tally(&self) -> Vec<u64> {
        self.state.read().await.tally.counts().to_vec()
    }

    pub async fn total_votes(&self) -> u64 {
        self.state.read().await.tally.total()
    }

    pub async fn is_nullifier_used(&self, nullifier: &Nullifier) -> bool {
        self.state.read().await.nullifiers.contains(nullifier)
    }

    pub async fn is_relayer(&self, principal: &Principal) -> bool {
        self.state.read().await.relayers.contains(principal)
    }

    /// Snapshot of the relayer registry
    pub async fn relayers(&self) -> Vec<Principal> {
        self.state.read().await.relayers.to_sorted_vec()
    }

    // ========================================
    // Persistence
    // ========================================

    pub async fn snapshot(&self) -> LedgerSnapshot {
        let state = self.state.read().await;
        LedgerSnapshot::capture(self.admin, &state)
    }

    /// Rebuild a ledger from a snapshot after checking its consistency
    /// and its round against `config`
    pub fn restore(
        snapshot: LedgerSnapshot,
        verifier: Arc<dyn ProofVerifier>,
        config: LedgerConfig,
    ) -> Result<Self, LedgerError> {
        let admin = snapshot.admin;
        let state = snapshot.into_state(&config)?;
        info!(
            "Restored ledger with {} votes and {} relayers",
            state.tally.total(),
            state.relayers.len()
        );
        Ok(Self {
            admin,
            config,
            state: RwLock::new(state),
            verifier,
            clock: Arc::new(SystemClock),
            event_tx: None,
        })
    }
}
