//! Relayer pool for anonymous ballot submission
//!
//! A relayer is a registered intermediary that forwards a participant's
//! ballot to the ledger, so the ledger only ever sees the relayer as the
//! caller. This crate provides:
//! - `Relayer`: an agent owning an Ed25519 identity, signing and
//!   dispatching ballots
//! - `RelayerPool`: the agents this process operates, with uniform random
//!   selection among those currently in the ledger's registry
//! - Per-relayer dispatch statistics
//!
//! Selection keeps no state between calls, so the choice of relayer for
//! one ballot says nothing about the choice for the next.

use std::collections::HashMap;
use std::sync::Arc;

use crypto::{Identity, Principal};
use ledger::{LedgerError, VoteLedger, VoteRecord};
use protocol::{Ballot, SignedBallot};
use rand::seq::SliceRandom;
use rand::Rng;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Relay errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("No registered relayer available")]
    NoRelayerAvailable,

    #[error("Relayer {0} is not operated by this pool")]
    UnknownRelayer(Principal),

    #[error("Ledger rejected submission: {0}")]
    Ledger(#[from] LedgerError),
}

/// A relayer agent
#[derive(Debug, Clone)]
pub struct Relayer {
    identity: Identity,
}

impl Relayer {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    pub fn principal(&self) -> Principal {
        self.identity.principal()
    }

    /// Countersign a ballot for submission
    pub fn sign(&self, ballot: Ballot) -> SignedBallot {
        SignedBallot::sign(&self.identity, ballot)
    }

    /// Sign and submit a ballot, returning the ledger's verdict
    pub async fn relay(&self, ledger: &VoteLedger, ballot: Ballot) -> Result<VoteRecord, LedgerError> {
        let signed = self.sign(ballot);
        ledger.submit_signed_vote(signed).await
    }
}

/// Dispatch counters for one relayer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchCounters {
    pub dispatched: u64,
    pub accepted: u64,
    pub rejected: u64,
}

/// Pool statistics
#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    /// Agents operated by the pool
    pub num_agents: usize,
    /// Agents currently in the ledger registry
    pub num_registered: usize,
    pub dispatched: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub per_relayer: HashMap<Principal, DispatchCounters>,
}

/// Pick one element uniformly at random
pub fn choose_uniform<R: Rng + ?Sized>(candidates: &[Principal], rng: &mut R) -> Option<Principal> {
    candidates.choose(rng).copied()
}

/// The relayer agents this process operates
pub struct RelayerPool {
    ledger: Arc<VoteLedger>,
    /// Agents indexed by principal
    agents: RwLock<HashMap<Principal, Arc<Relayer>>>,
    /// Dispatch counters per relayer
    counters: RwLock<HashMap<Principal, DispatchCounters>>,
}

impl RelayerPool {
    pub fn new(ledger: Arc<VoteLedger>) -> Self {
        Self {
            ledger,
            agents: RwLock::new(HashMap::new()),
            counters: RwLock::new(HashMap::new()),
        }
    }

    pub fn ledger(&self) -> &Arc<VoteLedger> {
        &self.ledger
    }

    /// Operate an agent for `identity`. Registration on the ledger is a
    /// separate, administrator-only step.
    pub async fn enroll(&self, identity: Identity) -> Principal {
        let relayer = Relayer::new(identity);
        let principal = relayer.principal();
        self.agents.write().await.insert(principal, Arc::new(relayer));
        debug!("Enrolled relayer agent {}", principal.short_hex());
        principal
    }

    /// Enroll an agent and register it on the ledger
    pub async fn register(&self, admin: &Principal, identity: Identity) -> Result<Principal, RelayError> {
        let principal = identity.principal();
        self.ledger.register_relayer(admin, principal).await?;
        self.enroll(identity).await;
        Ok(principal)
    }

    /// Remove a relayer from the ledger registry and stop operating it
    pub async fn deregister(&self, admin: &Principal, relayer: Principal) -> Result<(), RelayError> {
        self.ledger.deregister_relayer(admin, relayer).await?;
        self.agents.write().await.remove(&relayer);
        Ok(())
    }

    /// Agents that are currently registered on the ledger
    async fn eligible(&self) -> Vec<Principal> {
        let registry = self.ledger.relayers().await;
        let agents = self.agents.read().await;
        registry.into_iter().filter(|p| agents.contains_key(p)).collect()
    }

    /// Choose one registered relayer uniformly at random
    pub async fn select_relayer(&self) -> Result<Principal, RelayError> {
        let eligible = self.eligible().await;
        let choice = {
            let mut rng = rand::thread_rng();
            choose_uniform(&eligible, &mut rng)
        };
        choice.ok_or_else(|| {
            warn!("No relayer of this pool is registered on the ledger");
            RelayError::NoRelayerAvailable
        })
    }

    /// Submit a ballot through a randomly selected relayer
    pub async fn dispatch(&self, ballot: Ballot) -> Result<VoteRecord, RelayError> {
        let relayer = self.select_relayer().await?;
        self.dispatch_via(relayer, ballot).await
    }

    /// Submit a ballot through a specific relayer
    pub async fn dispatch_via(&self, relayer: Principal, ballot: Ballot) -> Result<VoteRecord, RelayError> {
        let agent = self
            .agents
            .read()
            .await
            .get(&relayer)
            .cloned()
            .ok_or(RelayError::UnknownRelayer(relayer))?;

        debug!(
            "Dispatching ballot {} via {}",
            ballot.nullifier.short_hex(),
            relayer.short_hex()
        );
        let result = agent.relay(&self.ledger, ballot).await;

        {
            let mut counters = self.counters.write().await;
            let entry = counters.entry(relayer).or_default();
            entry.dispatched += 1;
            match &result {
                Ok(_) => entry.accepted += 1,
                Err(_) => entry.rejected += 1,
            }
        }

        match result {
            Ok(record) => {
                info!(
                    "Relayer {} delivered vote for candidate {}",
                    relayer.short_hex(),
                    record.candidate_id
                );
                Ok(record)
            }
            Err(e) => {
                warn!("Relayer {} submission rejected: {}", relayer.short_hex(), e);
                Err(e.into())
            }
        }
    }

    /// Get statistics
    pub async fn stats(&self) -> RelayStats {
        let num_agents = self.agents.read().await.len();
        let num_registered = self.eligible().await.len();
        let counters = self.counters.read().await;

        let mut stats = RelayStats {
            num_agents,
            num_registered,
            per_relayer: counters.clone(),
            ..Default::default()
        };
        for c in counters.values() {
            stats.dispatched += c.dispatched;
            stats.accepted += c.accepted;
            stats.rejected += c.rejected;
        }
        stats
    }
}
