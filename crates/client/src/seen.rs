//! Local record of nullifiers this client has submitted.
//!
//! Best effort only: the ledger's nullifier set is authoritative. The
//! cache exists to stop a client from paying for verification and relay
//! of a ballot it already sent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use zk::Nullifier;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeenState {
    /// A submission is currently running
    InFlight,
    /// The ledger has consumed the nullifier
    Settled,
}

#[derive(Clone, Debug, Default)]
pub struct SeenCache {
    entries: Arc<Mutex<HashMap<Nullifier, SeenState>>>,
}

impl SeenCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Nullifier, SeenState>> {
        // The map stays consistent even if a holder panicked
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self, nullifier: &Nullifier) -> Option<SeenState> {
        self.entries().get(nullifier).copied()
    }

    /// Mark a nullifier in flight, or report what is already recorded
    pub fn try_mark(&self, nullifier: Nullifier) -> Result<SeenMark, SeenState> {
        let mut entries = self.entries();
        if let Some(state) = entries.get(&nullifier) {
            return Err(*state);
        }
        entries.insert(nullifier, SeenState::InFlight);
        Ok(SeenMark {
            cache: self.clone(),
            nullifier,
            settled: false,
        })
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// In-flight mark; released on drop unless settled
#[derive(Debug)]
pub struct SeenMark {
    cache: SeenCache,
    nullifier: Nullifier,
    settled: bool,
}

impl SeenMark {
    /// Keep the entry permanently
    pub fn settle(mut self) {
        self.cache
            .entries()
            .insert(self.nullifier, SeenState::Settled);
        self.settled = true;
    }
}

impl Drop for SeenMark {
    fn drop(&mut self) {
        if !self.settled {
            self.cache.entries().remove(&self.nullifier);
        }
    }
}
