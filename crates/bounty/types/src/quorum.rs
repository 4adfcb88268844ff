//! Attestor confirmation sets

use crate::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The distinct attestors that confirmed one request round
///
/// Quorum is the cardinality of the set, so an attestor repeating its
/// confirmation never moves a request closer to quorum.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmations {
    attestors: BTreeSet<AccountId>,
}

impl Confirmations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a confirmation; false if this attestor already confirmed
    pub fn record(&mut self, attestor: AccountId) -> bool {
        self.attestors.insert(attestor)
    }

    /// Undo a confirmation recorded by an operation that later failed
    pub fn retract(&mut self, attestor: &AccountId) -> bool {
        self.attestors.remove(attestor)
    }

    pub fn contains(&self, attestor: &AccountId) -> bool {
        self.attestors.contains(attestor)
    }

    pub fn count(&self) -> usize {
        self.attestors.len()
    }

    pub fn reaches(&self, quorum: u32) -> bool {
        self.attestors.len() >= quorum as usize
    }

    pub fn attestors(&self) -> impl Iterator<Item = &AccountId> {
        self.attestors.iter()
    }
}

/// Result of submitting a confirmation
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    /// Counted, quorum not yet reached
    Accepted { confirmations: usize, quorum: u32 },
    /// This attestor had already confirmed; nothing changed
    Duplicate { confirmations: usize },
    /// Counted, and the request reached quorum
    QuorumReached,
}

impl ConfirmationOutcome {
    pub fn is_final(&self) -> bool {
        matches!(self, ConfirmationOutcome::QuorumReached)
    }
}
