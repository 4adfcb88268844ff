//! Attestor set: accounts whose confirmations count toward quorum
//!
//! The deploying operator is the bootstrap attestor and the owner of the
//! ledger. The owner can never be removed.

use bounty_types::{AccountId, LedgerError, LedgerResult};
use std::collections::BTreeSet;
use tracing::info;

/// Accounts allowed to confirm registrations and withdrawals
#[derive(Clone, Debug)]
pub struct AttestorSet {
    owner: AccountId,
    attestors: BTreeSet<AccountId>,
}

impl AttestorSet {
    /// Create a set whose only member is the permanent `owner`
    pub fn new(owner: AccountId) -> Self {
        let mut attestors = BTreeSet::new();
        attestors.insert(owner.clone());
        Self { owner, attestors }
    }

    pub fn owner(&self) -> &AccountId {
        &self.owner
    }

    pub fn is_owner(&self, account: &AccountId) -> bool {
        &self.owner == account
    }

    pub fn is_attestor(&self, account: &AccountId) -> bool {
        self.attestors.contains(account)
    }

    /// Fails with `NotAttestor` unless `account` may confirm
    pub fn ensure_attestor(&self, account: &AccountId) -> LedgerResult<()> {
        if self.is_attestor(account) {
            Ok(())
        } else {
            Err(LedgerError::NotAttestor(account.clone()))
        }
    }

    /// Enroll `account`; returns whether the set changed
    pub fn add(&mut self, account: AccountId) -> bool {
        let added = self.attestors.insert(account.clone());
        if added {
            info!(attestor = %account, total = self.attestors.len(), "Attestor added");
        }
        added
    }

    /// Returns whether the set changed
    pub fn remove(&mut self, account: &AccountId) -> LedgerResult<bool> {
        if self.is_owner(account) {
            return Err(LedgerError::CannotRemoveOwner(account.clone()));
        }
        let removed = self.attestors.remove(account);
        if removed {
            info!(attestor = %account, total = self.attestors.len(), "Attestor removed");
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.attestors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attestors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AccountId> {
        self.attestors.iter()
    }
}
