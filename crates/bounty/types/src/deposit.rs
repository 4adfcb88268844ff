//! Deposits: value locked against an issue or pull request

use crate::{AccountId, Amount, Category, DepositId, ExternalRef, GroupKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single depositor's stake in a (category, reference) group
///
/// Entries are never removed. Settling a deposit zeroes its amount
/// (a tombstone) so the id stays stable and the history stays auditable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub id: DepositId,
    pub category: Category,
    pub external_ref: ExternalRef,
    pub depositor: AccountId,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
    /// Never earlier than `created_at`
    pub locked_until: DateTime<Utc>,
}

impl Deposit {
    pub fn new(
        id: DepositId,
        category: Category,
        external_ref: ExternalRef,
        depositor: AccountId,
        amount: Amount,
        created_at: DateTime<Utc>,
        locked_until: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            category,
            external_ref,
            depositor,
            amount,
            created_at,
            locked_until: locked_until.max(created_at),
        }
    }

    pub fn group_key(&self) -> GroupKey {
        GroupKey::new(self.category, self.external_ref.clone())
    }

    pub fn is_tombstoned(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_unlocked(&self, now: DateTime<Utc>) -> bool {
        crate::is_unlocked(now, self.locked_until)
    }

    /// Add to the stake and push the lock horizon out, never in
    ///
    /// Returns the new stake, or `None` without touching the deposit if it
    /// would overflow.
    pub fn top_up(&mut self, amount: Amount, locked_until: DateTime<Utc>) -> Option<Amount> {
        self.amount = self.amount.checked_add(amount)?;
        self.locked_until = self.locked_until.max(locked_until);
        Some(self.amount)
    }

    /// Zero the deposit, returning what it held
    pub fn tombstone(&mut self) -> Amount {
        std::mem::take(&mut self.amount)
    }
}
