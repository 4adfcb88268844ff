//! Pending withdrawals awaiting attestor quorum

use crate::{
    AccountId, Amount, Confirmations, ExternalHandle, GroupKey, OracleRequestId, WithdrawalId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of a withdrawal request
///
/// `Pending` may last forever; there is no implicit expiry. New terminal
/// states (e.g. cancellation) slot in here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WithdrawalStatus {
    #[default]
    Pending,
    Executed,
}

/// A claimant's request to release a pull request's deposit group
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWithdrawal {
    pub id: WithdrawalId,
    pub claimant: AccountId,
    /// Handle the claimant was registered under when requesting
    pub handle: ExternalHandle,
    pub group: GroupKey,
    pub confirmations: Confirmations,
    pub status: WithdrawalStatus,
    pub requested_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_out: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oracle_request: Option<OracleRequestId>,
}

impl PendingWithdrawal {
    pub fn new(
        id: WithdrawalId,
        claimant: AccountId,
        handle: ExternalHandle,
        group: GroupKey,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            claimant,
            handle,
            group,
            confirmations: Confirmations::new(),
            status: WithdrawalStatus::Pending,
            requested_at: now,
            executed_at: None,
            paid_out: None,
            oracle_request: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, WithdrawalStatus::Pending)
    }

    pub fn is_executed(&self) -> bool {
        matches!(self.status, WithdrawalStatus::Executed)
    }

    pub fn mark_executed(&mut self, paid_out: Amount, now: DateTime<Utc>) {
        self.status = WithdrawalStatus::Executed;
        self.executed_at = Some(now);
        self.paid_out = Some(paid_out);
    }

    /// Return to `Pending` after a failed settlement
    pub fn revert_execution(&mut self) {
        self.status = WithdrawalStatus::Pending;
        self.executed_at = None;
        self.paid_out = None;
    }
}
