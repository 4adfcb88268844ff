//! Ledger events and the append-only event journal
//!
//! Events are observability, not authority: they carry post-mutation values
//! for external indexers and are appended only after an operation commits.

use crate::{AccountId, Amount, DepositId, ExternalHandle, GroupKey, WithdrawalId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Something that happened on the ledger
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEvent {
    DepositUpdated {
        deposit_id: DepositId,
        group: GroupKey,
        depositor: AccountId,
        /// Cumulative amount after this deposit
        amount: Amount,
        locked_until: DateTime<Utc>,
    },
    DepositRefunded {
        deposit_ids: Vec<DepositId>,
        depositor: AccountId,
        amount: Amount,
        forced: bool,
    },
    RewardIssued {
        recipient: AccountId,
        amount: Amount,
    },
    RegistrationRequested {
        handle: ExternalHandle,
        account: AccountId,
        #[serde(skip_serializing_if = "Option::is_none")]
        superseded: Option<AccountId>,
    },
    RegistrationConfirmed {
        handle: ExternalHandle,
        account: AccountId,
        confirmations: usize,
    },
    WithdrawalRequested {
        withdrawal_id: WithdrawalId,
        claimant: AccountId,
        group: GroupKey,
    },
    WithdrawalExecuted {
        withdrawal_id: WithdrawalId,
        claimant: AccountId,
        group: GroupKey,
        amount: Amount,
        deposit_ids: Vec<DepositId>,
    },
    AttestorAdded {
        attestor: AccountId,
    },
    AttestorRemoved {
        attestor: AccountId,
    },
    BlacklistUpdated {
        handle: ExternalHandle,
        blacklisted: bool,
    },
}

impl LedgerEvent {
    /// Short stable name, used for filtering
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEvent::DepositUpdated { .. } => "deposit_updated",
            LedgerEvent::DepositRefunded { .. } => "deposit_refunded",
            LedgerEvent::RewardIssued { .. } => "reward_issued",
            LedgerEvent::RegistrationRequested { .. } => "registration_requested",
            LedgerEvent::RegistrationConfirmed { .. } => "registration_confirmed",
            LedgerEvent::WithdrawalRequested { .. } => "withdrawal_requested",
            LedgerEvent::WithdrawalExecuted { .. } => "withdrawal_executed",
            LedgerEvent::AttestorAdded { .. } => "attestor_added",
            LedgerEvent::AttestorRemoved { .. } => "attestor_removed",
            LedgerEvent::BlacklistUpdated { .. } => "blacklist_updated",
        }
    }

    /// Whether the event concerns `account`
    pub fn involves(&self, account: &AccountId) -> bool {
        match self {
            LedgerEvent::DepositUpdated { depositor, .. }
            | LedgerEvent::DepositRefunded { depositor, .. } => depositor == account,
            LedgerEvent::RewardIssued { recipient, .. } => recipient == account,
            LedgerEvent::RegistrationRequested {
                account: bound,
                superseded,
                ..
            } => bound == account || superseded.as_ref() == Some(account),
            LedgerEvent::RegistrationConfirmed { account: bound, .. } => bound == account,
            LedgerEvent::WithdrawalRequested { claimant, .. }
            | LedgerEvent::WithdrawalExecuted { claimant, .. } => claimant == account,
            LedgerEvent::AttestorAdded { attestor } | LedgerEvent::AttestorRemoved { attestor } => {
                attestor == account
            }
            LedgerEvent::BlacklistUpdated { .. } => false,
        }
    }
}

/// A journaled event with its position in the log
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: LedgerEvent,
}

/// Append-only journal of committed ledger events
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventJournal {
    records: Vec<EventRecord>,
    next_sequence: u64,
}

impl EventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event, returning its sequence number
    pub fn record(&mut self, event: LedgerEvent, at: DateTime<Utc>) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.records.push(EventRecord {
            sequence,
            recorded_at: at,
            event,
        });
        sequence
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&EventRecord> {
        self.records.last()
    }

    /// Records at or after `sequence`, for incremental indexing
    pub fn since(&self, sequence: u64) -> &[EventRecord] {
        let start = self.records.partition_point(|r| r.sequence < sequence);
        &self.records[start..]
    }

    pub fn of_kind(&self, kind: &str) -> Vec<&EventRecord> {
        self.records
            .iter()
            .filter(|r| r.event.kind() == kind)
            .collect()
    }

    pub fn for_account(&self, account: &AccountId) -> Vec<&EventRecord> {
        self.records
            .iter()
            .filter(|r| r.event.involves(account))
            .collect()
    }

    /// Hand all buffered records to an indexer; sequence numbering continues
    pub fn drain(&mut self) -> Vec<EventRecord> {
        std::mem::take(&mut self.records)
    }
}
