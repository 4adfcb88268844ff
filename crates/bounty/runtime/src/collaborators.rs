//! External collaborators of the settlement core
//!
//! The ledger never moves currency, mints credit, talks to oracles or reads
//! the wall clock directly. It goes through these traits, which the
//! deployment wires to real rails. In-memory implementations are provided
//! for tests and for the replay tool.

use bounty_types::{AccountId, Amount, ExternalHandle, GroupKey, LedgerError, OracleRequestId};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Failure reported by the currency rail
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransferError {
    #[error("transfer of {amount} to {to} rejected: {reason}")]
    Rejected {
        to: AccountId,
        amount: Amount,
        reason: String,
    },

    #[error("currency rail unavailable: {0}")]
    Unavailable(String),
}

impl From<TransferError> for LedgerError {
    fn from(err: TransferError) -> Self {
        LedgerError::TransferFailed(err.to_string())
    }
}

/// Failure reported by the oracle transport
#[derive(Debug, Clone, thiserror::Error)]
#[error("oracle transport failed: {0}")]
pub struct TransportError(pub String);

impl From<TransportError> for LedgerError {
    fn from(err: TransportError) -> Self {
        LedgerError::OracleUnavailable(err.0)
    }
}

/// Outbound currency primitive
pub trait CurrencyTransfer: Send + Sync {
    /// Pay `amount` out of custody to `to`
    fn transfer(&self, to: &AccountId, amount: Amount) -> Result<(), TransferError>;
}

/// The reward token; this ledger is its only minter
pub trait RewardLedger: Send + Sync {
    fn mint(&self, to: &AccountId, amount: Amount);
}

/// The fact an attestor is asked to verify
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "fact", rename_all = "snake_case")]
pub enum OracleFact {
    /// `account` controls the external `handle`
    HandleOwnership {
        handle: ExternalHandle,
        account: AccountId,
    },
    /// Work by `handle` under `group` was accepted
    WorkAccepted {
        group: GroupKey,
        handle: ExternalHandle,
        claimant: AccountId,
    },
}

/// A request published to the attestors
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRequest {
    pub id: OracleRequestId,
    #[serde(flatten)]
    pub fact: OracleFact,
    pub issued_at: DateTime<Utc>,
}

/// An attestor's answer to an oracle request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum OracleVerdict {
    Confirmed,
    Rejected { reason: String },
}

/// Outbound half of the attestation channel
///
/// Answers come back through the ledger's `complete` entry point, keyed by
/// the request id.
pub trait OracleTransport: Send + Sync {
    fn dispatch(&self, request: &OracleRequest) -> Result<(), TransportError>;
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// A completed payout on the in-memory rail
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub to: AccountId,
    pub amount: Amount,
}

#[derive(Debug, Default)]
struct BankState {
    payouts: Vec<Payout>,
    failing: bool,
}

/// In-memory currency rail that records payouts
#[derive(Clone, Debug, Default)]
pub struct InMemoryBank {
    state: Arc<Mutex<BankState>>,
}

impl InMemoryBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent transfers fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    pub fn payouts(&self) -> Vec<Payout> {
        self.state.lock().payouts.clone()
    }

    pub fn paid_to(&self, account: &AccountId) -> Amount {
        self.state
            .lock()
            .payouts
            .iter()
            .filter(|p| &p.to == account)
            .map(|p| p.amount)
            .fold(Amount::zero(), Amount::saturating_add)
    }

    pub fn total_paid(&self) -> Amount {
        self.state
            .lock()
            .payouts
            .iter()
            .map(|p| p.amount)
            .fold(Amount::zero(), Amount::saturating_add)
    }
}

impl CurrencyTransfer for InMemoryBank {
    fn transfer(&self, to: &AccountId, amount: Amount) -> Result<(), TransferError> {
        let mut state = self.state.lock();
        if state.failing {
            return Err(TransferError::Unavailable("rail offline".into()));
        }
        state.payouts.push(Payout {
            to: to.clone(),
            amount,
        });
        Ok(())
    }
}

/// In-memory reward token balances
#[derive(Clone, Debug, Default)]
pub struct InMemoryRewardLedger {
    balances: Arc<Mutex<HashMap<AccountId, Amount>>>,
}

impl InMemoryRewardLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.balances
            .lock()
            .get(account)
            .copied()
            .unwrap_or_default()
    }

    pub fn total_supply(&self) -> Amount {
        self.balances
            .lock()
            .values()
            .copied()
            .fold(Amount::zero(), Amount::saturating_add)
    }
}

impl RewardLedger for InMemoryRewardLedger {
    fn mint(&self, to: &AccountId, amount: Amount) {
        let mut balances = self.balances.lock();
        let balance = balances.entry(to.clone()).or_default();
        *balance = balance.saturating_add(amount);
    }
}

#[derive(Debug, Default)]
struct OutboxState {
    sent: Vec<OracleRequest>,
    failing: bool,
}

/// Oracle transport that queues requests for attestors to pick up
#[derive(Clone, Debug, Default)]
pub struct OracleOutbox {
    state: Arc<Mutex<OutboxState>>,
}

impl OracleOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    pub fn sent(&self) -> Vec<OracleRequest> {
        self.state.lock().sent.clone()
    }

    pub fn last(&self) -> Option<OracleRequest> {
        self.state.lock().sent.last().cloned()
    }
}

impl OracleTransport for OracleOutbox {
    fn dispatch(&self, request: &OracleRequest) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.failing {
            return Err(TransportError("outbox closed".into()));
        }
        state.sent.push(request.clone());
        Ok(())
    }
}

/// Everything the settlement core reaches outside itself for
#[derive(Clone)]
pub struct Collaborators {
    pub bank: Arc<dyn CurrencyTransfer>,
    pub rewards: Arc<dyn RewardLedger>,
    pub oracle: Arc<dyn OracleTransport>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    pub fn new(
        bank: Arc<dyn CurrencyTransfer>,
        rewards: Arc<dyn RewardLedger>,
        oracle: Arc<dyn OracleTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bank,
            rewards,
            oracle,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// In-memory collaborators with handles kept for inspection
#[derive(Clone, Debug)]
pub struct InMemoryCollaborators {
    pub bank: InMemoryBank,
    pub rewards: InMemoryRewardLedger,
    pub oracle: OracleOutbox,
    pub clock: ManualClock,
}

impl InMemoryCollaborators {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            bank: InMemoryBank::new(),
            rewards: InMemoryRewardLedger::new(),
            oracle: OracleOutbox::new(),
            clock: ManualClock::new(start),
        }
    }

    pub fn wire(&self) -> Collaborators {
        Collaborators::new(
            Arc::new(self.bank.clone()),
            Arc::new(self.rewards.clone()),
            Arc::new(self.oracle.clone()),
            Arc::new(self.clock.clone()),
        )
    }
}
