//! Bounty custody runtime
//!
//! The settlement core of the bounty ledger: depositors lock value against
//! an issue or pull request, and that value is released to a claimant only
//! after a quorum of distinct attestors confirms the claim.
//!
//! # Architecture
//!
//! [`CustodyLedger`] is the entry point. It owns the [`LedgerStore`] and the
//! [`EventJournal`](bounty_types::EventJournal) and delegates to:
//!
//! - [`DepositManager`]: deposits, top-ups and the refund paths
//! - [`RegistrationWorkflow`]: binding accounts to external handles
//! - [`WithdrawalQuorum`]: request/confirm state machine releasing funds
//! - [`RewardIssuer`]: reward credit for locks and third-party claims
//! - [`BlacklistGate`] and [`AttestorSet`]: the privileged sets
//! - [`OracleGateway`]: correlating attestor answers with requests
//!
//! External effects go through the traits in [`collaborators`]. Every
//! operation writes its state changes before calling out, and undoes them
//! if the call fails.
//!
//! # Example
//!
//! ```rust
//! use bounty_runtime::{CustodyLedger, InMemoryCollaborators};
//! use bounty_types::{AccountId, Amount, Category, ExternalRef, LedgerPolicy};
//!
//! let mem = InMemoryCollaborators::new(chrono::Utc::now());
//! let mut ledger =
//!     CustodyLedger::new(LedgerPolicy::default(), AccountId::new("operator"), mem.wire())
//!         .unwrap();
//!
//! let receipt = ledger
//!     .deposit(
//!         &AccountId::new("alice"),
//!         Category::PullRequest,
//!         ExternalRef::new("42"),
//!         Amount::new(100),
//!         90,
//!     )
//!     .unwrap();
//! assert_eq!(receipt.reward, Amount::new(100));
//! ```

#![deny(unsafe_code)]

pub mod attestor_set;
pub mod blacklist_gate;
pub mod collaborators;
pub mod custody_ledger;
pub mod deposit_manager;
pub mod handle;
pub mod oracle_gateway;
pub mod registration_workflow;
pub mod reward_issuance;
pub mod store;
pub mod withdrawal_quorum;

pub use attestor_set::AttestorSet;
pub use blacklist_gate::BlacklistGate;
pub use collaborators::{
    Clock, Collaborators, CurrencyTransfer, InMemoryBank, InMemoryCollaborators,
    InMemoryRewardLedger, ManualClock, OracleFact, OracleOutbox, OracleRequest, OracleTransport,
    OracleVerdict, Payout, RewardLedger, SystemClock, TransferError, TransportError,
};
pub use custody_ledger::{CompletionOutcome, CustodyLedger};
pub use deposit_manager::{DepositManager, DepositReceipt, RefundReceipt};
pub use handle::SharedLedger;
pub use oracle_gateway::{OracleGateway, OracleSubject, PendingOracleRequest};
pub use registration_workflow::{RegistrationTicket, RegistrationWorkflow};
pub use reward_issuance::RewardIssuer;
pub use store::{LedgerStore, RegistrationUndo};
pub use withdrawal_quorum::{Settlement, WithdrawalOutcome, WithdrawalQuorum, WithdrawalTicket};
