//! Bounty Custody Ledger Domain Types
//!
//! This crate defines the domain types for the bounty custody ledger:
//! value locked against an issue or pull request and released to a
//! claimant only after a quorum of attestors confirms an off-ledger fact.
//!
//! # Key Concepts
//!
//! - **Deposit**: a depositor's stake in a (category, reference) group.
//!   Settled deposits are tombstoned (zeroed), never removed.
//! - **Registration**: the binding of a ledger account to an external
//!   handle, confirmed by attestors.
//! - **Pending Withdrawal**: a claim on a pull request's deposit group,
//!   executed exactly once when quorum is reached.
//! - **Confirmations**: the set of distinct attestors behind a request.
//! - **Ledger Policy**: lock cap, day length, quorum thresholds.
//!
//! # Architecture
//!
//! This is a pure types crate with no runtime behaviour beyond the lock
//! computation. All types implement `Clone`, `Debug`, `Serialize`,
//! `Deserialize`.

#![deny(unsafe_code)]

mod deposit;
mod errors;
mod events;
mod ids;
mod policy;
mod quorum;
mod registration;
mod withdrawal;

pub use deposit::*;
pub use errors::*;
pub use events::*;
pub use ids::*;
pub use policy::*;
pub use quorum::*;
pub use registration::*;
pub use withdrawal::*;
