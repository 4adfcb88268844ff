//! Error types for the custody ledger

use crate::{AccountId, DepositId, ExternalHandle, GroupKey, OracleRequestId, WithdrawalId};
use chrono::{DateTime, Utc};

/// Broad classes of rejection, used by callers to decide whether to retry
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad input or wrong caller role; nothing was mutated
    Validation,
    /// The ledger is in a state that forbids the operation right now
    StateConflict,
    /// A collaborator failed and the operation was rolled back
    ExternalDependency,
}

/// Errors that can occur in ledger operations
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Deposit amount must be positive")]
    InvalidAmount,

    #[error("Deposit not found or already settled: {0}")]
    NotFound(DepositId),

    #[error("Deposit {id} is locked until {locked_until}")]
    StillLocked {
        id: DepositId,
        locked_until: DateTime<Utc>,
    },

    #[error("No unlocked deposits to refund for {0}")]
    NothingToRefund(AccountId),

    #[error("Caller {caller} is not allowed to {action}")]
    Unauthorized { caller: AccountId, action: String },

    #[error("Caller is not an attestor: {0}")]
    NotAttestor(AccountId),

    #[error("Owner attestor cannot be removed: {0}")]
    CannotRemoveOwner(AccountId),

    #[error("Handle is blacklisted: {0}")]
    Blacklisted(ExternalHandle),

    #[error("Unknown request: {0}")]
    UnknownRequest(String),

    #[error("Account has no confirmed registration: {0}")]
    NotRegistered(AccountId),

    #[error("No deposits with a positive balance under {0}")]
    NoMatchingDeposits(GroupKey),

    #[error("Withdrawal already executed: {0}")]
    AlreadyExecuted(WithdrawalId),

    #[error("Deposit group {group} was drained before withdrawal {id} settled")]
    NoFundsRemaining { id: WithdrawalId, group: GroupKey },

    #[error("Settling {0} would overflow the amount range")]
    AmountOverflow(String),

    #[error("Unknown oracle request: {0}")]
    UnknownOracleRequest(OracleRequestId),

    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    #[error("Oracle transport unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Invalid ledger policy: {0}")]
    InvalidPolicy(String),
}

impl LedgerError {
    /// Classify the error for the caller
    pub fn category(&self) -> ErrorCategory {
        match self {
            LedgerError::StillLocked { .. }
            | LedgerError::NothingToRefund(_)
            | LedgerError::AlreadyExecuted(_)
            | LedgerError::NoFundsRemaining { .. }
            | LedgerError::AmountOverflow(_) => ErrorCategory::StateConflict,
            LedgerError::TransferFailed(_) | LedgerError::OracleUnavailable(_) => {
                ErrorCategory::ExternalDependency
            }
            _ => ErrorCategory::Validation,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount => "invalid_amount",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::StillLocked { .. } => "still_locked",
            LedgerError::NothingToRefund(_) => "nothing_to_refund",
            LedgerError::Unauthorized { .. } => "unauthorized",
            LedgerError::NotAttestor(_) => "not_attestor",
            LedgerError::CannotRemoveOwner(_) => "cannot_remove_owner",
            LedgerError::Blacklisted(_) => "blacklisted",
            LedgerError::UnknownRequest(_) => "unknown_request",
            LedgerError::NotRegistered(_) => "not_registered",
            LedgerError::NoMatchingDeposits(_) => "no_matching_deposits",
            LedgerError::AlreadyExecuted(_) => "already_executed",
            LedgerError::NoFundsRemaining { .. } => "no_funds_remaining",
            LedgerError::AmountOverflow(_) => "amount_overflow",
            LedgerError::UnknownOracleRequest(_) => "unknown_oracle_request",
            LedgerError::TransferFailed(_) => "transfer_failed",
            LedgerError::OracleUnavailable(_) => "oracle_unavailable",
            LedgerError::InvalidPolicy(_) => "invalid_policy",
        }
    }
}

/// Result type alias for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
