//! Registrations: binding a ledger account to an external handle

use crate::{AccountId, Confirmations, ExternalHandle, OracleRequestId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a registration round
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RegistrationStatus {
    /// Waiting for attestors to vouch for the binding
    #[default]
    Pending,
    /// Quorum reached; the account may claim for this handle
    Confirmed,
}

/// The current binding of one external handle
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub handle: ExternalHandle,
    pub bound_account: AccountId,
    pub confirmations: Confirmations,
    pub status: RegistrationStatus,
    pub requested_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Outbound oracle request for this round
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oracle_request: Option<OracleRequestId>,
}

impl Registration {
    pub fn new(handle: ExternalHandle, bound_account: AccountId, now: DateTime<Utc>) -> Self {
        Self {
            handle,
            bound_account,
            confirmations: Confirmations::new(),
            status: RegistrationStatus::Pending,
            requested_at: now,
            confirmed_at: None,
            oracle_request: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, RegistrationStatus::Pending)
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self.status, RegistrationStatus::Confirmed)
    }

    pub fn confirm(&mut self, now: DateTime<Utc>) {
        self.status = RegistrationStatus::Confirmed;
        self.confirmed_at = Some(now);
    }
}
