//! Registration Workflow: binding accounts to external handles
//!
//! A caller claims a handle; the claim is published to the attestors and
//! stays `Pending` until enough distinct attestors vouch for it. A new claim
//! on a handle supersedes the previous binding immediately, so a handle is
//! never bound to two accounts at once.

use bounty_types::{
    AccountId, ConfirmationOutcome, EventJournal, ExternalHandle, LedgerError, LedgerEvent,
    LedgerResult, OracleRequestId, Registration,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::blacklist_gate::BlacklistGate;
use crate::collaborators::{Collaborators, OracleFact};
use crate::oracle_gateway::{OracleGateway, OracleSubject};
use crate::store::LedgerStore;

/// Handed back to the caller of `register`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RegistrationTicket {
    pub handle: ExternalHandle,
    pub request_id: OracleRequestId,
    /// Account whose binding to the handle was invalidated
    pub superseded: Option<AccountId>,
}

/// Binds accounts to external handles once enough attestors confirm
#[derive(Clone, Debug)]
pub struct RegistrationWorkflow {
    quorum: u32,
}

impl RegistrationWorkflow {
    /// Create a workflow requiring `quorum` distinct confirmations
    pub fn new(quorum: u32) -> Self {
        Self { quorum }
    }

    /// Bind `caller` to `handle`, pending attestation
    #[allow(clippy::too_many_arguments)]
    pub fn register(
        &self,
        store: &mut LedgerStore,
        gateway: &mut OracleGateway,
        blacklist: &BlacklistGate,
        collaborators: &Collaborators,
        journal: &mut EventJournal,
        caller: &AccountId,
        handle: ExternalHandle,
    ) -> LedgerResult<RegistrationTicket> {
        if blacklist.is_blacklisted(&handle) {
            return Err(LedgerError::Blacklisted(handle));
        }

        let now = collaborators.now();
        let undo = store.bind_registration(Registration::new(handle.clone(), caller.clone(), now));
        let superseded = undo.superseded_account().cloned();

        // Rounds for displaced bindings can no longer complete.
        let stale: Vec<OracleRequestId> = [undo.previous_for_handle(), undo.previous_for_account()]
            .into_iter()
            .flatten()
            .filter_map(|r| r.oracle_request.clone())
            .collect();
        let retired: Vec<_> = stale.iter().filter_map(|id| gateway.retire(id)).collect();

        let fact = OracleFact::HandleOwnership {
            handle: handle.clone(),
            account: caller.clone(),
        };
        let request_id = match gateway.dispatch(
            collaborators.oracle.as_ref(),
            OracleSubject::Registration(handle.clone()),
            fact,
            now,
        ) {
            Ok(id) => id,
            Err(err) => {
                store.undo_binding(undo);
                for pending in retired {
                    gateway.reinstate(pending);
                }
                return Err(err);
            }
        };

        if let Some(registration) = store.registration_mut(&handle) {
            registration.oracle_request = Some(request_id.clone());
        }

        info!(
            handle = %handle,
            account = %caller,
            superseded = ?superseded,
            request_id = %request_id,
            "Registration requested"
        );

        journal.record(
            LedgerEvent::RegistrationRequested {
                handle: handle.clone(),
                account: caller.clone(),
                superseded: superseded.clone(),
            },
            now,
        );

        Ok(RegistrationTicket {
            handle,
            request_id,
            superseded,
        })
    }

    /// Count `attestor`'s confirmation of the (handle, account) binding
    ///
    /// The caller must already have checked that `attestor` is authorized.
    #[allow(clippy::too_many_arguments)]
    pub fn confirm(
        &self,
        store: &mut LedgerStore,
        gateway: &mut OracleGateway,
        blacklist: &BlacklistGate,
        journal: &mut EventJournal,
        attestor: &AccountId,
        handle: &ExternalHandle,
        account: &AccountId,
        now: DateTime<Utc>,
    ) -> LedgerResult<ConfirmationOutcome> {
        let registration = store
            .registration_mut(handle)
            .filter(|r| &r.bound_account == account && r.is_pending())
            .ok_or_else(|| {
                LedgerError::UnknownRequest(format!("registration of {} by {}", handle, account))
            })?;

        if blacklist.is_blacklisted(handle) {
            return Err(LedgerError::Blacklisted(handle.clone()));
        }

        if !registration.confirmations.record(attestor.clone()) {
            debug!(
                handle = %handle,
                attestor = %attestor,
                "Repeat registration confirmation ignored"
            );
            return Ok(ConfirmationOutcome::Duplicate {
                confirmations: registration.confirmations.count(),
            });
        }

        let confirmations = registration.confirmations.count();
        debug!(
            handle = %handle,
            attestor = %attestor,
            confirmations,
            quorum = self.quorum,
            "Registration confirmation recorded"
        );

        if !registration.confirmations.reaches(self.quorum) {
            return Ok(ConfirmationOutcome::Accepted {
                confirmations,
                quorum: self.quorum,
            });
        }

        registration.confirm(now);
        if let Some(request_id) = registration.oracle_request.clone() {
            gateway.retire(&request_id);
        }

        info!(handle = %handle, account = %account, confirmations, "Registration confirmed");

        journal.record(
            LedgerEvent::RegistrationConfirmed {
                handle: handle.clone(),
                account: account.clone(),
                confirmations,
            },
            now,
        );

        Ok(ConfirmationOutcome::QuorumReached)
    }
}
