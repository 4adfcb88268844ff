//! Custody Ledger: the settlement core behind one entry point
//!
//! Owns the store, the journal and the pending oracle requests, and routes
//! each caller-facing operation to the component that implements it after
//! checking the caller's role. Every operation borrows the ledger mutably
//! for its whole duration.

use bounty_types::{
    AccountId, Amount, Category, ConfirmationOutcome, Deposit, DepositId, EventJournal,
    ExternalHandle, ExternalRef, GroupKey, LedgerError, LedgerEvent, LedgerPolicy, LedgerResult,
    OracleRequestId, PendingWithdrawal, Registration, WithdrawalId,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::attestor_set::AttestorSet;
use crate::blacklist_gate::BlacklistGate;
use crate::collaborators::{Collaborators, OracleVerdict};
use crate::deposit_manager::{DepositManager, DepositReceipt, RefundReceipt};
use crate::oracle_gateway::{OracleGateway, OracleSubject, PendingOracleRequest};
use crate::registration_workflow::{RegistrationTicket, RegistrationWorkflow};
use crate::store::LedgerStore;
use crate::withdrawal_quorum::{WithdrawalOutcome, WithdrawalQuorum, WithdrawalTicket};

/// Result of routing an oracle answer
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionOutcome {
    Registration(ConfirmationOutcome),
    Withdrawal(WithdrawalOutcome),
    /// The attestor declined to vouch; nothing was counted
    Rejected {
        subject: OracleSubject,
        reason: String,
    },
}

/// Bounty custody ledger: deposits, registrations and withdrawals
pub struct CustodyLedger {
    policy: LedgerPolicy,
    store: LedgerStore,
    journal: EventJournal,
    gateway: OracleGateway,
    blacklist: BlacklistGate,
    attestors: AttestorSet,
    deposits: DepositManager,
    registrations: RegistrationWorkflow,
    withdrawals: WithdrawalQuorum,
    collaborators: Collaborators,
}

impl CustodyLedger {
    /// Create an empty ledger owned by `operator`, the bootstrap attestor
    pub fn new(
        policy: LedgerPolicy,
        operator: AccountId,
        collaborators: Collaborators,
    ) -> LedgerResult<Self> {
        policy.validate()?;
        info!(
            operator = %operator,
            max_lock_days = policy.max_lock_days,
            registration_quorum = policy.registration_quorum,
            withdrawal_quorum = policy.withdrawal_quorum,
            "Custody ledger initialized"
        );

        Ok(Self {
            store: LedgerStore::new(),
            journal: EventJournal::new(),
            gateway: OracleGateway::new(),
            blacklist: BlacklistGate::new(),
            attestors: AttestorSet::new(operator),
            deposits: DepositManager::new(policy.clone()),
            registrations: RegistrationWorkflow::new(policy.registration_quorum),
            withdrawals: WithdrawalQuorum::new(&policy),
            policy,
            collaborators,
        })
    }

    /// The policy the ledger was created with
    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    /// The owner account, which can never be removed as an attestor
    pub fn operator(&self) -> &AccountId {
        self.attestors.owner()
    }

    /// Events recorded so far, oldest first
    pub fn journal(&self) -> &EventJournal {
        &self.journal
    }

    pub fn journal_mut(&mut self) -> &mut EventJournal {
        &mut self.journal
    }

    // ------------------------------------------------------------------
    // Deposits
    // ------------------------------------------------------------------

    /// Lock `amount` against a group, topping up the caller's live deposit
    pub fn deposit(
        &mut self,
        depositor: &AccountId,
        category: Category,
        external_ref: ExternalRef,
        amount: Amount,
        lock_days: u32,
    ) -> LedgerResult<DepositReceipt> {
        self.deposits.deposit(
            &mut self.store,
            &self.collaborators,
            &mut self.journal,
            depositor,
            category,
            external_ref,
            amount,
            lock_days,
        )
    }

    /// Refund one of the caller's unlocked deposits
    pub fn refund(
        &mut self,
        caller: &AccountId,
        deposit_id: DepositId,
    ) -> LedgerResult<RefundReceipt> {
        self.deposits.refund(
            &mut self.store,
            &self.collaborators,
            &mut self.journal,
            caller,
            deposit_id,
        )
    }

    /// Refund every unlocked deposit the caller holds
    pub fn refund_all(&mut self, caller: &AccountId) -> LedgerResult<RefundReceipt> {
        self.deposits
            .refund_all(&mut self.store, &self.collaborators, &mut self.journal, caller)
    }

    /// Refund the caller's unlocked deposits among `deposit_ids`
    pub fn refund_selected(
        &mut self,
        caller: &AccountId,
        deposit_ids: &[DepositId],
    ) -> LedgerResult<RefundReceipt> {
        self.deposits.refund_selected(
            &mut self.store,
            &self.collaborators,
            &mut self.journal,
            caller,
            deposit_ids,
        )
    }

    /// Refund a deposit past its lock; operator only
    pub fn force_refund(
        &mut self,
        caller: &AccountId,
        deposit_id: DepositId,
    ) -> LedgerResult<RefundReceipt> {
        self.ensure_operator(caller, "force refund")?;
        self.deposits.force_refund(
            &mut self.store,
            &self.collaborators,
            &mut self.journal,
            deposit_id,
        )
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Bind the caller to `handle`, pending attestation
    pub fn register(
        &mut self,
        caller: &AccountId,
        handle: ExternalHandle,
    ) -> LedgerResult<RegistrationTicket> {
        self.registrations.register(
            &mut self.store,
            &mut self.gateway,
            &self.blacklist,
            &self.collaborators,
            &mut self.journal,
            caller,
            handle,
        )
    }

    /// Count an attestor's confirmation of a (handle, account) binding
    pub fn confirm_registration(
        &mut self,
        attestor: &AccountId,
        handle: &ExternalHandle,
        account: &AccountId,
    ) -> LedgerResult<ConfirmationOutcome> {
        self.attestors.ensure_attestor(attestor)?;
        let now = self.collaborators.now();
        self.registrations.confirm(
            &mut self.store,
            &mut self.gateway,
            &self.blacklist,
            &mut self.journal,
            attestor,
            handle,
            account,
            now,
        )
    }

    // ------------------------------------------------------------------
    // Withdrawals
    // ------------------------------------------------------------------

    /// Open a withdrawal of a pull request's deposits for the caller
    pub fn request_withdrawal(
        &mut self,
        caller: &AccountId,
        external_ref: ExternalRef,
    ) -> LedgerResult<WithdrawalTicket> {
        self.withdrawals.request(
            &mut self.store,
            &mut self.gateway,
            &self.blacklist,
            &self.collaborators,
            &mut self.journal,
            caller,
            external_ref,
        )
    }

    /// Count an attestor's confirmation; pays out at quorum
    pub fn confirm_withdrawal(
        &mut self,
        attestor: &AccountId,
        withdrawal_id: WithdrawalId,
    ) -> LedgerResult<WithdrawalOutcome> {
        self.attestors.ensure_attestor(attestor)?;
        self.withdrawals.confirm(
            &mut self.store,
            &mut self.gateway,
            &self.blacklist,
            &self.collaborators,
            &mut self.journal,
            attestor,
            withdrawal_id,
        )
    }

    /// Route an attestor's answer to the request it correlates with
    pub fn complete(
        &mut self,
        request_id: &OracleRequestId,
        attestor: &AccountId,
        verdict: OracleVerdict,
    ) -> LedgerResult<CompletionOutcome> {
        self.attestors.ensure_attestor(attestor)?;
        let subject = self
            .gateway
            .subject(request_id)
            .cloned()
            .ok_or_else(|| LedgerError::UnknownOracleRequest(request_id.clone()))?;

        if let OracleVerdict::Rejected { reason } = verdict {
            warn!(
                request_id = %request_id,
                attestor = %attestor,
                subject = ?subject,
                reason = %reason,
                "Attestor rejected oracle request"
            );
            return Ok(CompletionOutcome::Rejected { subject, reason });
        }

        match subject {
            OracleSubject::Registration(handle) => {
                let account = self
                    .store
                    .registration(&handle)
                    .map(|r| r.bound_account.clone())
                    .ok_or_else(|| LedgerError::UnknownOracleRequest(request_id.clone()))?;
                self.confirm_registration(attestor, &handle, &account)
                    .map(CompletionOutcome::Registration)
            }
            OracleSubject::Withdrawal(id) => self
                .confirm_withdrawal(attestor, id)
                .map(CompletionOutcome::Withdrawal),
        }
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    /// Enroll an attestor; operator only
    pub fn add_attestor(&mut self, caller: &AccountId, attestor: AccountId) -> LedgerResult<bool> {
        self.ensure_operator(caller, "add attestor")?;
        let added = self.attestors.add(attestor.clone());
        if added {
            self.journal.record(
                LedgerEvent::AttestorAdded { attestor },
                self.collaborators.now(),
            );
        }
        Ok(added)
    }

    /// Remove an attestor; operator only, never the owner
    pub fn remove_attestor(
        &mut self,
        caller: &AccountId,
        attestor: &AccountId,
    ) -> LedgerResult<bool> {
        self.ensure_operator(caller, "remove attestor")?;
        let removed = self.attestors.remove(attestor)?;
        if removed {
            self.journal.record(
                LedgerEvent::AttestorRemoved {
                    attestor: attestor.clone(),
                },
                self.collaborators.now(),
            );
        }
        Ok(removed)
    }

    /// Idempotent; returns whether the blacklist changed
    pub fn add_to_blacklist(
        &mut self,
        caller: &AccountId,
        handle: ExternalHandle,
    ) -> LedgerResult<bool> {
        self.ensure_blacklist_admin(caller)?;
        let added = self.blacklist.add(handle.clone());
        if added {
            self.journal.record(
                LedgerEvent::BlacklistUpdated {
                    handle,
                    blacklisted: true,
                },
                self.collaborators.now(),
            );
        }
        Ok(added)
    }

    /// Idempotent; returns whether the blacklist changed
    pub fn remove_from_blacklist(
        &mut self,
        caller: &AccountId,
        handle: &ExternalHandle,
    ) -> LedgerResult<bool> {
        self.ensure_blacklist_admin(caller)?;
        let removed = self.blacklist.remove(handle);
        if removed {
            self.journal.record(
                LedgerEvent::BlacklistUpdated {
                    handle: handle.clone(),
                    blacklisted: false,
                },
                self.collaborators.now(),
            );
        }
        Ok(removed)
    }

    fn ensure_operator(&self, caller: &AccountId, action: &str) -> LedgerResult<()> {
        if self.attestors.is_owner(caller) {
            return Ok(());
        }
        warn!(caller = %caller, action, "Operator action refused");
        Err(LedgerError::Unauthorized {
            caller: caller.clone(),
            action: action.to_string(),
        })
    }

    fn ensure_blacklist_admin(&self, caller: &AccountId) -> LedgerResult<()> {
        if self.attestors.is_attestor(caller) || self.attestors.is_owner(caller) {
            return Ok(());
        }
        Err(LedgerError::Unauthorized {
            caller: caller.clone(),
            action: "update blacklist".to_string(),
        })
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// A deposit by id, tombstoned or not
    pub fn get_deposit(&self, id: DepositId) -> Option<&Deposit> {
        self.store.deposit(id)
    }

    /// Live deposits of `depositor`
    pub fn deposits_of(&self, depositor: &AccountId) -> Vec<&Deposit> {
        self.store
            .active_of(depositor)
            .into_iter()
            .filter_map(|id| self.store.deposit(id))
            .collect()
    }

    /// Every deposit `depositor` ever made, tombstones included
    pub fn deposit_history(&self, depositor: &AccountId) -> Vec<&Deposit> {
        self.store.history_of(depositor)
    }

    /// Live balance of a (category, reference) group
    pub fn group_balance(
        &self,
        category: Category,
        external_ref: ExternalRef,
    ) -> LedgerResult<Amount> {
        self.store.group_balance(&GroupKey::new(category, external_ref))
    }

    /// Sum of every live deposit
    pub fn total_custody(&self) -> Amount {
        self.store.total_custody()
    }

    /// The registration currently held under `handle`
    pub fn registration(&self, handle: &ExternalHandle) -> Option<&Registration> {
        self.store.registration(handle)
    }

    /// The handle `account` is bound to
    pub fn handle_of(&self, account: &AccountId) -> Option<&ExternalHandle> {
        self.store.handle_of(account)
    }

    /// A withdrawal request by id
    pub fn withdrawal(&self, id: WithdrawalId) -> Option<&PendingWithdrawal> {
        self.store.withdrawal(id)
    }

    /// Withdrawal requests not yet executed
    pub fn pending_withdrawals(&self) -> Vec<&PendingWithdrawal> {
        self.store.pending_withdrawals()
    }

    /// Current attestors, owner included
    pub fn attestors(&self) -> Vec<&AccountId> {
        self.attestors.iter().collect()
    }

    pub fn is_attestor(&self, account: &AccountId) -> bool {
        self.attestors.is_attestor(account)
    }

    pub fn is_blacklisted(&self, handle: &ExternalHandle) -> bool {
        self.blacklist.is_blacklisted(handle)
    }

    pub fn pending_oracle_requests(&self) -> Vec<&PendingOracleRequest> {
        self.gateway.pending().collect()
    }
}
