//! Withdrawal Quorum: releasing a pull request's deposits to its claimant
//!
//! A confirmed claimant requests a withdrawal against a pull request. The
//! request collects confirmations from distinct attestors and executes
//! exactly once when quorum is reached: every live deposit in the group is
//! zeroed, the request is marked executed, and only then is the aggregate
//! transferred. A failed transfer rolls all of that back, including the
//! confirmation that triggered it.
//!
//! Requests have no expiry. A request that never reaches quorum stays
//! pending.

use bounty_types::{
    AccountId, Amount, DepositId, EventJournal, ExternalRef, GroupKey, LedgerError, LedgerEvent,
    LedgerPolicy, LedgerResult, OracleRequestId, PendingWithdrawal, WithdrawalId,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::blacklist_gate::BlacklistGate;
use crate::collaborators::{Collaborators, OracleFact};
use crate::oracle_gateway::{OracleGateway, OracleSubject};
use crate::reward_issuance::RewardIssuer;
use crate::store::LedgerStore;

/// Handed back to the caller of `request`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WithdrawalTicket {
    pub withdrawal_id: WithdrawalId,
    pub group: GroupKey,
    /// Group balance at request time; the payout is whatever remains at
    /// execution
    pub balance: Amount,
    pub request_id: OracleRequestId,
}

/// A completed payout
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Settlement {
    pub withdrawal_id: WithdrawalId,
    pub claimant: AccountId,
    pub amount: Amount,
    pub deposit_ids: Vec<DepositId>,
    /// Contributor reward minted for deposits made by others
    pub claim_reward: Amount,
}

/// Result of confirming a withdrawal
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WithdrawalOutcome {
    Accepted { confirmations: usize, quorum: u32 },
    Duplicate { confirmations: usize },
    Executed(Settlement),
}

/// Collects withdrawal confirmations and settles a group at quorum
#[derive(Clone, Debug)]
pub struct WithdrawalQuorum {
    quorum: u32,
    rewards: RewardIssuer,
}

impl WithdrawalQuorum {
    /// Create a quorum tracker with the policy's withdrawal quorum
    pub fn new(policy: &LedgerPolicy) -> Self {
        Self {
            quorum: policy.withdrawal_quorum,
            rewards: RewardIssuer::new(policy),
        }
    }

    /// Open a withdrawal against the pull request `external_ref`
    #[allow(clippy::too_many_arguments)]
    pub fn request(
        &self,
        store: &mut LedgerStore,
        gateway: &mut OracleGateway,
        blacklist: &BlacklistGate,
        collaborators: &Collaborators,
        journal: &mut EventJournal,
        caller: &AccountId,
        external_ref: ExternalRef,
    ) -> LedgerResult<WithdrawalTicket> {
        let handle = store
            .registration_of(caller)
            .filter(|r| r.is_confirmed())
            .map(|r| r.handle.clone())
            .ok_or_else(|| LedgerError::NotRegistered(caller.clone()))?;

        if blacklist.is_blacklisted(&handle) {
            return Err(LedgerError::Blacklisted(handle));
        }

        let group = GroupKey::pull_request(external_ref);
        let balance = store.group_balance(&group)?;
        if balance.is_zero() {
            return Err(LedgerError::NoMatchingDeposits(group));
        }

        let now = collaborators.now();
        let withdrawal_id = store.next_withdrawal_id();
        store.insert_withdrawal(PendingWithdrawal::new(
            withdrawal_id,
            caller.clone(),
            handle.clone(),
            group.clone(),
            now,
        ));

        let fact = OracleFact::WorkAccepted {
            group: group.clone(),
            handle: handle.clone(),
            claimant: caller.clone(),
        };
        let request_id = match gateway.dispatch(
            collaborators.oracle.as_ref(),
            OracleSubject::Withdrawal(withdrawal_id),
            fact,
            now,
        ) {
            Ok(id) => id,
            Err(err) => {
                store.discard_withdrawal(withdrawal_id);
                return Err(err);
            }
        };

        if let Some(withdrawal) = store.withdrawal_mut(withdrawal_id) {
            withdrawal.oracle_request = Some(request_id.clone());
        }

        info!(
            withdrawal_id = %withdrawal_id,
            claimant = %caller,
            handle = %handle,
            group = %group,
            balance = balance.0,
            "Withdrawal requested"
        );

        journal.record(
            LedgerEvent::WithdrawalRequested {
                withdrawal_id,
                claimant: caller.clone(),
                group: group.clone(),
            },
            now,
        );

        Ok(WithdrawalTicket {
            withdrawal_id,
            group,
            balance,
            request_id,
        })
    }

    /// Count `attestor`'s confirmation; settle on reaching quorum
    ///
    /// The caller must already have checked that `attestor` is authorized.
    #[allow(clippy::too_many_arguments)]
    pub fn confirm(
        &self,
        store: &mut LedgerStore,
        gateway: &mut OracleGateway,
        blacklist: &BlacklistGate,
        collaborators: &Collaborators,
        journal: &mut EventJournal,
        attestor: &AccountId,
        withdrawal_id: WithdrawalId,
    ) -> LedgerResult<WithdrawalOutcome> {
        let withdrawal = store
            .withdrawal(withdrawal_id)
            .ok_or_else(|| LedgerError::UnknownRequest(withdrawal_id.to_string()))?;

        if withdrawal.is_executed() {
            return Err(LedgerError::AlreadyExecuted(withdrawal_id));
        }

        let claimant = withdrawal.claimant.clone();
        let handle = withdrawal.handle.clone();
        let group = withdrawal.group.clone();

        // The claimant's binding may have been superseded since the request.
        let still_bound = store
            .registration(&handle)
            .is_some_and(|r| r.bound_account == claimant && r.is_confirmed());
        if !still_bound {
            return Err(LedgerError::NotRegistered(claimant));
        }
        if blacklist.is_blacklisted(&handle) {
            return Err(LedgerError::Blacklisted(handle));
        }
        if store.group_balance(&group)?.is_zero() {
            return Err(LedgerError::NoFundsRemaining {
                id: withdrawal_id,
                group,
            });
        }

        let withdrawal = store
            .withdrawal_mut(withdrawal_id)
            .ok_or_else(|| LedgerError::UnknownRequest(withdrawal_id.to_string()))?;
        if !withdrawal.confirmations.record(attestor.clone()) {
            debug!(
                withdrawal_id = %withdrawal_id,
                attestor = %attestor,
                "Repeat withdrawal confirmation ignored"
            );
            return Ok(WithdrawalOutcome::Duplicate {
                confirmations: withdrawal.confirmations.count(),
            });
        }

        let confirmations = withdrawal.confirmations.count();
        debug!(
            withdrawal_id = %withdrawal_id,
            attestor = %attestor,
            confirmations,
            quorum = self.quorum,
            "Withdrawal confirmation recorded"
        );

        if !withdrawal.confirmations.reaches(self.quorum) {
            return Ok(WithdrawalOutcome::Accepted {
                confirmations,
                quorum: self.quorum,
            });
        }

        self.settle(
            store,
            gateway,
            collaborators,
            journal,
            attestor,
            withdrawal_id,
        )
        .map(WithdrawalOutcome::Executed)
    }

    fn settle(
        &self,
        store: &mut LedgerStore,
        gateway: &mut OracleGateway,
        collaborators: &Collaborators,
        journal: &mut EventJournal,
        attestor: &AccountId,
        withdrawal_id: WithdrawalId,
    ) -> LedgerResult<Settlement> {
        let now = collaborators.now();
        let (claimant, group) = store
            .withdrawal(withdrawal_id)
            .map(|w| (w.claimant.clone(), w.group.clone()))
            .ok_or_else(|| LedgerError::UnknownRequest(withdrawal_id.to_string()))?;

        let live: Vec<(DepositId, Amount, AccountId)> = store
            .active_in_group(&group)
            .into_iter()
            .filter_map(|id| store.deposit(id).map(|d| (id, d.amount, d.depositor.clone())))
            .collect();

        // Totals are computed before anything moves; others' deposits earn
        // the claimant a contributor reward.
        let totals = live.iter().try_fold(
            (Amount::zero(), Amount::zero()),
            |(total, contributed), (_, amount, depositor)| {
                let contributed = if depositor == &claimant {
                    contributed
                } else {
                    contributed.checked_add(*amount)?
                };
                Some((total.checked_add(*amount)?, contributed))
            },
        );
        let Some((total, contributed)) = totals else {
            if let Some(withdrawal) = store.withdrawal_mut(withdrawal_id) {
                withdrawal.confirmations.retract(attestor);
            }
            return Err(LedgerError::AmountOverflow(group.to_string()));
        };

        // Effects first: zero the group and mark the request executed.
        let mut zeroed: Vec<(DepositId, Amount)> = Vec::with_capacity(live.len());
        for (id, _, _) in &live {
            if let Some(amount) = store.tombstone(*id) {
                zeroed.push((*id, amount));
            }
        }

        if let Some(withdrawal) = store.withdrawal_mut(withdrawal_id) {
            withdrawal.mark_executed(total, now);
        }

        // Then the interaction; undo every effect if it fails.
        if let Err(err) = collaborators.bank.transfer(&claimant, total) {
            warn!(
                withdrawal_id = %withdrawal_id,
                claimant = %claimant,
                amount = total.0,
                error = %err,
                "Withdrawal transfer failed, rolling back settlement"
            );
            for (id, amount) in &zeroed {
                store.restore(*id, *amount);
            }
            if let Some(withdrawal) = store.withdrawal_mut(withdrawal_id) {
                withdrawal.revert_execution();
                withdrawal.confirmations.retract(attestor);
            }
            return Err(err.into());
        }

        if let Some(request_id) = store
            .withdrawal(withdrawal_id)
            .and_then(|w| w.oracle_request.clone())
        {
            gateway.retire(&request_id);
        }

        let deposit_ids: Vec<DepositId> = zeroed.iter().map(|(id, _)| *id).collect();

        info!(
            withdrawal_id = %withdrawal_id,
            claimant = %claimant,
            group = %group,
            amount = total.0,
            deposits = deposit_ids.len(),
            "Withdrawal executed"
        );

        journal.record(
            LedgerEvent::WithdrawalExecuted {
                withdrawal_id,
                claimant: claimant.clone(),
                group,
                amount: total,
                deposit_ids: deposit_ids.clone(),
            },
            now,
        );

        let claim_reward = self.rewards.issue_claim_reward(
            collaborators.rewards.as_ref(),
            &claimant,
            contributed,
            journal,
            now,
        );

        Ok(Settlement {
            withdrawal_id,
            claimant,
            amount: total,
            deposit_ids,
            claim_reward,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::InMemoryCollaborators;
    use crate::registration_workflow::RegistrationWorkflow;
    use bounty_types::{Category, ExternalHandle};
    use chrono::Duration;

    struct Fixture {
        mem: InMemoryCollaborators,
        collaborators: Collaborators,
        store: LedgerStore,
        gateway: OracleGateway,
        blacklist: BlacklistGate,
        journal: EventJournal,
        quorum: WithdrawalQuorum,
    }

    fn setup(withdrawal_quorum: u32) -> Fixture {
        let mem = InMemoryCollaborators::new(chrono::Utc::now());
        let collaborators = mem.wire();
        let policy = LedgerPolicy::default().with_quorums(1, withdrawal_quorum);
        let mut fx = Fixture {
            mem,
            collaborators,
            store: LedgerStore::new(),
            gateway: OracleGateway::new(),
            blacklist: BlacklistGate::new(),
            journal: EventJournal::new(),
            quorum: WithdrawalQuorum::new(&policy),
        };
        fx.confirm_registration("bob", "bob-gh");
        fx
    }

    impl Fixture {
        fn confirm_registration(&mut self, who: &str, handle: &str) {
            let workflow = RegistrationWorkflow::new(1);
            workflow
                .register(
                    &mut self.store,
                    &mut self.gateway,
                    &self.blacklist,
                    &self.collaborators,
                    &mut self.journal,
                    &AccountId::new(who),
                    ExternalHandle::new(handle),
                )
                .unwrap();
            workflow
                .confirm(
                    &mut self.store,
                    &mut self.gateway,
                    &self.blacklist,
                    &mut self.journal,
                    &AccountId::new("operator"),
                    &ExternalHandle::new(handle),
                    &AccountId::new(who),
                    self.collaborators.now(),
                )
                .unwrap();
        }

        fn fund(&mut self, who: &str, reference: &str, amount: u64) -> DepositId {
            let now = self.collaborators.now();
            self.store
                .create_deposit(
                    Category::PullRequest,
                    ExternalRef::new(reference),
                    AccountId::new(who),
                    Amount::new(amount),
                    now,
                    now + Duration::days(30),
                )
                .unwrap()
        }

        fn request(&mut self, who: &str, reference: &str) -> LedgerResult<WithdrawalTicket> {
            self.quorum.request(
                &mut self.store,
                &mut self.gateway,
                &self.blacklist,
                &self.collaborators,
                &mut self.journal,
                &AccountId::new(who),
                ExternalRef::new(reference),
            )
        }

        fn confirm(&mut self, attestor: &str, id: WithdrawalId) -> LedgerResult<WithdrawalOutcome> {
            self.quorum.confirm(
                &mut self.store,
                &mut self.gateway,
                &self.blacklist,
                &self.collaborators,
                &mut self.journal,
                &AccountId::new(attestor),
                id,
            )
        }
    }

    #[test]
    fn test_request_requires_confirmed_registration() {
        let mut fx = setup(1);
        fx.fund("alice", "42", 100);
        assert!(matches!(
            fx.request("carol", "42"),
            Err(LedgerError::NotRegistered(_))
        ));
    }

    #[test]
    fn test_request_requires_funded_group() {
        let mut fx = setup(1);
        assert!(matches!(
            fx.request("bob", "42"),
            Err(LedgerError::NoMatchingDeposits(_))
        ));

        // Issue deposits do not fund pull request withdrawals
        let now = fx.collaborators.now();
        fx.store
            .create_deposit(
                Category::Issue,
                ExternalRef::new("42"),
                AccountId::new("alice"),
                Amount::new(10),
                now,
                now,
            )
            .unwrap();
        assert!(matches!(
            fx.request("bob", "42"),
            Err(LedgerError::NoMatchingDeposits(_))
        ));
    }

    #[test]
    fn test_settles_whole_group_once() {
        let mut fx = setup(2);
        let a = fx.fund("alice", "42", 100);
        let c = fx.fund("carol", "42", 50);
        fx.fund("alice", "43", 70);

        let ticket = fx.request("bob", "42").unwrap();
        assert_eq!(ticket.balance, Amount::new(150));

        let first = fx.confirm("oracle-1", ticket.withdrawal_id).unwrap();
        assert!(matches!(first, WithdrawalOutcome::Accepted { confirmations: 1, quorum: 2 }));
        let repeat = fx.confirm("oracle-1", ticket.withdrawal_id).unwrap();
        assert_eq!(repeat, WithdrawalOutcome::Duplicate { confirmations: 1 });
        assert!(fx.mem.bank.payouts().is_empty());

        let WithdrawalOutcome::Executed(settlement) =
            fx.confirm("oracle-2", ticket.withdrawal_id).unwrap()
        else {
            panic!("expected execution");
        };
        assert_eq!(settlement.amount, Amount::new(150));
        assert_eq!(settlement.deposit_ids, vec![a, c]);
        assert_eq!(fx.mem.bank.paid_to(&AccountId::new("bob")), Amount::new(150));
        assert!(fx.store.deposit(a).unwrap().is_tombstoned());
        assert_eq!(
            fx.store
                .group_balance(&GroupKey::pull_request(ExternalRef::new("43")))
                .unwrap(),
            Amount::new(70)
        );

        assert!(matches!(
            fx.confirm("oracle-3", ticket.withdrawal_id),
            Err(LedgerError::AlreadyExecuted(_))
        ));
        assert_eq!(fx.mem.bank.payouts().len(), 1);
    }

    #[test]
    fn test_full_range_group_settles_without_loss() {
        let mut fx = setup(1);
        let a = fx.fund("alice", "42", u64::MAX - 1);
        let c = fx.fund("carol", "42", 1);
        let now = fx.collaborators.now();
        assert!(matches!(
            fx.store.create_deposit(
                Category::PullRequest,
                ExternalRef::new("42"),
                AccountId::new("dave"),
                Amount::new(u64::MAX),
                now,
                now,
            ),
            Err(LedgerError::InvalidAmount)
        ));

        let ticket = fx.request("bob", "42").unwrap();
        assert_eq!(ticket.balance, Amount::new(u64::MAX));
        let WithdrawalOutcome::Executed(settlement) =
            fx.confirm("oracle-1", ticket.withdrawal_id).unwrap()
        else {
            panic!("expected execution");
        };

        assert_eq!(settlement.deposit_ids, vec![a, c]);
        assert_eq!(settlement.amount, Amount::new(u64::MAX));
        assert_eq!(fx.mem.bank.paid_to(&AccountId::new("bob")), Amount::new(u64::MAX));
        assert!(fx.store.total_custody().is_zero());
    }

    #[test]
    fn test_drained_group_rejects_confirmation() {
        let mut fx = setup(2);
        let a = fx.fund("alice", "42", 100);
        let ticket = fx.request("bob", "42").unwrap();
        fx.confirm("oracle-1", ticket.withdrawal_id).unwrap();

        fx.store.tombstone(a);
        assert!(matches!(
            fx.confirm("oracle-2", ticket.withdrawal_id),
            Err(LedgerError::NoFundsRemaining { .. })
        ));
    }

    #[test]
    fn test_transfer_failure_rolls_back_settlement() {
        let mut fx = setup(1);
        let a = fx.fund("alice", "42", 100);
        let ticket = fx.request("bob", "42").unwrap();
        let events_before = fx.journal.len();

        fx.mem.bank.set_failing(true);
        assert!(matches!(
            fx.confirm("oracle-1", ticket.withdrawal_id),
            Err(LedgerError::TransferFailed(_))
        ));

        let withdrawal = fx.store.withdrawal(ticket.withdrawal_id).unwrap();
        assert!(withdrawal.is_pending());
        assert_eq!(withdrawal.confirmations.count(), 0);
        assert_eq!(fx.store.deposit(a).unwrap().amount, Amount::new(100));
        assert_eq!(fx.journal.len(), events_before);

        fx.mem.bank.set_failing(false);
        assert!(matches!(
            fx.confirm("oracle-1", ticket.withdrawal_id),
            Ok(WithdrawalOutcome::Executed(_))
        ));
    }

    #[test]
    fn test_claim_reward_only_for_others_deposits() {
        let mut fx = setup(1);
        fx.fund("bob", "42", 40);
        fx.fund("alice", "42", 60);
        let ticket = fx.request("bob", "42").unwrap();

        let WithdrawalOutcome::Executed(settlement) =
            fx.confirm("oracle-1", ticket.withdrawal_id).unwrap()
        else {
            panic!("expected execution");
        };
        assert_eq!(settlement.amount, Amount::new(100));
        assert_eq!(settlement.claim_reward, Amount::new(60));
        assert_eq!(fx.mem.rewards.balance_of(&AccountId::new("bob")), Amount::new(60));
    }

    #[test]
    fn test_self_claim_mints_nothing() {
        let mut fx = setup(1);
        fx.fund("bob", "42", 40);
        let ticket = fx.request("bob", "42").unwrap();
        fx.confirm("oracle-1", ticket.withdrawal_id).unwrap();

        assert!(fx.mem.rewards.total_supply().is_zero());
        assert!(fx.journal.of_kind("reward_issued").is_empty());
    }

    #[test]
    fn test_blacklisted_claimant_cannot_request() {
        let mut fx = setup(1);
        fx.fund("alice", "42", 100);
        fx.blacklist.add(ExternalHandle::new("bob-gh"));
        assert!(matches!(
            fx.request("bob", "42"),
            Err(LedgerError::Blacklisted(_))
        ));
    }

    #[test]
    fn test_superseded_claimant_cannot_settle() {
        let mut fx = setup(1);
        fx.fund("alice", "42", 100);
        let ticket = fx.request("bob", "42").unwrap();

        fx.confirm_registration("mallory", "bob-gh");
        assert!(matches!(
            fx.confirm("oracle-1", ticket.withdrawal_id),
            Err(LedgerError::NotRegistered(_))
        ));
        assert!(fx.mem.bank.payouts().is_empty());
    }

    #[test]
    fn test_unknown_withdrawal() {
        let mut fx = setup(1);
        assert!(matches!(
            fx.confirm("oracle-1", WithdrawalId(99)),
            Err(LedgerError::UnknownRequest(_))
        ));
    }
}
