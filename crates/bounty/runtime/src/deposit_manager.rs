//! Deposit Manager: locking value and refunding it
//!
//! Wraps the store's deposit arena with the lock policy, reward issuance
//! and the refund paths. Every payout follows the same discipline:
//! validate, tombstone, then transfer. A failed transfer restores the
//! tombstoned amounts before the error is returned, so a failed refund
//! leaves the ledger untouched.

use bounty_types::{
    AccountId, Amount, Category, DepositId, EventJournal, ExternalRef, LedgerError, LedgerEvent,
    LedgerPolicy, LedgerResult,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::collaborators::Collaborators;
use crate::reward_issuance::RewardIssuer;
use crate::store::LedgerStore;

/// Outcome of a deposit
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DepositReceipt {
    pub deposit_id: DepositId,
    /// Whether a new entry was created rather than topped up
    pub created: bool,
    /// Cumulative amount of the entry
    pub amount: Amount,
    pub locked_until: DateTime<Utc>,
    pub reward: Amount,
}

/// Outcome of a refund
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RefundReceipt {
    pub deposit_ids: Vec<DepositId>,
    pub depositor: AccountId,
    pub amount: Amount,
}

/// Applies the lock policy to deposits and pays out refunds
#[derive(Clone, Debug)]
pub struct DepositManager {
    policy: LedgerPolicy,
    rewards: RewardIssuer,
}

impl DepositManager {
    /// Create a deposit manager enforcing `policy`
    pub fn new(policy: LedgerPolicy) -> Self {
        let rewards = RewardIssuer::new(&policy);
        Self { policy, rewards }
    }

    /// Lock `amount` against (category, reference) for up to `lock_days`
    #[allow(clippy::too_many_arguments)]
    pub fn deposit(
        &self,
        store: &mut LedgerStore,
        collaborators: &Collaborators,
        journal: &mut EventJournal,
        depositor: &AccountId,
        category: Category,
        external_ref: ExternalRef,
        amount: Amount,
        lock_days: u32,
    ) -> LedgerResult<DepositReceipt> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount);
        }

        let lock_days = self.policy.cap_lock_days(lock_days);
        let now = collaborators.now();
        let horizon = self.policy.locked_until(now, lock_days);

        // The store refuses anything that would overflow total custody, so
        // group and depositor totals always fit as well.
        let (deposit_id, created) = match store.find_active(category, &external_ref, depositor) {
            Some(id) => {
                store.top_up(id, amount, horizon)?;
                (id, false)
            }
            None => {
                let id = store.create_deposit(
                    category,
                    external_ref,
                    depositor.clone(),
                    amount,
                    now,
                    horizon,
                )?;
                (id, true)
            }
        };

        let deposit = store
            .deposit(deposit_id)
            .ok_or(LedgerError::NotFound(deposit_id))?;
        let (total, locked_until, group) =
            (deposit.amount, deposit.locked_until, deposit.group_key());

        info!(
            deposit_id = %deposit_id,
            group = %group,
            depositor = %depositor,
            amount = amount.0,
            total = total.0,
            lock_days,
            "Deposit recorded"
        );

        journal.record(
            LedgerEvent::DepositUpdated {
                deposit_id,
                group,
                depositor: depositor.clone(),
                amount: total,
                locked_until,
            },
            now,
        );

        // Only the increment earns; earlier top-ups were rewarded when made.
        let reward = self.rewards.issue_reward(
            collaborators.rewards.as_ref(),
            depositor,
            amount,
            lock_days,
            journal,
            now,
        );

        Ok(DepositReceipt {
            deposit_id,
            created,
            amount: total,
            locked_until,
            reward,
        })
    }

    /// Refund one of the caller's unlocked deposits
    pub fn refund(
        &self,
        store: &mut LedgerStore,
        collaborators: &Collaborators,
        journal: &mut EventJournal,
        caller: &AccountId,
        deposit_id: DepositId,
    ) -> LedgerResult<RefundReceipt> {
        let now = collaborators.now();
        let deposit = store
            .deposit(deposit_id)
            .filter(|d| !d.is_tombstoned())
            .ok_or(LedgerError::NotFound(deposit_id))?;

        if &deposit.depositor != caller {
            return Err(LedgerError::Unauthorized {
                caller: caller.clone(),
                action: format!("refund {}", deposit_id),
            });
        }
        if !deposit.is_unlocked(now) {
            return Err(LedgerError::StillLocked {
                id: deposit_id,
                locked_until: deposit.locked_until,
            });
        }

        self.settle_refund(store, collaborators, journal, caller, &[deposit_id], false)
    }

    /// Refund a deposit regardless of its lock; operator use only
    pub fn force_refund(
        &self,
        store: &mut LedgerStore,
        collaborators: &Collaborators,
        journal: &mut EventJournal,
        deposit_id: DepositId,
    ) -> LedgerResult<RefundReceipt> {
        let depositor = store
            .deposit(deposit_id)
            .filter(|d| !d.is_tombstoned())
            .map(|d| d.depositor.clone())
            .ok_or(LedgerError::NotFound(deposit_id))?;

        warn!(deposit_id = %deposit_id, depositor = %depositor, "Forcing refund past lock");
        self.settle_refund(store, collaborators, journal, &depositor, &[deposit_id], true)
    }

    /// Refund every unlocked deposit the caller holds, in one transfer
    pub fn refund_all(
        &self,
        store: &mut LedgerStore,
        collaborators: &Collaborators,
        journal: &mut EventJournal,
        caller: &AccountId,
    ) -> LedgerResult<RefundReceipt> {
        let candidates = store.active_of(caller);
        self.refund_selected(store, collaborators, journal, caller, &candidates)
    }

    /// Refund those of `deposit_ids` that belong to the caller and are
    /// unlocked, in one transfer; other ids are skipped
    pub fn refund_selected(
        &self,
        store: &mut LedgerStore,
        collaborators: &Collaborators,
        journal: &mut EventJournal,
        caller: &AccountId,
        deposit_ids: &[DepositId],
    ) -> LedgerResult<RefundReceipt> {
        let now = collaborators.now();
        let eligible: Vec<DepositId> = deposit_ids
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter(|id| {
                store.deposit(*id).is_some_and(|d| {
                    &d.depositor == caller && !d.is_tombstoned() && d.is_unlocked(now)
                })
            })
            .collect();

        if eligible.is_empty() {
            return Err(LedgerError::NothingToRefund(caller.clone()));
        }

        self.settle_refund(store, collaborators, journal, caller, &eligible, false)
    }

    fn settle_refund(
        &self,
        store: &mut LedgerStore,
        collaborators: &Collaborators,
        journal: &mut EventJournal,
        depositor: &AccountId,
        deposit_ids: &[DepositId],
        forced: bool,
    ) -> LedgerResult<RefundReceipt> {
        let total = Amount::checked_sum(
            deposit_ids
                .iter()
                .filter_map(|id| store.deposit(*id))
                .map(|d| d.amount),
        )
        .ok_or_else(|| LedgerError::AmountOverflow(format!("refund to {}", depositor)))?;
        if total.is_zero() {
            return Err(LedgerError::NothingToRefund(depositor.clone()));
        }

        let mut zeroed = Vec::with_capacity(deposit_ids.len());
        for id in deposit_ids {
            if let Some(amount) = store.tombstone(*id) {
                zeroed.push((*id, amount));
            }
        }

        if let Err(err) = collaborators.bank.transfer(depositor, total) {
            warn!(
                depositor = %depositor,
                amount = total.0,
                error = %err,
                "Refund transfer failed, restoring deposits"
            );
            for (id, amount) in zeroed {
                store.restore(id, amount);
            }
            return Err(err.into());
        }

        let deposit_ids: Vec<DepositId> = zeroed.iter().map(|(id, _)| *id).collect();
        info!(
            depositor = %depositor,
            amount = total.0,
            deposits = deposit_ids.len(),
            forced,
            "Refund settled"
        );

        journal.record(
            LedgerEvent::DepositRefunded {
                deposit_ids: deposit_ids.clone(),
                depositor: depositor.clone(),
                amount: total,
                forced,
            },
            collaborators.now(),
        );

        Ok(RefundReceipt {
            deposit_ids,
            depositor: depositor.clone(),
            amount: total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{Clock, InMemoryCollaborators};
    use chrono::{Duration, TimeZone};

    struct Fixture {
        mem: InMemoryCollaborators,
        collaborators: Collaborators,
        store: LedgerStore,
        journal: EventJournal,
        manager: DepositManager,
    }

    fn setup() -> Fixture {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mem = InMemoryCollaborators::new(start);
        let collaborators = mem.wire();
        Fixture {
            mem,
            collaborators,
            store: LedgerStore::new(),
            journal: EventJournal::new(),
            manager: DepositManager::new(LedgerPolicy::default()),
        }
    }

    impl Fixture {
        fn deposit(
            &mut self,
            who: &str,
            reference: &str,
            amount: u64,
            lock_days: u32,
        ) -> LedgerResult<DepositReceipt> {
            self.manager.deposit(
                &mut self.store,
                &self.collaborators,
                &mut self.journal,
                &AccountId::new(who),
                Category::PullRequest,
                ExternalRef::new(reference),
                Amount::new(amount),
                lock_days,
            )
        }

        fn refund(&mut self, who: &str, id: DepositId) -> LedgerResult<RefundReceipt> {
            self.manager.refund(
                &mut self.store,
                &self.collaborators,
                &mut self.journal,
                &AccountId::new(who),
                id,
            )
        }
    }

    #[test]
    fn test_zero_deposit_rejected() {
        let mut fx = setup();
        assert!(matches!(
            fx.deposit("alice", "42", 0, 10),
            Err(LedgerError::InvalidAmount)
        ));
        assert_eq!(fx.store.deposits().count(), 0);
        assert!(fx.journal.is_empty());
    }

    #[test]
    fn test_top_up_overflow_rejected_without_effects() {
        let mut fx = setup();
        let first = fx.deposit("alice", "42", u64::MAX - 5, 30).unwrap();
        let events_before = fx.journal.len();
        let minted_before = fx.mem.rewards.total_supply();

        assert!(matches!(
            fx.deposit("alice", "42", 6, 180),
            Err(LedgerError::InvalidAmount)
        ));

        let deposit = fx.store.deposit(first.deposit_id).unwrap();
        assert_eq!(deposit.amount, Amount::new(u64::MAX - 5));
        assert_eq!(deposit.locked_until, first.locked_until);
        assert_eq!(fx.store.deposits().count(), 1);
        assert_eq!(fx.journal.len(), events_before);
        assert_eq!(fx.mem.rewards.total_supply(), minted_before);
    }

    #[test]
    fn test_deposits_cannot_push_custody_past_range() {
        let mut fx = setup();
        let alice = AccountId::new("alice");
        fx.deposit("alice", "42", u64::MAX, 0).unwrap();
        let events_before = fx.journal.len();

        // Same group from someone else, and another group from the same depositor
        assert!(matches!(
            fx.deposit("bob", "42", u64::MAX, 0),
            Err(LedgerError::InvalidAmount)
        ));
        assert!(matches!(
            fx.deposit("alice", "43", 1, 0),
            Err(LedgerError::InvalidAmount)
        ));
        assert_eq!(fx.store.deposits().count(), 1);
        assert_eq!(fx.journal.len(), events_before);

        let receipt = fx
            .manager
            .refund_all(&mut fx.store, &fx.collaborators, &mut fx.journal, &alice)
            .unwrap();
        assert_eq!(receipt.amount, Amount::new(u64::MAX));
        assert_eq!(fx.mem.bank.total_paid(), Amount::new(u64::MAX));
        assert!(fx.store.total_custody().is_zero());
    }

    #[test]
    fn test_top_up_and_reward_scenario() {
        let mut fx = setup();
        let alice = AccountId::new("alice");

        let first = fx.deposit("alice", "42", 100, 90).unwrap();
        assert!(first.created);
        assert_eq!(first.amount, Amount::new(100));
        assert_eq!(first.reward, Amount::new(100));

        let second = fx.deposit("alice", "42", 50, 0).unwrap();
        assert!(!second.created);
        assert_eq!(second.deposit_id, first.deposit_id);
        assert_eq!(second.amount, Amount::new(150));
        assert_eq!(second.locked_until, first.locked_until);
        assert!(second.reward.is_zero());

        assert_eq!(fx.mem.rewards.balance_of(&alice), Amount::new(100));
    }

    #[test]
    fn test_lock_days_are_capped() {
        let mut fx = setup();
        let now = fx.mem.clock.now();
        let receipt = fx.deposit("alice", "42", 10, 1_000).unwrap();
        assert_eq!(receipt.locked_until, now + Duration::days(180));
        assert_eq!(receipt.reward, Amount::new(20));
    }

    #[test]
    fn test_refund_respects_lock_and_owner() {
        let mut fx = setup();
        let receipt = fx.deposit("alice", "42", 100, 5).unwrap();

        assert!(matches!(
            fx.refund("alice", receipt.deposit_id),
            Err(LedgerError::StillLocked { .. })
        ));
        assert!(matches!(
            fx.refund("bob", receipt.deposit_id),
            Err(LedgerError::Unauthorized { .. })
        ));

        fx.mem.clock.advance(Duration::days(5));
        let refund = fx.refund("alice", receipt.deposit_id).unwrap();
        assert_eq!(refund.amount, Amount::new(100));
        assert_eq!(fx.mem.bank.paid_to(&AccountId::new("alice")), Amount::new(100));

        assert!(matches!(
            fx.refund("alice", receipt.deposit_id),
            Err(LedgerError::NotFound(_))
        ));
        assert_eq!(fx.mem.bank.total_paid(), Amount::new(100));
    }

    #[test]
    fn test_failed_transfer_restores_deposit() {
        let mut fx = setup();
        let receipt = fx.deposit("alice", "42", 100, 0).unwrap();
        let events_before = fx.journal.len();

        fx.mem.bank.set_failing(true);
        assert!(matches!(
            fx.refund("alice", receipt.deposit_id),
            Err(LedgerError::TransferFailed(_))
        ));

        let deposit = fx.store.deposit(receipt.deposit_id).unwrap();
        assert_eq!(deposit.amount, Amount::new(100));
        assert_eq!(fx.journal.len(), events_before);

        fx.mem.bank.set_failing(false);
        assert!(fx.refund("alice", receipt.deposit_id).is_ok());
    }

    #[test]
    fn test_failed_batch_refund_restores_every_deposit() {
        let mut fx = setup();
        let alice = AccountId::new("alice");
        let a = fx.deposit("alice", "1", 10, 0).unwrap().deposit_id;
        let b = fx.deposit("alice", "2", 20, 0).unwrap().deposit_id;
        let c = fx.deposit("alice", "3", 40, 0).unwrap().deposit_id;
        let events_before = fx.journal.len();

        fx.mem.bank.set_failing(true);
        let all = fx
            .manager
            .refund_all(&mut fx.store, &fx.collaborators, &mut fx.journal, &alice);
        assert!(matches!(all, Err(LedgerError::TransferFailed(_))));
        let selected = fx.manager.refund_selected(
            &mut fx.store,
            &fx.collaborators,
            &mut fx.journal,
            &alice,
            &[a, c],
        );
        assert!(matches!(selected, Err(LedgerError::TransferFailed(_))));

        for (id, amount, reference) in [(a, 10, "1"), (b, 20, "2"), (c, 40, "3")] {
            assert_eq!(fx.store.deposit(id).unwrap().amount, Amount::new(amount));
            assert_eq!(
                fx.store
                    .find_active(Category::PullRequest, &ExternalRef::new(reference), &alice),
                Some(id)
            );
        }
        assert_eq!(fx.store.active_of(&alice), vec![a, b, c]);
        assert_eq!(fx.store.total_custody(), Amount::new(70));
        assert_eq!(fx.journal.len(), events_before);
        assert!(fx.mem.bank.payouts().is_empty());

        fx.mem.bank.set_failing(false);
        let receipt = fx
            .manager
            .refund_all(&mut fx.store, &fx.collaborators, &mut fx.journal, &alice)
            .unwrap();
        assert_eq!(receipt.deposit_ids, vec![a, b, c]);
        assert_eq!(receipt.amount, Amount::new(70));
    }

    #[test]
    fn test_deposit_after_refund_creates_new_entry() {
        let mut fx = setup();
        let first = fx.deposit("alice", "42", 100, 0).unwrap();
        fx.refund("alice", first.deposit_id).unwrap();

        let second = fx.deposit("alice", "42", 30, 0).unwrap();
        assert!(second.created);
        assert_ne!(second.deposit_id, first.deposit_id);
        assert_eq!(second.amount, Amount::new(30));
    }

    #[test]
    fn test_refund_all_skips_locked() {
        let mut fx = setup();
        let alice = AccountId::new("alice");
        fx.deposit("alice", "1", 10, 0).unwrap();
        fx.deposit("alice", "2", 20, 0).unwrap();
        let locked = fx.deposit("alice", "3", 40, 30).unwrap();
        fx.deposit("bob", "1", 80, 0).unwrap();

        let receipt = fx
            .manager
            .refund_all(&mut fx.store, &fx.collaborators, &mut fx.journal, &alice)
            .unwrap();
        assert_eq!(receipt.amount, Amount::new(30));
        assert_eq!(receipt.deposit_ids.len(), 2);
        assert_eq!(fx.mem.bank.payouts().len(), 1);
        assert_eq!(fx.store.active_of(&alice), vec![locked.deposit_id]);

        let again = fx
            .manager
            .refund_all(&mut fx.store, &fx.collaborators, &mut fx.journal, &alice);
        assert!(matches!(again, Err(LedgerError::NothingToRefund(_))));
    }

    #[test]
    fn test_refund_selected_ignores_foreign_ids() {
        let mut fx = setup();
        let alice = AccountId::new("alice");
        let mine = fx.deposit("alice", "1", 10, 0).unwrap();
        let theirs = fx.deposit("bob", "1", 80, 0).unwrap();

        let receipt = fx
            .manager
            .refund_selected(
                &mut fx.store,
                &fx.collaborators,
                &mut fx.journal,
                &alice,
                &[mine.deposit_id, theirs.deposit_id, mine.deposit_id],
            )
            .unwrap();
        assert_eq!(receipt.deposit_ids, vec![mine.deposit_id]);
        assert_eq!(receipt.amount, Amount::new(10));
        assert_eq!(
            fx.store.deposit(theirs.deposit_id).unwrap().amount,
            Amount::new(80)
        );
    }

    #[test]
    fn test_force_refund_bypasses_lock() {
        let mut fx = setup();
        let receipt = fx.deposit("alice", "42", 100, 180).unwrap();

        let refund = fx
            .manager
            .force_refund(
                &mut fx.store,
                &fx.collaborators,
                &mut fx.journal,
                receipt.deposit_id,
            )
            .unwrap();
        assert_eq!(refund.depositor, AccountId::new("alice"));
        assert!(fx.store.deposit(receipt.deposit_id).unwrap().is_tombstoned());

        let events = fx.journal.of_kind("deposit_refunded");
        assert!(matches!(
            events[0].event,
            LedgerEvent::DepositRefunded { forced: true, .. }
        ));
    }
}
