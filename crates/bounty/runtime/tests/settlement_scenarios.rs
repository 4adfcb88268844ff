//! End-to-end settlement scenarios against the in-memory collaborators.

use bounty_runtime::{CustodyLedger, InMemoryCollaborators, OracleFact, WithdrawalOutcome};
use bounty_types::{
    AccountId, Amount, Category, ErrorCategory, ExternalHandle, ExternalRef, LedgerError,
    LedgerPolicy,
};
use chrono::{Duration, TimeZone, Utc};

fn setup(policy: LedgerPolicy) -> (CustodyLedger, InMemoryCollaborators) {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let mem = InMemoryCollaborators::new(start);
    let ledger = CustodyLedger::new(policy, AccountId::new("operator"), mem.wire()).unwrap();
    (ledger, mem)
}

fn operator() -> AccountId {
    AccountId::new("operator")
}

fn confirmed_claimant(ledger: &mut CustodyLedger, who: &str, handle: &str) -> AccountId {
    let account = AccountId::new(who);
    ledger.register(&account, ExternalHandle::new(handle)).unwrap();
    ledger
        .confirm_registration(&operator(), &ExternalHandle::new(handle), &account)
        .unwrap();
    account
}

#[test]
fn deposit_top_up_scenario() {
    let (mut ledger, mem) = setup(LedgerPolicy::default().with_max_lock_days(180));
    let alice = AccountId::new("alice");

    let first = ledger
        .deposit(&alice, Category::PullRequest, ExternalRef::new("42"), Amount::new(100), 90)
        .unwrap();
    assert!(first.created);
    assert_eq!(first.amount, Amount::new(100));
    assert_eq!(first.reward, Amount::new(100));

    let second = ledger
        .deposit(&alice, Category::PullRequest, ExternalRef::new("42"), Amount::new(50), 0)
        .unwrap();
    assert!(!second.created);
    assert_eq!(second.deposit_id, first.deposit_id);
    assert_eq!(second.amount, Amount::new(150));
    assert_eq!(second.locked_until, first.locked_until);
    assert!(second.reward.is_zero());

    assert_eq!(mem.rewards.balance_of(&alice), Amount::new(100));
}

#[test]
fn reward_rounding_at_the_edges() {
    let (mut ledger, mem) = setup(LedgerPolicy::default());
    let alice = AccountId::new("alice");

    let short = ledger
        .deposit(&alice, Category::Issue, ExternalRef::new("1"), Amount::new(100), 89)
        .unwrap();
    assert!(short.reward.is_zero());

    let full = ledger
        .deposit(&alice, Category::Issue, ExternalRef::new("2"), Amount::new(100), 180)
        .unwrap();
    assert_eq!(full.reward, Amount::new(200));
    assert_eq!(mem.rewards.total_supply(), Amount::new(200));
}

#[test]
fn locked_deposit_refunds_after_horizon() {
    let (mut ledger, mem) = setup(LedgerPolicy::default());
    let alice = AccountId::new("alice");
    let receipt = ledger
        .deposit(&alice, Category::Issue, ExternalRef::new("7"), Amount::new(80), 10)
        .unwrap();

    let err = ledger.refund(&alice, receipt.deposit_id).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::StateConflict);

    mem.clock.advance(Duration::days(10));
    ledger.refund(&alice, receipt.deposit_id).unwrap();
    assert_eq!(mem.bank.paid_to(&alice), Amount::new(80));
    assert!(matches!(
        ledger.refund(&alice, receipt.deposit_id),
        Err(LedgerError::NotFound(_))
    ));
}

#[test]
fn refund_racing_withdrawal_leaves_nothing_to_release() {
    let (mut ledger, mem) = setup(LedgerPolicy::default().with_quorums(1, 2));
    let alice = AccountId::new("alice");
    let bob = confirmed_claimant(&mut ledger, "bob", "bob-gh");
    ledger.add_attestor(&operator(), AccountId::new("oracle-1")).unwrap();

    let receipt = ledger
        .deposit(&alice, Category::PullRequest, ExternalRef::new("42"), Amount::new(100), 0)
        .unwrap();
    let ticket = ledger.request_withdrawal(&bob, ExternalRef::new("42")).unwrap();
    ledger.confirm_withdrawal(&operator(), ticket.withdrawal_id).unwrap();

    ledger.refund(&alice, receipt.deposit_id).unwrap();
    let err = ledger
        .confirm_withdrawal(&AccountId::new("oracle-1"), ticket.withdrawal_id)
        .unwrap_err();
    assert!(matches!(err, LedgerError::NoFundsRemaining { .. }));
    assert!(mem.bank.paid_to(&bob).is_zero());
    assert_eq!(mem.bank.total_paid(), Amount::new(100));
}

#[test]
fn no_double_payout_after_execution() {
    let (mut ledger, mem) = setup(LedgerPolicy::default());
    let alice = AccountId::new("alice");
    let bob = confirmed_claimant(&mut ledger, "bob", "bob-gh");
    ledger.add_attestor(&operator(), AccountId::new("oracle-1")).unwrap();

    ledger
        .deposit(&alice, Category::PullRequest, ExternalRef::new("42"), Amount::new(100), 30)
        .unwrap();
    let ticket = ledger.request_withdrawal(&bob, ExternalRef::new("42")).unwrap();
    let outcome = ledger.confirm_withdrawal(&operator(), ticket.withdrawal_id).unwrap();
    assert!(matches!(outcome, WithdrawalOutcome::Executed(_)));

    // Fresh deposits to the same pull request do not reopen the old request
    ledger
        .deposit(&alice, Category::PullRequest, ExternalRef::new("42"), Amount::new(25), 0)
        .unwrap();
    assert!(matches!(
        ledger.confirm_withdrawal(&AccountId::new("oracle-1"), ticket.withdrawal_id),
        Err(LedgerError::AlreadyExecuted(_))
    ));
    assert_eq!(mem.bank.payouts().len(), 1);
    assert_eq!(mem.bank.paid_to(&bob), Amount::new(100));
}

#[test]
fn blacklist_after_execution_is_not_retroactive() {
    let (mut ledger, mem) = setup(LedgerPolicy::default());
    let alice = AccountId::new("alice");
    let bob = confirmed_claimant(&mut ledger, "bob", "bob-gh");

    ledger
        .deposit(&alice, Category::PullRequest, ExternalRef::new("42"), Amount::new(100), 0)
        .unwrap();
    let ticket = ledger.request_withdrawal(&bob, ExternalRef::new("42")).unwrap();
    ledger.confirm_withdrawal(&operator(), ticket.withdrawal_id).unwrap();

    ledger
        .add_to_blacklist(&operator(), ExternalHandle::new("bob-gh"))
        .unwrap();
    assert!(ledger.withdrawal(ticket.withdrawal_id).unwrap().is_executed());
    assert_eq!(mem.bank.paid_to(&bob), Amount::new(100));

    ledger
        .deposit(&alice, Category::PullRequest, ExternalRef::new("43"), Amount::new(10), 0)
        .unwrap();
    assert!(matches!(
        ledger.request_withdrawal(&bob, ExternalRef::new("43")),
        Err(LedgerError::Blacklisted(_))
    ));
}

#[test]
fn oracle_requests_carry_the_fact_to_attest() {
    let (mut ledger, mem) = setup(LedgerPolicy::default());
    let alice = AccountId::new("alice");
    let bob = confirmed_claimant(&mut ledger, "bob", "bob-gh");
    ledger
        .deposit(&alice, Category::PullRequest, ExternalRef::new("42"), Amount::new(100), 0)
        .unwrap();

    let ticket = ledger.request_withdrawal(&bob, ExternalRef::new("42")).unwrap();
    let request = mem.oracle.last().unwrap();
    assert_eq!(request.id, ticket.request_id);
    assert!(matches!(
        request.fact,
        OracleFact::WorkAccepted { ref claimant, .. } if claimant == &bob
    ));
    assert_eq!(ledger.pending_oracle_requests().len(), 1);
}

#[test]
fn journal_records_committed_operations_in_order() {
    let (mut ledger, mem) = setup(LedgerPolicy::default());
    let alice = AccountId::new("alice");
    let bob = confirmed_claimant(&mut ledger, "bob", "bob-gh");

    ledger
        .deposit(&alice, Category::PullRequest, ExternalRef::new("42"), Amount::new(100), 90)
        .unwrap();
    mem.bank.set_failing(true);
    let ticket = ledger.request_withdrawal(&bob, ExternalRef::new("42")).unwrap();
    assert!(ledger.confirm_withdrawal(&operator(), ticket.withdrawal_id).is_err());
    mem.bank.set_failing(false);
    ledger.confirm_withdrawal(&operator(), ticket.withdrawal_id).unwrap();

    let kinds: Vec<_> = ledger
        .journal()
        .records()
        .iter()
        .map(|r| r.event.kind())
        .collect();
    assert_eq!(
        kinds,
        vec![
            "registration_requested",
            "registration_confirmed",
            "deposit_updated",
            "reward_issued",
            "withdrawal_requested",
            "withdrawal_executed",
            "reward_issued",
        ]
    );

    let sequences: Vec<_> = ledger.journal().records().iter().map(|r| r.sequence).collect();
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(ledger.journal().for_account(&alice).len(), 2);
}
