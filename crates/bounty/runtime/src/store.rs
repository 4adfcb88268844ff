//! Ledger Store: deposits, registrations and withdrawals
//!
//! The store is an arena of entries keyed by generated ids plus the
//! composite indexes the workflows look things up by. It holds data only;
//! policy lives in the managers that are handed a `&mut LedgerStore`.
//!
//! Index invariants:
//! - `active_index`, `group_index` and `depositor_index` reference only
//!   deposits with a positive amount.
//! - `account_handles` is the exact reverse of `registrations`.
//! - `custody` is the exact sum of live deposits and fits in an `Amount`;
//!   any group or depositor total is bounded by it.

use bounty_types::{
    AccountId, Amount, Category, Deposit, DepositId, ExternalHandle, ExternalRef, GroupKey,
    LedgerError, LedgerResult, PendingWithdrawal, Registration, WithdrawalId,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};

type ActiveKey = (Category, ExternalRef, AccountId);

/// State displaced by installing a registration, kept for rollback
#[derive(Debug)]
pub struct RegistrationUndo {
    handle: ExternalHandle,
    account: AccountId,
    /// Previous registration under the same handle
    previous_for_handle: Option<Registration>,
    /// Previous registration the account held under another handle
    previous_for_account: Option<Registration>,
}

impl RegistrationUndo {
    /// The account whose binding to this handle was superseded, if any
    pub fn superseded_account(&self) -> Option<&AccountId> {
        self.previous_for_handle
            .as_ref()
            .map(|r| &r.bound_account)
            .filter(|a| **a != self.account)
    }

    pub fn previous_for_handle(&self) -> Option<&Registration> {
        self.previous_for_handle.as_ref()
    }

    pub fn previous_for_account(&self) -> Option<&Registration> {
        self.previous_for_account.as_ref()
    }
}

/// In-memory arena of deposits, registrations and withdrawals
#[derive(Debug, Default)]
pub struct LedgerStore {
    deposits: BTreeMap<DepositId, Deposit>,
    next_deposit_id: u64,
    custody: Amount,
    active_index: HashMap<ActiveKey, DepositId>,
    group_index: HashMap<GroupKey, BTreeSet<DepositId>>,
    depositor_index: HashMap<AccountId, BTreeSet<DepositId>>,

    registrations: HashMap<ExternalHandle, Registration>,
    account_handles: HashMap<AccountId, ExternalHandle>,

    withdrawals: BTreeMap<WithdrawalId, PendingWithdrawal>,
    next_withdrawal_id: u64,
}

impl LedgerStore {
    /// Create an empty store; ids start at 1
    pub fn new() -> Self {
        Self {
            next_deposit_id: 1,
            next_withdrawal_id: 1,
            ..Default::default()
        }
    }

    // --- Deposits ---

    /// Create a deposit under a fresh id
    ///
    /// Fails with `InvalidAmount` if total custody would overflow.
    pub fn create_deposit(
        &mut self,
        category: Category,
        external_ref: ExternalRef,
        depositor: AccountId,
        amount: Amount,
        created_at: DateTime<Utc>,
        locked_until: DateTime<Utc>,
    ) -> LedgerResult<DepositId> {
        let custody = self
            .custody
            .checked_add(amount)
            .ok_or(LedgerError::InvalidAmount)?;

        let id = DepositId(self.next_deposit_id);
        self.next_deposit_id += 1;

        let deposit = Deposit::new(
            id,
            category,
            external_ref,
            depositor,
            amount,
            created_at,
            locked_until,
        );
        self.index_deposit(&deposit);
        self.deposits.insert(id, deposit);
        self.custody = custody;
        Ok(id)
    }

    /// Add to a live deposit and push its lock horizon out
    ///
    /// Fails with `InvalidAmount`, leaving everything untouched, if total
    /// custody would overflow. Returns the deposit's new amount.
    pub fn top_up(
        &mut self,
        id: DepositId,
        amount: Amount,
        locked_until: DateTime<Utc>,
    ) -> LedgerResult<Amount> {
        let custody = self
            .custody
            .checked_add(amount)
            .ok_or(LedgerError::InvalidAmount)?;
        let deposit = self
            .deposits
            .get_mut(&id)
            .filter(|d| !d.is_tombstoned())
            .ok_or(LedgerError::NotFound(id))?;

        // A deposit never exceeds custody, so this only fails with it.
        let total = deposit
            .top_up(amount, locked_until)
            .ok_or(LedgerError::InvalidAmount)?;
        self.custody = custody;
        Ok(total)
    }

    pub fn deposit(&self, id: DepositId) -> Option<&Deposit> {
        self.deposits.get(&id)
    }

    /// The depositor's live deposit for a (category, reference) pair
    pub fn find_active(
        &self,
        category: Category,
        external_ref: &ExternalRef,
        depositor: &AccountId,
    ) -> Option<DepositId> {
        self.active_index
            .get(&(category, external_ref.clone(), depositor.clone()))
            .copied()
    }

    /// Zero a deposit and drop it from the live indexes
    ///
    /// Returns the amount it held, or `None` if absent or already zero.
    pub fn tombstone(&mut self, id: DepositId) -> Option<Amount> {
        let deposit = self.deposits.get_mut(&id)?;
        if deposit.is_tombstoned() {
            return None;
        }
        let amount = deposit.tombstone();
        let snapshot = deposit.clone();
        self.unindex_deposit(&snapshot);
        self.custody = self.custody.saturating_sub(amount);
        Some(amount)
    }

    /// Reverse a tombstone made by an operation that then failed
    pub fn restore(&mut self, id: DepositId, amount: Amount) {
        let Some(deposit) = self.deposits.get_mut(&id).filter(|d| d.is_tombstoned()) else {
            return;
        };
        // Only amounts `tombstone` took out come back, so custody stays in range.
        let Some(custody) = self.custody.checked_add(amount) else {
            return;
        };
        deposit.amount = amount;
        let snapshot = deposit.clone();
        self.index_deposit(&snapshot);
        self.custody = custody;
    }

    /// Live deposits in a group, in id order
    pub fn active_in_group(&self, group: &GroupKey) -> Vec<DepositId> {
        self.group_index
            .get(group)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Sum of the live deposits in a group
    pub fn group_balance(&self, group: &GroupKey) -> LedgerResult<Amount> {
        Amount::checked_sum(
            self.group_index
                .get(group)
                .into_iter()
                .flatten()
                .filter_map(|id| self.deposits.get(id))
                .map(|d| d.amount),
        )
        .ok_or_else(|| LedgerError::AmountOverflow(group.to_string()))
    }

    /// Live deposits of one depositor, in id order
    pub fn active_of(&self, depositor: &AccountId) -> Vec<DepositId> {
        self.depositor_index
            .get(depositor)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// All deposits ever made by `depositor`, tombstones included
    pub fn history_of(&self, depositor: &AccountId) -> Vec<&Deposit> {
        self.deposits
            .values()
            .filter(|d| &d.depositor == depositor)
            .collect()
    }

    pub fn deposits(&self) -> impl Iterator<Item = &Deposit> {
        self.deposits.values()
    }

    /// Sum of all live deposits
    pub fn total_custody(&self) -> Amount {
        self.custody
    }

    fn index_deposit(&mut self, deposit: &Deposit) {
        if deposit.is_tombstoned() {
            return;
        }
        self.active_index.insert(
            (
                deposit.category,
                deposit.external_ref.clone(),
                deposit.depositor.clone(),
            ),
            deposit.id,
        );
        self.group_index
            .entry(deposit.group_key())
            .or_default()
            .insert(deposit.id);
        self.depositor_index
            .entry(deposit.depositor.clone())
            .or_default()
            .insert(deposit.id);
    }

    fn unindex_deposit(&mut self, deposit: &Deposit) {
        let key = (
            deposit.category,
            deposit.external_ref.clone(),
            deposit.depositor.clone(),
        );
        if self.active_index.get(&key) == Some(&deposit.id) {
            self.active_index.remove(&key);
        }

        let group = deposit.group_key();
        if let Some(ids) = self.group_index.get_mut(&group) {
            ids.remove(&deposit.id);
            if ids.is_empty() {
                self.group_index.remove(&group);
            }
        }

        if let Some(ids) = self.depositor_index.get_mut(&deposit.depositor) {
            ids.remove(&deposit.id);
            if ids.is_empty() {
                self.depositor_index.remove(&deposit.depositor);
            }
        }
    }

    // --- Registrations ---

    pub fn registration(&self, handle: &ExternalHandle) -> Option<&Registration> {
        self.registrations.get(handle)
    }

    pub fn registration_mut(&mut self, handle: &ExternalHandle) -> Option<&mut Registration> {
        self.registrations.get_mut(handle)
    }

    pub fn handle_of(&self, account: &AccountId) -> Option<&ExternalHandle> {
        self.account_handles.get(account)
    }

    /// The registration currently bound to `account`
    pub fn registration_of(&self, account: &AccountId) -> Option<&Registration> {
        self.account_handles
            .get(account)
            .and_then(|handle| self.registrations.get(handle))
    }

    /// Install a registration, superseding any binding of its handle and any
    /// other handle the account held
    pub fn bind_registration(&mut self, registration: Registration) -> RegistrationUndo {
        let handle = registration.handle.clone();
        let account = registration.bound_account.clone();

        let previous_for_handle = self.registrations.remove(&handle);
        if let Some(previous) = &previous_for_handle {
            self.account_handles.remove(&previous.bound_account);
        }

        let previous_for_account = match self.account_handles.remove(&account) {
            Some(old_handle) if old_handle != handle => self.registrations.remove(&old_handle),
            _ => None,
        };

        self.account_handles.insert(account.clone(), handle.clone());
        self.registrations.insert(handle.clone(), registration);

        RegistrationUndo {
            handle,
            account,
            previous_for_handle,
            previous_for_account,
        }
    }

    /// Put back whatever `bind_registration` displaced
    pub fn undo_binding(&mut self, undo: RegistrationUndo) {
        self.registrations.remove(&undo.handle);
        self.account_handles.remove(&undo.account);

        for previous in [undo.previous_for_account, undo.previous_for_handle]
            .into_iter()
            .flatten()
        {
            self.account_handles
                .insert(previous.bound_account.clone(), previous.handle.clone());
            self.registrations.insert(previous.handle.clone(), previous);
        }
    }

    // --- Withdrawals ---

    /// Reserve the next withdrawal id
    pub fn next_withdrawal_id(&mut self) -> WithdrawalId {
        let id = WithdrawalId(self.next_withdrawal_id);
        self.next_withdrawal_id += 1;
        id
    }

    pub fn insert_withdrawal(&mut self, withdrawal: PendingWithdrawal) {
        self.withdrawals.insert(withdrawal.id, withdrawal);
    }

    /// Drop a withdrawal created by an operation that then failed
    pub fn discard_withdrawal(&mut self, id: WithdrawalId) {
        if self.withdrawals.remove(&id).is_some() && id.0 + 1 == self.next_withdrawal_id {
            self.next_withdrawal_id -= 1;
        }
    }

    pub fn withdrawal(&self, id: WithdrawalId) -> Option<&PendingWithdrawal> {
        self.withdrawals.get(&id)
    }

    pub fn withdrawal_mut(&mut self, id: WithdrawalId) -> Option<&mut PendingWithdrawal> {
        self.withdrawals.get_mut(&id)
    }

    pub fn pending_withdrawals(&self) -> Vec<&PendingWithdrawal> {
        self.withdrawals.values().filter(|w| w.is_pending()).collect()
    }
}
