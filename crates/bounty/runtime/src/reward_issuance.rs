//! Reward Issuance: credit minted for locking value
//!
//! Depositors who time-lock earn reward credit proportional to the lock:
//! `value * (lock_days / (max_lock_days / 2))`, integer division. Locks
//! shorter than half the maximum therefore earn nothing, and a full-length
//! lock earns twice the value.
//!
//! Claimants who settle someone else's deposit earn a contributor reward of
//! `claim_reward_percent` of the claimed amount. Claiming one's own deposit
//! earns nothing.

use bounty_types::{AccountId, Amount, EventJournal, LedgerEvent, LedgerPolicy};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::collaborators::RewardLedger;

/// Computes and mints lock and contributor rewards
#[derive(Clone, Debug)]
pub struct RewardIssuer {
    max_lock_days: u32,
    claim_reward_percent: u64,
}

impl RewardIssuer {
    pub fn new(policy: &LedgerPolicy) -> Self {
        Self {
            max_lock_days: policy.max_lock_days,
            claim_reward_percent: policy.claim_reward_percent,
        }
    }

    /// Reward units earned by locking `value` for `lock_days`
    pub fn lock_reward(&self, value: Amount, lock_days: u32) -> Amount {
        let half = u64::from(self.max_lock_days / 2);
        if value.is_zero() || lock_days == 0 || half == 0 {
            return Amount::zero();
        }
        let lock_days = lock_days.min(self.max_lock_days);
        let multiplier = u64::from(lock_days) / half;
        Amount::new(value.0.saturating_mul(multiplier))
    }

    /// Contributor reward for claiming `value` deposited by someone else
    pub fn claim_reward(&self, value: Amount) -> Amount {
        let scaled = u128::from(value.0) * u128::from(self.claim_reward_percent) / 100;
        Amount::new(u64::try_from(scaled).unwrap_or(u64::MAX))
    }

    /// Mint the lock reward for a deposit; no-op for zero value or zero lock
    pub fn issue_reward(
        &self,
        rewards: &dyn RewardLedger,
        recipient: &AccountId,
        value: Amount,
        lock_days: u32,
        journal: &mut EventJournal,
        now: DateTime<Utc>,
    ) -> Amount {
        let reward = self.lock_reward(value, lock_days);
        if reward.is_zero() {
            debug!(
                recipient = %recipient,
                value = value.0,
                lock_days,
                "Lock too short for reward"
            );
            return reward;
        }
        self.mint(rewards, recipient, reward, journal, now);
        reward
    }

    /// Mint the contributor reward for a third-party claim
    pub fn issue_claim_reward(
        &self,
        rewards: &dyn RewardLedger,
        claimant: &AccountId,
        claimed: Amount,
        journal: &mut EventJournal,
        now: DateTime<Utc>,
    ) -> Amount {
        let reward = self.claim_reward(claimed);
        if !reward.is_zero() {
            self.mint(rewards, claimant, reward, journal, now);
        }
        reward
    }

    fn mint(
        &self,
        rewards: &dyn RewardLedger,
        recipient: &AccountId,
        amount: Amount,
        journal: &mut EventJournal,
        now: DateTime<Utc>,
    ) {
        rewards.mint(recipient, amount);
        info!(recipient = %recipient, amount = amount.0, "Reward issued");
        journal.record(
            LedgerEvent::RewardIssued {
                recipient: recipient.clone(),
                amount,
            },
            now,
        );
    }
}
