//! Ledger policy and the time-lock rule
//!
//! The policy is plain data loaded by the deployment layer. The lock
//! computation is a pure function of the policy and an injected `now`.

use crate::{LedgerError, LedgerResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tunable parameters of the custody ledger
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPolicy {
    /// Upper bound on a deposit's lock duration, in days
    #[serde(default = "default_max_lock_days")]
    pub max_lock_days: u32,

    /// Length of one lock day in seconds
    #[serde(default = "default_day_length_secs")]
    pub day_length_secs: u64,

    /// Distinct attestor confirmations needed to confirm a registration
    #[serde(default = "default_quorum")]
    pub registration_quorum: u32,

    /// Distinct attestor confirmations needed to execute a withdrawal
    #[serde(default = "default_quorum")]
    pub withdrawal_quorum: u32,

    /// Contributor reward credited on third-party claims, as a percentage of
    /// the claimed deposit
    #[serde(default = "default_claim_reward_percent")]
    pub claim_reward_percent: u64,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            max_lock_days: default_max_lock_days(),
            day_length_secs: default_day_length_secs(),
            registration_quorum: default_quorum(),
            withdrawal_quorum: default_quorum(),
            claim_reward_percent: default_claim_reward_percent(),
        }
    }
}

fn default_max_lock_days() -> u32 {
    180
}

fn default_day_length_secs() -> u64 {
    86_400
}

fn default_quorum() -> u32 {
    1
}

fn default_claim_reward_percent() -> u64 {
    100
}

impl LedgerPolicy {
    pub fn with_quorums(mut self, registration: u32, withdrawal: u32) -> Self {
        self.registration_quorum = registration;
        self.withdrawal_quorum = withdrawal;
        self
    }

    pub fn with_max_lock_days(mut self, days: u32) -> Self {
        self.max_lock_days = days;
        self
    }

    pub fn with_claim_reward_percent(mut self, percent: u64) -> Self {
        self.claim_reward_percent = percent;
        self
    }

    /// Reject policies the ledger cannot operate under
    pub fn validate(&self) -> LedgerResult<()> {
        if self.registration_quorum == 0 || self.withdrawal_quorum == 0 {
            return Err(LedgerError::InvalidPolicy(
                "quorum thresholds must be at least 1".into(),
            ));
        }
        // The reward divisor is max_lock_days / 2 and must not be zero.
        if self.max_lock_days < 2 {
            return Err(LedgerError::InvalidPolicy(format!(
                "max_lock_days must be at least 2, got {}",
                self.max_lock_days
            )));
        }
        if self.day_length_secs == 0 {
            return Err(LedgerError::InvalidPolicy(
                "day_length_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Clamp a requested lock duration to the policy maximum
    pub fn cap_lock_days(&self, lock_days: u32) -> u32 {
        lock_days.min(self.max_lock_days)
    }

    /// Lock horizon for a deposit made at `now`
    pub fn locked_until(&self, now: DateTime<Utc>, lock_days: u32) -> DateTime<Utc> {
        compute_locked_until(now, lock_days, self.max_lock_days, self.day_length_secs)
    }
}

/// `now + min(lock_days, max_lock_days) * day_length`, saturating at the
/// latest representable instant
pub fn compute_locked_until(
    now: DateTime<Utc>,
    lock_days: u32,
    max_lock_days: u32,
    day_length_secs: u64,
) -> DateTime<Utc> {
    let days = u64::from(lock_days.min(max_lock_days));
    let secs = days.saturating_mul(day_length_secs);
    let secs = i64::try_from(secs).unwrap_or(i64::MAX);

    Duration::try_seconds(secs)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// True once `now` has reached the lock horizon
pub fn is_unlocked(now: DateTime<Utc>, locked_until: DateTime<Utc>) -> bool {
    now >= locked_until
}
