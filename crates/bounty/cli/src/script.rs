//! Replay scripts: a JSON array of ledger operations run against an
//! in-memory ledger with a manual clock

use anyhow::{Context, Result};
use bounty_runtime::{Clock, CustodyLedger, InMemoryCollaborators, OracleVerdict, Payout};
use bounty_types::{
    AccountId, Amount, Category, DepositId, ErrorCategory, EventRecord, ExternalHandle,
    ExternalRef, LedgerError, OracleRequestId, WithdrawalId,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

use crate::config::LedgerConfig;

/// One scripted call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Deposit {
        caller: String,
        category: Category,
        external_ref: String,
        amount: u64,
        #[serde(default)]
        lock_days: u32,
    },
    Refund {
        caller: String,
        deposit_id: u64,
    },
    RefundAll {
        caller: String,
    },
    ForceRefund {
        caller: String,
        deposit_id: u64,
    },
    Register {
        caller: String,
        handle: String,
    },
    ConfirmRegistration {
        attestor: String,
        handle: String,
        account: String,
    },
    RequestWithdrawal {
        caller: String,
        external_ref: String,
    },
    ConfirmWithdrawal {
        attestor: String,
        withdrawal_id: u64,
    },
    /// Answer the `request`-th oracle request dispatched so far (0-based)
    Complete {
        attestor: String,
        request: usize,
        #[serde(flatten)]
        verdict: OracleVerdict,
    },
    AddAttestor {
        caller: String,
        attestor: String,
    },
    RemoveAttestor {
        caller: String,
        attestor: String,
    },
    Blacklist {
        caller: String,
        handle: String,
    },
    Unblacklist {
        caller: String,
        handle: String,
    },
    /// Move the manual clock forward
    Advance {
        #[serde(default)]
        days: i64,
        #[serde(default)]
        seconds: i64,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Deposit { .. } => "deposit",
            Operation::Refund { .. } => "refund",
            Operation::RefundAll { .. } => "refund_all",
            Operation::ForceRefund { .. } => "force_refund",
            Operation::Register { .. } => "register",
            Operation::ConfirmRegistration { .. } => "confirm_registration",
            Operation::RequestWithdrawal { .. } => "request_withdrawal",
            Operation::ConfirmWithdrawal { .. } => "confirm_withdrawal",
            Operation::Complete { .. } => "complete",
            Operation::AddAttestor { .. } => "add_attestor",
            Operation::RemoveAttestor { .. } => "remove_attestor",
            Operation::Blacklist { .. } => "blacklist",
            Operation::Unblacklist { .. } => "unblacklist",
            Operation::Advance { .. } => "advance",
        }
    }
}

/// A rejected step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepError {
    pub code: &'static str,
    pub category: ErrorCategory,
    pub message: String,
}

impl From<&LedgerError> for StepError {
    fn from(err: &LedgerError) -> Self {
        Self {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub op: &'static str,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
}

impl StepReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Everything a replay produced
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub steps: Vec<StepReport>,
    pub payouts: Vec<Payout>,
    pub total_custody: Amount,
    pub journal: Vec<EventRecord>,
}

pub fn load_script(path: &Path) -> Result<Vec<Operation>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    parse_script(&raw).with_context(|| format!("Failed to parse script {}", path.display()))
}

pub fn parse_script(raw: &str) -> Result<Vec<Operation>> {
    Ok(serde_json::from_str(raw)?)
}

/// Runs a script against a fresh in-memory ledger
pub struct Replayer {
    ledger: CustodyLedger,
    mem: InMemoryCollaborators,
}

impl Replayer {
    pub fn new(config: &LedgerConfig, start: DateTime<Utc>) -> Result<Self> {
        let mem = InMemoryCollaborators::new(start);
        let operator = config.operator_account();
        let mut ledger = CustodyLedger::new(config.policy.clone(), operator.clone(), mem.wire())?;
        for attestor in config.attestor_accounts() {
            ledger.add_attestor(&operator, attestor)?;
        }
        Ok(Self { ledger, mem })
    }

    /// Run every operation; rejected steps are reported, not fatal
    pub fn run(mut self, ops: Vec<Operation>) -> Result<ReplayReport> {
        let mut steps = Vec::with_capacity(ops.len());
        for (step, op) in ops.into_iter().enumerate() {
            let name = op.name();
            let outcome = self.apply(op)?;
            let at = self.mem.clock.now();
            let report = match outcome {
                Ok(value) => StepReport {
                    step,
                    op: name,
                    at,
                    result: Some(value),
                    error: None,
                },
                Err(err) => {
                    debug!(step, op = name, error = %err, "Step rejected");
                    StepReport {
                        step,
                        op: name,
                        at,
                        result: None,
                        error: Some(StepError::from(&err)),
                    }
                }
            };
            steps.push(report);
        }

        let rejected = steps.iter().filter(|s| !s.is_ok()).count();
        info!(steps = steps.len(), rejected, "Replay finished");

        Ok(ReplayReport {
            steps,
            payouts: self.mem.bank.payouts(),
            total_custody: self.ledger.total_custody(),
            journal: self.ledger.journal_mut().drain(),
        })
    }

    /// The outer error is a script problem; the inner one a ledger rejection
    fn apply(&mut self, op: Operation) -> Result<Result<Value, LedgerError>> {
        let ledger = &mut self.ledger;
        let outcome = match op {
            Operation::Deposit {
                caller,
                category,
                external_ref,
                amount,
                lock_days,
            } => to_value(ledger.deposit(
                &AccountId::new(caller),
                category,
                ExternalRef::new(external_ref),
                Amount::new(amount),
                lock_days,
            ))?,
            Operation::Refund { caller, deposit_id } => {
                to_value(ledger.refund(&AccountId::new(caller), DepositId(deposit_id)))?
            }
            Operation::RefundAll { caller } => {
                to_value(ledger.refund_all(&AccountId::new(caller)))?
            }
            Operation::ForceRefund { caller, deposit_id } => {
                to_value(ledger.force_refund(&AccountId::new(caller), DepositId(deposit_id)))?
            }
            Operation::Register { caller, handle } => {
                to_value(ledger.register(&AccountId::new(caller), ExternalHandle::new(handle)))?
            }
            Operation::ConfirmRegistration {
                attestor,
                handle,
                account,
            } => to_value(ledger.confirm_registration(
                &AccountId::new(attestor),
                &ExternalHandle::new(handle),
                &AccountId::new(account),
            ))?,
            Operation::RequestWithdrawal {
                caller,
                external_ref,
            } => to_value(
                ledger.request_withdrawal(&AccountId::new(caller), ExternalRef::new(external_ref)),
            )?,
            Operation::ConfirmWithdrawal {
                attestor,
                withdrawal_id,
            } => to_value(
                ledger.confirm_withdrawal(&AccountId::new(attestor), WithdrawalId(withdrawal_id)),
            )?,
            Operation::Complete {
                attestor,
                request,
                verdict,
            } => {
                let request_id = nth_request(&self.mem, request)?;
                to_value(ledger.complete(&request_id, &AccountId::new(attestor), verdict))?
            }
            Operation::AddAttestor { caller, attestor } => {
                to_value(ledger.add_attestor(&AccountId::new(caller), AccountId::new(attestor)))?
            }
            Operation::RemoveAttestor { caller, attestor } => to_value(
                ledger.remove_attestor(&AccountId::new(caller), &AccountId::new(attestor)),
            )?,
            Operation::Blacklist { caller, handle } => to_value(
                ledger.add_to_blacklist(&AccountId::new(caller), ExternalHandle::new(handle)),
            )?,
            Operation::Unblacklist { caller, handle } => to_value(
                ledger.remove_from_blacklist(&AccountId::new(caller), &ExternalHandle::new(handle)),
            )?,
            Operation::Advance { days, seconds } => {
                let by = Duration::try_days(days)
                    .and_then(|d| d.checked_add(&Duration::try_seconds(seconds)?))
                    .context("Clock advance out of range")?;
                self.mem.clock.advance(by);
                Ok(serde_json::json!({ "now": self.mem.clock.now() }))
            }
        };
        Ok(outcome)
    }
}

fn nth_request(mem: &InMemoryCollaborators, index: usize) -> Result<OracleRequestId> {
    mem.oracle
        .sent()
        .get(index)
        .map(|r| r.id.clone())
        .with_context(|| format!("No oracle request #{} has been dispatched", index))
}

fn to_value<T: Serialize>(result: Result<T, LedgerError>) -> Result<Result<Value, LedgerError>> {
    match result {
        Ok(value) => Ok(Ok(serde_json::to_value(value)?)),
        Err(err) => Ok(Err(err)),
    }
}
