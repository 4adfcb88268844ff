//! Oracle Gateway: correlates attestor callbacks with pending requests
//!
//! Every registration round and withdrawal publishes one request through the
//! transport. Attestors answer asynchronously with the request id; the
//! gateway's table maps that id back to the subject awaiting confirmation.
//! Entries live until their subject settles or is superseded.

use bounty_types::{ExternalHandle, LedgerResult, OracleRequestId, WithdrawalId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::collaborators::{OracleFact, OracleRequest, OracleTransport};

/// What an oracle request is about
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleSubject {
    Registration(ExternalHandle),
    Withdrawal(WithdrawalId),
}

/// A dispatched request awaiting an attestor's answer
#[derive(Clone, Debug)]
pub struct PendingOracleRequest {
    pub request: OracleRequest,
    pub subject: OracleSubject,
}

/// Correlates oracle answers with the requests that asked for them
#[derive(Debug, Default)]
pub struct OracleGateway {
    pending: HashMap<OracleRequestId, PendingOracleRequest>,
}

impl OracleGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a request and start tracking it
    ///
    /// Nothing is tracked if the transport refuses the request.
    pub fn dispatch(
        &mut self,
        transport: &dyn OracleTransport,
        subject: OracleSubject,
        fact: OracleFact,
        now: DateTime<Utc>,
    ) -> LedgerResult<OracleRequestId> {
        let request = OracleRequest {
            id: OracleRequestId::generate(),
            fact,
            issued_at: now,
        };

        if let Err(err) = transport.dispatch(&request) {
            warn!(subject = ?subject, error = %err, "Oracle request not delivered");
            return Err(err.into());
        }

        let id = request.id.clone();
        debug!(request_id = %id, subject = ?subject, "Oracle request dispatched");
        self.pending
            .insert(id.clone(), PendingOracleRequest { request, subject });
        Ok(id)
    }

    pub fn subject(&self, id: &OracleRequestId) -> Option<&OracleSubject> {
        self.pending.get(id).map(|p| &p.subject)
    }

    /// Stop tracking a request whose subject settled or was superseded
    pub fn retire(&mut self, id: &OracleRequestId) -> Option<PendingOracleRequest> {
        self.pending.remove(id)
    }

    /// Put back a request retired by an operation that then failed
    pub fn reinstate(&mut self, pending: PendingOracleRequest) {
        self.pending.insert(pending.request.id.clone(), pending);
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingOracleRequest> {
        self.pending.values()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
