//! Shared handle serializing callers onto one ledger
//!
//! Each call locks the ledger for its whole duration, so operations from
//! concurrent tasks interleave only at call granularity.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::custody_ledger::CustodyLedger;

#[derive(Clone)]
pub struct SharedLedger {
    inner: Arc<Mutex<CustodyLedger>>,
}

impl SharedLedger {
    pub fn new(ledger: CustodyLedger) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }

    /// Run one operation as a single critical section
    pub async fn execute<T>(&self, op: impl FnOnce(&mut CustodyLedger) -> T) -> T {
        let mut ledger = self.inner.lock().await;
        op(&mut ledger)
    }

    /// Run a read-only query
    pub async fn read<T>(&self, query: impl FnOnce(&CustodyLedger) -> T) -> T {
        let ledger = self.inner.lock().await;
        query(&ledger)
    }
}
