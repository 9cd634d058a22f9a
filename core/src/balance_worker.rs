//! Balance worker: drains New and stale-Locked transactions in FIFO order.
//!
//! One pass, inside one atomic unit:
//!   1. Claim: bulk-stamp this worker's token on New and stale-Locked rows.
//!   2. Read back every Locked row, oldest first.
//!   3. Walk the list. At the first row carrying another worker's token,
//!      stop: that row and everything after it belong to someone else's
//!      ordering. Otherwise hand the row to the processor.
//!
//! Never replace steps 1-2 with "select, then update": the ownership
//! re-check after a bulk claim is what keeps each row single-writer.

use crate::{
    clock::Clock,
    config::BalanceWorkerConfig,
    error::LedgerResult,
    store::LedgerStore,
    transaction_processor::{TransactionHandler, TransactionProcessor},
    types::ClaimToken,
    worker::{PassOutcome, Worker},
};
use chrono::Duration;
use std::sync::Arc;

pub struct BalanceWorker<P = TransactionProcessor> {
    store:          LedgerStore,
    clock:          Arc<dyn Clock>,
    token:          ClaimToken,
    lock_staleness: Duration,
    processor:      P,
}

impl BalanceWorker<TransactionProcessor> {
    pub fn new(store: LedgerStore, clock: Arc<dyn Clock>, config: &BalanceWorkerConfig) -> Self {
        Self::with_processor(store, clock, config, TransactionProcessor)
    }
}

impl<P: TransactionHandler> BalanceWorker<P> {
    pub fn with_processor(
        store: LedgerStore,
        clock: Arc<dyn Clock>,
        config: &BalanceWorkerConfig,
        processor: P,
    ) -> Self {
        Self {
            store,
            clock,
            token: ClaimToken::generate(),
            lock_staleness: config.lock_staleness(),
            processor,
        }
    }

    /// Use a caller-chosen claim token instead of a generated one.
    pub fn with_token(mut self, token: ClaimToken) -> Self {
        self.token = token;
        self
    }

    pub fn token(&self) -> ClaimToken {
        self.token
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn into_store(self) -> LedgerStore {
        self.store
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }
}

impl<P: TransactionHandler> Worker for BalanceWorker<P> {
    fn name(&self) -> &'static str {
        "balance"
    }

    fn execute(&mut self) -> LedgerResult<PassOutcome> {
        let now = self.clock.now();
        let stale_before = now - self.lock_staleness;
        let token = self.token;
        let processor = &mut self.processor;

        let processed = self.store.atomic(|store| {
            let claimed = store.lock_new_transactions(token, now, stale_before)?;
            if claimed > 0 {
                log::debug!("balance {token} claimed {claimed} transactions");
            }

            let mut processed = 0usize;
            for mut tx in store.locked_transactions()? {
                if !tx.is_owned_by(token) {
                    log::debug!(
                        "balance {token} backs off at {}: owned by another worker",
                        tx.id
                    );
                    break;
                }
                processor.execute(store, &mut tx, now)?;
                processed += 1;
            }
            Ok(processed)
        })?;

        Ok(if processed == 0 {
            PassOutcome::Idle
        } else {
            PassOutcome::Worked(processed)
        })
    }
}
