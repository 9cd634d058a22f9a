//! Applies one claimed transaction to the balance.
//!
//! Internal entries always land. Every other entry lands only if the balance
//! stays non-negative; otherwise it is Cancelled and the balance is untouched.
//! The balance write and the status write happen in the caller's atomic unit.

use crate::{
    balance::{self, BalanceUpdate},
    error::LedgerResult,
    store::LedgerStore,
    transaction::{Transaction, TransactionStatus},
};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    Done,
    Cancelled,
}

impl From<TransactionOutcome> for TransactionStatus {
    fn from(outcome: TransactionOutcome) -> Self {
        match outcome {
            TransactionOutcome::Done      => TransactionStatus::Done,
            TransactionOutcome::Cancelled => TransactionStatus::Cancelled,
        }
    }
}

/// The processing half of the balance worker.
pub trait TransactionHandler: Send {
    fn execute(
        &mut self,
        store: &LedgerStore,
        tx: &mut Transaction,
        now: DateTime<Utc>,
    ) -> LedgerResult<TransactionOutcome>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionProcessor;

impl TransactionHandler for TransactionProcessor {
    fn execute(
        &mut self,
        store: &LedgerStore,
        tx: &mut Transaction,
        now: DateTime<Utc>,
    ) -> LedgerResult<TransactionOutcome> {
        let outcome = if tx.is_internal() {
            balance::force_update_balance(store, tx.amount, now)?;
            TransactionOutcome::Done
        } else {
            match balance::update_balance(store, tx.amount, now)? {
                BalanceUpdate::Applied(_) => TransactionOutcome::Done,
                BalanceUpdate::Rejected { current, attempted: Some(attempted), .. } => {
                    log::warn!(
                        "Transaction {} ({}) rejected: balance {current} would become {attempted}",
                        tx.id,
                        tx.amount
                    );
                    TransactionOutcome::Cancelled
                }
                BalanceUpdate::Rejected { current, attempted: None, .. } => {
                    log::warn!(
                        "Transaction {} ({}) rejected: balance {current} would overflow",
                        tx.id,
                        tx.amount
                    );
                    TransactionOutcome::Cancelled
                }
            }
        };

        match outcome {
            TransactionOutcome::Done => tx.mark_done(),
            TransactionOutcome::Cancelled => tx.mark_cancelled(),
        }
        tx.updated_at = now;
        store.save_transaction(tx)?;
        log::debug!("Transaction {} -> {}", tx.id, tx.status);
        Ok(outcome)
    }
}
