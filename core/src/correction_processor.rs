//! Compensation cycle: reverse every second entry among the latest 2N
//! New/Done transactions and enqueue one Internal entry carrying the
//! inverse of their sum. The balance worker applies that entry later.

use crate::{
    amount::Amount,
    error::{LedgerError, LedgerResult},
    store::LedgerStore,
    transaction::{Action, SourceType, Transaction},
    types::TransactionId,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrectionReport {
    pub cancelled:    Vec<TransactionId>,
    pub delta:        Amount,
    pub compensation: Option<Transaction>,
}

/// The processing half of the correction worker.
pub trait CorrectionHandler: Send {
    fn execute(&mut self, store: &LedgerStore, now: DateTime<Utc>) -> LedgerResult<CorrectionReport>;
}

#[derive(Debug, Clone)]
pub struct CorrectionProcessor {
    batch_size: usize,
}

impl CorrectionProcessor {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }
}

impl Default for CorrectionProcessor {
    fn default() -> Self {
        Self::new(10)
    }
}

/// Picks positions 2, 4, 6, … (1-based) from a newest-first list.
pub fn select_for_reversal(recent: &[Transaction]) -> impl Iterator<Item = &Transaction> {
    recent.iter().skip(1).step_by(2)
}

impl CorrectionHandler for CorrectionProcessor {
    fn execute(&mut self, store: &LedgerStore, now: DateTime<Utc>) -> LedgerResult<CorrectionReport> {
        let recent = store.recent_settled_transactions(self.batch_size * 2)?;
        let mut report = CorrectionReport::default();

        for tx in select_for_reversal(&recent) {
            // Skip rows a balance worker claimed after the read above.
            if !store.cancel_transaction_if_settled(&tx.id, now)? {
                log::warn!("Transaction {} changed state mid-correction; left alone", tx.id);
                continue;
            }
            report.delta = report
                .delta
                .checked_add(tx.amount)
                .ok_or(LedgerError::AmountOverflow {
                    current: report.delta,
                    amount:  tx.amount,
                })?;
            report.cancelled.push(tx.id.clone());
        }

        if report.delta.is_zero() {
            log::info!(
                "Correction reversed {} transactions; net zero, no compensation",
                report.cancelled.len()
            );
            return Ok(report);
        }

        let amount = report
            .delta
            .checked_inverse()
            .ok_or(LedgerError::AmountOverflow {
                current: Amount::ZERO,
                amount:  report.delta,
            })?;
        let compensation = Transaction::new(
            Uuid::new_v4().to_string(),
            amount,
            Action::for_amount(amount),
            SourceType::Internal,
            now,
        );
        store.insert_transaction(&compensation)?;
        log::info!(
            "Correction reversed {} transactions; compensation {} for {}",
            report.cancelled.len(),
            compensation.id,
            amount
        );
        report.compensation = Some(compensation);
        Ok(report)
    }
}
