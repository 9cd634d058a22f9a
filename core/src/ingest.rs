//! Ingestion contract: validate a submitted event and insert it as New.
//!
//! Zero amounts are dropped silently. A repeated id is a success: the first
//! writer wins and later submissions change nothing.

use crate::{
    amount::Amount,
    error::{LedgerResult, ValidationError},
    store::LedgerStore,
    transaction::{Action, SourceType, Transaction},
    types::TransactionId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Largest accepted magnitude: 10 trillion currency units.
pub const MAX_INGEST_AMOUNT: Amount = Amount::from_cents(1_000_000_000_000_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Created,
    SkippedZero,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTransaction {
    pub id:          TransactionId,
    pub amount:      Amount,
    pub action:      Action,
    pub source_type: SourceType,
}

impl CreateTransaction {
    /// Validate raw request fields.
    pub fn parse(
        id: &str,
        amount: &str,
        action: &str,
        source_type: &str,
    ) -> Result<Self, ValidationError> {
        if id.trim().is_empty() {
            return Err(ValidationError::EmptyTransactionId);
        }
        let parsed: Amount = amount.parse()?;
        if !parsed.within(MAX_INGEST_AMOUNT) {
            return Err(ValidationError::AmountOutOfRange(amount.to_string()));
        }
        let amount = parsed;
        let action: Action = action.parse()?;
        let source_type: SourceType = source_type.parse()?;
        if source_type == SourceType::Internal {
            return Err(ValidationError::ReservedSourceType(source_type.to_string()));
        }
        if !action.admits(amount) {
            return Err(ValidationError::SignMismatch {
                action: action.to_string(),
                amount: amount.to_string(),
            });
        }
        Ok(Self {
            id: id.to_string(),
            amount,
            action,
            source_type,
        })
    }

    pub fn execute(&self, store: &LedgerStore, now: DateTime<Utc>) -> LedgerResult<IngestOutcome> {
        if self.amount.is_zero() {
            log::debug!("Transaction {} has zero amount; skipped", self.id);
            return Ok(IngestOutcome::SkippedZero);
        }
        let tx = Transaction::new(self.id.clone(), self.amount, self.action, self.source_type, now);
        match store.insert_transaction(&tx) {
            Ok(()) => Ok(IngestOutcome::Created),
            Err(e) if e.is_duplicate() => {
                log::debug!("{e}; first submission kept");
                Ok(IngestOutcome::Duplicate)
            }
            Err(e) => Err(e),
        }
    }
}

/// JSON body of `POST /transaction`. The source type travels in the
/// `Source-Type` header and is passed alongside.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub state:          String,
    pub amount:         String,
    pub transaction_id: String,
}

impl TransactionRequest {
    pub fn into_command(self, source_type: &str) -> Result<CreateTransaction, ValidationError> {
        CreateTransaction::parse(&self.transaction_id, &self.amount, &self.state, source_type)
    }
}
