use crate::amount::Amount;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Transaction '{id}' already exists")]
    DuplicateTransaction { id: String },

    #[error("Amount overflow adding {amount} to {current}")]
    AmountOverflow { current: Amount, amount: Amount },

    #[error("Row '{id}' missing from table '{table}'")]
    MissingRow { table: &'static str, id: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LedgerError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, LedgerError::DuplicateTransaction { .. })
    }
}

/// Request-level rejections. Never persisted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Amount '{0}' is not a decimal number")]
    InvalidAmount(String),

    #[error("Amount '{0}' is outside the accepted range")]
    AmountOutOfRange(String),

    #[error("Unknown action '{0}'")]
    UnknownAction(String),

    #[error("Unknown source type '{0}'")]
    UnknownSourceType(String),

    #[error("Source type '{0}' is reserved for system entries")]
    ReservedSourceType(String),

    #[error("Unknown status '{0}'")]
    UnknownStatus(String),

    #[error("Amount {amount} does not match action '{action}'")]
    SignMismatch { action: String, amount: String },

    #[error("Transaction id must not be empty")]
    EmptyTransactionId,
}

pub type LedgerResult<T> = Result<T, LedgerError>;
