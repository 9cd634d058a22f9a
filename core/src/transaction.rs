//! The transaction entity and its enumerations.
//!
//! Lifecycle: New → Locked (claimed by a balance worker) → Done | Cancelled.
//! A Locked row whose lock has gone stale may be claimed again.

use crate::{
    amount::Amount,
    error::ValidationError,
    types::{ClaimToken, TransactionId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    New,
    Locked,
    Done,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::New       => "new",
            TransactionStatus::Locked    => "locked",
            TransactionStatus::Done      => "done",
            TransactionStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new"       => Ok(TransactionStatus::New),
            "locked"    => Ok(TransactionStatus::Locked),
            "done"      => Ok(TransactionStatus::Done),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            other       => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Game,
    Server,
    Payment,
    /// System-generated compensating entries. Never accepted from ingestion.
    Internal,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Game     => "game",
            SourceType::Server   => "server",
            SourceType::Payment  => "payment",
            SourceType::Internal => "internal",
        }
    }
}

impl FromStr for SourceType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "game"     => Ok(SourceType::Game),
            "server"   => Ok(SourceType::Server),
            "payment"  => Ok(SourceType::Payment),
            "internal" => Ok(SourceType::Internal),
            other      => Err(ValidationError::UnknownSourceType(other.to_string())),
        }
    }
}

/// Sign hint: `Win` carries amounts >= 0, `Lost` amounts <= 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Win,
    Lost,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Win  => "win",
            Action::Lost => "lost",
        }
    }

    /// The action matching the sign of `amount` (zero counts as a win).
    pub fn for_amount(amount: Amount) -> Self {
        if amount.less_than_zero() { Action::Lost } else { Action::Win }
    }

    pub fn admits(self, amount: Amount) -> bool {
        match self {
            Action::Win  => !amount.less_than_zero(),
            Action::Lost => !amount.greater_than_zero(),
        }
    }
}

impl FromStr for Action {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "win"  => Ok(Action::Win),
            "lost" => Ok(Action::Lost),
            other  => Err(ValidationError::UnknownAction(other.to_string())),
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {$(
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    )*};
}

display_as_str!(TransactionStatus, SourceType, Action);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id:          TransactionId,
    pub status:      TransactionStatus,
    pub source_type: SourceType,
    pub action:      Action,
    pub amount:      Amount,
    pub lock_owner:  Option<ClaimToken>,
    pub locked_at:   Option<DateTime<Utc>>,
    pub created_at:  DateTime<Utc>,
    pub updated_at:  DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        id: impl Into<TransactionId>,
        amount: Amount,
        action: Action,
        source_type: SourceType,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            status: TransactionStatus::New,
            source_type,
            action,
            amount,
            lock_owner: None,
            locked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.source_type == SourceType::Internal
    }

    pub fn is_owned_by(&self, token: ClaimToken) -> bool {
        self.lock_owner == Some(token)
    }

    pub fn lock(&mut self, token: ClaimToken, now: DateTime<Utc>) {
        self.status = TransactionStatus::Locked;
        self.lock_owner = Some(token);
        self.locked_at = Some(now);
    }

    /// Effect applied. The claim is released; `locked_at` stays as history.
    pub fn mark_done(&mut self) {
        self.status = TransactionStatus::Done;
        self.lock_owner = None;
    }

    pub fn mark_cancelled(&mut self) {
        self.status = TransactionStatus::Cancelled;
        self.lock_owner = None;
    }
}
