//! The correction singleton and its provider.
//!
//! Cycle: Ready → Locked(worker) → Ready. A fresh row starts Locked by a
//! throwaway token, so a newly booted system waits one staleness window
//! before its first correction.

use crate::{
    error::{LedgerResult, ValidationError},
    store::LedgerStore,
    types::{ClaimToken, CORRECTION_ID},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionStatus {
    Ready,
    Locked,
}

impl CorrectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CorrectionStatus::Ready  => "ready",
            CorrectionStatus::Locked => "locked",
        }
    }
}

impl FromStr for CorrectionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready"  => Ok(CorrectionStatus::Ready),
            "locked" => Ok(CorrectionStatus::Locked),
            other    => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for CorrectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub id:         String,
    pub status:     CorrectionStatus,
    pub lock_owner: Option<ClaimToken>,
    pub locked_at:  Option<DateTime<Utc>>,
    pub done_at:    Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Correction {
    /// A brand-new singleton, pre-locked by a token nobody owns.
    pub fn new_locked(now: DateTime<Utc>) -> Self {
        Self {
            id: CORRECTION_ID.to_string(),
            status: CorrectionStatus::Locked,
            lock_owner: Some(ClaimToken::generate()),
            locked_at: Some(now),
            done_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, token: ClaimToken) -> bool {
        self.lock_owner == Some(token)
    }

    /// Finish a cycle: back to Ready, stamped done.
    pub fn unlock(&mut self, now: DateTime<Utc>) {
        self.status = CorrectionStatus::Ready;
        self.lock_owner = None;
        self.done_at = Some(now);
    }
}

/// Returns the correction singleton, creating it pre-locked if absent.
pub fn provide_correction(store: &LedgerStore, now: DateTime<Utc>) -> LedgerResult<Correction> {
    if let Some(existing) = store.find_correction(CORRECTION_ID)? {
        return Ok(existing);
    }
    let correction = Correction::new_locked(now);
    store.insert_correction(&correction)?;
    log::info!("Correction singleton created, locked until {}", now);
    Ok(correction)
}
