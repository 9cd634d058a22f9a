//! Shared primitive types and well-known identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Caller-supplied correlation id; primary key of a transaction.
pub type TransactionId = String;

/// Fixed id of the single balance row.
pub const BALANCE_ID: &str = "0f31adad-bfb6-41d1-aeff-c110ca13cbfa";

/// Fixed id of the single correction row.
pub const CORRECTION_ID: &str = "6c1f4f0e-93d2-4b7a-8d55-2f0b7c9e4a11";

/// Opaque token a worker stamps onto rows it claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimToken(Uuid);

impl ClaimToken {
    pub fn generate() -> Self {
        ClaimToken(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        ClaimToken(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ClaimToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
