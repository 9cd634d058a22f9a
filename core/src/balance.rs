//! The balance singleton: lazy materialisation and guarded updates.
//!
//! RULE: the balance is read and written inside the caller's atomic unit.
//! Nothing here caches a balance value between calls.

use crate::{
    amount::Amount,
    error::{LedgerError, LedgerResult},
    store::LedgerStore,
    types::BALANCE_ID,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub id:         String,
    pub value:      Amount,
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    pub fn new(value: Amount, now: DateTime<Utc>) -> Self {
        Self {
            id: BALANCE_ID.to_string(),
            value,
            updated_at: now,
        }
    }
}

/// Result of a guarded balance update.
#[derive(Debug, Clone, PartialEq)]
pub enum BalanceUpdate {
    Applied(Balance),
    /// The result would be negative, or would not fit (`attempted` is
    /// `None`). Nothing was written.
    Rejected {
        current:   Amount,
        amount:    Amount,
        attempted: Option<Amount>,
    },
}

/// Returns the balance singleton. On first use it is computed as the sum of
/// all Done transactions and persisted.
pub fn provide_balance(store: &LedgerStore, now: DateTime<Utc>) -> LedgerResult<Balance> {
    if let Some(balance) = store.find_balance(BALANCE_ID)? {
        return Ok(balance);
    }
    let total = store.done_total()?;
    let balance = Balance::new(total, now);
    store.insert_balance(&balance)?;
    log::info!("Balance materialised from settled history: {}", balance.value);
    Ok(balance)
}

/// Add `amount` to the balance unless the result would be negative.
pub fn update_balance(
    store: &LedgerStore,
    amount: Amount,
    now: DateTime<Utc>,
) -> LedgerResult<BalanceUpdate> {
    let mut balance = provide_balance(store, now)?;
    let attempted = balance.value.checked_add(amount);
    let next = match attempted {
        Some(next) if !next.less_than_zero() => next,
        _ => {
            return Ok(BalanceUpdate::Rejected {
                current: balance.value,
                amount,
                attempted,
            })
        }
    };
    balance.value = next;
    balance.updated_at = now;
    store.save_balance(&balance)?;
    Ok(BalanceUpdate::Applied(balance))
}

/// Add `amount` with no sign check. Used for system compensations.
/// A sum that does not fit is a `LedgerError::AmountOverflow`.
pub fn force_update_balance(
    store: &LedgerStore,
    amount: Amount,
    now: DateTime<Utc>,
) -> LedgerResult<Balance> {
    let mut balance = provide_balance(store, now)?;
    balance.value = balance
        .value
        .checked_add(amount)
        .ok_or(LedgerError::AmountOverflow {
            current: balance.value,
            amount,
        })?;
    balance.updated_at = now;
    store.save_balance(&balance)?;
    Ok(balance)
}
