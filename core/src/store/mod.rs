//! SQLite persistence layer.
//!
//! RULE: Only the store module talks to the database.
//! Processors and workers call store methods; they never execute SQL directly.
//!
//! Timestamps are INTEGER Unix milliseconds. Enumerations are lowercase TEXT.

use crate::{
    amount::Amount,
    correction::{Correction, CorrectionStatus},
    error::LedgerResult,
    transaction::{Action, SourceType, Transaction, TransactionStatus},
    types::ClaimToken,
};
use chrono::{DateTime, Utc};
use rusqlite::{
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
    Connection, OpenFlags, Row, TransactionBehavior,
};
use std::time::Duration;
use uuid::Uuid;

mod balance;
mod correction;
mod transaction;

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct LedgerStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
    busy_timeout: Duration,
}

impl LedgerStore {
    pub fn open(path: &str) -> LedgerResult<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open with an explicit wait on the writer lock. Competing workers
    /// each hold a connection, so writers queue instead of failing.
    pub fn open_with_timeout(path: &str, busy_timeout: Duration) -> LedgerResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.busy_timeout(busy_timeout)?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
            busy_timeout,
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> LedgerResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn,
            path: None,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        })
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases, this returns a new in-memory database (isolated).
    /// For file-based databases, this opens the same file.
    pub fn reopen(&self) -> LedgerResult<Self> {
        match &self.path {
            Some(p) => Self::open_with_timeout(p, self.busy_timeout),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> LedgerResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_ledger.sql"))?;
        Ok(())
    }

    /// Run `f` as one atomic unit (`BEGIN IMMEDIATE` … `COMMIT`).
    ///
    /// An `Err` from `f`, or a panic unwinding through it, rolls the whole
    /// unit back. Units do not nest.
    pub fn atomic<T, F>(&self, f: F) -> LedgerResult<T>
    where
        F: FnOnce(&Self) -> LedgerResult<T>,
    {
        let tx = rusqlite::Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let value = f(self)?;
        tx.commit()?;
        Ok(value)
    }
}

// ── Column codecs ──────────────────────────────────────────────

macro_rules! text_column {
    ($($ty:ty),*) => {$(
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse::<$ty>()
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    )*};
}

text_column!(TransactionStatus, SourceType, Action, CorrectionStatus);

impl ToSql for Amount {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.cents()))
    }
}

impl FromSql for Amount {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(Amount::from_cents)
    }
}

impl ToSql for ClaimToken {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_uuid().to_string()))
    }
}

impl FromSql for ClaimToken {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Uuid::parse_str(value.as_str()?)
            .map(ClaimToken::from_uuid)
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

pub(crate) fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn utc_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let ms: i64 = row.get(idx)?;
    DateTime::<Utc>::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

fn opt_utc_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<i64>>(idx)? {
        Some(_) => utc_at(row, idx).map(Some),
        None => Ok(None),
    }
}

// ── Row shapes ─────────────────────────────────────────────────

const TRANSACTION_COLUMNS: &str =
    "id, status, source_type, action, amount, lock_owner, locked_at, created_at, updated_at";

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id:          row.get(0)?,
        status:      row.get(1)?,
        source_type: row.get(2)?,
        action:      row.get(3)?,
        amount:      row.get(4)?,
        lock_owner:  row.get(5)?,
        locked_at:   opt_utc_at(row, 6)?,
        created_at:  utc_at(row, 7)?,
        updated_at:  utc_at(row, 8)?,
    })
}

const CORRECTION_COLUMNS: &str =
    "id, status, lock_owner, locked_at, done_at, created_at, updated_at";

fn correction_from_row(row: &Row<'_>) -> rusqlite::Result<Correction> {
    Ok(Correction {
        id:         row.get(0)?,
        status:     row.get(1)?,
        lock_owner: row.get(2)?,
        locked_at:  opt_utc_at(row, 3)?,
        done_at:    opt_utc_at(row, 4)?,
        created_at: utc_at(row, 5)?,
        updated_at: utc_at(row, 6)?,
    })
}
