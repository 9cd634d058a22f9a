use super::{millis, transaction_from_row, LedgerStore, TRANSACTION_COLUMNS};
use crate::{
    amount::Amount,
    error::{LedgerError, LedgerResult},
    transaction::{Transaction, TransactionStatus},
    types::ClaimToken,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

impl LedgerStore {
    // ── Transaction ───────────────────────────────────────────────

    /// Insert a transaction. A clash on `id` surfaces as
    /// `LedgerError::DuplicateTransaction`.
    pub fn insert_transaction(&self, tx: &Transaction) -> LedgerResult<()> {
        let result = self.conn.execute(
            "INSERT INTO transactions
             (id, status, source_type, action, amount, lock_owner, locked_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                tx.id,
                tx.status,
                tx.source_type,
                tx.action,
                tx.amount,
                tx.lock_owner,
                tx.locked_at.map(millis),
                millis(tx.created_at),
                millis(tx.updated_at),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                Err(LedgerError::DuplicateTransaction { id: tx.id.clone() })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the mutable state of an existing transaction.
    pub fn save_transaction(&self, tx: &Transaction) -> LedgerResult<()> {
        let changed = self.conn.execute(
            "UPDATE transactions
             SET status = ?1, lock_owner = ?2, locked_at = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                tx.status,
                tx.lock_owner,
                tx.locked_at.map(millis),
                millis(tx.updated_at),
                tx.id,
            ],
        )?;
        if changed == 0 {
            return Err(LedgerError::MissingRow {
                table: "transactions",
                id: tx.id.clone(),
            });
        }
        Ok(())
    }

    pub fn find_transaction(&self, id: &str) -> LedgerResult<Option<Transaction>> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1");
        let tx = self
            .conn
            .query_row(&sql, params![id], transaction_from_row)
            .optional()?;
        Ok(tx)
    }

    /// Every transaction, oldest first.
    pub fn all_transactions(&self) -> LedgerResult<Vec<Transaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions ORDER BY created_at ASC, rowid ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], transaction_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Claim step of the balance worker: one conditional bulk update that
    /// stamps `token` on every New row and on every Locked row whose lock
    /// is older than `stale_before`. Returns the number of rows stamped.
    pub fn lock_new_transactions(
        &self,
        token: ClaimToken,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> LedgerResult<usize> {
        let claimed = self.conn.execute(
            "UPDATE transactions
             SET status = ?1, lock_owner = ?2, locked_at = ?3, updated_at = ?3
             WHERE status = ?4
                OR (status = ?1 AND locked_at IS NOT NULL AND locked_at < ?5)",
            params![
                TransactionStatus::Locked,
                token,
                millis(now),
                TransactionStatus::New,
                millis(stale_before),
            ],
        )?;
        Ok(claimed)
    }

    /// All Locked rows regardless of owner, oldest first.
    pub fn locked_transactions(&self) -> LedgerResult<Vec<Transaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions
             WHERE status = ?1
             ORDER BY created_at ASC, rowid ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![TransactionStatus::Locked], transaction_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// The most recent New or Done rows, newest first.
    pub fn recent_settled_transactions(&self, limit: usize) -> LedgerResult<Vec<Transaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions
             WHERE status IN (?1, ?2)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?3"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![TransactionStatus::New, TransactionStatus::Done, limit as i64],
            transaction_from_row,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Cancel a row only if it is still New or Done. Returns whether the
    /// row was cancelled by this call.
    pub fn cancel_transaction_if_settled(&self, id: &str, now: DateTime<Utc>) -> LedgerResult<bool> {
        let changed = self.conn.execute(
            "UPDATE transactions
             SET status = ?1, lock_owner = NULL, updated_at = ?2
             WHERE id = ?3 AND status IN (?4, ?5)",
            params![
                TransactionStatus::Cancelled,
                millis(now),
                id,
                TransactionStatus::New,
                TransactionStatus::Done,
            ],
        )?;
        Ok(changed == 1)
    }

    /// Sum of amounts over all Done transactions.
    pub fn done_total(&self) -> LedgerResult<Amount> {
        let total: Amount = self.conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM transactions WHERE status = ?1",
            params![TransactionStatus::Done],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    pub fn count_by_status(&self, status: TransactionStatus) -> LedgerResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE status = ?1",
            params![status],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
