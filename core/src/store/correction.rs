use super::{correction_from_row, millis, LedgerStore, CORRECTION_COLUMNS};
use crate::{
    correction::{Correction, CorrectionStatus},
    error::{LedgerError, LedgerResult},
    types::ClaimToken,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

impl LedgerStore {
    // ── Correction ────────────────────────────────────────────────

    pub fn find_correction(&self, id: &str) -> LedgerResult<Option<Correction>> {
        let sql = format!("SELECT {CORRECTION_COLUMNS} FROM corrections WHERE id = ?1");
        let correction = self
            .conn
            .query_row(&sql, params![id], correction_from_row)
            .optional()?;
        Ok(correction)
    }

    pub fn insert_correction(&self, c: &Correction) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO corrections (id, status, lock_owner, locked_at, done_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                c.id,
                c.status,
                c.lock_owner,
                c.locked_at.map(millis),
                c.done_at.map(millis),
                millis(c.created_at),
                millis(c.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn save_correction(&self, c: &Correction) -> LedgerResult<()> {
        let changed = self.conn.execute(
            "UPDATE corrections
             SET status = ?1, lock_owner = ?2, locked_at = ?3, done_at = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                c.status,
                c.lock_owner,
                c.locked_at.map(millis),
                c.done_at.map(millis),
                millis(c.updated_at),
                c.id,
            ],
        )?;
        if changed == 0 {
            return Err(LedgerError::MissingRow {
                table: "corrections",
                id: c.id.clone(),
            });
        }
        Ok(())
    }

    /// Claim step of the correction worker. Stamps `token` when the row is
    /// Ready and due (never done, or done before `done_before`), or when it
    /// is Locked with a lock older than `stale_before`.
    /// Returns whether the row was stamped.
    pub fn lock_correction(
        &self,
        id: &str,
        token: ClaimToken,
        now: DateTime<Utc>,
        done_before: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> LedgerResult<bool> {
        let changed = self.conn.execute(
            "UPDATE corrections
             SET status = ?1, lock_owner = ?2, locked_at = ?3, updated_at = ?3
             WHERE id = ?4
               AND ((status = ?5 AND (done_at IS NULL OR done_at < ?6))
                 OR (status = ?1 AND locked_at IS NOT NULL AND locked_at < ?7))",
            params![
                CorrectionStatus::Locked,
                token,
                millis(now),
                id,
                CorrectionStatus::Ready,
                millis(done_before),
                millis(stale_before),
            ],
        )?;
        Ok(changed == 1)
    }
}
