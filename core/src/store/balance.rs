use super::{millis, utc_at, LedgerStore};
use crate::{
    balance::Balance,
    error::{LedgerError, LedgerResult},
};
use rusqlite::{params, OptionalExtension};

impl LedgerStore {
    // ── Balance ───────────────────────────────────────────────────

    pub fn find_balance(&self, id: &str) -> LedgerResult<Option<Balance>> {
        let balance = self
            .conn
            .query_row(
                "SELECT id, value, updated_at FROM balances WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Balance {
                        id: row.get(0)?,
                        value: row.get(1)?,
                        updated_at: utc_at(row, 2)?,
                    })
                },
            )
            .optional()?;
        Ok(balance)
    }

    pub fn insert_balance(&self, balance: &Balance) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO balances (id, value, updated_at) VALUES (?1, ?2, ?3)",
            params![balance.id, balance.value, millis(balance.updated_at)],
        )?;
        Ok(())
    }

    pub fn save_balance(&self, balance: &Balance) -> LedgerResult<()> {
        let changed = self.conn.execute(
            "UPDATE balances SET value = ?1, updated_at = ?2 WHERE id = ?3",
            params![balance.value, millis(balance.updated_at), balance.id],
        )?;
        if changed == 0 {
            return Err(LedgerError::MissingRow {
                table: "balances",
                id: balance.id.clone(),
            });
        }
        Ok(())
    }
}
