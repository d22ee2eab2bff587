use anyhow::Result;
use rusqlite::{OptionalExtension, Row};

use crate::models::TokenPairRow;
use crate::{Database, NOW};

impl Database {
    /// Drop whatever pair the user holds and store a fresh one, atomically.
    pub fn replace_token_pair(&self, user_id: &str, access: &str, refresh: &str) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute("DELETE FROM token_pairs WHERE user_id = ?1", [user_id])?;
            tx.execute(
                "INSERT INTO token_pairs (user_id, access, refresh) VALUES (?1, ?2, ?3)",
                (user_id, access, refresh),
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_token_pair(&self, user_id: &str) -> Result<Option<TokenPairRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT user_id, access, refresh, created_at, updated_at
                     FROM token_pairs WHERE user_id = ?1",
                    [user_id],
                    pair_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_token_pair_by_refresh(&self, refresh: &str) -> Result<Option<TokenPairRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT user_id, access, refresh, created_at, updated_at
                     FROM token_pairs WHERE refresh = ?1",
                    [refresh],
                    pair_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Overwrite both tokens of the user's pair in place, but only if the pair
    /// still holds `old_refresh`. Returns false when someone else rotated or
    /// replaced it first.
    pub fn rotate_token_pair(
        &self,
        user_id: &str,
        old_refresh: &str,
        access: &str,
        refresh: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let sql = format!(
                "UPDATE token_pairs SET access = ?1, refresh = ?2, updated_at = {}
                 WHERE user_id = ?3 AND refresh = ?4",
                NOW
            );
            let changed = conn.execute(&sql, (access, refresh, user_id, old_refresh))?;
            Ok(changed == 1)
        })
    }
}

fn pair_from_row(row: &Row<'_>) -> rusqlite::Result<TokenPairRow> {
    Ok(TokenPairRow {
        user_id: row.get(0)?,
        access: row.get(1)?,
        refresh: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}
