use anyhow::{Result, bail};
use rusqlite::{Connection, OptionalExtension, Row, ffi};
use thiserror::Error;

use crate::Database;
use crate::models::{UserFlags, UserRow};

const USER_COLUMNS: &str =
    "id, username, password, is_active, is_staff, is_superuser, created_at, updated_at";

/// Another user already holds this username.
#[derive(Debug, Error)]
#[error("username '{0}' is taken")]
pub struct UsernameTaken(pub String);

impl Database {
    /// Fails with [`UsernameTaken`] when the UNIQUE constraint on `username`
    /// rejects the row, including when a concurrent insert won.
    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        password_hash: &str,
        flags: UserFlags,
    ) -> Result<()> {
        if flags.is_superuser && !flags.is_staff {
            bail!("Superuser must have is_staff = true");
        }

        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, username, password, is_active, is_staff, is_superuser)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id,
                    username,
                    password_hash,
                    flags.is_active,
                    flags.is_staff,
                    flags.is_superuser,
                ],
            );
            match inserted {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
                {
                    Err(UsernameTaken(username.to_string()).into())
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
    let row = conn.query_row(&sql, [value], user_from_row).optional()?;
    Ok(row)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        is_active: row.get(3)?,
        is_staff: row.get(4)?,
        is_superuser: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
