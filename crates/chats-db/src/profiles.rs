use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params_from_iter};

use crate::models::{NewProfile, ProfileChanges, ProfileRow};
use crate::search::SearchFilter;
use crate::{Database, NOW};

const PROFILE_SELECT: &str = "SELECT p.id, p.user_id, u.username, p.first_name, p.last_name, \
     p.caption, p.about, p.profile_picture, p.created_at, p.updated_at \
     FROM user_profiles p JOIN users u ON u.id = p.user_id";

impl Database {
    pub fn create_profile(&self, id: &str, profile: &NewProfile<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_profiles
                    (id, user_id, first_name, last_name, caption, about, profile_picture)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    id,
                    profile.user_id,
                    profile.first_name,
                    profile.last_name,
                    profile.caption,
                    profile.about,
                    profile.profile_picture,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_profile(&self, id: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| query_profile(conn, "p.id", id))
    }

    pub fn get_profile_by_user(&self, user_id: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| query_profile(conn, "p.user_id", user_id))
    }

    /// List profiles in creation order, narrowed by `filter` when given.
    pub fn search_profiles(
        &self,
        filter: Option<&SearchFilter>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ProfileRow>> {
        self.with_conn(|conn| {
            let mut sql = PROFILE_SELECT.to_string();
            let mut values: Vec<Value> = Vec::new();

            if let Some(filter) = filter {
                sql.push_str(" WHERE ");
                sql.push_str(filter.clause());
                values.extend(filter.params().iter().cloned().map(Value::Text));
            }

            sql.push_str(" ORDER BY p.created_at, p.rowid LIMIT ? OFFSET ?");
            values.push(Value::Integer(i64::from(limit)));
            values.push(Value::Integer(i64::from(offset)));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), profile_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Apply `changes`; returns false if the profile does not exist.
    pub fn update_profile(&self, id: &str, changes: &ProfileChanges<'_>) -> Result<bool> {
        let mut sets: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        let mut set = |column: &str, value: Value| {
            sets.push(format!("{} = ?", column));
            values.push(value);
        };
        let text = |s: &str| Value::Text(s.to_string());
        let nullable = |v: Option<&str>| v.map_or(Value::Null, text);

        if let Some(v) = changes.first_name {
            set("first_name", text(v));
        }
        if let Some(v) = changes.last_name {
            set("last_name", text(v));
        }
        if let Some(v) = changes.caption {
            set("caption", nullable(v));
        }
        if let Some(v) = changes.about {
            set("about", nullable(v));
        }
        if let Some(v) = changes.profile_picture {
            set("profile_picture", nullable(v));
        }

        sets.push(format!("updated_at = {}", NOW));
        values.push(Value::Text(id.to_string()));

        let sql = format!("UPDATE user_profiles SET {} WHERE id = ?", sets.join(", "));

        self.with_conn(|conn| {
            let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
            Ok(changed == 1)
        })
    }

    pub fn delete_profile(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM user_profiles WHERE id = ?1", [id])?;
            Ok(changed == 1)
        })
    }
}

fn query_profile(conn: &Connection, column: &str, value: &str) -> Result<Option<ProfileRow>> {
    let sql = format!("{} WHERE {} = ?1", PROFILE_SELECT, column);
    let row = conn.query_row(&sql, [value], profile_from_row).optional()?;
    Ok(row)
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        caption: row.get(5)?,
        about: row.get(6)?,
        profile_picture: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}
