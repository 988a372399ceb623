use anyhow::{Result, anyhow};
use rusqlite::{Connection, Row};

use super::{OptionalExt, as_params, placeholders};
use crate::Database;
use crate::models::UserRow;

const USER_COLUMNS: &str = "id, external_id, name, image_url, email, last_seen, created_at";

impl Database {
    /// Insert the user for `external_id` unless one already exists, then
    /// return the stored row. A racing insert for the same subject falls
    /// through to the lookup.
    pub fn ensure_user(
        &self,
        id: &str,
        external_id: &str,
        name: &str,
        image_url: &str,
        email: Option<&str>,
        created_at: i64,
    ) -> Result<UserRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, external_id, name, image_url, email, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(external_id) DO NOTHING",
                rusqlite::params![id, external_id, name, image_url, email, created_at],
            )?;
            query_user_by_external_id(conn, external_id)?
                .ok_or_else(|| anyhow!("User missing after insert: {}", external_id))
        })
    }

    pub fn update_profile(
        &self,
        id: &str,
        name: &str,
        image_url: &str,
        email: Option<&str>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET name = ?2, image_url = ?3, email = ?4 WHERE id = ?1",
                rusqlite::params![id, name, image_url, email],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// Batch-fetch users. Missing ids are simply absent from the result.
    pub fn get_users_by_ids(&self, ids: &[String]) -> Result<Vec<UserRow>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM users WHERE id IN ({})",
                USER_COLUMNS,
                placeholders(ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(as_params(ids).as_slice(), user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_users_except(&self, id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users WHERE id != ?1 ORDER BY name, id", USER_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Presence write. Returns false if the user does not exist.
    pub fn set_last_seen(&self, id: &str, last_seen: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET last_seen = ?2 WHERE id = ?1",
                rusqlite::params![id, last_seen],
            )?;
            Ok(changed > 0)
        })
    }
}

pub(crate) fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
    conn.query_row(&sql, [id], user_from_row).optional()
}

fn query_user_by_external_id(conn: &Connection, external_id: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE external_id = ?1", USER_COLUMNS);
    conn.query_row(&sql, [external_id], user_from_row).optional()
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        external_id: row.get(1)?,
        name: row.get(2)?,
        image_url: row.get(3)?,
        email: row.get(4)?,
        last_seen: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::queries::test_support::*;

    #[test]
    fn test_ensure_user_is_idempotent_per_subject() {
        let db = db();
        let first = db.ensure_user("id-1", "ext-a", "Alice", "", None, 5).unwrap();
        let second = db.ensure_user("id-2", "ext-a", "Alice again", "", None, 9).unwrap();

        assert_eq!(first.id, "id-1");
        assert_eq!(second.id, "id-1");
        assert_eq!(second.name, "Alice");
        assert!(second.last_seen.is_none());
    }

    #[test]
    fn test_last_seen_and_listing() {
        let db = db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");

        assert!(db.set_last_seen(&a, 1234).unwrap());
        assert!(!db.set_last_seen("missing", 1).unwrap());
        assert_eq!(db.get_user_by_id(&a).unwrap().unwrap().last_seen, Some(1234));

        let others = db.list_users_except(&a).unwrap();
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].id, b);

        let batch = db.get_users_by_ids(&[a.clone(), "missing".into()]).unwrap();
        assert_eq!(batch.len(), 1);
    }
}
