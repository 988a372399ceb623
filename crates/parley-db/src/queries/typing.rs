use anyhow::Result;

use crate::Database;
use crate::models::TypingRow;

impl Database {
    /// Record the latest typing expiry for (user, conversation). Rows are
    /// never deleted; stale ones are filtered by readers.
    pub fn upsert_typing(
        &self,
        user_id: &str,
        conversation_id: &str,
        user_name: &str,
        expires_at: i64,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO typing (user_id, conversation_id, user_name, expires_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, conversation_id)
                 DO UPDATE SET user_name = excluded.user_name, expires_at = excluded.expires_at",
                rusqlite::params![user_id, conversation_id, user_name, expires_at],
            )?;
            Ok(())
        })
    }

    /// Every typing row for a conversation, stale ones included.
    pub fn get_typing_for_conversation(&self, conversation_id: &str) -> Result<Vec<TypingRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, conversation_id, user_name, expires_at
                 FROM typing WHERE conversation_id = ?1
                 ORDER BY expires_at, user_id",
            )?;
            let rows = stmt
                .query_map([conversation_id], |row| {
                    Ok(TypingRow {
                        user_id: row.get(0)?,
                        conversation_id: row.get(1)?,
                        user_name: row.get(2)?,
                        expires_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::queries::test_support::*;

    #[test]
    fn test_upsert_supersedes_previous_expiry() {
        let db = db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let conv = direct(&db, &a, &b);

        db.upsert_typing(&a, &conv, "alice", 2000).unwrap();
        db.upsert_typing(&a, &conv, "alice", 2500).unwrap();
        db.upsert_typing(&b, &conv, "bob", 2100).unwrap();

        let rows = db.get_typing_for_conversation(&conv).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].user_id, b);
        assert_eq!(rows[1].expires_at, 2500);
    }
}
