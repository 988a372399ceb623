use anyhow::Result;

use super::OptionalExt;
use crate::Database;

impl Database {
    /// Upsert the read watermark for (user, conversation). The stored value
    /// only ever moves forward. Returns the watermark after the write.
    ///
    /// Stamped under the writer lock, like `insert_message`, so a message
    /// committed after this call always lands above the watermark.
    pub fn mark_read(&self, user_id: &str, conversation_id: &str, now: impl FnOnce() -> i64) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let now = now();
            conn.execute(
                "INSERT INTO read_receipts (user_id, conversation_id, last_read_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id, conversation_id)
                 DO UPDATE SET last_read_at = MAX(last_read_at, excluded.last_read_at)",
                rusqlite::params![user_id, conversation_id, now],
            )?;
            let stored = conn.query_row(
                "SELECT last_read_at FROM read_receipts WHERE user_id = ?1 AND conversation_id = ?2",
                [user_id, conversation_id],
                |row| row.get(0),
            )?;
            Ok(stored)
        })
    }

    pub fn get_last_read_at(&self, user_id: &str, conversation_id: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT last_read_at FROM read_receipts WHERE user_id = ?1 AND conversation_id = ?2",
                [user_id, conversation_id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Every receipt in a conversation as (user_id, last_read_at).
    pub fn get_receipts_for_conversation(&self, conversation_id: &str) -> Result<Vec<(String, i64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, last_read_at FROM read_receipts WHERE conversation_id = ?1",
            )?;
            let rows = stmt
                .query_map([conversation_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::queries::test_support::*;

    #[test]
    fn test_mark_read_never_moves_backwards() {
        let db = db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let conv = direct(&db, &a, &b);

        assert_eq!(db.get_last_read_at(&a, &conv).unwrap(), None);
        assert_eq!(db.mark_read(&a, &conv, || 500).unwrap(), 500);
        assert_eq!(db.mark_read(&a, &conv, || 300).unwrap(), 500);
        assert_eq!(db.mark_read(&a, &conv, || 900).unwrap(), 900);

        let receipts = db.get_receipts_for_conversation(&conv).unwrap();
        assert_eq!(receipts, vec![(a.clone(), 900)]);
    }
}
