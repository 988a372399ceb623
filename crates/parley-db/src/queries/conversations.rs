use anyhow::Result;
use rusqlite::{Connection, Row};

use super::OptionalExt;
use crate::Database;
use crate::models::ConversationRow;

const CONVERSATION_COLUMNS: &str = "c.id, c.is_group, c.name, c.created_at, c.last_message_time";

impl Database {
    pub fn find_direct_conversation(&self, direct_key: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM conversations c WHERE c.direct_key = ?1",
                CONVERSATION_COLUMNS
            );
            let row = conn.query_row(&sql, [direct_key], conversation_from_row).optional()?;
            row.map(|r| with_members(conn, r)).transpose()
        })
    }

    /// Insert a direct conversation keyed by the sorted member pair.
    /// Returns false when another conversation already owns `direct_key`;
    /// the caller resolves that conflict by looking the winner up.
    pub fn insert_direct_conversation(
        &self,
        id: &str,
        direct_key: &str,
        members: &[&str],
        created_at: i64,
    ) -> Result<bool> {
        self.with_tx(|tx| {
            let inserted = tx.execute(
                "INSERT INTO conversations (id, is_group, name, direct_key, created_at)
                 VALUES (?1, 0, NULL, ?2, ?3)
                 ON CONFLICT(direct_key) DO NOTHING",
                rusqlite::params![id, direct_key, created_at],
            )?;
            if inserted == 0 {
                return Ok(false);
            }
            insert_members(tx, id, members)?;
            Ok(true)
        })
    }

    pub fn insert_group_conversation(
        &self,
        id: &str,
        name: &str,
        members: &[&str],
        created_at: i64,
    ) -> Result<()> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO conversations (id, is_group, name, direct_key, created_at)
                 VALUES (?1, 1, ?2, NULL, ?3)",
                rusqlite::params![id, name, created_at],
            )?;
            insert_members(tx, id, members)
        })
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| query_conversation(conn, id))
    }

    /// Conversations `user_id` belongs to, most recent activity first.
    pub fn conversations_for_user(&self, user_id: &str) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM conversations c
                 JOIN conversation_members m ON m.conversation_id = c.id
                 WHERE m.user_id = ?1
                 ORDER BY COALESCE(c.last_message_time, c.created_at) DESC, c.id",
                CONVERSATION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], conversation_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(|r| with_members(conn, r)).collect()
        })
    }

    pub fn is_member(&self, conversation_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM conversation_members WHERE conversation_id = ?1 AND user_id = ?2",
                    [conversation_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }
}

pub(crate) fn query_conversation(conn: &Connection, id: &str) -> Result<Option<ConversationRow>> {
    let sql = format!("SELECT {} FROM conversations c WHERE c.id = ?1", CONVERSATION_COLUMNS);
    let row = conn.query_row(&sql, [id], conversation_from_row).optional()?;
    row.map(|r| with_members(conn, r)).transpose()
}

fn insert_members(conn: &Connection, conversation_id: &str, members: &[&str]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO conversation_members (conversation_id, user_id, position) VALUES (?1, ?2, ?3)",
    )?;
    for (position, user_id) in members.iter().enumerate() {
        stmt.execute(rusqlite::params![conversation_id, user_id, position as i64])?;
    }
    Ok(())
}

fn with_members(conn: &Connection, mut row: ConversationRow) -> Result<ConversationRow> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM conversation_members WHERE conversation_id = ?1 ORDER BY position",
    )?;
    row.members = stmt
        .query_map([&row.id], |r| r.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(row)
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        is_group: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
        last_message_time: row.get(4)?,
        members: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use crate::queries::test_support::*;

    #[test]
    fn test_direct_key_rejects_second_insert() {
        let db = db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let key = if a < b { format!("{}:{}", a, b) } else { format!("{}:{}", b, a) };

        assert!(db.insert_direct_conversation("c1", &key, &[a.as_str(), b.as_str()], 1).unwrap());
        assert!(!db.insert_direct_conversation("c2", &key, &[b.as_str(), a.as_str()], 2).unwrap());

        let found = db.find_direct_conversation(&key).unwrap().unwrap();
        assert_eq!(found.id, "c1");
        assert_eq!(found.members, vec![a, b]);
        // The losing insert left no orphan rows behind
        assert!(db.get_conversation("c2").unwrap().is_none());
    }

    #[test]
    fn test_groups_have_no_uniqueness() {
        let db = db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let c = user(&db, "carol");

        db.insert_group_conversation("g1", "team", &[a.as_str(), b.as_str(), c.as_str()], 1).unwrap();
        db.insert_group_conversation("g2", "team", &[a.as_str(), b.as_str(), c.as_str()], 2).unwrap();

        let mine = db.conversations_for_user(&c).unwrap();
        assert_eq!(mine.len(), 2);
        // Newest first when neither has messages
        assert_eq!(mine[0].id, "g2");
        assert!(db.is_member("g1", &b).unwrap());
        assert!(!db.is_member("g1", "stranger").unwrap());
    }
}
