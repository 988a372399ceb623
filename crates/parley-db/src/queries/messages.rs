use anyhow::Result;
use rusqlite::{Connection, Row};

use super::OptionalExt;
use crate::Database;
use crate::models::{MessageInsert, MessageRow, NewMessage, ReplySnapshotRow};

// JOIN users to fetch sender name/avatar in a single query (no N+1)
const MESSAGE_SELECT: &str = "
    SELECT m.id, m.conversation_id, m.sender_id,
           COALESCE(u.name, 'Unknown'), COALESCE(u.image_url, ''),
           m.content, m.created_at, m.edited_at, m.deleted_at,
           m.reply_to_id, m.reply_sender_name, m.reply_content, m.reply_is_deleted
    FROM messages m
    LEFT JOIN users u ON m.sender_id = u.id";

impl Database {
    /// Append a message and advance the conversation's `last_message_time`
    /// in one transaction, so readers never see one without the other.
    ///
    /// `now` is called with the writer lock held: `created_at` order matches
    /// commit order across every writer, `mark_read` included.
    pub fn insert_message(&self, msg: &NewMessage<'_>, now: impl FnOnce() -> i64) -> Result<MessageInsert> {
        self.with_tx(|tx| {
            if let Some(key) = msg.idempotency_key {
                let existing: Option<(String, String)> = tx
                    .query_row(
                        "SELECT id, conversation_id FROM messages
                         WHERE sender_id = ?1 AND idempotency_key = ?2",
                        [msg.sender_id, key],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;
                match existing {
                    Some((id, conv)) if conv == msg.conversation_id => {
                        return Ok(MessageInsert::Duplicate(id));
                    }
                    Some(_) => return Ok(MessageInsert::KeyReused),
                    None => {}
                }
            }

            let created_at = now();

            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, content, created_at,
                                       reply_to_id, reply_sender_name, reply_content, reply_is_deleted,
                                       idempotency_key)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    msg.id,
                    msg.conversation_id,
                    msg.sender_id,
                    msg.content,
                    created_at,
                    msg.reply_to_id,
                    msg.reply.map(|r| r.sender_name.as_str()),
                    msg.reply.map(|r| r.content.as_str()),
                    msg.reply.map(|r| r.is_deleted),
                    msg.idempotency_key,
                ],
            )?;

            // Write-through cache; never moves backwards
            tx.execute(
                "UPDATE conversations
                 SET last_message_time = MAX(COALESCE(last_message_time, 0), ?2)
                 WHERE id = ?1",
                rusqlite::params![msg.conversation_id, created_at],
            )?;

            Ok(MessageInsert::Created(created_at))
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// Replace the content of a live message. Returns false if the message
    /// is missing or already a tombstone.
    pub fn update_message_content(&self, id: &str, content: &str, edited_at: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET content = ?2, edited_at = ?3
                 WHERE id = ?1 AND deleted_at IS NULL",
                rusqlite::params![id, content, edited_at],
            )?;
            Ok(changed > 0)
        })
    }

    /// Tombstone a message. Returns false if it was already deleted (or
    /// missing); the first `deleted_at` wins.
    pub fn soft_delete_message(&self, id: &str, deleted_at: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
                rusqlite::params![id, deleted_at],
            )?;
            Ok(changed > 0)
        })
    }

    /// Full timeline, tombstones included, in `(created_at, id)` order.
    pub fn list_messages(&self, conversation_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE m.conversation_id = ?1 ORDER BY m.created_at ASC, m.id ASC",
                MESSAGE_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([conversation_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn latest_message(&self, conversation_id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE m.conversation_id = ?1 ORDER BY m.created_at DESC, m.id DESC LIMIT 1",
                MESSAGE_SELECT
            );
            conn.query_row(&sql, [conversation_id], message_from_row).optional()
        })
    }

    /// Messages newer than `after` that `user_id` did not send.
    pub fn count_unread(&self, conversation_id: &str, user_id: &str, after: i64) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE conversation_id = ?1 AND created_at > ?2 AND sender_id != ?3",
                rusqlite::params![conversation_id, after, user_id],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }
}

fn query_message(conn: &Connection, id: &str) -> Result<Option<MessageRow>> {
    let sql = format!("{} WHERE m.id = ?1", MESSAGE_SELECT);
    conn.query_row(&sql, [id], message_from_row).optional()
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    let reply_sender_name: Option<String> = row.get(10)?;
    let reply = match reply_sender_name {
        Some(sender_name) => Some(ReplySnapshotRow {
            sender_name,
            content: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
            is_deleted: row.get::<_, Option<bool>>(12)?.unwrap_or(false),
        }),
        None => None,
    };

    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_name: row.get(3)?,
        sender_image: row.get(4)?,
        content: row.get(5)?,
        created_at: row.get(6)?,
        edited_at: row.get(7)?,
        deleted_at: row.get(8)?,
        reply_to_id: row.get(9)?,
        reply,
    })
}
