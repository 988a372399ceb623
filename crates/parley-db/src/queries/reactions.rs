use anyhow::Result;

use super::{OptionalExt, as_params, placeholders};
use crate::Database;
use crate::models::{ReactionChange, ReactionRow};

impl Database {
    /// Toggle a reaction on the (message, user) key:
    /// none → insert, same emoji → delete, different emoji → replace.
    /// The read and the write share one IMMEDIATE transaction, so two racing
    /// toggles on the same key are serialized.
    pub fn toggle_reaction(
        &self,
        message_id: &str,
        user_id: &str,
        emoji: &str,
        now: i64,
    ) -> Result<ReactionChange> {
        self.with_tx(|tx| {
            let existing: Option<String> = tx
                .query_row(
                    "SELECT emoji FROM reactions WHERE message_id = ?1 AND user_id = ?2",
                    [message_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;

            if existing.is_some() {
                tx.execute(
                    "DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2",
                    [message_id, user_id],
                )?;
            }

            match existing {
                Some(current) if current == emoji => Ok(ReactionChange::Removed),
                previous => {
                    tx.execute(
                        "INSERT INTO reactions (message_id, user_id, emoji, created_at)
                         VALUES (?1, ?2, ?3, ?4)",
                        rusqlite::params![message_id, user_id, emoji, now],
                    )?;
                    Ok(match previous {
                        Some(previous) => ReactionChange::Replaced { previous },
                        None => ReactionChange::Added,
                    })
                }
            }
        })
    }

    /// Batch-fetch reactions for a set of message IDs, oldest first.
    pub fn get_reactions_for_messages(&self, message_ids: &[String]) -> Result<Vec<ReactionRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT message_id, user_id, emoji, created_at FROM reactions
                 WHERE message_id IN ({})
                 ORDER BY created_at, rowid",
                placeholders(message_ids.len())
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(as_params(message_ids).as_slice(), |row| {
                    Ok(ReactionRow {
                        message_id: row.get(0)?,
                        user_id: row.get(1)?,
                        emoji: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}
