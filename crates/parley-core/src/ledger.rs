use parley_db::models::{MessageInsert, MessageRow, NewMessage, ReplySnapshotRow};
use parley_types::api::{Caller, MessageResponse};
use parley_types::models::Millis;
use tracing::debug;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::{SyncEngine, convert};

#[derive(Debug, Clone)]
pub struct Sent {
    pub message: MessageResponse,
    /// False when the idempotency key matched an earlier send.
    pub created: bool,
}

#[derive(Debug, Clone)]
pub struct Deleted {
    pub conversation_id: Uuid,
    pub message_id: Uuid,
    pub deleted_at: Millis,
    /// False when the message was already a tombstone.
    pub changed: bool,
}

impl SyncEngine {
    pub fn send_message(
        &self,
        caller: &Caller,
        conversation_id: Uuid,
        content: &str,
        reply_to_id: Option<Uuid>,
        idempotency_key: Option<&str>,
    ) -> SyncResult<Sent> {
        let content = self.validate_content(content)?;
        self.require_member(caller, conversation_id)?;

        let conv_str = conversation_id.to_string();
        let reply_str = reply_to_id.map(|id| id.to_string());
        let reply = match &reply_str {
            Some(reply_id) => {
                let quoted = self
                    .db
                    .get_message(reply_id)?
                    .filter(|m| m.conversation_id == conv_str)
                    .ok_or(SyncError::NotFound("message"))?;
                Some(snapshot(quoted))
            }
            None => None,
        };

        let id = Uuid::new_v4().to_string();
        let sender = caller.user_id.to_string();
        let outcome = self.db.insert_message(
            &NewMessage {
                id: &id,
                conversation_id: &conv_str,
                sender_id: &sender,
                content,
                reply_to_id: reply_str.as_deref(),
                reply: reply.as_ref(),
                idempotency_key: idempotency_key.filter(|k| !k.is_empty()),
            },
            || self.now(),
        )?;

        let (stored_id, created) = match outcome {
            MessageInsert::Created(_) => (id, true),
            MessageInsert::Duplicate(existing) => {
                debug!("Send from {} matched idempotency key, returning {}", caller.user_id, existing);
                (existing, false)
            }
            MessageInsert::KeyReused => {
                return Err(SyncError::invalid(
                    "idempotency key was already used in another conversation",
                ));
            }
        };

        let row = self
            .db
            .get_message(&stored_id)?
            .ok_or(SyncError::NotFound("message"))?;
        if created {
            debug!("{} sent message {} to {}", caller.user_id, stored_id, conversation_id);
        }
        Ok(Sent {
            message: convert::message_response(row)?,
            created,
        })
    }

    /// Only the sender may edit, and only while the message is live.
    /// Editing never changes `created_at`, so the message keeps its place.
    pub fn edit_message(&self, caller: &Caller, message_id: Uuid, content: &str) -> SyncResult<MessageResponse> {
        let content = self.validate_content(content)?;
        let id = message_id.to_string();
        let row = self.owned_message(caller, &id)?;
        if row.deleted_at.is_some() {
            return Err(SyncError::NotFound("message"));
        }

        // Lost a race with delete
        if !self.db.update_message_content(&id, content, self.now())? {
            return Err(SyncError::NotFound("message"));
        }

        let row = self.db.get_message(&id)?.ok_or(SyncError::NotFound("message"))?;
        debug!("{} edited message {}", caller.user_id, message_id);
        convert::message_response(row)
    }

    /// Soft-delete. Deleting a tombstone succeeds and reports the original
    /// `deleted_at`.
    pub fn delete_message(&self, caller: &Caller, message_id: Uuid) -> SyncResult<Deleted> {
        let id = message_id.to_string();
        let row = self.owned_message(caller, &id)?;
        let conversation_id = convert::id(&row.conversation_id)?;

        if let Some(deleted_at) = row.deleted_at {
            return Ok(Deleted {
                conversation_id,
                message_id,
                deleted_at,
                changed: false,
            });
        }

        let now = self.now();
        let changed = self.db.soft_delete_message(&id, now)?;
        let deleted_at = if changed {
            now
        } else {
            // Concurrent delete won; report its timestamp
            self.db
                .get_message(&id)?
                .and_then(|m| m.deleted_at)
                .unwrap_or(now)
        };

        if changed {
            debug!("{} deleted message {}", caller.user_id, message_id);
        }
        Ok(Deleted {
            conversation_id,
            message_id,
            deleted_at,
            changed,
        })
    }

    /// Full timeline, tombstones included, ascending by `(created_at, id)`.
    pub fn list_messages(&self, caller: &Caller, conversation_id: Uuid) -> SyncResult<Vec<MessageResponse>> {
        self.require_member(caller, conversation_id)?;
        self.db
            .list_messages(&conversation_id.to_string())?
            .into_iter()
            .map(convert::message_response)
            .collect()
    }

    fn owned_message(&self, caller: &Caller, id: &str) -> SyncResult<MessageRow> {
        let row = self.db.get_message(id)?.ok_or(SyncError::NotFound("message"))?;
        if row.sender_id != caller.user_id.to_string() {
            return Err(SyncError::NotAuthorized("only the sender may change this message"));
        }
        Ok(row)
    }

    fn validate_content<'a>(&self, content: &'a str) -> SyncResult<&'a str> {
        let content = content.trim();
        if content.is_empty() {
            return Err(SyncError::invalid("message content cannot be empty"));
        }
        if content.chars().count() > self.config.max_message_len {
            return Err(SyncError::invalid(format!(
                "message content exceeds {} characters",
                self.config.max_message_len
            )));
        }
        Ok(content)
    }
}

fn snapshot(quoted: MessageRow) -> ReplySnapshotRow {
    let is_deleted = quoted.deleted_at.is_some();
    ReplySnapshotRow {
        sender_name: quoted.sender_name,
        content: if is_deleted { String::new() } else { quoted.content },
        is_deleted,
    }
}
