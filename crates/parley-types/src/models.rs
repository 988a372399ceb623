use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// All timestamps are epoch milliseconds.
pub type Millis = i64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Stable subject issued by the identity provider.
    pub external_id: String,
    pub name: String,
    pub image_url: String,
    pub email: Option<String>,
    /// Only ever written by heartbeat / offline signals. `None` = never seen.
    pub last_seen: Option<Millis>,
    pub created_at: Millis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    /// Insertion order is preserved; no duplicates.
    pub members: Vec<Uuid>,
    pub is_group: bool,
    pub name: Option<String>,
    pub created_at: Millis,
    pub last_message_time: Option<Millis>,
}

impl Conversation {
    pub fn has_member(&self, user_id: Uuid) -> bool {
        self.members.contains(&user_id)
    }
}

/// Snapshot of a quoted message, frozen at the moment the reply was sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyPreview {
    pub sender_name: String,
    pub content: String,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    /// Retained after soft-delete for audit; never expose for tombstones.
    pub content: String,
    pub created_at: Millis,
    pub edited_at: Option<Millis>,
    pub deleted_at: Option<Millis>,
    pub reply_to_id: Option<Uuid>,
    pub reply_preview: Option<ReplyPreview>,
}

impl Message {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingSignal {
    pub user_id: Uuid,
    pub conversation_id: Uuid,
    pub user_name: String,
    pub expires_at: Millis,
}

impl TypingSignal {
    pub fn is_active(&self, now: Millis) -> bool {
        self.expires_at > now
    }
}
