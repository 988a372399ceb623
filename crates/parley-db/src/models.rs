/// Database row types. These map directly to SQLite rows.
/// Distinct from parley-types models to keep the DB layer independent.
/// Ids are stored as TEXT uuids, timestamps as INTEGER epoch milliseconds.

pub struct UserRow {
    pub id: String,
    pub external_id: String,
    pub name: String,
    pub image_url: String,
    pub email: Option<String>,
    pub last_seen: Option<i64>,
    pub created_at: i64,
}

pub struct ConversationRow {
    pub id: String,
    pub is_group: bool,
    pub name: Option<String>,
    pub created_at: i64,
    pub last_message_time: Option<i64>,
    /// Member ids in insertion order.
    pub members: Vec<String>,
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_image: String,
    pub content: String,
    pub created_at: i64,
    pub edited_at: Option<i64>,
    pub deleted_at: Option<i64>,
    pub reply_to_id: Option<String>,
    pub reply: Option<ReplySnapshotRow>,
}

pub struct ReplySnapshotRow {
    pub sender_name: String,
    pub content: String,
    pub is_deleted: bool,
}

/// Everything needed to append one message.
pub struct NewMessage<'a> {
    pub id: &'a str,
    pub conversation_id: &'a str,
    pub sender_id: &'a str,
    pub content: &'a str,
    pub reply_to_id: Option<&'a str>,
    pub reply: Option<&'a ReplySnapshotRow>,
    pub idempotency_key: Option<&'a str>,
}

pub struct ReactionRow {
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
    pub created_at: i64,
}

pub struct TypingRow {
    pub user_id: String,
    pub conversation_id: String,
    pub user_name: String,
    pub expires_at: i64,
}

/// Result of appending a message.
pub enum MessageInsert {
    /// Carries the `created_at` stamped under the writer lock.
    Created(i64),
    /// The idempotency key matched an earlier send; carries its id.
    Duplicate(String),
    /// The sender already used this key in a different conversation.
    KeyReused,
}

/// Result of a reaction toggle on one (message, user) key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionChange {
    Added,
    Removed,
    Replaced { previous: String },
}
