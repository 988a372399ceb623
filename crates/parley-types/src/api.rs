use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Millis, ReplyPreview};

// -- Identity --

/// JWT claims minted by the external identity provider. Shared by the REST
/// middleware and the gateway upgrade so both map a token to the same user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Stable external subject, mapped 1:1 to a User.
    pub sub: String,
    pub name: String,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: usize,
}

/// The authenticated user an operation runs on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub display_name: String,
}

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncProfileRequest {
    pub name: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub image_url: String,
    pub last_seen: Option<Millis>,
    pub online: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceResponse {
    pub user_id: Uuid,
    pub last_seen: Option<Millis>,
    pub online: bool,
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateDirectRequest {
    pub other_user_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGroupRequest {
    pub name: String,
    pub member_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastMessagePreview {
    pub id: Uuid,
    pub sender_id: Uuid,
    /// Empty when the message is a tombstone.
    pub content: String,
    pub created_at: Millis,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub id: Uuid,
    pub is_group: bool,
    pub name: Option<String>,
    pub created_at: Millis,
    pub last_message_time: Option<Millis>,
    pub members: Vec<UserResponse>,
    pub last_message: Option<LastMessagePreview>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub reply_to_id: Option<Uuid>,
    /// Client-generated token; a retried send with the same key returns the
    /// original message instead of creating a duplicate.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditMessageRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub sender_image: String,
    /// Empty for tombstones; clients render a placeholder.
    pub content: String,
    pub created_at: Millis,
    pub edited_at: Option<Millis>,
    pub deleted_at: Option<Millis>,
    pub reply_to_id: Option<Uuid>,
    pub reply_preview: Option<ReplyPreview>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub message_id: Uuid,
    /// False when the idempotency key matched an earlier send.
    pub created: bool,
}

// -- Reactions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToggleReactionRequest {
    pub emoji: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchReactionsRequest {
    pub message_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionGroup {
    pub emoji: String,
    pub count: usize,
    pub user_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleOutcome {
    Added,
    Removed,
    Replaced,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleReactionResponse {
    pub outcome: ToggleOutcome,
    pub reactions: Vec<ReactionGroup>,
}

pub type ReactionsByMessage = HashMap<Uuid, Vec<ReactionGroup>>;

// -- Read status --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadStatus {
    /// Capture before marking read to place the unread divider.
    pub my_last_read_at: Millis,
    /// Minimum watermark across every other member (0 if any has none).
    pub other_last_read_at: Millis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub last_read_at: Millis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    pub conversation_id: Uuid,
    pub count: u64,
}

// -- Typing --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingUser {
    pub user_id: Uuid,
    pub user_name: String,
    pub expires_at: Millis,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveTypers {
    pub typers: Vec<TypingUser>,
    /// Earliest expiry among `typers`; subscribers recheck at this instant.
    pub next_expiry: Option<Millis>,
}
