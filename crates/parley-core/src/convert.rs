//! Row → model conversions. Ids are TEXT in the store; a row that does not
//! parse is a storage fault, not a caller error.

use anyhow::Context;
use parley_db::models::{ConversationRow, MessageRow, UserRow};
use parley_types::api::{MessageResponse, UserResponse};
use parley_types::models::{Conversation, Message, ReplyPreview, User};
use uuid::Uuid;

use crate::error::SyncResult;
use crate::presence::{is_online, reported_last_seen};

pub(crate) fn id(raw: &str) -> SyncResult<Uuid> {
    Ok(Uuid::parse_str(raw).with_context(|| format!("Corrupt id in store: '{}'", raw))?)
}

pub(crate) fn user(row: UserRow) -> SyncResult<User> {
    Ok(User {
        id: id(&row.id)?,
        external_id: row.external_id,
        name: row.name,
        image_url: row.image_url,
        email: row.email,
        last_seen: reported_last_seen(row.last_seen),
        created_at: row.created_at,
    })
}

pub(crate) fn user_response(row: UserRow, now: i64, threshold_ms: i64) -> SyncResult<UserResponse> {
    Ok(UserResponse {
        id: id(&row.id)?,
        online: is_online(row.last_seen, now, threshold_ms),
        name: row.name,
        image_url: row.image_url,
        last_seen: reported_last_seen(row.last_seen),
    })
}

pub(crate) fn conversation(row: ConversationRow) -> SyncResult<Conversation> {
    Ok(Conversation {
        id: id(&row.id)?,
        members: row.members.iter().map(|m| id(m)).collect::<SyncResult<Vec<_>>>()?,
        is_group: row.is_group,
        name: row.name,
        created_at: row.created_at,
        last_message_time: row.last_message_time,
    })
}

pub(crate) fn message(row: MessageRow) -> SyncResult<Message> {
    Ok(Message {
        id: id(&row.id)?,
        conversation_id: id(&row.conversation_id)?,
        sender_id: id(&row.sender_id)?,
        content: row.content,
        created_at: row.created_at,
        edited_at: row.edited_at,
        deleted_at: row.deleted_at,
        reply_to_id: row.reply_to_id.as_deref().map(id).transpose()?,
        reply_preview: row.reply.map(|r| ReplyPreview {
            sender_name: r.sender_name,
            content: r.content,
            is_deleted: r.is_deleted,
        }),
    })
}

/// Outward view of a message. Tombstones never leak their content.
pub(crate) fn message_response(row: MessageRow) -> SyncResult<MessageResponse> {
    let sender_name = row.sender_name.clone();
    let sender_image = row.sender_image.clone();
    let msg = message(row)?;
    let content = if msg.is_deleted() { String::new() } else { msg.content };

    Ok(MessageResponse {
        id: msg.id,
        conversation_id: msg.conversation_id,
        sender_id: msg.sender_id,
        sender_name,
        sender_image,
        content,
        created_at: msg.created_at,
        edited_at: msg.edited_at,
        deleted_at: msg.deleted_at,
        reply_to_id: msg.reply_to_id,
        reply_preview: msg.reply_preview,
    })
}
