use std::collections::{HashMap, HashSet};

use parley_types::api::{Caller, ConversationResponse, LastMessagePreview, UserResponse};
use parley_types::models::Conversation;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::{SyncEngine, convert};

/// Lookup/insert rounds before a direct-conversation race is surfaced.
const DIRECT_CREATE_ATTEMPTS: usize = 3;

/// Order-independent storage key for the direct conversation of `a` and `b`.
pub fn direct_key(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{}:{}", lo, hi)
}

#[derive(Debug, Clone)]
pub struct ResolvedConversation {
    pub conversation: Conversation,
    /// True only for the call whose insert won.
    pub created: bool,
}

impl SyncEngine {
    /// Return the single direct conversation of the caller and `other_user_id`,
    /// creating it if absent. Racing callers all end up with the same id: the
    /// store's unique direct key rejects the losing insert, which is then
    /// retried as a lookup.
    pub fn get_or_create_direct_conversation(
        &self,
        caller: &Caller,
        other_user_id: Uuid,
    ) -> SyncResult<ResolvedConversation> {
        if other_user_id == caller.user_id {
            return Err(SyncError::invalid("cannot open a direct conversation with yourself"));
        }
        if self.db.get_user_by_id(&other_user_id.to_string())?.is_none() {
            return Err(SyncError::NotFound("user"));
        }

        let key = direct_key(caller.user_id, other_user_id);
        for attempt in 1..=DIRECT_CREATE_ATTEMPTS {
            if let Some(row) = self.db.find_direct_conversation(&key)? {
                return Ok(ResolvedConversation {
                    conversation: convert::conversation(row)?,
                    created: false,
                });
            }

            match self.insert_direct(&key, caller.user_id, other_user_id) {
                Ok(conversation) => {
                    info!("Created direct conversation {} ({})", conversation.id, key);
                    return Ok(ResolvedConversation {
                        conversation,
                        created: true,
                    });
                }
                Err(SyncError::Conflict(_)) => {
                    debug!("Direct conversation {} lost creation race (attempt {}), retrying as lookup", key, attempt);
                }
                Err(e) => return Err(e),
            }
        }

        Err(SyncError::Conflict("direct conversation creation kept conflicting"))
    }

    fn insert_direct(&self, key: &str, a: Uuid, b: Uuid) -> SyncResult<Conversation> {
        let id = Uuid::new_v4();
        let now = self.now();
        let (a_str, b_str) = (a.to_string(), b.to_string());

        if !self
            .db
            .insert_direct_conversation(&id.to_string(), key, &[a_str.as_str(), b_str.as_str()], now)?
        {
            return Err(SyncError::Conflict("direct conversation already exists"));
        }

        Ok(Conversation {
            id,
            members: vec![a, b],
            is_group: false,
            name: None,
            created_at: now,
            last_message_time: None,
        })
    }

    /// Create a new group. The caller is always the first member; duplicate
    /// ids are dropped. Groups are never deduplicated.
    pub fn create_group_conversation(
        &self,
        caller: &Caller,
        name: &str,
        member_ids: &[Uuid],
    ) -> SyncResult<Conversation> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SyncError::invalid("group name cannot be empty"));
        }
        if name.chars().count() > self.config.max_group_name_len {
            return Err(SyncError::invalid(format!(
                "group name exceeds {} characters",
                self.config.max_group_name_len
            )));
        }

        let mut seen = HashSet::new();
        let members: Vec<Uuid> = std::iter::once(caller.user_id)
            .chain(member_ids.iter().copied())
            .filter(|id| seen.insert(*id))
            .collect();
        if members.len() < 2 {
            return Err(SyncError::invalid("a group needs at least one other member"));
        }

        let member_strs: Vec<String> = members.iter().map(Uuid::to_string).collect();
        let found = self.db.get_users_by_ids(&member_strs)?;
        if found.len() != members.len() {
            return Err(SyncError::NotFound("user"));
        }

        let id = Uuid::new_v4();
        let now = self.now();
        let refs: Vec<&str> = member_strs.iter().map(String::as_str).collect();
        self.db.insert_group_conversation(&id.to_string(), name, &refs, now)?;

        info!("{} created group {} '{}' with {} members", caller.user_id, id, name, members.len());
        Ok(Conversation {
            id,
            members,
            is_group: true,
            name: Some(name.to_string()),
            created_at: now,
            last_message_time: None,
        })
    }

    /// Every conversation the caller belongs to, most recent activity first,
    /// with member profiles and the latest message.
    pub fn list_conversations(&self, caller: &Caller) -> SyncResult<Vec<ConversationResponse>> {
        let rows = self.db.conversations_for_user(&caller.user_id.to_string())?;
        let conversations = rows
            .into_iter()
            .map(convert::conversation)
            .collect::<SyncResult<Vec<_>>>()?;

        let profiles = self.profiles_for(&conversations)?;
        conversations
            .into_iter()
            .map(|c| self.conversation_response(c, &profiles))
            .collect()
    }

    pub fn get_conversation(&self, caller: &Caller, conversation_id: Uuid) -> SyncResult<ConversationResponse> {
        let conversation = self.member_conversation(caller, conversation_id)?;
        let profiles = self.profiles_for(std::slice::from_ref(&conversation))?;
        self.conversation_response(conversation, &profiles)
    }

    /// The subset of `conversation_ids` the caller is a member of.
    pub fn member_conversation_ids(&self, caller: &Caller, conversation_ids: &[Uuid]) -> SyncResult<Vec<Uuid>> {
        let user_id = caller.user_id.to_string();
        let mut allowed = Vec::with_capacity(conversation_ids.len());
        for id in conversation_ids {
            if self.db.is_member(&id.to_string(), &user_id)? {
                allowed.push(*id);
            }
        }
        Ok(allowed)
    }

    fn profiles_for(&self, conversations: &[Conversation]) -> SyncResult<HashMap<Uuid, UserResponse>> {
        let ids: Vec<String> = conversations
            .iter()
            .flat_map(|c| c.members.iter())
            .collect::<HashSet<_>>()
            .into_iter()
            .map(Uuid::to_string)
            .collect();

        let now = self.now();
        self.db
            .get_users_by_ids(&ids)?
            .into_iter()
            .map(|row| {
                let profile = convert::user_response(row, now, self.config.online_threshold_ms)?;
                Ok((profile.id, profile))
            })
            .collect()
    }

    fn conversation_response(
        &self,
        conversation: Conversation,
        profiles: &HashMap<Uuid, UserResponse>,
    ) -> SyncResult<ConversationResponse> {
        let last_message = self
            .db
            .latest_message(&conversation.id.to_string())?
            .map(convert::message)
            .transpose()?
            .map(|m| LastMessagePreview {
                id: m.id,
                sender_id: m.sender_id,
                is_deleted: m.is_deleted(),
                content: if m.is_deleted() { String::new() } else { m.content },
                created_at: m.created_at,
            });

        Ok(ConversationResponse {
            id: conversation.id,
            is_group: conversation.is_group,
            name: conversation.name,
            created_at: conversation.created_at,
            last_message_time: conversation.last_message_time,
            members: conversation
                .members
                .iter()
                .filter_map(|id| profiles.get(id).cloned())
                .collect(),
            last_message,
        })
    }
}
