use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{ConversationResponse, MessageResponse, ReactionGroup, TypingUser};
use crate::models::Millis;

/// Events pushed over the WebSocket gateway. Every payload is the fresh,
/// post-commit result so clients can replace their state rather than patch it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the connection is authenticated
    Ready { user_id: Uuid, display_name: String },

    /// A conversation the recipient belongs to was created
    ConversationCreate { conversation: ConversationResponse },

    /// A new message was accepted
    MessageCreate { message: MessageResponse },

    /// A message was edited in place
    MessageUpdate { message: MessageResponse },

    /// A message became a tombstone
    MessageDelete {
        conversation_id: Uuid,
        message_id: Uuid,
        deleted_at: Millis,
    },

    /// Reactions on a message changed; carries the full aggregate
    ReactionUpdate {
        conversation_id: Uuid,
        message_id: Uuid,
        reactions: Vec<ReactionGroup>,
    },

    /// A member advanced their read watermark
    ReadStatusUpdate {
        conversation_id: Uuid,
        user_id: Uuid,
        last_read_at: Millis,
    },

    /// The set of active typers in a conversation changed
    TypingUpdate {
        conversation_id: Uuid,
        typers: Vec<TypingUser>,
        next_expiry: Option<Millis>,
    },

    /// A user's presence changed
    PresenceUpdate {
        user_id: Uuid,
        last_seen: Option<Millis>,
        online: bool,
    },
}

impl GatewayEvent {
    /// Returns the conversation this event is scoped to, if any.
    /// Events that return `None` are global and delivered to every client.
    pub fn conversation_id(&self) -> Option<Uuid> {
        match self {
            Self::ConversationCreate { conversation } => Some(conversation.id),
            Self::MessageCreate { message } | Self::MessageUpdate { message } => {
                Some(message.conversation_id)
            }
            Self::MessageDelete { conversation_id, .. }
            | Self::ReactionUpdate { conversation_id, .. }
            | Self::ReadStatusUpdate { conversation_id, .. }
            | Self::TypingUpdate { conversation_id, .. } => Some(*conversation_id),
            // Ready and PresenceUpdate are global
            Self::Ready { .. } | Self::PresenceUpdate { .. } => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Replace the set of conversations this connection receives events for.
    /// Conversations the user is not a member of are dropped.
    Subscribe { conversation_ids: Vec<Uuid> },

    /// Indicate typing in a conversation (client throttles to ~500 ms)
    StartTyping { conversation_id: Uuid },

    /// Keep-alive presence signal (client sends every ~10 s)
    Heartbeat,

    /// Foreground/background transition of the client
    Visibility { visible: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = GatewayEvent::PresenceUpdate {
            user_id: Uuid::nil(),
            last_seen: Some(42),
            online: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "PresenceUpdate");
        assert_eq!(json["data"]["last_seen"], 42);
        assert_eq!(json["data"]["online"], true);
        assert!(event.conversation_id().is_none());
    }

    #[test]
    fn test_scoped_events_report_conversation() {
        let conversation_id = Uuid::new_v4();
        let event = GatewayEvent::TypingUpdate {
            conversation_id,
            typers: vec![],
            next_expiry: None,
        };
        assert_eq!(event.conversation_id(), Some(conversation_id));

        let event = GatewayEvent::ReadStatusUpdate {
            conversation_id,
            user_id: Uuid::new_v4(),
            last_read_at: 10,
        };
        assert_eq!(event.conversation_id(), Some(conversation_id));
    }

    #[test]
    fn test_command_parsing() {
        let cmd: GatewayCommand =
            serde_json::from_str(r#"{"type":"Visibility","data":{"visible":false}}"#).unwrap();
        assert!(matches!(cmd, GatewayCommand::Visibility { visible: false }));

        let cmd: GatewayCommand = serde_json::from_str(r#"{"type":"Heartbeat"}"#).unwrap();
        assert!(matches!(cmd, GatewayCommand::Heartbeat));

        let bad = serde_json::from_str::<GatewayCommand>(r#"{"type":"VoiceJoin"}"#);
        assert!(bad.is_err());
    }
}
