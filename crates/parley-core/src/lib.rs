//! Conversation synchronization engine.
//!
//! Every operation takes the acting [`Caller`] explicitly and runs to
//! completion against the store before returning, so a successful return
//! means the change is committed and safe to fan out.

pub mod clock;
pub mod config;
pub mod error;

mod convert;
mod ledger;
mod membership;
mod presence;
mod reactions;
mod read_status;
mod typing;
mod users;

use std::sync::Arc;

use parley_db::Database;
use parley_types::api::Caller;
use parley_types::models::Conversation;
use uuid::Uuid;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use ledger::{Deleted, Sent};
pub use membership::{ResolvedConversation, direct_key};
pub use presence::{OFFLINE_SENTINEL, is_online};
pub use reactions::{ALLOWED_EMOJIS, Toggled, group_reactions, is_allowed_emoji};

pub struct SyncEngine {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>, config: SyncConfig) -> Self {
        Self { db, clock, config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn now(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Load a conversation the caller belongs to.
    fn member_conversation(&self, caller: &Caller, conversation_id: Uuid) -> SyncResult<Conversation> {
        let row = self
            .db
            .get_conversation(&conversation_id.to_string())?
            .ok_or(SyncError::NotFound("conversation"))?;
        let conversation = convert::conversation(row)?;
        if !conversation.has_member(caller.user_id) {
            return Err(SyncError::NotAuthorized("not a member of this conversation"));
        }
        Ok(conversation)
    }

    fn require_member(&self, caller: &Caller, conversation_id: Uuid) -> SyncResult<()> {
        self.member_conversation(caller, conversation_id).map(|_| ())
    }
}
