use std::collections::HashMap;

use parley_types::api::{Caller, ReadStatus, UnreadCountResponse};
use parley_types::models::Millis;
use tracing::debug;
use uuid::Uuid;

use crate::error::SyncResult;
use crate::{SyncEngine, convert};

impl SyncEngine {
    /// Advance the caller's watermark to now. Repeated calls are harmless and
    /// the watermark never moves backwards. Returns the stored watermark.
    pub fn mark_read(&self, caller: &Caller, conversation_id: Uuid) -> SyncResult<Millis> {
        self.require_member(caller, conversation_id)?;
        let stored = self.db.mark_read(
            &caller.user_id.to_string(),
            &conversation_id.to_string(),
            || self.now(),
        )?;
        debug!("{} read {} up to {}", caller.user_id, conversation_id, stored);
        Ok(stored)
    }

    /// Messages from other members newer than the caller's watermark.
    /// Tombstones still count.
    pub fn unread_count(&self, caller: &Caller, conversation_id: Uuid) -> SyncResult<u64> {
        self.require_member(caller, conversation_id)?;
        self.count_unread_for(caller, conversation_id)
    }

    /// `my_last_read_at` must be captured before `mark_read` to place the
    /// unread divider. `other_last_read_at` is the minimum over every other
    /// member, with a missing receipt counting as 0.
    pub fn read_status(&self, caller: &Caller, conversation_id: Uuid) -> SyncResult<ReadStatus> {
        let conversation = self.member_conversation(caller, conversation_id)?;

        let receipts: HashMap<Uuid, Millis> = self
            .db
            .get_receipts_for_conversation(&conversation_id.to_string())?
            .into_iter()
            .map(|(user_id, at)| Ok((convert::id(&user_id)?, at)))
            .collect::<SyncResult<_>>()?;

        let my_last_read_at = receipts.get(&caller.user_id).copied().unwrap_or(0);
        let other_last_read_at = conversation
            .members
            .iter()
            .filter(|id| **id != caller.user_id)
            .map(|id| receipts.get(id).copied().unwrap_or(0))
            .min()
            .unwrap_or(0);

        Ok(ReadStatus {
            my_last_read_at,
            other_last_read_at,
        })
    }

    /// Unread counts for every conversation the caller belongs to.
    pub fn unread_counts(&self, caller: &Caller) -> SyncResult<Vec<UnreadCountResponse>> {
        self.db
            .conversations_for_user(&caller.user_id.to_string())?
            .into_iter()
            .map(|row| {
                let conversation_id = convert::id(&row.id)?;
                Ok(UnreadCountResponse {
                    conversation_id,
                    count: self.count_unread_for(caller, conversation_id)?,
                })
            })
            .collect()
    }

    fn count_unread_for(&self, caller: &Caller, conversation_id: Uuid) -> SyncResult<u64> {
        let user_id = caller.user_id.to_string();
        let conv = conversation_id.to_string();
        let after = self.db.get_last_read_at(&user_id, &conv)?.unwrap_or(0);
        Ok(self.db.count_unread(&conv, &user_id, after)?)
    }
}
