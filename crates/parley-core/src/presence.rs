use parley_types::api::{Caller, PresenceResponse};
use parley_types::models::Millis;
use tracing::debug;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::{SyncEngine, convert};

/// `last_seen` written by an explicit offline signal. Older than any
/// threshold, so the user reads as offline immediately.
pub const OFFLINE_SENTINEL: Millis = i64::MIN;

/// `last_seen` as clients see it. An explicit offline reads as never seen,
/// so the sentinel never leaves the engine.
pub(crate) fn reported_last_seen(last_seen: Option<Millis>) -> Option<Millis> {
    last_seen.filter(|seen| *seen != OFFLINE_SENTINEL)
}

/// Pure presence rule: online while `now - last_seen < threshold`.
/// A user never seen is offline.
pub fn is_online(last_seen: Option<Millis>, now: Millis, threshold_ms: i64) -> bool {
    match last_seen {
        Some(seen) => now.saturating_sub(seen) < threshold_ms,
        None => false,
    }
}

impl SyncEngine {
    pub fn heartbeat(&self, caller: &Caller) -> SyncResult<PresenceResponse> {
        self.write_last_seen(caller.user_id, self.now())
    }

    /// Immediate offline transition, regardless of the threshold.
    pub fn set_offline(&self, caller: &Caller) -> SyncResult<PresenceResponse> {
        self.write_last_seen(caller.user_id, OFFLINE_SENTINEL)
    }

    pub fn presence(&self, user_id: Uuid) -> SyncResult<PresenceResponse> {
        let row = self
            .db
            .get_user_by_id(&user_id.to_string())?
            .ok_or(SyncError::NotFound("user"))?;
        Ok(PresenceResponse {
            user_id: convert::id(&row.id)?,
            last_seen: reported_last_seen(row.last_seen),
            online: is_online(row.last_seen, self.now(), self.config.online_threshold_ms),
        })
    }

    pub fn is_user_online(&self, user_id: Uuid, now: Millis) -> SyncResult<bool> {
        let row = self
            .db
            .get_user_by_id(&user_id.to_string())?
            .ok_or(SyncError::NotFound("user"))?;
        Ok(is_online(row.last_seen, now, self.config.online_threshold_ms))
    }

    fn write_last_seen(&self, user_id: Uuid, last_seen: Millis) -> SyncResult<PresenceResponse> {
        if !self.db.set_last_seen(&user_id.to_string(), last_seen)? {
            return Err(SyncError::NotFound("user"));
        }
        let online = is_online(Some(last_seen), self.now(), self.config.online_threshold_ms);
        debug!("Presence for {}: online={}", user_id, online);
        Ok(PresenceResponse {
            user_id,
            last_seen: reported_last_seen(Some(last_seen)),
            online,
        })
    }
}
