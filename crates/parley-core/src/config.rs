use crate::error::{SyncError, SyncResult};

pub const ONLINE_THRESHOLD_MS: i64 = 15_000;
pub const HEARTBEAT_INTERVAL_MS: i64 = 10_000;
pub const TYPING_TTL_MS: i64 = 2_000;
pub const OFFLINE_GRACE_MS: i64 = 5_000;
pub const MAX_MESSAGE_LEN: usize = 2_000;
pub const MAX_GROUP_NAME_LEN: usize = 50;

/// Timing and validation knobs for the engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// A user is online while `now - last_seen` is below this.
    pub online_threshold_ms: i64,
    /// Expected client heartbeat cadence.
    pub heartbeat_interval_ms: i64,
    pub typing_ttl_ms: i64,
    /// Delay before a backgrounded client is reported offline.
    pub offline_grace_ms: i64,
    pub max_message_len: usize,
    pub max_group_name_len: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            online_threshold_ms: ONLINE_THRESHOLD_MS,
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
            typing_ttl_ms: TYPING_TTL_MS,
            offline_grace_ms: OFFLINE_GRACE_MS,
            max_message_len: MAX_MESSAGE_LEN,
            max_group_name_len: MAX_GROUP_NAME_LEN,
        }
    }
}

impl SyncConfig {
    /// Rejects a threshold that does not exceed the heartbeat interval.
    pub fn validate(&self) -> SyncResult<()> {
        if self.heartbeat_interval_ms <= 0 {
            return Err(SyncError::invalid("heartbeat interval must be positive"));
        }
        if self.online_threshold_ms <= self.heartbeat_interval_ms {
            return Err(SyncError::invalid(format!(
                "online threshold ({} ms) must exceed heartbeat interval ({} ms)",
                self.online_threshold_ms, self.heartbeat_interval_ms
            )));
        }
        if self.typing_ttl_ms <= 0 {
            return Err(SyncError::invalid("typing TTL must be positive"));
        }
        if self.offline_grace_ms < 0 {
            return Err(SyncError::invalid("offline grace must not be negative"));
        }
        if self.max_message_len == 0 || self.max_group_name_len == 0 {
            return Err(SyncError::invalid("length caps must be positive"));
        }
        Ok(())
    }
}
