use parley_types::api::{Caller, Claims, SyncProfileRequest, UserResponse};
use parley_types::models::User;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::{SyncEngine, convert};

const MAX_DISPLAY_NAME_LEN: usize = 64;

impl SyncEngine {
    /// Map verified identity-provider claims to a local user, creating it on
    /// first sight. Concurrent first requests for one subject resolve to the
    /// same user.
    pub fn resolve_caller(&self, claims: &Claims) -> SyncResult<Caller> {
        if claims.sub.trim().is_empty() {
            return Err(SyncError::Unauthenticated);
        }

        let name = match claims.name.trim() {
            "" => "Anonymous",
            name => name,
        };
        let new_id = Uuid::new_v4().to_string();
        let row = self.db.ensure_user(
            &new_id,
            &claims.sub,
            name,
            claims.picture.as_deref().unwrap_or(""),
            claims.email.as_deref(),
            self.now(),
        )?;
        if row.id == new_id {
            info!("Provisioned user {} for subject {}", row.id, claims.sub);
        }

        Ok(Caller {
            user_id: convert::id(&row.id)?,
            display_name: row.name,
        })
    }

    pub fn current_user(&self, caller: &Caller) -> SyncResult<User> {
        let row = self
            .db
            .get_user_by_id(&caller.user_id.to_string())?
            .ok_or(SyncError::Unauthenticated)?;
        convert::user(row)
    }

    /// Overwrite the caller's profile with what the identity provider holds.
    pub fn sync_profile(&self, caller: &Caller, req: &SyncProfileRequest) -> SyncResult<User> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(SyncError::invalid("name cannot be empty"));
        }
        if name.chars().count() > MAX_DISPLAY_NAME_LEN {
            return Err(SyncError::invalid(format!(
                "name exceeds {} characters",
                MAX_DISPLAY_NAME_LEN
            )));
        }

        let id = caller.user_id.to_string();
        if !self
            .db
            .update_profile(&id, name, req.image_url.trim(), req.email.as_deref())?
        {
            return Err(SyncError::Unauthenticated);
        }
        debug!("{} synced profile", caller.user_id);
        self.current_user(caller)
    }

    pub fn get_user(&self, user_id: Uuid) -> SyncResult<UserResponse> {
        let row = self
            .db
            .get_user_by_id(&user_id.to_string())?
            .ok_or(SyncError::NotFound("user"))?;
        convert::user_response(row, self.now(), self.config.online_threshold_ms)
    }

    /// Every user except the caller, with derived presence.
    pub fn list_users(&self, caller: &Caller) -> SyncResult<Vec<UserResponse>> {
        let now = self.now();
        self.db
            .list_users_except(&caller.user_id.to_string())?
            .into_iter()
            .map(|row| convert::user_response(row, now, self.config.online_threshold_ms))
            .collect()
    }
}
