use parley_types::api::{ActiveTypers, Caller, TypingUser};
use parley_types::models::TypingSignal;
use tracing::debug;
use uuid::Uuid;

use crate::error::SyncResult;
use crate::{SyncEngine, convert};

impl SyncEngine {
    /// Record that the caller is typing until `now + typing_ttl`. No
    /// throttling happens here; each call just pushes the expiry out.
    pub fn set_typing(&self, caller: &Caller, conversation_id: Uuid) -> SyncResult<TypingSignal> {
        self.require_member(caller, conversation_id)?;
        let expires_at = self.now() + self.config.typing_ttl_ms;
        self.db.upsert_typing(
            &caller.user_id.to_string(),
            &conversation_id.to_string(),
            &caller.display_name,
            expires_at,
        )?;
        debug!("{} typing in {} until {}", caller.user_id, conversation_id, expires_at);

        Ok(TypingSignal {
            user_id: caller.user_id,
            conversation_id,
            user_name: caller.display_name.clone(),
            expires_at,
        })
    }

    /// Everyone but the caller who is typing right now.
    pub fn active_typers(&self, caller: &Caller, conversation_id: Uuid) -> SyncResult<ActiveTypers> {
        self.require_member(caller, conversation_id)?;
        self.typing_snapshot(conversation_id, Some(caller.user_id))
    }

    /// Active signals for a conversation, evaluated lazily against the
    /// clock. Used by the push layer, which filters per recipient.
    pub fn typing_snapshot(&self, conversation_id: Uuid, excluding: Option<Uuid>) -> SyncResult<ActiveTypers> {
        let now = self.now();
        let mut typers = Vec::new();
        for row in self.db.get_typing_for_conversation(&conversation_id.to_string())? {
            let user_id = convert::id(&row.user_id)?;
            if row.expires_at <= now || Some(user_id) == excluding {
                continue;
            }
            typers.push(TypingUser {
                user_id,
                user_name: row.user_name,
                expires_at: row.expires_at,
            });
        }

        // Rows arrive sorted by expiry
        let next_expiry = typers.first().map(|t| t.expires_at);
        Ok(ActiveTypers { typers, next_expiry })
    }
}

#[cfg(test)]
mod tests {
    use crate::error::SyncError;
    use crate::test_support::Harness;

    #[test]
    fn test_typing_expires_lazily() {
        let h = Harness::new();
        let alice = h.user("alice");
        let bob = h.user("bob");
        let conv = h.direct(&alice, &bob);

        let signal = h.engine.set_typing(&alice, conv).unwrap();
        assert_eq!(signal.expires_at, 3_000);
        assert!(signal.is_active(2_999));

        let seen = h.engine.active_typers(&bob, conv).unwrap();
        assert_eq!(seen.typers.len(), 1);
        assert_eq!(seen.typers[0].user_name, "alice");
        assert_eq!(seen.next_expiry, Some(3_000));

        // The typer never sees themselves
        assert!(h.engine.active_typers(&alice, conv).unwrap().typers.is_empty());

        h.clock.set(3_000);
        let seen = h.engine.active_typers(&bob, conv).unwrap();
        assert!(seen.typers.is_empty());
        assert_eq!(seen.next_expiry, None);
    }

    #[test]
    fn test_typing_refresh_extends_expiry() {
        let h = Harness::new();
        let alice = h.user("alice");
        let bob = h.user("bob");
        let carol = h.user("carol");
        let group = h
            .engine
            .create_group_conversation(&alice, "trio", &[bob.user_id, carol.user_id])
            .unwrap()
            .id;

        h.engine.set_typing(&alice, group).unwrap();
        h.clock.advance(500);
        h.engine.set_typing(&bob, group).unwrap();
        h.clock.advance(500);
        h.engine.set_typing(&alice, group).unwrap();

        let seen = h.engine.active_typers(&carol, group).unwrap();
        let names: Vec<&str> = seen.typers.iter().map(|t| t.user_name.as_str()).collect();
        assert_eq!(names, vec!["bob", "alice"]);
        assert_eq!(seen.next_expiry, Some(3_500));

        let err = h.engine.set_typing(&h.user("eve"), group).unwrap_err();
        assert!(matches!(err, SyncError::NotAuthorized(_)));
    }
}
