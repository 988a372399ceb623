use std::collections::HashMap;

use parley_db::models::{MessageRow, ReactionChange};
use parley_types::api::{Caller, ReactionGroup, ReactionsByMessage, ToggleOutcome};
use tracing::debug;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::{SyncEngine, convert};

pub const ALLOWED_EMOJIS: [&str; 5] = ["👍", "❤️", "😂", "😮", "😢"];

pub fn is_allowed_emoji(emoji: &str) -> bool {
    ALLOWED_EMOJIS.contains(&emoji)
}

#[derive(Debug, Clone)]
pub struct Toggled {
    pub conversation_id: Uuid,
    pub message_id: Uuid,
    pub outcome: ToggleOutcome,
    /// Fresh aggregate for the message after the toggle.
    pub reactions: Vec<ReactionGroup>,
}

/// Group `(user, emoji)` pairs by emoji, keeping the order in which each
/// emoji first appears.
pub fn group_reactions<'a>(reactions: impl IntoIterator<Item = (Uuid, &'a str)>) -> Vec<ReactionGroup> {
    let mut groups: Vec<ReactionGroup> = Vec::new();
    for (user_id, emoji) in reactions {
        match groups.iter_mut().find(|g| g.emoji == emoji) {
            Some(group) => {
                group.count += 1;
                group.user_ids.push(user_id);
            }
            None => groups.push(ReactionGroup {
                emoji: emoji.to_string(),
                count: 1,
                user_ids: vec![user_id],
            }),
        }
    }
    groups
}

impl SyncEngine {
    /// Apply one toggle on the caller's (message, user) key. The store
    /// serializes concurrent toggles on the same key, so the caller never
    /// ends up with two reactions on one message.
    pub fn toggle_reaction(&self, caller: &Caller, message_id: Uuid, emoji: &str) -> SyncResult<Toggled> {
        if !is_allowed_emoji(emoji) {
            return Err(SyncError::invalid(format!("emoji '{}' is not allowed", emoji)));
        }

        let id = message_id.to_string();
        let message = self.visible_message(caller, &id)?;
        if message.deleted_at.is_some() {
            return Err(SyncError::NotFound("message"));
        }

        let change = self
            .db
            .toggle_reaction(&id, &caller.user_id.to_string(), emoji, self.now())?;
        debug!("{} toggled {} on {}: {:?}", caller.user_id, emoji, message_id, change);

        let outcome = match change {
            ReactionChange::Added => ToggleOutcome::Added,
            ReactionChange::Removed => ToggleOutcome::Removed,
            ReactionChange::Replaced { .. } => ToggleOutcome::Replaced,
        };

        Ok(Toggled {
            conversation_id: convert::id(&message.conversation_id)?,
            message_id,
            outcome,
            reactions: self.reactions_for(&id)?,
        })
    }

    pub fn aggregate_reactions(&self, caller: &Caller, message_id: Uuid) -> SyncResult<Vec<ReactionGroup>> {
        let id = message_id.to_string();
        self.visible_message(caller, &id)?;
        self.reactions_for(&id)
    }

    /// Aggregate many messages in one round-trip. Every requested id gets an
    /// entry; ids the caller cannot see map to an empty list.
    pub fn aggregate_reactions_many(&self, caller: &Caller, message_ids: &[Uuid]) -> SyncResult<ReactionsByMessage> {
        let user_id = caller.user_id.to_string();
        let mut membership: HashMap<String, bool> = HashMap::new();
        let mut visible = Vec::with_capacity(message_ids.len());

        for message_id in message_ids {
            let Some(row) = self.db.get_message(&message_id.to_string())? else {
                continue;
            };
            let allowed = match membership.get(&row.conversation_id) {
                Some(allowed) => *allowed,
                None => {
                    let allowed = self.db.is_member(&row.conversation_id, &user_id)?;
                    membership.insert(row.conversation_id.clone(), allowed);
                    allowed
                }
            };
            if allowed {
                visible.push(row.id);
            }
        }

        let mut by_message: HashMap<String, Vec<(Uuid, String)>> = HashMap::new();
        for row in self.db.get_reactions_for_messages(&visible)? {
            by_message
                .entry(row.message_id)
                .or_default()
                .push((convert::id(&row.user_id)?, row.emoji));
        }

        Ok(message_ids
            .iter()
            .map(|id| {
                let groups = by_message
                    .get(&id.to_string())
                    .map(|pairs| group_reactions(pairs.iter().map(|(u, e)| (*u, e.as_str()))))
                    .unwrap_or_default();
                (*id, groups)
            })
            .collect())
    }

    fn reactions_for(&self, message_id: &str) -> SyncResult<Vec<ReactionGroup>> {
        let rows = self.db.get_reactions_for_messages(&[message_id.to_string()])?;
        let pairs = rows
            .into_iter()
            .map(|r| Ok((convert::id(&r.user_id)?, r.emoji)))
            .collect::<SyncResult<Vec<_>>>()?;
        Ok(group_reactions(pairs.iter().map(|(u, e)| (*u, e.as_str()))))
    }

    /// Load a message whose conversation the caller belongs to.
    fn visible_message(&self, caller: &Caller, message_id: &str) -> SyncResult<MessageRow> {
        let row = self.db.get_message(message_id)?.ok_or(SyncError::NotFound("message"))?;
        if !self.db.is_member(&row.conversation_id, &caller.user_id.to_string())? {
            return Err(SyncError::NotAuthorized("not a member of this conversation"));
        }
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;

    #[test]
    fn test_group_reactions_keeps_first_appearance_order() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let groups = group_reactions([(a, "😂"), (b, "👍"), (c, "😂")]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].emoji, "😂");
        assert_eq!(groups[0].count, 2);
        assert_eq!(groups[0].user_ids, vec![a, c]);
        assert_eq!(groups[1].emoji, "👍");
    }

    #[test]
    fn test_toggle_transitions() {
        let h = Harness::new();
        let alice = h.user("alice");
        let bob = h.user("bob");
        let conv = h.direct(&alice, &bob);
        let msg = h.send(&alice, conv, "react to me");

        let added = h.engine.toggle_reaction(&bob, msg, "👍").unwrap();
        assert_eq!(added.outcome, ToggleOutcome::Added);
        assert_eq!(added.conversation_id, conv);
        assert_eq!(added.reactions[0].user_ids, vec![bob.user_id]);

        let replaced = h.engine.toggle_reaction(&bob, msg, "❤️").unwrap();
        assert_eq!(replaced.outcome, ToggleOutcome::Replaced);
        assert_eq!(replaced.reactions.len(), 1);
        assert_eq!(replaced.reactions[0].emoji, "❤️");

        let removed = h.engine.toggle_reaction(&bob, msg, "❤️").unwrap();
        assert_eq!(removed.outcome, ToggleOutcome::Removed);
        assert!(removed.reactions.is_empty());
    }

    #[test]
    fn test_toggle_rejects_bad_input() {
        let h = Harness::new();
        let alice = h.user("alice");
        let bob = h.user("bob");
        let eve = h.user("eve");
        let conv = h.direct(&alice, &bob);
        let msg = h.send(&alice, conv, "hi");

        let err = h.engine.toggle_reaction(&bob, msg, "🦀").unwrap_err();
        assert!(matches!(err, SyncError::InvalidArgument(_)));
        let err = h.engine.toggle_reaction(&eve, msg, "👍").unwrap_err();
        assert!(matches!(err, SyncError::NotAuthorized(_)));
        let err = h.engine.toggle_reaction(&bob, Uuid::new_v4(), "👍").unwrap_err();
        assert!(matches!(err, SyncError::NotFound("message")));

        h.engine.delete_message(&alice, msg).unwrap();
        let err = h.engine.toggle_reaction(&bob, msg, "👍").unwrap_err();
        assert!(matches!(err, SyncError::NotFound("message")));
    }

    #[test]
    fn test_aggregate_many_has_entry_per_id() {
        let h = Harness::new();
        let alice = h.user("alice");
        let bob = h.user("bob");
        let carol = h.user("carol");
        let conv = h.direct(&alice, &bob);
        let hidden_conv = h.direct(&bob, &carol);

        let m1 = h.send(&alice, conv, "one");
        let m2 = h.send(&alice, conv, "two");
        let hidden = h.send(&bob, hidden_conv, "not for alice");
        h.engine.toggle_reaction(&alice, m1, "😂").unwrap();
        h.engine.toggle_reaction(&bob, m1, "😂").unwrap();
        h.engine.toggle_reaction(&carol, hidden, "😮").unwrap();

        let missing = Uuid::new_v4();
        let all = h
            .engine
            .aggregate_reactions_many(&alice, &[m1, m2, hidden, missing])
            .unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[&m1][0].count, 2);
        assert!(all[&m2].is_empty());
        assert!(all[&hidden].is_empty());
        assert!(all[&missing].is_empty());

        assert_eq!(h.engine.aggregate_reactions(&bob, m1).unwrap(), all[&m1]);
    }
}
