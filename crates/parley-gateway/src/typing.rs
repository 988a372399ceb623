use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use parley_core::SyncEngine;
use parley_types::events::GatewayEvent;

use crate::dispatcher::Dispatcher;

/// Re-evaluates a conversation's typers when the earliest signal lapses, so
/// subscribers see "is typing" disappear without polling. At most one timer
/// per conversation is armed; it always targets the earliest known expiry.
#[derive(Clone)]
pub struct TypingScheduler {
    engine: Arc<SyncEngine>,
    dispatcher: Dispatcher,
    /// conversation_id -> armed deadline (engine clock, ms)
    armed: Arc<Mutex<HashMap<Uuid, i64>>>,
}

impl TypingScheduler {
    pub fn new(engine: Arc<SyncEngine>, dispatcher: Dispatcher) -> Self {
        Self {
            engine,
            dispatcher,
            armed: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Broadcast the current typers of `conversation_id` and arm a recheck at
    /// the next expiry. The payload includes every active typer; clients drop
    /// their own entry.
    pub async fn refresh(&self, conversation_id: Uuid) {
        let engine = self.engine.clone();
        let dispatcher = self.dispatcher.clone();
        // Snapshot and send under the ordering lock so a stale typer set can
        // never overtake a fresher one
        let snapshot = tokio::task::spawn_blocking(move || {
            dispatcher.broadcast_in_order(
                || engine.typing_snapshot(conversation_id, None),
                |typers| {
                    Some(GatewayEvent::TypingUpdate {
                        conversation_id,
                        typers: typers.typers.clone(),
                        next_expiry: typers.next_expiry,
                    })
                },
            )
        })
        .await;
        let next_expiry = match snapshot {
            Ok(Ok(typers)) => typers.next_expiry,
            Ok(Err(e)) => {
                warn!("Typing snapshot for {} failed: {}", conversation_id, e);
                return;
            }
            Err(e) => {
                warn!("Typing snapshot task for {} failed: {}", conversation_id, e);
                return;
            }
        };

        if let Some(at) = next_expiry {
            self.arm(conversation_id, at);
        }
    }

    fn arm(&self, conversation_id: Uuid, at: i64) {
        {
            let Ok(mut armed) = self.armed.lock() else {
                return;
            };
            // An earlier timer will re-arm for later expiries itself
            if armed.get(&conversation_id).is_some_and(|existing| *existing <= at) {
                return;
            }
            armed.insert(conversation_id, at);
        }

        let delay = Duration::from_millis((at - self.engine.now()).max(0) as u64);
        debug!("Typing recheck for {} in {:?}", conversation_id, delay);

        let scheduler = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let still_armed = match scheduler.armed.lock() {
                Ok(mut armed) if armed.get(&conversation_id) == Some(&at) => {
                    armed.remove(&conversation_id);
                    true
                }
                _ => false,
            };
            if still_armed {
                scheduler.refresh(conversation_id).await;
            }
        });
    }
}
