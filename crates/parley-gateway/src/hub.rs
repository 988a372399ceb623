use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tracing::{error, warn};
use uuid::Uuid;

use parley_core::{SyncEngine, SyncError, SyncResult};
use parley_types::api::{Caller, ConversationResponse, PresenceResponse};
use parley_types::events::GatewayEvent;

use crate::dispatcher::Dispatcher;
use crate::presence::PresenceGrace;
use crate::typing::TypingScheduler;

/// Shared push-layer state: the engine plus everything that fans its
/// committed results out to connected clients.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    engine: Arc<SyncEngine>,
    dispatcher: Dispatcher,
    typing: TypingScheduler,
    grace: PresenceGrace,
}

impl Hub {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        let dispatcher = Dispatcher::new();
        let typing = TypingScheduler::new(engine.clone(), dispatcher.clone());
        Self {
            inner: Arc::new(HubInner {
                engine,
                dispatcher,
                typing,
                grace: PresenceGrace::new(),
            }),
        }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.inner.engine
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Run a synchronous engine operation on the blocking pool.
    pub async fn call<T, F>(&self, f: F) -> SyncResult<T>
    where
        F: FnOnce(&SyncEngine) -> SyncResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.inner.engine.clone();
        joined(tokio::task::spawn_blocking(move || f(&engine)).await)
    }

    /// Run a mutating engine operation and fan out the event it yields.
    /// Commit and broadcast happen under one ordering lock, so subscribers
    /// never see an older snapshot after a newer one.
    pub async fn commit<T, F, P>(&self, f: F, event: P) -> SyncResult<T>
    where
        F: FnOnce(&SyncEngine) -> SyncResult<T> + Send + 'static,
        P: FnOnce(&T) -> Option<GatewayEvent> + Send + 'static,
        T: Send + 'static,
    {
        let inner = self.inner.clone();
        joined(
            tokio::task::spawn_blocking(move || {
                inner
                    .dispatcher
                    .broadcast_in_order(|| f(&inner.engine), event)
            })
            .await,
        )
    }

    /// New conversations go straight to every member's connections, since no
    /// one can be subscribed to them yet.
    pub async fn conversation_created(&self, conversation: ConversationResponse) {
        let members: Vec<Uuid> = conversation.members.iter().map(|m| m.id).collect();
        self.inner
            .dispatcher
            .send_to_users(&members, &GatewayEvent::ConversationCreate { conversation })
            .await;
    }

    /// Push the fresh typer set for a conversation and schedule the next
    /// re-evaluation.
    pub async fn typing_changed(&self, conversation_id: Uuid) {
        self.inner.typing.refresh(conversation_id).await;
    }

    pub async fn heartbeat(&self, caller: Caller) -> SyncResult<PresenceResponse> {
        self.commit(move |e| e.heartbeat(&caller), presence_update).await
    }

    pub async fn set_offline(&self, caller: Caller) -> SyncResult<PresenceResponse> {
        self.commit(move |e| e.set_offline(&caller), presence_update).await
    }

    /// Report `caller` offline after the grace delay unless they come back.
    pub fn schedule_offline(&self, caller: Caller) {
        let delay = Duration::from_millis(self.inner.engine.config().offline_grace_ms.max(0) as u64);
        let hub = self.clone();
        self.inner.grace.schedule(caller.user_id, delay, move || async move {
            hub.go_offline(caller).await;
        });
    }

    pub fn cancel_offline(&self, user_id: Uuid) -> bool {
        self.inner.grace.cancel(user_id)
    }

    pub async fn go_online(&self, caller: Caller) {
        self.cancel_offline(caller.user_id);
        if let Err(e) = self.heartbeat(caller).await {
            warn!("Heartbeat failed: {}", e);
        }
    }

    pub async fn go_offline(&self, caller: Caller) {
        self.cancel_offline(caller.user_id);
        if let Err(e) = self.set_offline(caller).await {
            warn!("Offline transition failed: {}", e);
        }
    }
}

fn presence_update(presence: &PresenceResponse) -> Option<GatewayEvent> {
    Some(GatewayEvent::PresenceUpdate {
        user_id: presence.user_id,
        last_seen: presence.last_seen,
        online: presence.online,
    })
}

fn joined<T>(result: Result<SyncResult<T>, tokio::task::JoinError>) -> SyncResult<T> {
    match result {
        Ok(result) => result,
        Err(e) => {
            error!("Engine task failed: {}", e);
            Err(SyncError::Storage(anyhow!("engine task failed: {}", e)))
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parley_core::{ManualClock, SyncConfig};
    use parley_db::Database;
    use parley_types::api::Claims;

    pub fn hub() -> (Hub, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let db = Arc::new(Database::open_in_memory().unwrap());
        let engine = Arc::new(SyncEngine::new(db, clock.clone(), SyncConfig::default()));
        (Hub::new(engine), clock)
    }

    pub fn login(hub: &Hub, name: &str) -> Caller {
        hub.engine()
            .resolve_caller(&Claims {
                sub: format!("test|{}", name),
                name: name.to_string(),
                picture: None,
                email: None,
                exp: usize::MAX,
            })
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_backgrounded_user_goes_offline_after_grace() {
        let (hub, clock) = hub();
        let alice = login(&hub, "alice");
        let mut rx = hub.dispatcher().subscribe();

        hub.go_online(alice.clone()).await;
        let online = rx.recv().await.unwrap();
        assert!(online.json.contains("\"online\":true"));

        hub.schedule_offline(alice.clone());
        clock.advance(1_000);
        tokio::time::sleep(Duration::from_millis(5_100)).await;

        let offline = rx.recv().await.unwrap();
        assert!(offline.json.contains("\"online\":false"));
        assert!(!hub.engine().presence(alice.user_id).unwrap().online);
    }

    #[tokio::test(start_paused = true)]
    async fn test_returning_within_grace_keeps_user_online() {
        let (hub, _clock) = hub();
        let alice = login(&hub, "alice");

        hub.schedule_offline(alice.clone());
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        hub.go_online(alice.clone()).await;
        tokio::time::sleep(Duration::from_millis(10_000)).await;

        assert!(hub.engine().presence(alice.user_id).unwrap().online);
    }

    #[tokio::test]
    async fn test_conversation_create_targets_members() {
        let (hub, _clock) = hub();
        let alice = login(&hub, "alice");
        let bob = login(&hub, "bob");
        let carol = login(&hub, "carol");

        let (_, mut bob_rx) = hub.dispatcher().register_connection(bob.user_id).await;
        let (_, mut carol_rx) = hub.dispatcher().register_connection(carol.user_id).await;

        let other = bob.user_id;
        let conv = hub
            .call(move |e| {
                let id = e.get_or_create_direct_conversation(&alice, other)?.conversation.id;
                e.get_conversation(&alice, id)
            })
            .await
            .unwrap();
        hub.conversation_created(conv).await;

        assert!(bob_rx.recv().await.unwrap().contains("ConversationCreate"));
        assert!(carol_rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_reaction_updates_end_on_latest_state() {
        let (hub, _clock) = hub();
        let alice = login(&hub, "alice");
        let bob = login(&hub, "bob");
        let carol = login(&hub, "carol");
        let members = [bob.user_id, carol.user_id];
        let author = alice.clone();
        let msg = hub
            .call(move |e| {
                let conv = e.create_group_conversation(&author, "trio", &members)?.id;
                Ok(e.send_message(&author, conv, "vote", None, None)?.message.id)
            })
            .await
            .unwrap();
        let mut rx = hub.dispatcher().subscribe();

        for _ in 0..25 {
            let toggles: Vec<_> = [bob.clone(), carol.clone()]
                .into_iter()
                .map(|who| {
                    let hub = hub.clone();
                    tokio::spawn(async move {
                        hub.commit(
                            move |e| e.toggle_reaction(&who, msg, "👍"),
                            |t| {
                                Some(GatewayEvent::ReactionUpdate {
                                    conversation_id: t.conversation_id,
                                    message_id: t.message_id,
                                    reactions: t.reactions.clone(),
                                })
                            },
                        )
                        .await
                        .unwrap();
                    })
                })
                .collect();
            for toggle in toggles {
                toggle.await.unwrap();
            }

            let mut last = None;
            while let Ok(envelope) = rx.try_recv() {
                if let GatewayEvent::ReactionUpdate { reactions, .. } =
                    serde_json::from_str::<GatewayEvent>(&envelope.json).unwrap()
                {
                    last = Some(reactions);
                }
            }
            let viewer = alice.clone();
            let current = hub.call(move |e| e.aggregate_reactions(&viewer, msg)).await.unwrap();
            assert_eq!(last, Some(current));
        }
    }
}
