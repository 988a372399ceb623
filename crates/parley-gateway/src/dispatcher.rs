use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::warn;
use uuid::Uuid;

use parley_types::events::GatewayEvent;

/// A broadcast event, serialized once and shared by every connection.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// `None` for global events (presence); otherwise only connections
    /// subscribed to this conversation forward it.
    pub conversation_id: Option<Uuid>,
    pub json: Arc<str>,
}

/// Fan-out hub for connected clients: one broadcast channel for
/// conversation-scoped and global events, plus per-connection channels for
/// events targeted at specific users.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    broadcast_tx: broadcast::Sender<Envelope>,

    /// Held across commit and send in `broadcast_in_order`.
    commit_order: Mutex<()>,

    /// user_id -> (conn_id -> sender). A user may hold several connections.
    user_channels: RwLock<HashMap<Uuid, HashMap<Uuid, mpsc::UnboundedSender<Arc<str>>>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                commit_order: Mutex::new(()),
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publish an event. Scoping comes from [`GatewayEvent::conversation_id`].
    pub fn broadcast(&self, event: &GatewayEvent) {
        if let Some(json) = encode(event) {
            // No receivers is fine
            let _ = self.inner.broadcast_tx.send(Envelope {
                conversation_id: event.conversation_id(),
                json,
            });
        }
    }

    /// Run `commit`, then broadcast the event it yields, as one serialized
    /// step. Events sent this way reach subscribers in the order their
    /// changes committed, so the last snapshot a client sees is the newest.
    /// Blocks; call it from the blocking pool.
    pub fn broadcast_in_order<T, E>(
        &self,
        commit: impl FnOnce() -> Result<T, E>,
        event: impl FnOnce(&T) -> Option<GatewayEvent>,
    ) -> Result<T, E> {
        let _order = self
            .inner
            .commit_order
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let out = commit()?;
        if let Some(event) = event(&out) {
            self.broadcast(&event);
        }
        Ok(out)
    }

    /// Register a connection for `user_id`. Returns (conn_id, receiver).
    pub async fn register_connection(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<Arc<str>>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Drop one connection. Returns true if it was the user's last one.
    pub async fn unregister_connection(&self, user_id: Uuid, conn_id: Uuid) -> bool {
        let mut channels = self.inner.user_channels.write().await;
        let Some(conns) = channels.get_mut(&user_id) else {
            return true;
        };
        conns.remove(&conn_id);
        if conns.is_empty() {
            channels.remove(&user_id);
            true
        } else {
            false
        }
    }

    pub async fn connection_count(&self, user_id: Uuid) -> usize {
        self.inner
            .user_channels
            .read()
            .await
            .get(&user_id)
            .map_or(0, HashMap::len)
    }

    /// Send an event to every connection of `user_id`.
    pub async fn send_to_user(&self, user_id: Uuid, event: &GatewayEvent) {
        self.send_to_users(std::slice::from_ref(&user_id), event).await;
    }

    /// Send an event to every connection of each listed user, regardless of
    /// subscriptions.
    pub async fn send_to_users(&self, user_ids: &[Uuid], event: &GatewayEvent) {
        let Some(json) = encode(event) else {
            return;
        };
        let channels = self.inner.user_channels.read().await;
        for user_id in user_ids {
            if let Some(conns) = channels.get(user_id) {
                for tx in conns.values() {
                    let _ = tx.send(json.clone());
                }
            }
        }
    }
}

fn encode(event: &GatewayEvent) -> Option<Arc<str>> {
    match serde_json::to_string(event) {
        Ok(json) => Some(json.into()),
        Err(e) => {
            warn!("Failed to serialize gateway event: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presence(user_id: Uuid) -> GatewayEvent {
        GatewayEvent::PresenceUpdate {
            user_id,
            last_seen: Some(1),
            online: true,
        }
    }

    #[tokio::test]
    async fn test_broadcast_carries_scope() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let conversation_id = Uuid::new_v4();

        dispatcher.broadcast(&presence(Uuid::new_v4()));
        dispatcher.broadcast(&GatewayEvent::ReadStatusUpdate {
            conversation_id,
            user_id: Uuid::new_v4(),
            last_read_at: 5,
        });

        let global = rx.recv().await.unwrap();
        assert_eq!(global.conversation_id, None);
        assert!(global.json.contains("PresenceUpdate"));

        let scoped = rx.recv().await.unwrap();
        assert_eq!(scoped.conversation_id, Some(conversation_id));
    }

    #[tokio::test]
    async fn test_targeted_send_reaches_every_connection() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let (first, mut rx1) = dispatcher.register_connection(alice).await;
        let (_second, mut rx2) = dispatcher.register_connection(alice).await;
        let (_, mut bob_rx) = dispatcher.register_connection(bob).await;
        assert_eq!(dispatcher.connection_count(alice).await, 2);

        dispatcher.send_to_user(alice, &presence(alice)).await;
        assert!(rx1.recv().await.is_some());
        assert!(rx2.recv().await.is_some());
        assert!(bob_rx.try_recv().is_err());

        assert!(!dispatcher.unregister_connection(alice, first).await);
        assert_eq!(dispatcher.connection_count(alice).await, 1);
    }

    #[tokio::test]
    async fn test_last_connection_reported() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::new_v4();
        let (conn, _rx) = dispatcher.register_connection(alice).await;

        assert!(dispatcher.unregister_connection(alice, conn).await);
        assert_eq!(dispatcher.connection_count(alice).await, 0);
    }

    #[test]
    fn test_ordered_broadcasts_follow_commit_order() {
        use std::sync::atomic::{AtomicI64, Ordering};

        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let conversation_id = Uuid::new_v4();
        let version = Arc::new(AtomicI64::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                let version = version.clone();
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        dispatcher
                            .broadcast_in_order(
                                || Ok::<_, ()>(version.fetch_add(1, Ordering::SeqCst) + 1),
                                |at| {
                                    // Widen the window between commit and send
                                    std::thread::yield_now();
                                    Some(GatewayEvent::ReadStatusUpdate {
                                        conversation_id,
                                        user_id: Uuid::nil(),
                                        last_read_at: *at,
                                    })
                                },
                            )
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut seen = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            match serde_json::from_str::<GatewayEvent>(&envelope.json).unwrap() {
                GatewayEvent::ReadStatusUpdate { last_read_at, .. } => seen.push(last_read_at),
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(seen, (1..=160).collect::<Vec<i64>>());
    }

    #[test]
    fn test_failed_commit_broadcasts_nothing() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();

        let result = dispatcher.broadcast_in_order(|| Err::<(), _>("rolled back"), |_| Some(presence(Uuid::nil())));
        assert_eq!(result, Err("rolled back"));
        assert!(rx.try_recv().is_err());
    }
}
