use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Deferred offline transitions for backgrounded clients. Scheduling again
/// for the same user replaces the pending one; cancelling before the delay
/// elapses means the transition never runs.
#[derive(Clone, Default)]
pub struct PresenceGrace {
    inner: Arc<GraceInner>,
}

#[derive(Default)]
struct GraceInner {
    pending: Mutex<HashMap<Uuid, (u64, CancellationToken)>>,
    generation: AtomicU64,
}

impl PresenceGrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `on_expire` after `delay` unless cancelled first.
    pub fn schedule<F, Fut>(&self, user_id: Uuid, delay: Duration, on_expire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);

        match self.inner.pending.lock() {
            Ok(mut pending) => {
                if let Some((_, previous)) = pending.insert(user_id, (generation, token.clone())) {
                    previous.cancel();
                }
            }
            Err(e) => {
                warn!("Presence grace lock poisoned: {}", e);
                return;
            }
        }

        debug!("Offline for {} scheduled in {:?}", user_id, delay);
        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if inner.take(user_id, generation) {
                        on_expire().await;
                    }
                }
            }
        });
    }

    /// Cancel a pending transition. Returns true if one was pending.
    pub fn cancel(&self, user_id: Uuid) -> bool {
        let removed = match self.inner.pending.lock() {
            Ok(mut pending) => pending.remove(&user_id),
            Err(_) => None,
        };
        match removed {
            Some((_, token)) => {
                token.cancel();
                debug!("Pending offline for {} cancelled", user_id);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, user_id: Uuid) -> bool {
        self.inner
            .pending
            .lock()
            .map(|p| p.contains_key(&user_id))
            .unwrap_or(false)
    }
}

impl GraceInner {
    /// Claim the entry if it still belongs to `generation`.
    fn take(&self, user_id: Uuid, generation: u64) -> bool {
        let Ok(mut pending) = self.pending.lock() else {
            return false;
        };
        match pending.get(&user_id) {
            Some((g, _)) if *g == generation => {
                pending.remove(&user_id);
                true
            }
            _ => false,
        }
    }
}
