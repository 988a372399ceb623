use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_types::api::Caller;
use parley_types::events::{GatewayCommand, GatewayEvent};

use crate::hub::Hub;

/// Server sends a Ping every 15 seconds. Two consecutive missed Pongs
/// (~30s) drop the connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const MAX_MISSED_PONGS: u8 = 2;

type Subscriptions = Arc<RwLock<HashSet<Uuid>>>;

/// Drive a WebSocket whose token was already verified at the HTTP upgrade.
pub async fn handle_connection(socket: WebSocket, hub: Hub, caller: Caller) {
    let (mut sender, mut receiver) = socket.split();
    let user_id = caller.user_id;

    info!("{} ({}) connected to gateway", caller.display_name, user_id);

    let ready = GatewayEvent::Ready {
        user_id,
        display_name: caller.display_name.clone(),
    };
    let Ok(ready) = serde_json::to_string(&ready) else {
        return;
    };
    if sender.send(Message::Text(ready.into())).await.is_err() {
        return;
    }

    let (conn_id, mut user_rx) = hub.dispatcher().register_connection(user_id).await;
    let mut broadcast_rx = hub.dispatcher().subscribe();

    // A fresh session counts as a heartbeat
    hub.go_online(caller.clone()).await;

    let subscriptions: Subscriptions = Arc::new(RwLock::new(HashSet::new()));
    let send_subscriptions = subscriptions.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_pongs: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let envelope = match result {
                        Ok(envelope) => envelope,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} messages", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if let Some(conversation_id) = envelope.conversation_id {
                        let subscribed = send_subscriptions
                            .read()
                            .map(|subs| subs.contains(&conversation_id))
                            .unwrap_or(false);
                        if !subscribed {
                            continue;
                        }
                    }

                    if sender.send(Message::Text(envelope.json.to_string().into())).await.is_err() {
                        break;
                    }
                }
                result = user_rx.recv() => {
                    let Some(json) = result else { break };
                    if sender.send(Message::Text(json.to_string().into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_pongs = 0;
                    } else {
                        missed_pongs += 1;
                        if missed_pongs >= MAX_MISSED_PONGS {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_pongs);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let recv_hub = hub.clone();
    let recv_caller = caller.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&recv_hub, &recv_caller, cmd, &subscriptions).await,
                    Err(e) => {
                        let raw: String = text.chars().take(200).collect();
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            recv_caller.display_name, recv_caller.user_id, e, raw
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    if hub.dispatcher().unregister_connection(user_id, conn_id).await {
        hub.go_offline(caller.clone()).await;
    }
    info!("{} ({}) disconnected from gateway", caller.display_name, user_id);
}

async fn handle_command(hub: &Hub, caller: &Caller, cmd: GatewayCommand, subscriptions: &Subscriptions) {
    match cmd {
        GatewayCommand::Subscribe { conversation_ids } => {
            let requested = conversation_ids.len();
            let who = caller.clone();
            let allowed = match hub
                .call(move |e| e.member_conversation_ids(&who, &conversation_ids))
                .await
            {
                Ok(allowed) => allowed,
                Err(e) => {
                    warn!("Subscribe for {} failed: {}", caller.user_id, e);
                    return;
                }
            };

            info!(
                "{} ({}) subscribing to {} of {} conversations",
                caller.display_name,
                caller.user_id,
                allowed.len(),
                requested
            );
            match subscriptions.write() {
                Ok(mut subs) => *subs = allowed.into_iter().collect(),
                Err(e) => warn!("Subscription lock poisoned: {}", e),
            }
        }

        GatewayCommand::StartTyping { conversation_id } => {
            let who = caller.clone();
            match hub.call(move |e| e.set_typing(&who, conversation_id)).await {
                Ok(_) => hub.typing_changed(conversation_id).await,
                Err(e) => debug!("{} cannot type in {}: {}", caller.user_id, conversation_id, e),
            }
        }

        GatewayCommand::Heartbeat => {
            if let Err(e) = hub.heartbeat(caller.clone()).await {
                warn!("Heartbeat for {} failed: {}", caller.user_id, e);
            }
        }

        GatewayCommand::Visibility { visible: true } => {
            hub.go_online(caller.clone()).await;
        }

        GatewayCommand::Visibility { visible: false } => {
            debug!("{} backgrounded", caller.user_id);
            hub.schedule_offline(caller.clone());
        }
    }
}
