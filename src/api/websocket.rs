//! WebSocket handler for streaming feed updates.
//!
//! Each socket acts as one subscriber. It receives updates only for the keys
//! it subscribed to, and everything it holds is released when it closes.
//! Keys are remembered with the registry epoch they were taken in; once the
//! session drops and the registry moves on, they are forgotten and the client
//! is sent `unsubscribed` for each.

use crate::session::SessionState;
use crate::state::AppState;
use crate::subscriptions::{Feed, FeedUpdate, SubscriptionHandle, SubscriptionKey};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info};

/// WebSocket message types sent to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WsMessage {
    /// Connection established.
    Connected {
        /// Subscriber id used for this socket.
        subscriber: String,
        /// Session state at connect time.
        session: SessionState,
    },
    /// A subscription was created or joined.
    Subscribed {
        /// Handle of the subscription.
        handle: SubscriptionHandle,
    },
    /// A subscription was released.
    Unsubscribed {
        /// Released key.
        key: SubscriptionKey,
    },
    /// New value on a subscribed feed.
    Update(FeedUpdate),
    /// Session state changed.
    Session {
        /// New state.
        state: SessionState,
    },
    /// A client command failed.
    Error {
        /// Error description.
        message: String,
    },
    /// Heartbeat/ping.
    Heartbeat {
        /// Timestamp in milliseconds.
        timestamp: i64,
    },
}

/// Commands accepted from clients.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start or join a feed.
    Subscribe {
        /// Feed to stream.
        feed: Feed,
    },
    /// Release a feed.
    Unsubscribe {
        /// Key to release.
        key: SubscriptionKey,
    },
}

/// Keys held by one socket, with the registry epoch each was taken in.
type HeldKeys = Mutex<HashMap<SubscriptionKey, u64>>;

/// Optional connection parameters.
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Subscriber id; generated when absent.
    pub subscriber: Option<String>,
}

/// WebSocket upgrade handler.
#[utoipa::path(
    get,
    path = "/ws",
    params(
        ("subscriber" = Option<String>, Query, description = "Subscriber id for this socket")
    ),
    responses(
        (status = 101, description = "WebSocket connection established")
    ),
    tag = "WebSocket"
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsParams>,
) -> impl IntoResponse {
    let subscriber = params
        .subscriber
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| format!("ws-{}", uuid::Uuid::new_v4()));
    ws.on_upgrade(move |socket| handle_socket(socket, state, subscriber))
}

/// Handle an individual WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, subscriber: String) {
    let (mut sender, mut receiver) = socket.split();

    let keys: Arc<HeldKeys> = Arc::new(Mutex::new(HashMap::new()));
    let mut update_rx = state.session.registry().updates();
    let mut state_rx = state.session.watch();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<WsMessage>();

    let connected_msg = WsMessage::Connected {
        subscriber: subscriber.clone(),
        session: state.session.state(),
    };
    if let Ok(json) = serde_json::to_string(&connected_msg) {
        let _ = sender.send(Message::Text(json.into())).await;
    }

    info!("WebSocket client {} connected", subscriber);

    let recv_state = Arc::clone(&state);
    let recv_keys = Arc::clone(&keys);
    let recv_subscriber = subscriber.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    debug!("Received WebSocket message: {}", text);
                    let reply =
                        handle_client_message(&text, &recv_state, &recv_subscriber, &recv_keys);
                    if reply_tx.send(reply).is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("WebSocket client {} disconnected", recv_subscriber);
                    break;
                }
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    });

    let send_keys = Arc::clone(&keys);
    let registry = state.session.registry().clone();
    let send_task = tokio::spawn(async move {
        loop {
            let messages = tokio::select! {
                reply = reply_rx.recv() => match reply {
                    Some(reply) => vec![reply],
                    None => break,
                },
                update = update_rx.recv() => match update {
                    Ok(update) => {
                        let epoch = registry.epoch();
                        let mut messages = forget_stale(&send_keys, epoch);
                        messages.extend(forward(update, &send_keys, epoch));
                        messages
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!("WebSocket lagged {} updates", n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *state_rx.borrow_and_update();
                    let mut messages = forget_stale(&send_keys, registry.epoch());
                    messages.push(WsMessage::Session { state });
                    messages
                }
                _ = tokio::time::sleep(tokio::time::Duration::from_secs(30)) => {
                    vec![WsMessage::Heartbeat {
                        timestamp: chrono::Utc::now().timestamp_millis(),
                    }]
                }
            };
            for msg in messages {
                if let Ok(json) = serde_json::to_string(&msg)
                    && sender.send(Message::Text(json.into())).await.is_err()
                {
                    return;
                }
            }
        }
    });

    tokio::select! {
        _ = recv_task => {}
        _ = send_task => {}
    }

    let released = match state.session.handle() {
        Ok(handle) => handle.release_subscriber(&subscriber).unwrap_or_else(|e| {
            debug!("Nothing released for {}: {}", subscriber, e);
            0
        }),
        Err(_) => state.session.registry().release_subscriber(&subscriber, None),
    };
    info!(
        "WebSocket connection {} closed, released {} subscription(s)",
        subscriber, released
    );
}

/// Wraps `update` if this socket holds its key in the current epoch.
fn forward(update: FeedUpdate, keys: &HeldKeys, epoch: u64) -> Option<WsMessage> {
    (keys.lock().get(&update.key) == Some(&epoch)).then_some(WsMessage::Update(update))
}

/// Drops keys taken before the registry reached `epoch`.
fn forget_stale(keys: &HeldKeys, epoch: u64) -> Vec<WsMessage> {
    let mut stale: Vec<SubscriptionKey> = Vec::new();
    keys.lock().retain(|key, held| {
        if *held == epoch {
            return true;
        }
        stale.push(key.clone());
        false
    });
    stale.sort();
    stale
        .into_iter()
        .map(|key| WsMessage::Unsubscribed { key })
        .collect()
}

/// Applies one client command and builds the reply.
fn handle_client_message(
    text: &str,
    state: &AppState,
    subscriber: &str,
    keys: &HeldKeys,
) -> WsMessage {
    let command = match serde_json::from_str::<ClientMessage>(text) {
        Ok(command) => command,
        Err(e) => {
            return WsMessage::Error {
                message: format!("Invalid command: {}", e),
            };
        }
    };
    let handle = match state.session.handle() {
        Ok(handle) => handle,
        Err(e) => {
            return WsMessage::Error {
                message: e.to_string(),
            };
        }
    };

    match command {
        ClientMessage::Subscribe { feed } => match handle.subscribe(feed, subscriber) {
            Ok(subscription) => {
                keys.lock().insert(subscription.key.clone(), subscription.epoch);
                WsMessage::Subscribed {
                    handle: subscription,
                }
            }
            Err(e) => WsMessage::Error {
                message: e.to_string(),
            },
        },
        ClientMessage::Unsubscribe { key } => {
            let Some(subscription) = handle.registry().handle_for(&key, subscriber) else {
                return WsMessage::Error {
                    message: format!("{} has no subscription to {}", subscriber, key),
                };
            };
            match handle.unsubscribe(&subscription) {
                Ok(()) => {
                    keys.lock().remove(&key);
                    WsMessage::Unsubscribed { key }
                }
                Err(e) => WsMessage::Error {
                    message: e.to_string(),
                },
            }
        }
    }
}
