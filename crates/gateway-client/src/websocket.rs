//! WebSocket client for streamed feed updates.

use crate::error::Error;
use crate::types::{Contract, Feed, FeedUpdate, SessionState, SubscriptionHandle};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Messages received from the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WsMessage {
    /// Connection established.
    Connected {
        /// Subscriber id assigned to this socket.
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
        key: String,
    },
    /// New value on a subscribed feed.
    Update(FeedUpdate),
    /// Session state changed.
    Session {
        /// New state.
        state: SessionState,
    },
    /// A command failed.
    Error {
        /// Error description.
        message: String,
    },
    /// Heartbeat.
    Heartbeat {
        /// Timestamp in milliseconds.
        timestamp: i64,
    },
}

/// Commands that can be sent to the gateway.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Start or join a feed.
    Subscribe {
        /// Feed to stream.
        feed: Feed,
    },
    /// Release a feed.
    Unsubscribe {
        /// Key to release.
        key: String,
    },
}

impl ClientCommand {
    /// Creates a ticker subscribe command.
    #[must_use]
    pub fn subscribe_ticker(contract: Contract) -> Self {
        Self::Subscribe {
            feed: Feed::Ticker {
                contract,
                generic_ticks: String::new(),
            },
        }
    }

    /// Creates a 5-second trade bar subscribe command.
    #[must_use]
    pub fn subscribe_realtime_bars(contract: Contract) -> Self {
        Self::Subscribe {
            feed: Feed::RealTimeBars {
                contract,
                what_to_show: "TRADES".to_string(),
                use_rth: true,
            },
        }
    }

    /// Creates an account updates subscribe command.
    #[must_use]
    pub fn subscribe_account(account: &str) -> Self {
        Self::Subscribe {
            feed: Feed::AccountUpdates {
                account: account.to_string(),
            },
        }
    }

    /// Creates an unsubscribe command.
    #[must_use]
    pub fn unsubscribe(key: &str) -> Self {
        Self::Unsubscribe {
            key: key.to_string(),
        }
    }
}

/// WebSocket client for receiving feed updates.
pub struct WsClient {
    rx: mpsc::Receiver<WsMessage>,
    tx: mpsc::Sender<ClientCommand>,
}

impl WsClient {
    /// Connects to the gateway stream.
    ///
    /// # Arguments
    /// * `url` - WebSocket URL (e.g., "ws://localhost:8000/ws"); append
    ///   `?subscriber=<id>` to choose the subscriber id.
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let (ws_stream, _) = connect_async(url).await.map_err(Box::new)?;
        let (mut write, mut read) = ws_stream.split();

        let (msg_tx, msg_rx) = mpsc::channel::<WsMessage>(100);
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<ClientCommand>(100);

        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if let Ok(ws_msg) = serde_json::from_str::<WsMessage>(&text)
                            && msg_tx.send(ws_msg).await.is_err()
                        {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Err(_) => break,
                    _ => {}
                }
            }
        });

        tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                if let Ok(json) = serde_json::to_string(&cmd)
                    && write.send(Message::Text(json.into())).await.is_err()
                {
                    break;
                }
            }
            let _ = write.close().await;
        });

        Ok(Self {
            rx: msg_rx,
            tx: cmd_tx,
        })
    }

    /// Receives the next message from the gateway.
    ///
    /// Returns `None` if the connection is closed.
    pub async fn recv(&mut self) -> Option<WsMessage> {
        self.rx.recv().await
    }

    /// Sends a command to the gateway.
    ///
    /// # Errors
    /// Returns error if the send fails.
    pub async fn send(&self, cmd: ClientCommand) -> Result<(), Error> {
        self.tx.send(cmd).await.map_err(|_| Error::ConnectionClosed)
    }

    /// Subscribes to a feed.
    ///
    /// # Errors
    /// Returns error if the send fails.
    pub async fn subscribe(&self, feed: Feed) -> Result<(), Error> {
        self.send(ClientCommand::Subscribe { feed }).await
    }

    /// Releases a feed by key.
    ///
    /// # Errors
    /// Returns error if the send fails.
    pub async fn unsubscribe(&self, key: &str) -> Result<(), Error> {
        self.send(ClientCommand::unsubscribe(key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_command_json() {
        let cmd = ClientCommand::subscribe_ticker(Contract::stock("AAPL"));
        let json = serde_json::to_value(&cmd).unwrap();

        assert_eq!(json["action"], "subscribe");
        assert_eq!(json["feed"]["feed"], "ticker");
        assert_eq!(json["feed"]["contract"]["symbol"], "AAPL");
    }

    #[test]
    fn test_unsubscribe_command_json() {
        let cmd = ClientCommand::unsubscribe("account:DU123456");
        let json = serde_json::to_string(&cmd).unwrap();

        assert_eq!(
            json,
            r#"{"action":"unsubscribe","key":"account:DU123456"}"#
        );
    }

    #[test]
    fn test_connected_message_deserialization() {
        let json = r#"{"type":"connected","data":{"subscriber":"ws-1","session":"connected"}}"#;

        match serde_json::from_str::<WsMessage>(json).unwrap() {
            WsMessage::Connected {
                subscriber,
                session,
            } => {
                assert_eq!(subscriber, "ws-1");
                assert_eq!(session, SessionState::Connected);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_update_message_deserialization() {
        let json = r#"{"type":"update","data":{
            "key":"bars5s:AAPL-STK-SMART-USD",
            "value":{"kind":"bar","date":"20260105 14:30:05","open":1.0,"high":2.0,
                     "low":0.5,"close":1.5,"volume":100.0,"average":1.2,"bar_count":4},
            "at":"2026-01-05T14:30:05Z"}}"#;

        match serde_json::from_str::<WsMessage>(json).unwrap() {
            WsMessage::Update(update) => {
                assert_eq!(update.key, "bars5s:AAPL-STK-SMART-USD");
                assert!(matches!(update.value, crate::LastValue::Bar(ref b) if b.close == 1.5));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }
}
