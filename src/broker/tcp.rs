//! Line-delimited JSON connector to a platform bridge daemon.
//!
//! After a `hello`/`welcome` handshake every line from the bridge is one
//! [`BrokerEvent`] and every line to the bridge is one [`Command`].

use super::{
    BrokerEvent, BrokerLink, Command, CommandSink, ConnectParams, ConnectionError, Connector,
    DUPLICATE_CLIENT_ID_CODE, Handshake, TransportError,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Client greeting.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Greeting {
    Hello { client_id: i32, read_only: bool },
}

/// Bridge answer to the greeting.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum HandshakeReply {
    Welcome(Handshake),
    Rejected { code: i32, message: String },
}

/// Connects to a bridge over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    handshake_timeout: Duration,
}

impl TcpConnector {
    /// Creates a connector with the given handshake timeout.
    #[must_use]
    pub fn new(handshake_timeout: Duration) -> Self {
        Self { handshake_timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, params: &ConnectParams) -> Result<BrokerLink, ConnectionError> {
        let addr = format!("{}:{}", params.host, params.port);
        let stream = TcpStream::connect(&addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let hello = Greeting::Hello {
            client_id: params.client_id,
            read_only: params.read_only,
        };
        write_line(&mut write_half, &hello).await?;

        let mut line = String::new();
        let read = tokio::time::timeout(self.handshake_timeout, reader.read_line(&mut line))
            .await
            .map_err(|_| ConnectionError::Timeout(self.handshake_timeout))??;
        if read == 0 {
            return Err(ConnectionError::Protocol(
                "connection closed during handshake".to_string(),
            ));
        }

        let handshake = match serde_json::from_str::<HandshakeReply>(line.trim_end())
            .map_err(|e| ConnectionError::Protocol(e.to_string()))?
        {
            HandshakeReply::Welcome(handshake) => handshake,
            HandshakeReply::Rejected { code, .. } if code == DUPLICATE_CLIENT_ID_CODE => {
                return Err(ConnectionError::DuplicateClientId(params.client_id));
            }
            HandshakeReply::Rejected { code, message } => {
                return Err(ConnectionError::Rejected { code, message });
            }
        };

        info!(
            "Connected to {} (server version {}, next order id {})",
            addr, handshake.server_version, handshake.next_order_id
        );

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let reader_task = tokio::spawn(read_loop(reader, event_tx));
        let writer_task = tokio::spawn(write_loop(write_half, command_rx));

        Ok(BrokerLink {
            handshake,
            commands: std::sync::Arc::new(TcpCommandSink {
                queue: Mutex::new(Some(command_tx)),
                tasks: Mutex::new(vec![reader_task, writer_task]),
            }),
            events: event_rx,
        })
    }
}

async fn write_line<T: Serialize>(
    writer: &mut OwnedWriteHalf,
    message: &T,
) -> Result<(), std::io::Error> {
    let mut line = serde_json::to_vec(message).map_err(std::io::Error::other)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await
}

/// Turns inbound lines into events until EOF or an IO error.
async fn read_loop(
    mut reader: BufReader<OwnedReadHalf>,
    events: mpsc::UnboundedSender<BrokerEvent>,
) {
    let mut line = String::new();
    let reason = loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break "connection closed by peer".to_string(),
            Ok(_) => {
                let trimmed = line.trim_end();
                if trimmed.is_empty() {
                    continue;
                }
                match serde_json::from_str::<BrokerEvent>(trimmed) {
                    Ok(event) => {
                        if events.send(event).is_err() {
                            return;
                        }
                    }
                    Err(e) => warn!("Dropping malformed event: {} ({})", trimmed, e),
                }
            }
            Err(e) => break format!("read failed: {}", e),
        }
    };
    debug!("Reader stopped: {}", reason);
    let _ = events.send(BrokerEvent::ConnectionClosed { reason });
}

/// Drains the command queue onto the socket.
async fn write_loop(mut writer: OwnedWriteHalf, mut commands: mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = commands.recv().await {
        if let Err(e) = write_line(&mut writer, &command).await {
            warn!("Failed to write {} command: {}", command.name(), e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// Command queue of a TCP connection.
struct TcpCommandSink {
    queue: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CommandSink for TcpCommandSink {
    fn send(&self, command: &Command) -> Result<(), TransportError> {
        match self.queue.lock().as_ref() {
            Some(queue) => queue
                .send(command.clone())
                .map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    fn close(&self) {
        self.queue.lock().take();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}
