//! Scripted in-process broker.
//!
//! Deterministic stand-in for the platform connection: it records every
//! command, can fail connects on demand, and delivers scripted events. The
//! responder runs inside [`CommandSink::send`], so its events are queued
//! before the sender gets control back. That reproduces replies that race
//! ahead of the submission call.

use super::{
    BrokerEvent, BrokerLink, Command, CommandSink, ConnectParams, ConnectionError, Connector,
    Handshake, TransportError,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;

type Responder = Box<dyn FnMut(&Command) -> Vec<BrokerEvent> + Send>;

#[derive(Default)]
struct SimState {
    handshake: Handshake,
    connect_failures: VecDeque<ConnectionError>,
    refuse_all: Option<ConnectionError>,
    connects: u32,
    connect_params: Vec<ConnectParams>,
    commands: Vec<Command>,
    events: Option<mpsc::UnboundedSender<BrokerEvent>>,
    responder: Option<Responder>,
    generation: u64,
}

/// Scripted broker implementing [`Connector`].
#[derive(Clone, Default)]
pub struct SimulatedBroker {
    state: Arc<Mutex<SimState>>,
}

impl std::fmt::Debug for SimulatedBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SimulatedBroker")
            .field("connects", &state.connects)
            .field("commands", &state.commands.len())
            .finish()
    }
}

impl SimulatedBroker {
    /// Creates a broker that accepts connections with one managed account.
    #[must_use]
    pub fn new() -> Self {
        let broker = Self::default();
        broker.state.lock().handshake = Handshake {
            server_version: 176,
            next_order_id: 1,
            managed_accounts: vec!["DU123456".to_string()],
        };
        broker
    }

    /// Sets the handshake returned on connect.
    pub fn set_handshake(&self, handshake: Handshake) {
        self.state.lock().handshake = handshake;
    }

    /// Makes the next connect attempt fail.
    pub fn fail_next_connect(&self, error: ConnectionError) {
        self.state.lock().connect_failures.push_back(error);
    }

    /// Makes every connect attempt fail until [`Self::accept_connections`].
    pub fn refuse_connections(&self, error: ConnectionError) {
        self.state.lock().refuse_all = Some(error);
    }

    /// Lifts [`Self::refuse_connections`].
    pub fn accept_connections(&self) {
        self.state.lock().refuse_all = None;
    }

    /// Installs a responder called for every command sent.
    pub fn respond_with<F>(&self, responder: F)
    where
        F: FnMut(&Command) -> Vec<BrokerEvent> + Send + 'static,
    {
        self.state.lock().responder = Some(Box::new(responder));
    }

    /// Delivers an event on the live connection.
    ///
    /// Returns `false` when no connection is open.
    pub fn emit(&self, event: BrokerEvent) -> bool {
        match self.state.lock().events.as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Simulates a transport failure on the live connection.
    pub fn drop_connection(&self, reason: &str) {
        let mut state = self.state.lock();
        if let Some(tx) = state.events.take() {
            let _ = tx.send(BrokerEvent::ConnectionClosed {
                reason: reason.to_string(),
            });
        }
    }

    /// Returns whether a connection is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.lock().events.is_some()
    }

    /// Number of successful connects.
    #[must_use]
    pub fn connect_count(&self) -> u32 {
        self.state.lock().connects
    }

    /// Parameters of every connect attempt.
    #[must_use]
    pub fn connect_params(&self) -> Vec<ConnectParams> {
        self.state.lock().connect_params.clone()
    }

    /// Every command sent so far.
    #[must_use]
    pub fn commands(&self) -> Vec<Command> {
        self.state.lock().commands.clone()
    }

    /// Number of commands matching `predicate`.
    pub fn count_commands<P>(&self, predicate: P) -> usize
    where
        P: Fn(&Command) -> bool,
    {
        self.state.lock().commands.iter().filter(|c| predicate(c)).count()
    }
}

#[async_trait]
impl Connector for SimulatedBroker {
    async fn connect(&self, params: &ConnectParams) -> Result<BrokerLink, ConnectionError> {
        let mut state = self.state.lock();
        state.connect_params.push(params.clone());
        if let Some(error) = state.connect_failures.pop_front() {
            return Err(error);
        }
        if let Some(ref error) = state.refuse_all {
            return Err(error.clone());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.events = Some(tx);
        state.connects += 1;
        state.generation += 1;

        Ok(BrokerLink {
            handshake: state.handshake.clone(),
            commands: Arc::new(SimLink {
                state: Arc::clone(&self.state),
                generation: state.generation,
            }),
            events: rx,
        })
    }
}

/// Command sink of one simulated connection.
struct SimLink {
    state: Arc<Mutex<SimState>>,
    generation: u64,
}

impl CommandSink for SimLink {
    fn send(&self, command: &Command) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.generation != self.generation || state.events.is_none() {
            return Err(TransportError::Closed);
        }
        state.commands.push(command.clone());

        let replies = match state.responder.as_mut() {
            Some(responder) => responder(command),
            None => Vec::new(),
        };
        if let Some(tx) = state.events.as_ref() {
            for event in replies {
                let _ = tx.send(event);
            }
        }
        Ok(())
    }

    fn close(&self) {
        let mut state = self.state.lock();
        if state.generation == self.generation {
            state.events = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConnectParams {
        ConnectParams {
            host: "sim".to_string(),
            port: 0,
            client_id: 1,
            read_only: false,
        }
    }

    #[tokio::test]
    async fn test_responder_events_queued_before_send_returns() {
        let broker = SimulatedBroker::new();
        broker.respond_with(|command| match command {
            Command::CurrentTime { req_id } => vec![BrokerEvent::End { req_id: *req_id }],
            _ => Vec::new(),
        });

        let mut link = broker.connect(&params()).await.unwrap();
        link.commands
            .send(&Command::CurrentTime { req_id: 4 })
            .unwrap();

        assert_eq!(link.events.try_recv().unwrap(), BrokerEvent::End { req_id: 4 });
        assert_eq!(broker.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_connect_failure() {
        let broker = SimulatedBroker::new();
        broker.fail_next_connect(ConnectionError::DuplicateClientId(1));

        assert!(broker.connect(&params()).await.is_err());
        assert!(broker.connect(&params()).await.is_ok());
        assert_eq!(broker.connect_count(), 1);
        assert_eq!(broker.connect_params().len(), 2);
    }

    #[tokio::test]
    async fn test_stale_link_cannot_send() {
        let broker = SimulatedBroker::new();
        let first = broker.connect(&params()).await.unwrap();
        let _second = broker.connect(&params()).await.unwrap();

        assert_eq!(
            first.commands.send(&Command::OpenOrders { req_id: 1 }),
            Err(TransportError::Closed)
        );
    }

    #[tokio::test]
    async fn test_drop_connection_delivers_closed_event() {
        let broker = SimulatedBroker::new();
        let mut link = broker.connect(&params()).await.unwrap();

        broker.drop_connection("socket reset");

        assert!(matches!(
            link.events.recv().await,
            Some(BrokerEvent::ConnectionClosed { .. })
        ));
        assert!(!broker.is_connected());
        assert!(!broker.emit(BrokerEvent::End { req_id: 1 }));
    }
}
