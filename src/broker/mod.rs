//! Capability interface to the trading platform.
//!
//! The platform client library is consumed through three seams:
//!
//! - [`Connector`]: establishes a connection and performs the handshake.
//! - [`CommandSink`]: enqueues outbound commands on a live connection.
//! - an event receiver in [`BrokerLink`]: the single inbound event stream.
//!
//! [`tcp::TcpConnector`] talks to a platform bridge over TCP;
//! [`sim::SimulatedBroker`] is a scripted in-process stand-in for tests.

pub mod sim;
pub mod tcp;
pub mod types;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

pub use types::{
    AccountValue, Bar, BrokerEvent, Command, Contract, ContractDetails, Execution, NewsHeadline,
    OrderAction, OrderRecord, OrderSpec, OrderStatus, OrderType, Payload, PortfolioItem, Position,
    ScanItem, ScannerParams, SecType, TickField, TimeInForce, is_warning_code,
};

/// Platform error code reported when the client id is already in use.
pub const DUPLICATE_CLIENT_ID_CODE: i32 = 326;

/// Platform error code confirming an order cancellation. The order's
/// `Cancelled` status follows it.
pub const ORDER_CANCELLED_CODE: i32 = 202;

/// Connection establishment errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConnectionError {
    /// The platform did not complete the handshake in time.
    #[error("connection timed out after {0:?}")]
    Timeout(Duration),
    /// Another session already uses this client id.
    #[error("client id {0} is already in use")]
    DuplicateClientId(i32),
    /// The platform rejected the session.
    #[error("connection rejected ({code}): {message}")]
    Rejected {
        /// Platform error code.
        code: i32,
        /// Platform error text.
        message: String,
    },
    /// Socket-level failure.
    #[error("transport failure: {0}")]
    Io(String),
    /// The peer sent something unexpected during the handshake.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Reconnection gave up.
    #[error("reconnect attempts exhausted after {attempts} tries: {last_error}")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Last failure seen.
        last_error: String,
    },
}

impl From<std::io::Error> for ConnectionError {
    fn from(err: std::io::Error) -> Self {
        ConnectionError::Io(err.to_string())
    }
}

/// Failure to hand a command to the transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The connection is closed.
    #[error("connection closed")]
    Closed,
}

/// Parameters for establishing a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    /// Platform host.
    pub host: String,
    /// Platform port.
    pub port: u16,
    /// Client id, unique per connection to the platform.
    pub client_id: i32,
    /// Whether the session may not place orders.
    pub read_only: bool,
}

/// Information returned by the platform on connect.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Handshake {
    /// Platform server version.
    pub server_version: i32,
    /// First order id this client may use.
    pub next_order_id: i64,
    /// Accounts managed by this login.
    pub managed_accounts: Vec<String>,
}

/// Outbound half of a live connection.
///
/// `send` only enqueues and must never wait on the network.
pub trait CommandSink: Send + Sync {
    /// Enqueues a command.
    ///
    /// # Errors
    /// Returns [`TransportError::Closed`] once the connection is gone.
    fn send(&self, command: &Command) -> Result<(), TransportError>;

    /// Tears down the connection. Further sends fail.
    fn close(&self);
}

/// A freshly established connection.
pub struct BrokerLink {
    /// Handshake data.
    pub handshake: Handshake,
    /// Command queue.
    pub commands: Arc<dyn CommandSink>,
    /// Inbound events in platform delivery order.
    pub events: mpsc::UnboundedReceiver<BrokerEvent>,
}

impl std::fmt::Debug for BrokerLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerLink")
            .field("handshake", &self.handshake)
            .finish_non_exhaustive()
    }
}

/// Establishes connections to the platform.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connects and completes the handshake.
    ///
    /// # Errors
    /// Returns [`ConnectionError`] on refusal, duplicate client id or protocol failure.
    async fn connect(&self, params: &ConnectParams) -> Result<BrokerLink, ConnectionError>;
}
