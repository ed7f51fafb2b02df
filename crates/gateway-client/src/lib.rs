//! HTTP client library for the Broker Gateway API.
//!
//! Typed access to every REST endpoint of the gateway plus a WebSocket
//! client for streamed feed updates.
//!
//! # Example
//!
//! ```no_run
//! use gateway_client::{ClientConfig, Contract, GatewayClient};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), gateway_client::Error> {
//!     let client = GatewayClient::new(ClientConfig {
//!         base_url: "http://localhost:8000".into(),
//!         timeout: Duration::from_secs(30),
//!     })?;
//!
//!     let health = client.health_check().await?;
//!     println!("Session: {}", health.session);
//!
//!     let contracts = client.qualify_contract(Contract::stock("AAPL")).await?;
//!     println!("Qualified {} contract(s)", contracts.count);
//!
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod types;
mod websocket;

pub use client::{ClientConfig, GatewayClient};
pub use error::Error;
pub use types::*;
pub use websocket::{ClientCommand, WsClient, WsMessage};
