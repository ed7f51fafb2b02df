//! # Broker Gateway - REST API Server
//!
//! Exposes one persistent session to a trading platform as a REST and
//! WebSocket surface shared by many HTTP clients. Built with
//! [Axum](https://crates.io/crates/axum) for async HTTP handling and
//! provides OpenAPI/Swagger documentation via [utoipa](https://crates.io/crates/utoipa).
//!
//! ## Key Features
//!
//! - **Single Session**: one connection to the platform, owned by the
//!   [`session::SessionManager`], with heartbeat and bounded reconnect.
//!
//! - **Request Correlation**: every platform command is matched to its
//!   asynchronous answer by request or order id, with per-request deadlines.
//!
//! - **Shared Streams**: market data and account streams are reference
//!   counted, so many clients share one platform subscription.
//!
//! - **OpenAPI Documentation**: Auto-generated Swagger UI at `/swagger-ui/`.
//!
//! ## Architecture
//!
//! ```text
//! HTTP / WebSocket clients
//!   └── api (routes, handlers, controls, websocket)
//!         └── adapters (account, trading, market_data, research)
//!               └── session::SessionHandle
//!                     ├── correlator::Correlator        request/response matching
//!                     ├── subscriptions::SubscriptionRegistry   shared feeds
//!                     └── broker::CommandSink           platform connection
//! ```
//!
//! ## Module Structure
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`broker`] | Platform connection interface, wire types, TCP and simulated connectors |
//! | [`correlator`] | Pending-request table |
//! | [`subscriptions`] | Reference-counted feed registry |
//! | [`session`] | Session lifecycle, event dispatch, heartbeat, reconnect |
//! | [`adapters`] | Account, trading, market data and research operations |
//! | [`api`] | Route handlers and router configuration |
//! | [`error`] | API error types with `IntoResponse` implementation |
//! | [`models`] | Request/response DTOs with OpenAPI schemas |
//! | [`config`] | TOML configuration with environment overrides |
//! | [`state`] | Application state management |
//!
//! ## Example Usage
//!
//! ```bash
//! # Gateway on port 8000, platform on 127.0.0.1:4002
//! cargo run
//!
//! # Against a paper account on another host, read-only
//! IB_HOST=10.0.0.5 IB_PORT=7497 IB_READONLY=true cargo run
//!
//! # Account summary
//! curl http://localhost:8000/api/v1/account/summary
//!
//! # Share a ticker stream
//! curl -X POST http://localhost:8000/api/v1/market-data/ticker/subscribe \
//!   -H "Content-Type: application/json" \
//!   -d '{"contract": {"symbol": "AAPL"}, "subscriber": "desk-1"}'
//! ```

pub mod adapters;
pub mod api;
pub mod broker;
pub mod config;
pub mod correlator;
pub mod error;
pub mod models;
pub mod session;
pub mod state;
pub mod subscriptions;
