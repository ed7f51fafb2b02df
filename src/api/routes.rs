//! Route configuration.

use crate::api::{controls, handlers, websocket};
use crate::state::AppState;
use axum::Router;
use axum::routing::{delete, get, post};
use std::sync::Arc;

/// Creates the API router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health
        .route("/health", get(controls::health_check))
        .route("/ready", get(controls::ready))
        // WebSocket
        .route("/ws", get(websocket::ws_handler))
        // Session
        .route("/api/v1/session", get(controls::get_session))
        .route("/api/v1/session/connect", post(controls::connect_session))
        .route(
            "/api/v1/session/disconnect",
            post(controls::disconnect_session),
        )
        // Account
        .route(
            "/api/v1/account/managed-accounts",
            get(handlers::managed_accounts),
        )
        .route("/api/v1/account/summary", get(handlers::account_summary))
        .route("/api/v1/account/values", get(handlers::account_values))
        .route("/api/v1/account/positions", get(handlers::positions))
        .route("/api/v1/account/portfolio", get(handlers::portfolio))
        .route(
            "/api/v1/account/updates/subscribe",
            post(handlers::subscribe_account_updates),
        )
        // Trading
        .route(
            "/api/v1/trading/contract/qualify",
            post(handlers::qualify_contract),
        )
        .route("/api/v1/trading/orders/place", post(handlers::place_order))
        .route("/api/v1/trading/orders/cancel", post(handlers::cancel_order))
        .route("/api/v1/trading/orders/open", get(handlers::open_orders))
        .route("/api/v1/trading/orders/all", get(handlers::all_orders))
        .route("/api/v1/trading/executions", get(handlers::executions))
        // Market data
        .route(
            "/api/v1/market-data/historical-bars",
            post(handlers::historical_bars),
        )
        .route(
            "/api/v1/market-data/ticker/subscribe",
            post(handlers::subscribe_ticker),
        )
        .route(
            "/api/v1/market-data/realtime-bars/subscribe",
            post(handlers::subscribe_realtime_bars),
        )
        .route(
            "/api/v1/market-data/subscriptions",
            get(handlers::list_subscriptions),
        )
        .route(
            "/api/v1/market-data/subscriptions/{key}",
            delete(handlers::unsubscribe),
        )
        .route(
            "/api/v1/market-data/subscriptions/{key}/snapshot",
            get(handlers::get_snapshot),
        )
        // Research
        .route(
            "/api/v1/research/contract-details",
            post(handlers::contract_details),
        )
        .route(
            "/api/v1/research/fundamental-data",
            post(handlers::fundamental_data),
        )
        .route("/api/v1/research/news", post(handlers::news))
        // Scanner
        .route("/api/v1/scanner/scan", post(handlers::scan))
        .route(
            "/api/v1/scanner/scanner-parameters",
            get(handlers::scanner_parameters),
        )
        .with_state(state)
}
