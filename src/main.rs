//! Broker Gateway Server
//!
//! REST and WebSocket server sharing one trading-platform session.

use broker_gateway::api::controls::{ReadyResponse, SessionActionResponse};
use broker_gateway::api::create_router;
use broker_gateway::broker::tcp::TcpConnector;
use broker_gateway::config::Config;
use broker_gateway::error::ErrorResponse;
use broker_gateway::session::{SessionState, SessionStatus};
use broker_gateway::state::AppState;
use broker_gateway::subscriptions::{
    Feed, FeedUpdate, LastValue, SubscriptionHandle, SubscriptionInfo, SubscriptionKey,
    TickerSnapshot,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use broker_gateway::models::{
    AccountSummaryResponse, AccountUpdatesRequest, AccountValueEntry, AccountValuesResponse,
    BarsResponse, CancelOrderRequest, CancelOrderResponse, ContractDetailsResponse,
    ContractRequest, ContractsResponse, ExecutionsResponse, FundamentalDataRequest,
    FundamentalDataResponse, HealthResponse, HistoricalBarsRequest, ManagedAccountsResponse,
    NewsRequest, NewsResponse, OrdersResponse, PlaceOrderRequest, PlaceOrderResponse,
    PortfolioResponse, PositionsResponse, RealTimeBarsSubscribeRequest, ScanRequest,
    ScanResponse, ScannerParametersResponse, SnapshotResponse, SubscribeResponse,
    SubscriptionsResponse, TickerSubscribeRequest, UnsubscribeResponse,
};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    paths(
        broker_gateway::api::controls::health_check,
        broker_gateway::api::controls::ready,
        broker_gateway::api::controls::get_session,
        broker_gateway::api::controls::connect_session,
        broker_gateway::api::controls::disconnect_session,
        broker_gateway::api::handlers::managed_accounts,
        broker_gateway::api::handlers::account_summary,
        broker_gateway::api::handlers::account_values,
        broker_gateway::api::handlers::positions,
        broker_gateway::api::handlers::portfolio,
        broker_gateway::api::handlers::subscribe_account_updates,
        broker_gateway::api::handlers::qualify_contract,
        broker_gateway::api::handlers::place_order,
        broker_gateway::api::handlers::cancel_order,
        broker_gateway::api::handlers::open_orders,
        broker_gateway::api::handlers::all_orders,
        broker_gateway::api::handlers::executions,
        broker_gateway::api::handlers::historical_bars,
        broker_gateway::api::handlers::subscribe_ticker,
        broker_gateway::api::handlers::subscribe_realtime_bars,
        broker_gateway::api::handlers::list_subscriptions,
        broker_gateway::api::handlers::get_snapshot,
        broker_gateway::api::handlers::unsubscribe,
        broker_gateway::api::handlers::contract_details,
        broker_gateway::api::handlers::fundamental_data,
        broker_gateway::api::handlers::news,
        broker_gateway::api::handlers::scan,
        broker_gateway::api::handlers::scanner_parameters,
        broker_gateway::api::websocket::ws_handler,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            ReadyResponse,
            SessionState,
            SessionStatus,
            SessionActionResponse,
            ManagedAccountsResponse,
            AccountValueEntry,
            AccountSummaryResponse,
            AccountValuesResponse,
            PositionsResponse,
            PortfolioResponse,
            AccountUpdatesRequest,
            ContractRequest,
            ContractsResponse,
            PlaceOrderRequest,
            PlaceOrderResponse,
            CancelOrderRequest,
            CancelOrderResponse,
            OrdersResponse,
            ExecutionsResponse,
            HistoricalBarsRequest,
            BarsResponse,
            TickerSubscribeRequest,
            RealTimeBarsSubscribeRequest,
            SubscribeResponse,
            SubscriptionsResponse,
            SnapshotResponse,
            UnsubscribeResponse,
            ContractDetailsResponse,
            FundamentalDataRequest,
            FundamentalDataResponse,
            NewsRequest,
            NewsResponse,
            ScanRequest,
            ScanResponse,
            ScannerParametersResponse,
            Feed,
            FeedUpdate,
            LastValue,
            TickerSnapshot,
            SubscriptionHandle,
            SubscriptionInfo,
            SubscriptionKey,
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "Session", description = "Platform session control"),
        (name = "Account", description = "Accounts, positions and portfolio"),
        (name = "Trading", description = "Contracts, orders and executions"),
        (name = "Market Data", description = "Historical bars and shared streams"),
        (name = "Research", description = "Contract details, fundamentals and news"),
        (name = "Scanner", description = "Market scanner"),
        (name = "WebSocket", description = "Streaming feed updates"),
    ),
    info(
        title = "Broker Gateway API",
        version = "0.1.0",
        description = "REST gateway over a single trading-platform session",
        license(name = "MIT"),
        contact(name = "Joaquin Bejar", email = "jb@taunais.com")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let host = config.server.host.clone();
    let port = config.server.port;

    let connector = Arc::new(TcpConnector::new(std::time::Duration::from_millis(
        config.broker.connect_timeout_ms,
    )));
    let state = Arc::new(AppState::new(connector, config));

    info!("Starting Broker Gateway on {}:{}", host, port);
    info!("Swagger UI available at http://{}:{}/swagger-ui/", host, port);

    state.connect_on_startup().await;

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the router
    let app = create_router(Arc::clone(&state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start the server
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    let shutdown_state = Arc::clone(&state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_state.shutdown_after(shutdown_signal()).await;
        })
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
