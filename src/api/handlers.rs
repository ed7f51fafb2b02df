//! API request handlers.
//!
//! Thin wrappers over the domain adapters: extract, call, map errors.

use crate::adapters::{account, market_data, research, trading};
use crate::error::{ApiError, ErrorResponse};
use crate::models::{
    AccountQuery, AccountSummaryResponse, AccountUpdatesRequest, AccountValuesResponse,
    BarsResponse, CancelOrderRequest, CancelOrderResponse, ContractDetailsResponse,
    ContractRequest, ContractsResponse, ExecutionsResponse, FundamentalDataRequest,
    FundamentalDataResponse, HistoricalBarsRequest, ManagedAccountsResponse, NewsRequest,
    NewsResponse, OrdersResponse, PlaceOrderRequest, PlaceOrderResponse, PortfolioResponse,
    PositionsResponse, RealTimeBarsSubscribeRequest, ScanRequest, ScanResponse,
    ScannerParametersResponse, SnapshotResponse, SubscribeResponse, SubscriptionsResponse,
    TickerSubscribeRequest, TimeoutQuery, UnsubscribeQuery, UnsubscribeResponse,
};
use crate::state::AppState;
use crate::subscriptions::SubscriptionKey;
use axum::Json;
use axum::extract::{Path, Query, State};
use std::sync::Arc;


// ============================================================================
// Account
// ============================================================================

/// List the accounts managed by this login.
#[utoipa::path(
    get,
    path = "/api/v1/account/managed-accounts",
    responses(
        (status = 200, description = "Managed accounts", body = ManagedAccountsResponse),
        (status = 503, description = "Not connected", body = ErrorResponse)
    ),
    tag = "Account"
)]
pub async fn managed_accounts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ManagedAccountsResponse>, ApiError> {
    Ok(Json(account::managed_accounts(&state.session)?))
}

/// Get key account metrics.
#[utoipa::path(
    get,
    path = "/api/v1/account/summary",
    params(
        ("account" = Option<String>, Query, description = "Account id, defaults to the first managed account"),
        ("timeout_ms" = Option<u64>, Query, description = "Request deadline in milliseconds")
    ),
    responses(
        (status = 200, description = "Account summary", body = AccountSummaryResponse),
        (status = 404, description = "No accounts", body = ErrorResponse),
        (status = 503, description = "Not connected", body = ErrorResponse),
        (status = 504, description = "Timed out", body = ErrorResponse)
    ),
    tag = "Account"
)]
pub async fn account_summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AccountQuery>,
) -> Result<Json<AccountSummaryResponse>, ApiError> {
    Ok(Json(account::summary(&state.session, query).await?))
}

/// Get every account value, grouped by tag.
#[utoipa::path(
    get,
    path = "/api/v1/account/values",
    params(
        ("account" = Option<String>, Query, description = "Account id, defaults to the first managed account"),
        ("timeout_ms" = Option<u64>, Query, description = "Request deadline in milliseconds")
    ),
    responses(
        (status = 200, description = "Account values", body = AccountValuesResponse),
        (status = 503, description = "Not connected", body = ErrorResponse)
    ),
    tag = "Account"
)]
pub async fn account_values(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AccountQuery>,
) -> Result<Json<AccountValuesResponse>, ApiError> {
    Ok(Json(account::values(&state.session, query).await?))
}

/// List positions.
#[utoipa::path(
    get,
    path = "/api/v1/account/positions",
    params(
        ("account" = Option<String>, Query, description = "Restrict to one account"),
        ("timeout_ms" = Option<u64>, Query, description = "Request deadline in milliseconds")
    ),
    responses(
        (status = 200, description = "Positions", body = PositionsResponse),
        (status = 503, description = "Not connected", body = ErrorResponse)
    ),
    tag = "Account"
)]
pub async fn positions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AccountQuery>,
) -> Result<Json<PositionsResponse>, ApiError> {
    Ok(Json(account::positions(&state.session, query).await?))
}

/// List portfolio items with P&L.
#[utoipa::path(
    get,
    path = "/api/v1/account/portfolio",
    params(
        ("account" = Option<String>, Query, description = "Restrict to one account"),
        ("timeout_ms" = Option<u64>, Query, description = "Request deadline in milliseconds")
    ),
    responses(
        (status = 200, description = "Portfolio", body = PortfolioResponse),
        (status = 503, description = "Not connected", body = ErrorResponse)
    ),
    tag = "Account"
)]
pub async fn portfolio(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AccountQuery>,
) -> Result<Json<PortfolioResponse>, ApiError> {
    Ok(Json(account::portfolio(&state.session, query).await?))
}

/// Start or join the account update stream.
#[utoipa::path(
    post,
    path = "/api/v1/account/updates/subscribe",
    request_body = AccountUpdatesRequest,
    responses(
        (status = 200, description = "Subscribed", body = SubscribeResponse),
        (status = 409, description = "Already subscribed", body = ErrorResponse),
        (status = 503, description = "Not connected", body = ErrorResponse)
    ),
    tag = "Account"
)]
pub async fn subscribe_account_updates(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AccountUpdatesRequest>,
) -> Result<Json<SubscribeResponse>, ApiError> {
    Ok(Json(account::subscribe_updates(&state.session, request)?))
}

// ============================================================================
// Trading
// ============================================================================

/// Qualify a contract.
#[utoipa::path(
    post,
    path = "/api/v1/trading/contract/qualify",
    request_body = ContractRequest,
    responses(
        (status = 200, description = "Qualified contracts", body = ContractsResponse),
        (status = 404, description = "Contract not found", body = ErrorResponse)
    ),
    tag = "Trading"
)]
pub async fn qualify_contract(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ContractRequest>,
) -> Result<Json<ContractsResponse>, ApiError> {
    Ok(Json(
        trading::qualify_contract(&state.session, request.contract, request.timeout_ms).await?,
    ))
}

/// Place an order.
///
/// The order is sent once. A timeout does not mean the order was rejected.
#[utoipa::path(
    post,
    path = "/api/v1/trading/orders/place",
    request_body = PlaceOrderRequest,
    responses(
        (status = 200, description = "Order acknowledged", body = PlaceOrderResponse),
        (status = 400, description = "Invalid or rejected order", body = ErrorResponse),
        (status = 403, description = "Session is read-only", body = ErrorResponse),
        (status = 404, description = "Contract not found", body = ErrorResponse),
        (status = 504, description = "No acknowledgement in time", body = ErrorResponse)
    ),
    tag = "Trading"
)]
pub async fn place_order(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PlaceOrderRequest>,
) -> Result<Json<PlaceOrderResponse>, ApiError> {
    Ok(Json(trading::place_order(&state.session, request).await?))
}

/// Cancel an order.
#[utoipa::path(
    post,
    path = "/api/v1/trading/orders/cancel",
    request_body = CancelOrderRequest,
    responses(
        (status = 200, description = "Cancel acknowledged", body = CancelOrderResponse),
        (status = 400, description = "Cancel rejected", body = ErrorResponse),
        (status = 403, description = "Session is read-only", body = ErrorResponse),
        (status = 409, description = "Order has a request in flight", body = ErrorResponse)
    ),
    tag = "Trading"
)]
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CancelOrderRequest>,
) -> Result<Json<CancelOrderResponse>, ApiError> {
    Ok(Json(trading::cancel_order(&state.session, request).await?))
}

/// List working orders.
#[utoipa::path(
    get,
    path = "/api/v1/trading/orders/open",
    params(
        ("timeout_ms" = Option<u64>, Query, description = "Request deadline in milliseconds")
    ),
    responses(
        (status = 200, description = "Open orders", body = OrdersResponse)
    ),
    tag = "Trading"
)]
pub async fn open_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TimeoutQuery>,
) -> Result<Json<OrdersResponse>, ApiError> {
    Ok(Json(
        trading::open_orders(&state.session, query.timeout_ms).await?,
    ))
}

/// List all orders, completed ones included.
#[utoipa::path(
    get,
    path = "/api/v1/trading/orders/all",
    params(
        ("timeout_ms" = Option<u64>, Query, description = "Request deadline in milliseconds")
    ),
    responses(
        (status = 200, description = "All orders", body = OrdersResponse)
    ),
    tag = "Trading"
)]
pub async fn all_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TimeoutQuery>,
) -> Result<Json<OrdersResponse>, ApiError> {
    Ok(Json(
        trading::all_orders(&state.session, query.timeout_ms).await?,
    ))
}

/// List executions.
#[utoipa::path(
    get,
    path = "/api/v1/trading/executions",
    params(
        ("timeout_ms" = Option<u64>, Query, description = "Request deadline in milliseconds")
    ),
    responses(
        (status = 200, description = "Executions", body = ExecutionsResponse)
    ),
    tag = "Trading"
)]
pub async fn executions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TimeoutQuery>,
) -> Result<Json<ExecutionsResponse>, ApiError> {
    Ok(Json(
        trading::executions(&state.session, query.timeout_ms).await?,
    ))
}

// ============================================================================
// Market Data
// ============================================================================

/// Fetch historical bars.
#[utoipa::path(
    post,
    path = "/api/v1/market-data/historical-bars",
    request_body = HistoricalBarsRequest,
    responses(
        (status = 200, description = "Bars", body = BarsResponse),
        (status = 400, description = "Invalid or rejected request", body = ErrorResponse),
        (status = 504, description = "Timed out", body = ErrorResponse)
    ),
    tag = "Market Data"
)]
pub async fn historical_bars(
    State(state): State<Arc<AppState>>,
    Json(request): Json<HistoricalBarsRequest>,
) -> Result<Json<BarsResponse>, ApiError> {
    Ok(Json(
        market_data::historical_bars(&state.session, request).await?,
    ))
}

/// Start or join a ticker stream.
#[utoipa::path(
    post,
    path = "/api/v1/market-data/ticker/subscribe",
    request_body = TickerSubscribeRequest,
    responses(
        (status = 200, description = "Subscribed", body = SubscribeResponse),
        (status = 409, description = "Already subscribed", body = ErrorResponse)
    ),
    tag = "Market Data"
)]
pub async fn subscribe_ticker(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TickerSubscribeRequest>,
) -> Result<Json<SubscribeResponse>, ApiError> {
    Ok(Json(market_data::subscribe_ticker(&state.session, request)?))
}

/// Start or join a 5-second bar stream.
#[utoipa::path(
    post,
    path = "/api/v1/market-data/realtime-bars/subscribe",
    request_body = RealTimeBarsSubscribeRequest,
    responses(
        (status = 200, description = "Subscribed", body = SubscribeResponse),
        (status = 400, description = "Invalid feed", body = ErrorResponse),
        (status = 409, description = "Already subscribed", body = ErrorResponse)
    ),
    tag = "Market Data"
)]
pub async fn subscribe_realtime_bars(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RealTimeBarsSubscribeRequest>,
) -> Result<Json<SubscribeResponse>, ApiError> {
    Ok(Json(market_data::subscribe_realtime_bars(
        &state.session,
        request,
    )?))
}

/// List live subscriptions.
#[utoipa::path(
    get,
    path = "/api/v1/market-data/subscriptions",
    responses(
        (status = 200, description = "Subscriptions", body = SubscriptionsResponse)
    ),
    tag = "Market Data"
)]
pub async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SubscriptionsResponse>, ApiError> {
    Ok(Json(market_data::list_subscriptions(&state.session)?))
}

/// Latest cached value of a feed.
#[utoipa::path(
    get,
    path = "/api/v1/market-data/subscriptions/{key}/snapshot",
    params(
        ("key" = String, Path, description = "Subscription key, e.g. ticker:AAPL-STK-SMART-USD")
    ),
    responses(
        (status = 200, description = "Snapshot", body = SnapshotResponse),
        (status = 404, description = "No such subscription", body = ErrorResponse)
    ),
    tag = "Market Data"
)]
pub async fn get_snapshot(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<SnapshotResponse>, ApiError> {
    Ok(Json(market_data::snapshot(
        &state.session,
        &SubscriptionKey(key),
    )?))
}

/// Release a subscriber's claim on a feed.
#[utoipa::path(
    delete,
    path = "/api/v1/market-data/subscriptions/{key}",
    params(
        ("key" = String, Path, description = "Subscription key"),
        ("subscriber" = String, Query, description = "Subscriber releasing the feed")
    ),
    responses(
        (status = 200, description = "Released", body = UnsubscribeResponse),
        (status = 404, description = "Not subscribed", body = ErrorResponse)
    ),
    tag = "Market Data"
)]
pub async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(query): Query<UnsubscribeQuery>,
) -> Result<Json<UnsubscribeResponse>, ApiError> {
    Ok(Json(market_data::unsubscribe(
        &state.session,
        &SubscriptionKey(key),
        &query.subscriber,
    )?))
}

// ============================================================================
// Research
// ============================================================================

/// Full contract details.
#[utoipa::path(
    post,
    path = "/api/v1/research/contract-details",
    request_body = ContractRequest,
    responses(
        (status = 200, description = "Contract details", body = ContractDetailsResponse),
        (status = 404, description = "No details found", body = ErrorResponse)
    ),
    tag = "Research"
)]
pub async fn contract_details(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ContractRequest>,
) -> Result<Json<ContractDetailsResponse>, ApiError> {
    Ok(Json(
        research::contract_details(&state.session, request.contract, request.timeout_ms).await?,
    ))
}

/// Fundamental data report.
#[utoipa::path(
    post,
    path = "/api/v1/research/fundamental-data",
    request_body = FundamentalDataRequest,
    responses(
        (status = 200, description = "Report", body = FundamentalDataResponse),
        (status = 400, description = "Rejected", body = ErrorResponse)
    ),
    tag = "Research"
)]
pub async fn fundamental_data(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FundamentalDataRequest>,
) -> Result<Json<FundamentalDataResponse>, ApiError> {
    Ok(Json(research::fundamental_data(&state.session, request).await?))
}

/// Historical news headlines.
#[utoipa::path(
    post,
    path = "/api/v1/research/news",
    request_body = NewsRequest,
    responses(
        (status = 200, description = "Headlines", body = NewsResponse),
        (status = 404, description = "Contract not found", body = ErrorResponse)
    ),
    tag = "Research"
)]
pub async fn news(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NewsRequest>,
) -> Result<Json<NewsResponse>, ApiError> {
    Ok(Json(research::news(&state.session, request).await?))
}

/// Run the market scanner.
#[utoipa::path(
    post,
    path = "/api/v1/scanner/scan",
    request_body = ScanRequest,
    responses(
        (status = 200, description = "Scan results", body = ScanResponse),
        (status = 400, description = "Invalid parameters or no results", body = ErrorResponse)
    ),
    tag = "Scanner"
)]
pub async fn scan(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScanRequest>,
) -> Result<Json<ScanResponse>, ApiError> {
    Ok(Json(research::scan(&state.session, request).await?))
}

/// Scanner parameter document.
#[utoipa::path(
    get,
    path = "/api/v1/scanner/scanner-parameters",
    params(
        ("timeout_ms" = Option<u64>, Query, description = "Request deadline in milliseconds")
    ),
    responses(
        (status = 200, description = "Scanner parameters XML", body = ScannerParametersResponse)
    ),
    tag = "Scanner"
)]
pub async fn scanner_parameters(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TimeoutQuery>,
) -> Result<Json<ScannerParametersResponse>, ApiError> {
    Ok(Json(
        research::scanner_parameters(&state.session, query.timeout_ms).await?,
    ))
}
