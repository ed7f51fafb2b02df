//! Request and response types for the gateway API.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[cfg(test)]
mod tests;

// ============================================================================
// Enums
// ============================================================================

/// Platform session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No connection.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Ready for requests.
    Connected,
    /// Connection lost; reconnecting.
    Degraded,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Degraded => write!(f, "degraded"),
        }
    }
}

/// Security type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SecType {
    /// Stock.
    #[default]
    #[serde(rename = "STK")]
    Stock,
    /// Option.
    #[serde(rename = "OPT")]
    Option,
    /// Future.
    #[serde(rename = "FUT")]
    Future,
    /// Forex pair.
    #[serde(rename = "CASH")]
    Forex,
    /// Index.
    #[serde(rename = "IND")]
    Index,
    /// Contract for difference.
    #[serde(rename = "CFD")]
    Cfd,
    /// Commodity.
    #[serde(rename = "CMDTY")]
    Commodity,
    /// Bond.
    #[serde(rename = "BOND")]
    Bond,
    /// Mutual fund.
    #[serde(rename = "FUND")]
    Fund,
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderAction {
    /// Buy.
    Buy,
    /// Sell.
    Sell,
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderAction::Buy => write!(f, "BUY"),
            OrderAction::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderType {
    /// Market.
    #[default]
    #[serde(rename = "MKT")]
    Market,
    /// Limit.
    #[serde(rename = "LMT")]
    Limit,
    /// Stop.
    #[serde(rename = "STP")]
    Stop,
    /// Stop limit.
    #[serde(rename = "STP LMT")]
    StopLimit,
    /// Trailing stop.
    #[serde(rename = "TRAIL")]
    TrailingStop,
}

/// Time in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// Day.
    #[default]
    Day,
    /// Good till cancelled.
    Gtc,
    /// Immediate or cancel.
    Ioc,
    /// Good till date.
    Gtd,
}

// ============================================================================
// Contracts and Orders
// ============================================================================

/// Instrument description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    /// Platform contract id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub con_id: Option<i64>,
    /// Symbol.
    pub symbol: String,
    /// Security type.
    #[serde(default)]
    pub sec_type: SecType,
    /// Exchange.
    pub exchange: String,
    /// Currency.
    pub currency: String,
    /// Expiry (YYYYMMDD) for derivatives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_trade_date: Option<String>,
    /// Strike for options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strike: Option<f64>,
    /// Right for options ("C" or "P").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<String>,
    /// Contract multiplier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<String>,
    /// Primary listing exchange.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_exchange: Option<String>,
    /// Local symbol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_symbol: Option<String>,
}

impl Contract {
    /// Creates a SMART-routed USD stock contract.
    #[must_use]
    pub fn stock(symbol: &str) -> Self {
        Self {
            con_id: None,
            symbol: symbol.to_string(),
            sec_type: SecType::Stock,
            exchange: "SMART".to_string(),
            currency: "USD".to_string(),
            last_trade_date: None,
            strike: None,
            right: None,
            multiplier: None,
            primary_exchange: None,
            local_symbol: None,
        }
    }

    /// Creates a SMART-routed USD option contract.
    #[must_use]
    pub fn option(symbol: &str, expiry: &str, strike: f64, right: &str) -> Self {
        Self {
            sec_type: SecType::Option,
            last_trade_date: Some(expiry.to_string()),
            strike: Some(strike),
            right: Some(right.to_string()),
            multiplier: Some("100".to_string()),
            ..Self::stock(symbol)
        }
    }
}

/// Order parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Side.
    pub action: OrderAction,
    /// Order type.
    #[serde(default)]
    pub order_type: OrderType,
    /// Quantity.
    pub quantity: f64,
    /// Limit price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<f64>,
    /// Stop price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<f64>,
    /// Time in force.
    #[serde(default)]
    pub time_in_force: TimeInForce,
    /// Account; the platform default when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Transmit immediately.
    pub transmit: bool,
    /// Parent order id for brackets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    /// One-cancels-all group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oca_group: Option<String>,
}

impl OrderSpec {
    /// Creates a market order.
    #[must_use]
    pub fn market(action: OrderAction, quantity: f64) -> Self {
        Self {
            action,
            order_type: OrderType::Market,
            quantity,
            limit_price: None,
            stop_price: None,
            time_in_force: TimeInForce::Day,
            account: None,
            transmit: true,
            parent_id: None,
            oca_group: None,
        }
    }

    /// Creates a limit order.
    #[must_use]
    pub fn limit(action: OrderAction, quantity: f64, price: f64) -> Self {
        Self {
            order_type: OrderType::Limit,
            limit_price: Some(price),
            ..Self::market(action, quantity)
        }
    }
}

/// Order status as last reported by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatus {
    /// Order id.
    pub order_id: i64,
    /// Status, e.g. "Submitted", "Filled".
    pub status: String,
    /// Filled quantity.
    #[serde(default)]
    pub filled: f64,
    /// Remaining quantity.
    #[serde(default)]
    pub remaining: f64,
    /// Average fill price.
    #[serde(default)]
    pub avg_fill_price: f64,
    /// Permanent id.
    #[serde(default)]
    pub perm_id: i64,
    /// Last fill price.
    #[serde(default)]
    pub last_fill_price: f64,
    /// Reason the order is held.
    #[serde(default)]
    pub why_held: String,
}

/// An order known to the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Order id.
    pub order_id: i64,
    /// Client id that placed the order.
    pub client_id: i64,
    /// Instrument.
    pub contract: Contract,
    /// Order parameters.
    pub order: OrderSpec,
    /// Status.
    pub status: OrderStatus,
}

/// Trade execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub exec_id: String,
    pub time: String,
    pub account: String,
    pub contract: Contract,
    pub side: String,
    pub shares: f64,
    pub price: f64,
    pub perm_id: i64,
    pub client_id: i64,
    pub order_id: i64,
    pub cum_qty: f64,
    pub avg_price: f64,
}

// ============================================================================
// Account Types
// ============================================================================

/// One value of an account tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountValueEntry {
    pub value: String,
    pub currency: String,
    pub account: String,
}

/// Raw account value as streamed by account update feeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountValue {
    pub account: String,
    pub tag: String,
    pub value: String,
    pub currency: String,
}

/// Position held in an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub account: String,
    pub contract: Contract,
    pub position: f64,
    pub avg_cost: f64,
}

/// Position with market valuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioItem {
    pub account: String,
    pub contract: Contract,
    pub position: f64,
    pub market_price: f64,
    pub market_value: f64,
    pub average_cost: f64,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
}

// ============================================================================
// Market Data and Research Types
// ============================================================================

/// Price bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default)]
    pub average: f64,
    #[serde(default)]
    pub bar_count: i64,
}

/// Full contract description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDetails {
    pub contract: Contract,
    #[serde(default)]
    pub market_name: String,
    #[serde(default)]
    pub min_tick: f64,
    #[serde(default)]
    pub long_name: String,
    #[serde(default)]
    pub order_types: String,
    #[serde(default)]
    pub valid_exchanges: String,
    #[serde(default)]
    pub trading_hours: String,
    #[serde(default)]
    pub time_zone_id: String,
}

/// Scanner result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanItem {
    pub rank: i32,
    pub contract: Contract,
    #[serde(default)]
    pub distance: String,
    #[serde(default)]
    pub benchmark: String,
    #[serde(default)]
    pub projection: String,
    #[serde(default)]
    pub legs: String,
}

/// News headline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsHeadline {
    pub time: String,
    pub provider_code: String,
    pub article_id: String,
    pub headline: String,
}

// ============================================================================
// Subscriptions
// ============================================================================

/// Streamable feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "feed", rename_all = "snake_case")]
pub enum Feed {
    /// Top-of-book market data.
    Ticker {
        /// Instrument.
        contract: Contract,
        /// Comma-separated generic tick list.
        #[serde(default)]
        generic_ticks: String,
    },
    /// 5-second bars.
    RealTimeBars {
        /// Instrument.
        contract: Contract,
        /// Data type.
        what_to_show: String,
        /// Regular trading hours only.
        use_rth: bool,
    },
    /// Account value updates.
    AccountUpdates {
        /// Account id.
        account: String,
    },
}

/// Merged top-of-book state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickerSnapshot {
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last: Option<f64>,
    pub bid_size: Option<f64>,
    pub ask_size: Option<f64>,
    pub last_size: Option<f64>,
    pub volume: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub open: Option<f64>,
    pub halted: Option<bool>,
}

/// Last value received on a feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LastValue {
    /// Ticker state.
    Ticker(TickerSnapshot),
    /// Latest bar.
    Bar(Bar),
    /// Account values by key.
    Account {
        /// Values by key.
        values: BTreeMap<String, AccountValue>,
    },
}

/// One subscriber's claim on a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionHandle {
    /// Feed key, e.g. `ticker:AAPL-STK-SMART-USD`.
    pub key: String,
    pub subscriber: String,
    pub req_id: i64,
    pub epoch: u64,
}

/// Registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    pub key: String,
    pub feed: Feed,
    pub req_id: i64,
    pub subscribers: Vec<String>,
    pub subscriber_count: usize,
    pub active: bool,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub last_value: Option<LastValue>,
}

/// Update on a subscribed feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedUpdate {
    pub key: String,
    pub value: LastValue,
    /// RFC 3339 timestamp.
    pub at: String,
}

// ============================================================================
// Health and Session
// ============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy" or "degraded".
    pub status: String,
    pub version: String,
    pub session: SessionState,
}

/// Readiness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub state: SessionState,
}

/// Session status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub host: String,
    pub port: u16,
    pub client_id: i32,
    pub read_only: bool,
    pub server_version: Option<i32>,
    pub connected_since: Option<String>,
    pub last_error: Option<String>,
    pub reconnect_attempts: u32,
    pub pending_requests: usize,
    pub active_subscriptions: usize,
}

/// Result of a connect or disconnect call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionActionResponse {
    pub success: bool,
    pub message: String,
    pub session: SessionStatus,
}

// ============================================================================
// Account Requests and Responses
// ============================================================================

/// Query shared by account endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Managed accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedAccountsResponse {
    pub accounts: Vec<String>,
    pub count: usize,
}

/// Key account metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSummaryResponse {
    pub account: String,
    pub summary: BTreeMap<String, AccountValueEntry>,
}

/// All account values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountValuesResponse {
    pub account: String,
    pub values: BTreeMap<String, Vec<AccountValueEntry>>,
}

/// Positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionsResponse {
    pub positions: Vec<Position>,
    pub count: usize,
}

/// Portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioResponse {
    pub portfolio: Vec<PortfolioItem>,
    pub count: usize,
}

/// Request to stream account updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountUpdatesRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscriber: Option<String>,
}

// ============================================================================
// Trading Requests and Responses
// ============================================================================

/// Request carrying one contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractRequest {
    pub contract: Contract,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Qualified contracts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsResponse {
    pub contracts: Vec<Contract>,
    pub count: usize,
}

/// Request to place an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    pub contract: Contract,
    pub order: OrderSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Placed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderResponse {
    pub order_id: i64,
    pub status: String,
    pub contract: Contract,
    pub order_status: OrderStatus,
}

/// Request to cancel an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOrderRequest {
    pub order_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Cancelled order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOrderResponse {
    pub order_id: i64,
    pub status: String,
    pub order_status: OrderStatus,
}

/// Orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdersResponse {
    pub orders: Vec<OrderRecord>,
    pub count: usize,
}

/// Executions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionsResponse {
    pub executions: Vec<Execution>,
    pub count: usize,
}

/// Query with an optional deadline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeoutQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

// ============================================================================
// Market Data Requests and Responses
// ============================================================================

/// Request for historical bars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalBarsRequest {
    pub contract: Contract,
    pub bar_size: String,
    pub duration: String,
    pub what_to_show: String,
    pub use_rth: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_datetime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl HistoricalBarsRequest {
    /// One day of 1-minute trade bars, regular hours only.
    #[must_use]
    pub fn new(contract: Contract) -> Self {
        Self {
            contract,
            bar_size: "1 min".to_string(),
            duration: "1 D".to_string(),
            what_to_show: "TRADES".to_string(),
            use_rth: true,
            end_datetime: None,
            timeout_ms: None,
        }
    }
}

/// Historical bars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarsResponse {
    pub bars: Vec<Bar>,
    pub count: usize,
}

/// Request to stream market data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerSubscribeRequest {
    pub contract: Contract,
    #[serde(default)]
    pub generic_ticks: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscriber: Option<String>,
}

/// Request to stream 5-second bars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealTimeBarsSubscribeRequest {
    pub contract: Contract,
    pub what_to_show: String,
    pub use_rth: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscriber: Option<String>,
}

/// Created or joined subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeResponse {
    pub handle: SubscriptionHandle,
    pub subscriber_count: usize,
    pub snapshot: Option<LastValue>,
}

/// Live subscriptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionsResponse {
    pub subscriptions: Vec<SubscriptionInfo>,
    pub count: usize,
}

/// Cached value of a feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub key: String,
    pub value: Option<LastValue>,
    pub active: bool,
    pub error: Option<String>,
}

/// Released subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsubscribeResponse {
    pub key: String,
    pub subscriber: String,
    pub remaining: usize,
}

// ============================================================================
// Research Requests and Responses
// ============================================================================

/// Contract details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractDetailsResponse {
    pub details: Vec<ContractDetails>,
    pub count: usize,
}

/// Request for a fundamental data report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundamentalDataRequest {
    pub contract: Contract,
    pub report_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Fundamental data report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundamentalDataResponse {
    pub symbol: String,
    pub report_type: String,
    pub data: String,
}

/// Request for news headlines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsRequest {
    pub contract: Contract,
    pub provider_codes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    pub total_results: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// News headlines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsResponse {
    pub headlines: Vec<NewsHeadline>,
    pub count: usize,
}

/// Market scanner request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub instrument: String,
    pub location_code: String,
    pub scan_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub above_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub below_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub above_volume: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap_above: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap_below: Option<f64>,
    pub number_of_rows: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Default for ScanRequest {
    fn default() -> Self {
        Self {
            instrument: "STK".to_string(),
            location_code: "STK.US.MAJOR".to_string(),
            scan_code: "TOP_PERC_GAIN".to_string(),
            above_price: None,
            below_price: None,
            above_volume: None,
            market_cap_above: None,
            market_cap_below: None,
            number_of_rows: 50,
            timeout_ms: None,
        }
    }
}

/// Scanner results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResponse {
    pub results: Vec<ScanItem>,
    pub count: usize,
}

/// Scanner parameter document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerParametersResponse {
    pub parameters: String,
}
