//! Command, event and payload types exchanged with the trading platform.
//!
//! These shapes are passed through the gateway with minimal reshaping. They
//! serialize as tagged JSON so the same definitions describe the wire format of
//! the TCP bridge and the HTTP response bodies.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Security type of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
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

impl std::fmt::Display for SecType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            Self::Stock => "STK",
            Self::Option => "OPT",
            Self::Future => "FUT",
            Self::Forex => "CASH",
            Self::Index => "IND",
            Self::Cfd => "CFD",
            Self::Commodity => "CMDTY",
            Self::Bond => "BOND",
            Self::Fund => "FUND",
        };
        write!(f, "{}", code)
    }
}

fn default_exchange() -> String {
    "SMART".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

/// Contract specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Contract {
    /// Platform contract id, present once the contract is qualified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub con_id: Option<i64>,
    /// Symbol (e.g., "AAPL", "EURUSD").
    pub symbol: String,
    /// Security type.
    #[serde(default)]
    pub sec_type: SecType,
    /// Destination exchange.
    #[serde(default = "default_exchange")]
    pub exchange: String,
    /// Currency.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Expiry (YYYYMMDD) or contract month (YYYYMM) for derivatives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_trade_date: Option<String>,
    /// Strike price for options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strike: Option<f64>,
    /// "C" or "P" for options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<String>,
    /// Contract multiplier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<String>,
    /// Primary listing exchange.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_exchange: Option<String>,
    /// Local exchange symbol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_symbol: Option<String>,
}

/// "CALL"/"PUT" in any case fold to "C"/"P".
fn canonical_right(right: &str) -> String {
    let right = right.trim().to_uppercase();
    match right.as_str() {
        "CALL" => "C".to_string(),
        "PUT" => "P".to_string(),
        _ => right,
    }
}

impl Contract {
    /// Creates a SMART-routed USD stock contract.
    #[must_use]
    pub fn stock(symbol: &str) -> Self {
        Self {
            con_id: None,
            symbol: symbol.to_string(),
            sec_type: SecType::Stock,
            exchange: default_exchange(),
            currency: default_currency(),
            last_trade_date: None,
            strike: None,
            right: None,
            multiplier: None,
            primary_exchange: None,
            local_symbol: None,
        }
    }

    /// Returns the signature used to deduplicate subscriptions.
    ///
    /// Format: `SYMBOL-SECTYPE-EXCHANGE-CURRENCY`, followed by
    /// `-EXPIRY-STRIKE-RIGHT` for contracts that carry derivative fields.
    #[must_use]
    pub fn signature(&self) -> String {
        let mut sig = format!(
            "{}-{}-{}-{}",
            self.symbol.to_uppercase(),
            self.sec_type,
            self.exchange.to_uppercase(),
            self.currency.to_uppercase()
        );
        if let Some(ref expiry) = self.last_trade_date {
            sig.push('-');
            sig.push_str(expiry);
        }
        if let Some(strike) = self.strike {
            sig.push_str(&format!("-{}", strike));
        }
        if let Some(ref right) = self.right {
            sig.push('-');
            sig.push_str(&canonical_right(right));
        }
        sig
    }

    /// Checks that the fields required by the security type are present.
    ///
    /// # Errors
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.symbol.trim().is_empty() {
            return Err("contract symbol cannot be empty".to_string());
        }
        match self.sec_type {
            SecType::Stock | SecType::Forex | SecType::Index => Ok(()),
            SecType::Option => {
                if self.last_trade_date.is_none() || self.strike.is_none() {
                    return Err("option contracts require last_trade_date and strike".to_string());
                }
                match self.right.as_deref().map(str::to_uppercase).as_deref() {
                    Some("C" | "P" | "CALL" | "PUT") => Ok(()),
                    _ => Err("option contracts require right 'C' or 'P'".to_string()),
                }
            }
            SecType::Future => {
                if self.last_trade_date.is_none() {
                    return Err("future contracts require last_trade_date".to_string());
                }
                Ok(())
            }
            other => Err(format!("Unsupported security type: {}", other)),
        }
    }
}

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderAction {
    /// Buy.
    Buy,
    /// Sell.
    Sell,
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub enum OrderType {
    /// Market order.
    #[default]
    #[serde(rename = "MKT")]
    Market,
    /// Limit order.
    #[serde(rename = "LMT")]
    Limit,
    /// Stop order.
    #[serde(rename = "STP")]
    Stop,
    /// Stop-limit order.
    #[serde(rename = "STP LMT")]
    StopLimit,
    /// Trailing stop order.
    #[serde(rename = "TRAIL")]
    TrailingStop,
}

/// Time in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// Day order (default).
    #[default]
    Day,
    /// Good till canceled.
    Gtc,
    /// Immediate or cancel.
    Ioc,
    /// Good till date.
    Gtd,
}

fn default_transmit() -> bool {
    true
}

/// Order specification sent with a place-order command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrderSpec {
    /// Buy or sell.
    pub action: OrderAction,
    /// Order type.
    #[serde(default)]
    pub order_type: OrderType,
    /// Total quantity.
    pub quantity: f64,
    /// Limit price for LMT and STP LMT orders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<f64>,
    /// Stop price for STP and STP LMT orders, trailing amount for TRAIL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<f64>,
    /// Time in force.
    #[serde(default)]
    pub time_in_force: TimeInForce,
    /// Account to route the order to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Whether the platform should transmit the order immediately.
    #[serde(default = "default_transmit")]
    pub transmit: bool,
    /// Parent order id for bracket children.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    /// One-cancels-all group name.
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

    /// Checks quantity and the prices required by the order type.
    ///
    /// # Errors
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.quantity.is_finite() && self.quantity > 0.0) {
            return Err("order quantity must be positive".to_string());
        }
        let needs_limit = matches!(self.order_type, OrderType::Limit | OrderType::StopLimit);
        let needs_stop = matches!(
            self.order_type,
            OrderType::Stop | OrderType::StopLimit | OrderType::TrailingStop
        );
        if needs_limit && self.limit_price.is_none() {
            return Err("limit_price is required for this order type".to_string());
        }
        if needs_stop && self.stop_price.is_none() {
            return Err("stop_price is required for this order type".to_string());
        }
        Ok(())
    }
}

/// Scanner subscription parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScannerParams {
    /// Instrument class (e.g., "STK").
    pub instrument: String,
    /// Location code (e.g., "STK.US.MAJOR").
    pub location_code: String,
    /// Scan code (e.g., "TOP_PERC_GAIN").
    pub scan_code: String,
    /// Minimum price filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub above_price: Option<f64>,
    /// Maximum price filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub below_price: Option<f64>,
    /// Minimum volume filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub above_volume: Option<i64>,
    /// Minimum market capitalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap_above: Option<f64>,
    /// Maximum market capitalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap_below: Option<f64>,
    /// Maximum number of rows.
    pub number_of_rows: u32,
}

/// Outbound command to the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Request server time (used as heartbeat).
    CurrentTime { req_id: i64 },
    /// Request all account values for one account.
    AccountValues { req_id: i64, account: String },
    /// Request positions.
    Positions {
        req_id: i64,
        account: Option<String>,
    },
    /// Request portfolio items with P&L.
    Portfolio {
        req_id: i64,
        account: Option<String>,
    },
    /// Request contract details (also used to qualify a contract).
    ContractDetails { req_id: i64, contract: Contract },
    /// Place an order under a client-assigned id.
    PlaceOrder {
        order_id: i64,
        contract: Contract,
        order: OrderSpec,
    },
    /// Cancel an order.
    CancelOrder { order_id: i64 },
    /// Request open orders.
    OpenOrders { req_id: i64 },
    /// Request all orders of the session, including completed ones.
    AllOrders { req_id: i64 },
    /// Request executions.
    Executions { req_id: i64 },
    /// Request historical bars.
    HistoricalData {
        req_id: i64,
        contract: Contract,
        end_date_time: String,
        duration: String,
        bar_size: String,
        what_to_show: String,
        use_rth: bool,
    },
    /// Start streaming market data.
    MarketData {
        req_id: i64,
        contract: Contract,
        generic_ticks: String,
    },
    /// Stop streaming market data.
    CancelMarketData { req_id: i64 },
    /// Start streaming 5-second bars.
    RealTimeBars {
        req_id: i64,
        contract: Contract,
        what_to_show: String,
        use_rth: bool,
    },
    /// Stop streaming 5-second bars.
    CancelRealTimeBars { req_id: i64 },
    /// Start streaming account updates.
    AccountUpdates { req_id: i64, account: String },
    /// Stop streaming account updates.
    CancelAccountUpdates { req_id: i64 },
    /// Run a market scanner.
    Scanner {
        req_id: i64,
        params: ScannerParams,
    },
    /// Request scanner parameters XML.
    ScannerParameters { req_id: i64 },
    /// Request a fundamental data report.
    FundamentalData {
        req_id: i64,
        contract: Contract,
        report_type: String,
    },
    /// Request historical news headlines.
    HistoricalNews {
        req_id: i64,
        con_id: i64,
        provider_codes: String,
        start_time: Option<String>,
        end_time: Option<String>,
        total_results: u32,
    },
}

impl Command {
    /// Short name used in log lines.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::CurrentTime { .. } => "current_time",
            Self::AccountValues { .. } => "account_values",
            Self::Positions { .. } => "positions",
            Self::Portfolio { .. } => "portfolio",
            Self::ContractDetails { .. } => "contract_details",
            Self::PlaceOrder { .. } => "place_order",
            Self::CancelOrder { .. } => "cancel_order",
            Self::OpenOrders { .. } => "open_orders",
            Self::AllOrders { .. } => "all_orders",
            Self::Executions { .. } => "executions",
            Self::HistoricalData { .. } => "historical_data",
            Self::MarketData { .. } => "market_data",
            Self::CancelMarketData { .. } => "cancel_market_data",
            Self::RealTimeBars { .. } => "real_time_bars",
            Self::CancelRealTimeBars { .. } => "cancel_real_time_bars",
            Self::AccountUpdates { .. } => "account_updates",
            Self::CancelAccountUpdates { .. } => "cancel_account_updates",
            Self::Scanner { .. } => "scanner",
            Self::ScannerParameters { .. } => "scanner_parameters",
            Self::FundamentalData { .. } => "fundamental_data",
            Self::HistoricalNews { .. } => "historical_news",
        }
    }
}

/// A single account value as reported by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AccountValue {
    /// Account id.
    pub account: String,
    /// Value tag (e.g., "NetLiquidation").
    pub tag: String,
    /// Value as reported (numeric or text).
    pub value: String,
    /// Currency.
    pub currency: String,
}

/// Position held in an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Position {
    /// Account id.
    pub account: String,
    /// Contract.
    pub contract: Contract,
    /// Signed position size.
    pub position: f64,
    /// Average cost.
    pub avg_cost: f64,
}

/// Portfolio item with P&L information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PortfolioItem {
    /// Account id.
    pub account: String,
    /// Contract.
    pub contract: Contract,
    /// Signed position size.
    pub position: f64,
    /// Current market price.
    pub market_price: f64,
    /// Current market value.
    pub market_value: f64,
    /// Average cost.
    pub average_cost: f64,
    /// Unrealized P&L.
    pub unrealized_pnl: f64,
    /// Realized P&L.
    pub realized_pnl: f64,
}

/// Contract details returned by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ContractDetails {
    /// Fully qualified contract.
    pub contract: Contract,
    /// Market name.
    #[serde(default)]
    pub market_name: String,
    /// Minimum price increment.
    #[serde(default)]
    pub min_tick: f64,
    /// Long name of the instrument.
    #[serde(default)]
    pub long_name: String,
    /// Supported order types.
    #[serde(default)]
    pub order_types: String,
    /// Exchanges the contract is valid on.
    #[serde(default)]
    pub valid_exchanges: String,
    /// Trading hours description.
    #[serde(default)]
    pub trading_hours: String,
    /// Time zone id.
    #[serde(default)]
    pub time_zone_id: String,
}

/// Order status update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrderStatus {
    /// Client-assigned order id.
    pub order_id: i64,
    /// Status text (e.g., "Submitted", "Filled", "Cancelled").
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
    /// Permanent platform id.
    #[serde(default)]
    pub perm_id: i64,
    /// Last fill price.
    #[serde(default)]
    pub last_fill_price: f64,
    /// Reason the order is held, if any.
    #[serde(default)]
    pub why_held: String,
}

/// Order as reported by open/all orders requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrderRecord {
    /// Order id.
    pub order_id: i64,
    /// Client id that placed the order.
    pub client_id: i64,
    /// Contract.
    pub contract: Contract,
    /// Order specification.
    pub order: OrderSpec,
    /// Latest status.
    pub status: OrderStatus,
}

/// Execution report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Execution {
    /// Execution id.
    pub exec_id: String,
    /// Execution time as reported.
    pub time: String,
    /// Account id.
    pub account: String,
    /// Contract.
    pub contract: Contract,
    /// "BOT" or "SLD".
    pub side: String,
    /// Executed quantity.
    pub shares: f64,
    /// Execution price.
    pub price: f64,
    /// Permanent order id.
    pub perm_id: i64,
    /// Client id.
    pub client_id: i64,
    /// Order id.
    pub order_id: i64,
    /// Cumulative quantity.
    pub cum_qty: f64,
    /// Average price.
    pub avg_price: f64,
}

/// OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Bar {
    /// Bar timestamp as reported.
    pub date: String,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Volume.
    pub volume: f64,
    /// Volume-weighted average price.
    #[serde(default)]
    pub average: f64,
    /// Number of trades.
    #[serde(default)]
    pub bar_count: i64,
}

/// One row of a scanner result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScanItem {
    /// Rank in the scan.
    pub rank: i32,
    /// Contract.
    pub contract: Contract,
    /// Distance.
    #[serde(default)]
    pub distance: String,
    /// Benchmark.
    #[serde(default)]
    pub benchmark: String,
    /// Projection.
    #[serde(default)]
    pub projection: String,
    /// Combo legs description.
    #[serde(default)]
    pub legs: String,
}

/// News headline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NewsHeadline {
    /// Publication time.
    pub time: String,
    /// Provider code.
    pub provider_code: String,
    /// Article id.
    pub article_id: String,
    /// Headline text.
    pub headline: String,
}

/// One item of a (possibly multi-part) reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// Server time in seconds since the epoch.
    CurrentTime { epoch: i64 },
    /// Account value.
    AccountValue(AccountValue),
    /// Position.
    Position(Position),
    /// Portfolio item.
    PortfolioItem(PortfolioItem),
    /// Contract details.
    ContractDetails(ContractDetails),
    /// Order record.
    Order(OrderRecord),
    /// Order status.
    OrderStatus(OrderStatus),
    /// Execution.
    Execution(Execution),
    /// Bar.
    Bar(Bar),
    /// Scanner row.
    ScanItem(ScanItem),
    /// Scanner parameters document.
    ScannerParameters { xml: String },
    /// Fundamental data report.
    FundamentalData { xml: String },
    /// News headline.
    News(NewsHeadline),
}

/// Market data tick field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TickField {
    /// Best bid.
    Bid,
    /// Best ask.
    Ask,
    /// Last trade price.
    Last,
    /// Bid size.
    BidSize,
    /// Ask size.
    AskSize,
    /// Last trade size.
    LastSize,
    /// Session volume.
    Volume,
    /// Session high.
    High,
    /// Session low.
    Low,
    /// Previous close.
    Close,
    /// Session open.
    Open,
    /// Halted indicator.
    Halted,
}

/// Inbound event from the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrokerEvent {
    /// One part of a reply to a request.
    Item { req_id: i64, item: Payload },
    /// Marks a reply as complete.
    End { req_id: i64 },
    /// Order status change.
    OrderStatus(OrderStatus),
    /// Error or warning. `id` is a request id, order id, or -1.
    Error { id: i64, code: i32, message: String },
    /// Market data tick for a subscription.
    Tick {
        req_id: i64,
        field: TickField,
        value: f64,
    },
    /// 5-second bar for a subscription.
    RealTimeBar { req_id: i64, bar: Bar },
    /// Account update for a subscription.
    AccountUpdate { req_id: i64, value: AccountValue },
    /// Transport closed.
    ConnectionClosed { reason: String },
}

/// Returns whether a platform error code is informational.
///
/// Warnings are logged but never fail the request they refer to.
#[must_use]
pub fn is_warning_code(code: i32) -> bool {
    matches!(code, 2100..=2199 | 399 | 10167)
}
