//! Request and response models for the REST API.

use crate::broker::{
    Bar, Contract, ContractDetails, Execution, NewsHeadline, OrderRecord, OrderSpec, OrderStatus,
    PortfolioItem, Position, ScanItem, ScannerParams,
};
use crate::session::SessionState;
use crate::subscriptions::{LastValue, SubscriptionHandle, SubscriptionInfo, SubscriptionKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

// ============================================================================
// Health and Session
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
    /// Broker session state.
    pub session: SessionState,
}

// ============================================================================
// Account
// ============================================================================

/// Query parameters shared by account endpoints.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct AccountQuery {
    /// Account id; the first managed account when omitted.
    #[serde(default)]
    pub account: Option<String>,
    /// Request deadline in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Accounts managed by the session login.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ManagedAccountsResponse {
    pub accounts: Vec<String>,
    pub count: usize,
}

/// One reported value of an account tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AccountValueEntry {
    pub value: String,
    pub currency: String,
    pub account: String,
}

/// Key account metrics.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AccountSummaryResponse {
    pub account: String,
    /// Summary tags present in the account's values.
    pub summary: BTreeMap<String, AccountValueEntry>,
}

/// Every account value, grouped by tag.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AccountValuesResponse {
    pub account: String,
    pub values: BTreeMap<String, Vec<AccountValueEntry>>,
}

/// Open positions.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PositionsResponse {
    pub positions: Vec<Position>,
    pub count: usize,
}

/// Portfolio items with P&L.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PortfolioResponse {
    pub portfolio: Vec<PortfolioItem>,
    pub count: usize,
}

/// Request to stream account updates.
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct AccountUpdatesRequest {
    /// Account id; the first managed account when omitted.
    #[serde(default)]
    pub account: Option<String>,
    /// Subscriber id; generated when omitted.
    #[serde(default)]
    pub subscriber: Option<String>,
}

// ============================================================================
// Trading
// ============================================================================

/// Contract in a request body.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ContractRequest {
    #[serde(flatten)]
    pub contract: Contract,
    /// Request deadline in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Contracts matching a request.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ContractsResponse {
    pub contracts: Vec<Contract>,
    pub count: usize,
}

/// Request to place an order.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct PlaceOrderRequest {
    /// Instrument; qualified before the order is sent.
    pub contract: Contract,
    #[serde(flatten)]
    pub order: OrderSpec,
    /// Deadline for the first order status, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Acknowledged order.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PlaceOrderResponse {
    pub order_id: i64,
    /// Status text of the first status report.
    pub status: String,
    /// Qualified contract the order was sent for.
    pub contract: Contract,
    pub order_status: OrderStatus,
}

/// Request to cancel an order.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CancelOrderRequest {
    pub order_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Result of a cancellation.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CancelOrderResponse {
    pub order_id: i64,
    pub status: String,
    pub order_status: OrderStatus,
}

/// Orders known to the session.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrdersResponse {
    pub orders: Vec<OrderRecord>,
    pub count: usize,
}

/// Executions of the session.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ExecutionsResponse {
    pub executions: Vec<Execution>,
    pub count: usize,
}

/// Query with an optional deadline.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TimeoutQuery {
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

// ============================================================================
// Market Data
// ============================================================================

fn default_bar_size() -> String {
    "1 min".to_string()
}

fn default_duration() -> String {
    "1 D".to_string()
}

fn default_what_to_show() -> String {
    "TRADES".to_string()
}

fn default_true() -> bool {
    true
}

/// Request for historical bars.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct HistoricalBarsRequest {
    pub contract: Contract,
    /// Bar size, e.g. "1 min", "1 day".
    #[serde(default = "default_bar_size")]
    pub bar_size: String,
    /// Duration, e.g. "1 D", "2 W".
    #[serde(default = "default_duration")]
    pub duration: String,
    #[serde(default = "default_what_to_show")]
    pub what_to_show: String,
    #[serde(default = "default_true")]
    pub use_rth: bool,
    /// End of the window; now when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_datetime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Historical bars.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BarsResponse {
    pub bars: Vec<Bar>,
    pub count: usize,
}

/// Request to stream market data for a contract.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct TickerSubscribeRequest {
    pub contract: Contract,
    #[serde(default)]
    pub generic_ticks: String,
    /// Subscriber id; generated when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriber: Option<String>,
}

/// Request to stream 5-second bars for a contract.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct RealTimeBarsSubscribeRequest {
    pub contract: Contract,
    #[serde(default = "default_what_to_show")]
    pub what_to_show: String,
    #[serde(default = "default_true")]
    pub use_rth: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriber: Option<String>,
}

/// A subscription that was created or joined.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubscribeResponse {
    pub handle: SubscriptionHandle,
    /// Subscribers sharing the feed, this one included.
    pub subscriber_count: usize,
    /// Cached value, if the feed already had one.
    pub snapshot: Option<LastValue>,
}

/// Live subscriptions.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionsResponse {
    pub subscriptions: Vec<SubscriptionInfo>,
    pub count: usize,
}

/// Cached value of one feed.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SnapshotResponse {
    pub key: SubscriptionKey,
    /// `None` until the first update arrives.
    pub value: Option<LastValue>,
    pub active: bool,
    pub error: Option<String>,
}

/// Query identifying the subscriber to release.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UnsubscribeQuery {
    pub subscriber: String,
}

/// Result of a release.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UnsubscribeResponse {
    pub key: SubscriptionKey,
    pub subscriber: String,
    /// Subscribers left on the feed; 0 means the platform stream was cancelled.
    pub remaining: usize,
}

// ============================================================================
// Research and Scanner
// ============================================================================

/// Contract details.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ContractDetailsResponse {
    pub details: Vec<ContractDetails>,
    pub count: usize,
}

fn default_report_type() -> String {
    "ReportsFinSummary".to_string()
}

/// Request for a fundamental data report.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct FundamentalDataRequest {
    pub contract: Contract,
    /// ReportSnapshot, ReportsFinSummary, ReportRatios, ReportsFinStatements, RESC.
    #[serde(default = "default_report_type")]
    pub report_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Fundamental data report.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FundamentalDataResponse {
    pub symbol: String,
    pub report_type: String,
    /// Report document as delivered by the platform.
    pub data: String,
}

fn default_provider_codes() -> String {
    "BRFUPDN+DJNL".to_string()
}

fn default_total_results() -> u32 {
    10
}

/// Request for historical news headlines.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct NewsRequest {
    pub contract: Contract,
    #[serde(default = "default_provider_codes")]
    pub provider_codes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default = "default_total_results")]
    pub total_results: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// News headlines.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NewsResponse {
    pub headlines: Vec<NewsHeadline>,
    pub count: usize,
}

fn default_instrument() -> String {
    "STK".to_string()
}

fn default_location_code() -> String {
    "STK.US.MAJOR".to_string()
}

fn default_scan_code() -> String {
    "TOP_PERC_GAIN".to_string()
}

fn default_number_of_rows() -> u32 {
    50
}

/// Market scanner request.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ScanRequest {
    #[serde(default = "default_instrument")]
    pub instrument: String,
    #[serde(default = "default_location_code")]
    pub location_code: String,
    #[serde(default = "default_scan_code")]
    pub scan_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub above_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub below_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub above_volume: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap_above: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap_below: Option<f64>,
    #[serde(default = "default_number_of_rows")]
    pub number_of_rows: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Default for ScanRequest {
    fn default() -> Self {
        Self {
            instrument: default_instrument(),
            location_code: default_location_code(),
            scan_code: default_scan_code(),
            above_price: None,
            below_price: None,
            above_volume: None,
            market_cap_above: None,
            market_cap_below: None,
            number_of_rows: default_number_of_rows(),
            timeout_ms: None,
        }
    }
}

impl From<&ScanRequest> for ScannerParams {
    fn from(request: &ScanRequest) -> Self {
        Self {
            instrument: request.instrument.clone(),
            location_code: request.location_code.clone(),
            scan_code: request.scan_code.clone(),
            above_price: request.above_price,
            below_price: request.below_price,
            above_volume: request.above_volume,
            market_cap_above: request.market_cap_above,
            market_cap_below: request.market_cap_below,
            number_of_rows: request.number_of_rows,
        }
    }
}

/// Scanner results.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ScanResponse {
    pub results: Vec<ScanItem>,
    pub count: usize,
}

/// Scanner parameters document.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ScannerParametersResponse {
    pub parameters: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{OrderAction, OrderType};

    #[test]
    fn test_place_order_request_flattens_order_fields() {
        let json = r#"{
            "contract": {"symbol": "AAPL", "sec_type": "STK"},
            "action": "BUY",
            "order_type": "LMT",
            "quantity": 5,
            "limit_price": 190.25
        }"#;
        let request: PlaceOrderRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.order.action, OrderAction::Buy);
        assert_eq!(request.order.order_type, OrderType::Limit);
        assert_eq!(request.order.limit_price, Some(190.25));
        assert!(request.order.transmit);
        assert_eq!(request.contract.exchange, "SMART");
        assert!(request.timeout_ms.is_none());
    }

    #[test]
    fn test_scan_request_defaults() {
        let request: ScanRequest = serde_json::from_str("{}").unwrap();
        let params = ScannerParams::from(&request);
        assert_eq!(params.location_code, "STK.US.MAJOR");
        assert_eq!(params.scan_code, "TOP_PERC_GAIN");
        assert_eq!(params.number_of_rows, 50);
    }

    #[test]
    fn test_historical_bars_defaults() {
        let request: HistoricalBarsRequest =
            serde_json::from_str(r#"{"contract": {"symbol": "SPY"}}"#).unwrap();
        assert_eq!(request.bar_size, "1 min");
        assert_eq!(request.duration, "1 D");
        assert_eq!(request.what_to_show, "TRADES");
        assert!(request.use_rth);
    }
}
