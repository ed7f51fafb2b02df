//! Unit tests for types module.

use super::*;

// ============================================================================
// Enum Tests
// ============================================================================

#[test]
fn test_session_state_display() {
    assert_eq!(format!("{}", SessionState::Connected), "connected");
    assert_eq!(format!("{}", SessionState::Degraded), "degraded");
}

#[test]
fn test_session_state_deserialization() {
    let state: SessionState = serde_json::from_str("\"connecting\"").unwrap();
    assert_eq!(state, SessionState::Connecting);
}

#[test]
fn test_order_type_wire_names() {
    assert_eq!(
        serde_json::to_string(&OrderType::StopLimit).unwrap(),
        "\"STP LMT\""
    );
    assert_eq!(serde_json::to_string(&SecType::Forex).unwrap(), "\"CASH\"");
    assert_eq!(serde_json::to_string(&TimeInForce::Gtc).unwrap(), "\"GTC\"");
}

// ============================================================================
// Contract and Order Tests
// ============================================================================

#[test]
fn test_stock_contract_serialization_skips_empty_fields() {
    let json = serde_json::to_value(Contract::stock("AAPL")).unwrap();

    assert_eq!(json["symbol"], "AAPL");
    assert_eq!(json["sec_type"], "STK");
    assert_eq!(json["exchange"], "SMART");
    assert!(json.get("strike").is_none());
    assert!(json.get("con_id").is_none());
}

#[test]
fn test_option_contract() {
    let contract = Contract::option("SPY", "20261218", 500.0, "C");

    assert_eq!(contract.sec_type, SecType::Option);
    assert_eq!(contract.strike, Some(500.0));
    assert_eq!(contract.multiplier.as_deref(), Some("100"));
}

#[test]
fn test_limit_order() {
    let order = OrderSpec::limit(OrderAction::Sell, 10.0, 101.5);
    let json = serde_json::to_value(&order).unwrap();

    assert_eq!(json["action"], "SELL");
    assert_eq!(json["order_type"], "LMT");
    assert_eq!(json["limit_price"], 101.5);
    assert_eq!(json["transmit"], true);
}

// ============================================================================
// Subscription Tests
// ============================================================================

#[test]
fn test_feed_serialization() {
    let feed = Feed::RealTimeBars {
        contract: Contract::stock("MSFT"),
        what_to_show: "MIDPOINT".to_string(),
        use_rth: false,
    };
    let json = serde_json::to_value(&feed).unwrap();

    assert_eq!(json["feed"], "real_time_bars");
    assert_eq!(json["what_to_show"], "MIDPOINT");
}

#[test]
fn test_feed_update_deserialization() {
    let json = r#"{
        "key": "ticker:AAPL-STK-SMART-USD",
        "value": {"kind": "ticker", "bid": 189.5, "ask": 189.6, "last": null,
                  "bid_size": null, "ask_size": null, "last_size": null,
                  "volume": null, "high": null, "low": null, "close": null,
                  "open": null, "halted": null},
        "at": "2026-01-05T14:30:00Z"
    }"#;

    let update: FeedUpdate = serde_json::from_str(json).unwrap();
    assert_eq!(update.key, "ticker:AAPL-STK-SMART-USD");
    match update.value {
        LastValue::Ticker(snapshot) => {
            assert_eq!(snapshot.bid, Some(189.5));
            assert_eq!(snapshot.last, None);
        }
        other => panic!("unexpected value {:?}", other),
    }
}

#[test]
fn test_unsubscribe_response_deserialization() {
    let json = r#"{"key": "bars5s:AAPL-STK-SMART-USD", "subscriber": "desk-1", "remaining": 0}"#;

    let response: UnsubscribeResponse = serde_json::from_str(json).unwrap();
    assert_eq!(response.remaining, 0);
    assert_eq!(response.subscriber, "desk-1");
}

// ============================================================================
// Request Default Tests
// ============================================================================

#[test]
fn test_scan_request_default() {
    let request = ScanRequest::default();

    assert_eq!(request.instrument, "STK");
    assert_eq!(request.location_code, "STK.US.MAJOR");
    assert_eq!(request.number_of_rows, 50);
}

#[test]
fn test_historical_bars_request_new() {
    let request = HistoricalBarsRequest::new(Contract::stock("AAPL"));
    let json = serde_json::to_value(&request).unwrap();

    assert_eq!(json["bar_size"], "1 min");
    assert_eq!(json["duration"], "1 D");
    assert!(json.get("end_datetime").is_none());
}

#[test]
fn test_account_query_urlencoding() {
    let query = AccountQuery {
        account: Some("DU123456".to_string()),
        timeout_ms: None,
    };

    assert_eq!(
        serde_urlencoded::to_string(&query).unwrap(),
        "account=DU123456"
    );
    assert_eq!(
        serde_urlencoded::to_string(AccountQuery::default()).unwrap(),
        ""
    );
}
