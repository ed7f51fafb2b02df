//! Unit tests for error module.

use super::*;
use crate::correlator::CorrelationKey;
use crate::session::SessionState;
use crate::subscriptions::SubscriptionKey;
use std::time::Duration;

async fn body_json(error: ApiError) -> (StatusCode, serde_json::Value) {
    let response = error.into_response();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// ============================================================================
// ErrorResponse Tests
// ============================================================================

#[test]
fn test_error_response_serialization() {
    let response = ErrorResponse {
        error: "Something went wrong".to_string(),
        code: "INTERNAL_ERROR".to_string(),
        broker_code: None,
    };

    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains("\"error\":\"Something went wrong\""));
    assert!(json.contains("\"code\":\"INTERNAL_ERROR\""));
    assert!(!json.contains("broker_code"));
}

// ============================================================================
// Mapping Tests
// ============================================================================

#[test]
fn test_status_codes() {
    let cases = [
        (ApiError::NotConnected("x".into()), StatusCode::SERVICE_UNAVAILABLE),
        (ApiError::Connection("x".into()), StatusCode::BAD_GATEWAY),
        (ApiError::Timeout("x".into()), StatusCode::GATEWAY_TIMEOUT),
        (ApiError::Disconnected("x".into()), StatusCode::SERVICE_UNAVAILABLE),
        (ApiError::Conflict("x".into()), StatusCode::CONFLICT),
        (ApiError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
        (ApiError::ReadOnly, StatusCode::FORBIDDEN),
        (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
        (ApiError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (error, status) in cases {
        assert_eq!(error.into_response().status(), status);
    }
}

#[tokio::test]
async fn test_broker_rejection_carries_code() {
    let error: ApiError = RequestError::Rejected {
        code: 200,
        message: "No security definition has been found".to_string(),
    }
    .into();

    let (status, body) = body_json(error).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BROKER_REJECTED");
    assert_eq!(body["broker_code"], 200);
}

#[tokio::test]
async fn test_not_connected_body() {
    let error: ApiError = NotConnectedError {
        state: SessionState::Degraded,
    }
    .into();

    let (status, body) = body_json(error).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "NOT_CONNECTED");
    assert_eq!(body["error"], "Not connected: session is degraded");
    assert!(body.get("broker_code").is_none());
}

#[test]
fn test_request_error_mapping() {
    let timeout: ApiError = RequestError::Timeout {
        key: CorrelationKey::Request(3),
        after: Duration::from_secs(1),
    }
    .into();
    assert!(matches!(timeout, ApiError::Timeout(_)));

    let busy: ApiError = RequestError::KeyInUse(CorrelationKey::Order(5)).into();
    assert!(matches!(busy, ApiError::Conflict(_)));

    let gone: ApiError = RequestError::Disconnected("session closed".into()).into();
    assert!(matches!(gone, ApiError::Disconnected(ref r) if r == "session closed"));

    let read_only: ApiError = RequestError::ReadOnly.into();
    assert!(matches!(read_only, ApiError::ReadOnly));
}

#[test]
fn test_subscribe_error_mapping() {
    let duplicate: ApiError = SubscribeError::Duplicate {
        key: SubscriptionKey::from("ticker:AAPL-STK-SMART-USD"),
        subscriber: "alice".to_string(),
    }
    .into();
    assert!(matches!(duplicate, ApiError::Conflict(_)));

    let invalid: ApiError = SubscribeError::Invalid("bad".into()).into();
    assert!(matches!(invalid, ApiError::InvalidRequest(_)));

    let stale: ApiError = SubscribeError::Stale { held: 1, current: 2 }.into();
    assert!(matches!(stale, ApiError::Disconnected(_)));
}

#[test]
fn test_adapter_error_mapping() {
    let not_found: ApiError = AdapterError::NotFound("Contract not found".into()).into();
    assert_eq!(not_found.to_string(), "Not found: Contract not found");

    let nested: ApiError = AdapterError::Request(RequestError::ReadOnly).into();
    assert!(matches!(nested, ApiError::ReadOnly));
}

#[test]
fn test_connection_error_mapping() {
    let error: ApiError = ConnectionError::DuplicateClientId(7).into();
    assert_eq!(error.status_and_code().1, "CONNECTION_ERROR");
    assert!(error.to_string().contains("client id 7"));
}

// ============================================================================
// ApiError Debug Tests
// ============================================================================

#[test]
fn test_api_error_debug() {
    let error = ApiError::NotFound("AAPL".to_string());
    let debug = format!("{:?}", error);
    assert!(debug.contains("NotFound"));
    assert!(debug.contains("AAPL"));
}
