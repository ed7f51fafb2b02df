//! Unit tests for error module.

use super::*;

#[test]
fn test_api_error_display() {
    let error = Error::Api {
        status: 504,
        code: "TIMEOUT".to_string(),
        message: "request 12 timed out".to_string(),
        broker_code: None,
    };

    let display = format!("{}", error);
    assert!(display.contains("504"));
    assert!(display.contains("TIMEOUT"));
    assert!(display.contains("timed out"));
}

#[test]
fn test_from_response_parses_gateway_body() {
    let body = r#"{"error": "No security definition", "code": "BROKER_REJECTED", "broker_code": 200}"#;

    match Error::from_response(400, body) {
        Error::Api {
            status,
            code,
            message,
            broker_code,
        } => {
            assert_eq!(status, 400);
            assert_eq!(code, "BROKER_REJECTED");
            assert_eq!(message, "No security definition");
            assert_eq!(broker_code, Some(200));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_from_response_not_found() {
    let body = r#"{"error": "Contract not found", "code": "NOT_FOUND"}"#;

    let error = Error::from_response(404, body);
    assert!(matches!(error, Error::NotFound(ref m) if m == "Contract not found"));
    assert_eq!(error.code(), Some("NOT_FOUND"));
}

#[test]
fn test_from_response_plain_text() {
    let error = Error::from_response(502, "Bad Gateway");

    assert!(matches!(error, Error::Api { ref message, .. } if message == "Bad Gateway"));
    assert_eq!(error.code(), None);
}

#[test]
fn test_is_not_connected() {
    let body = r#"{"error": "session is disconnected", "code": "NOT_CONNECTED"}"#;
    assert!(Error::from_response(503, body).is_not_connected());

    let body = r#"{"error": "connection lost", "code": "DISCONNECTED"}"#;
    assert!(Error::from_response(503, body).is_not_connected());

    assert!(!Error::ConnectionClosed.is_not_connected());
}

#[test]
fn test_connection_closed_error_display() {
    let error = Error::ConnectionClosed;

    let display = format!("{}", error);
    assert!(display.contains("Connection closed"));
}
