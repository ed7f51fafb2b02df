//! Integration tests for the Broker Gateway API.
//!
//! These tests need a running gateway connected to a paper account. They are
//! ignored by default; run them with `cargo test -p gateway-tests -- --ignored`.
//! Configure the gateway URL via the `GATEWAY_BASE_URL` environment variable
//! (default: `http://localhost:8000`).

use gateway_client::{ClientConfig, GatewayClient, SessionState};
use std::time::Duration;

/// Gets the gateway base URL from environment or uses default.
#[must_use]
pub fn get_api_url() -> String {
    std::env::var("GATEWAY_BASE_URL").unwrap_or_else(|_| "http://localhost:8000".to_string())
}

/// Creates a test client configured for the gateway.
///
/// # Errors
/// Returns error if client creation fails.
pub fn create_test_client() -> Result<GatewayClient, gateway_client::Error> {
    GatewayClient::new(ClientConfig {
        base_url: get_api_url(),
        timeout: Duration::from_secs(30),
    })
}

/// Creates a client and makes sure the session is connected.
///
/// # Errors
/// Returns error if the gateway cannot reach the platform.
pub async fn connected_client() -> Result<GatewayClient, gateway_client::Error> {
    let client = create_test_client()?;
    if client.session_status().await?.state != SessionState::Connected {
        client.connect_session().await?;
    }
    Ok(client)
}

/// Generates a unique subscriber id to avoid conflicts between tests.
#[must_use]
pub fn unique_subscriber(prefix: &str) -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);

    format!("{}_{}_{}", prefix, ts, counter)
}
