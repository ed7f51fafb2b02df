//! Error types for the gateway client.

use serde::Deserialize;
use thiserror::Error;

#[cfg(test)]
mod tests;

/// Client error types.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The gateway answered with an error body.
    #[error("API error ({status} {code}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Machine-readable code, e.g. `TIMEOUT`.
        code: String,
        /// Error message from the gateway.
        message: String,
        /// Platform error code for rejected requests.
        broker_code: Option<i32>,
    },

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Error body returned by the gateway.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    code: String,
    #[serde(default)]
    broker_code: Option<i32>,
}

impl Error {
    /// Builds an error from a non-success status and its body text.
    ///
    /// Bodies that are not gateway error documents keep the raw text with an
    /// empty code.
    #[must_use]
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed = serde_json::from_str::<ErrorBody>(body).ok();
        if status == 404 {
            let message = parsed.map(|b| b.error).unwrap_or_else(|| body.to_string());
            return Self::NotFound(message);
        }
        match parsed {
            Some(b) => Self::Api {
                status,
                code: b.code,
                message: b.error,
                broker_code: b.broker_code,
            },
            None => Self::Api {
                status,
                code: String::new(),
                message: body.to_string(),
                broker_code: None,
            },
        }
    }

    /// Gateway error code, when the error came from the gateway.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } if !code.is_empty() => Some(code),
            Self::NotFound(_) => Some("NOT_FOUND"),
            _ => None,
        }
    }

    /// True when the gateway reported that the session is unavailable.
    #[must_use]
    pub fn is_not_connected(&self) -> bool {
        matches!(self.code(), Some("NOT_CONNECTED" | "DISCONNECTED"))
    }
}
