//! Error types for the REST API.

use crate::adapters::AdapterError;
use crate::broker::ConnectionError;
use crate::correlator::RequestError;
use crate::session::NotConnectedError;
use crate::subscriptions::SubscribeError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

#[cfg(test)]
mod tests;

/// API error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
    /// Error code.
    pub code: String,
    /// Platform error code, for platform rejections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker_code: Option<i32>,
}

/// API error types.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No live session.
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// Connecting to the platform failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The platform rejected the request.
    #[error("Broker error {code}: {message}")]
    BrokerRejected {
        /// Platform error code.
        code: i32,
        /// Platform error text.
        message: String,
    },

    /// No answer within the deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The session dropped while the request was outstanding.
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// The request conflicts with one already in place.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Trading is disabled on this session.
    #[error("Session is read-only")]
    ReadOnly,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status and machine-readable code.
    #[must_use]
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotConnected(_) => (StatusCode::SERVICE_UNAVAILABLE, "NOT_CONNECTED"),
            ApiError::Connection(_) => (StatusCode::BAD_GATEWAY, "CONNECTION_ERROR"),
            ApiError::BrokerRejected { .. } => (StatusCode::BAD_REQUEST, "BROKER_REJECTED"),
            ApiError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
            ApiError::Disconnected(_) => (StatusCode::SERVICE_UNAVAILABLE, "DISCONNECTED"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ApiError::ReadOnly => (StatusCode::FORBIDDEN, "READ_ONLY"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let broker_code = match &self {
            ApiError::BrokerRejected { code, .. } => Some(*code),
            _ => None,
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
            broker_code,
        });

        (status, body).into_response()
    }
}

impl From<NotConnectedError> for ApiError {
    fn from(err: NotConnectedError) -> Self {
        ApiError::NotConnected(err.to_string())
    }
}

impl From<ConnectionError> for ApiError {
    fn from(err: ConnectionError) -> Self {
        ApiError::Connection(err.to_string())
    }
}

impl From<RequestError> for ApiError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Rejected { code, message } => ApiError::BrokerRejected { code, message },
            RequestError::Timeout { .. } => ApiError::Timeout(err.to_string()),
            RequestError::Disconnected(reason) => ApiError::Disconnected(reason),
            RequestError::Transport(e) => ApiError::Disconnected(e.to_string()),
            RequestError::KeyInUse(_) => ApiError::Conflict(err.to_string()),
            RequestError::ReadOnly => ApiError::ReadOnly,
        }
    }
}

impl From<SubscribeError> for ApiError {
    fn from(err: SubscribeError) -> Self {
        match err {
            SubscribeError::Duplicate { .. } => ApiError::Conflict(err.to_string()),
            SubscribeError::Invalid(message) => ApiError::InvalidRequest(message),
            SubscribeError::Unknown { .. } => ApiError::NotFound(err.to_string()),
            SubscribeError::Stale { .. } => ApiError::Disconnected(err.to_string()),
            SubscribeError::Transport(e) => ApiError::Disconnected(e.to_string()),
        }
    }
}

impl From<AdapterError> for ApiError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::NotConnected(e) => e.into(),
            AdapterError::Request(e) => e.into(),
            AdapterError::Subscribe(e) => e.into(),
            AdapterError::Invalid(message) => ApiError::InvalidRequest(message),
            AdapterError::NotFound(message) => ApiError::NotFound(message),
        }
    }
}
