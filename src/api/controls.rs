//! Session control and health handlers.

use crate::error::{ApiError, ErrorResponse};
use crate::models::HealthResponse;
use crate::session::{SessionState, SessionStatus};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;


// ============================================================================
// Request/Response Types
// ============================================================================

/// Result of a connect or disconnect request.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionActionResponse {
    /// Whether the operation changed or confirmed the session.
    pub success: bool,
    /// Message describing the result.
    pub message: String,
    /// Session status after the action.
    pub session: SessionStatus,
}

/// Readiness response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadyResponse {
    /// Whether requests can be served.
    pub ready: bool,
    /// Current session state.
    pub state: SessionState,
}

// ============================================================================
// Health Handlers
// ============================================================================

/// Health check endpoint.
///
/// Always 200 while the process runs; the session state is reported, not
/// enforced.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    ),
    tag = "Health"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let session = state.session.state();
    Json(HealthResponse {
        status: if session == SessionState::Connected {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        session,
    })
}

/// Readiness probe: 200 only while connected.
#[utoipa::path(
    get,
    path = "/ready",
    responses(
        (status = 200, description = "Session connected", body = ReadyResponse),
        (status = 503, description = "Session not connected", body = ReadyResponse)
    ),
    tag = "Health"
)]
pub async fn ready(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ReadyResponse>) {
    let session = state.session.state();
    let ready = session == SessionState::Connected;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadyResponse {
            ready,
            state: session,
        }),
    )
}

// ============================================================================
// Session Handlers
// ============================================================================

/// Get the session status.
#[utoipa::path(
    get,
    path = "/api/v1/session",
    responses(
        (status = 200, description = "Session status", body = SessionStatus)
    ),
    tag = "Session"
)]
pub async fn get_session(State(state): State<Arc<AppState>>) -> Json<SessionStatus> {
    Json(state.session.health())
}

/// Connect the session, or confirm the existing connection.
#[utoipa::path(
    post,
    path = "/api/v1/session/connect",
    responses(
        (status = 200, description = "Session connected", body = SessionActionResponse),
        (status = 502, description = "Connection failed", body = ErrorResponse)
    ),
    tag = "Session"
)]
pub async fn connect_session(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionActionResponse>, ApiError> {
    let handle = state.session.connect().await?;
    Ok(Json(SessionActionResponse {
        success: true,
        message: format!("Connected (server version {})", handle.server_version()),
        session: state.session.health(),
    }))
}

/// Disconnect the session.
///
/// Outstanding requests fail and every subscription is dropped.
#[utoipa::path(
    post,
    path = "/api/v1/session/disconnect",
    responses(
        (status = 200, description = "Session disconnected", body = SessionActionResponse)
    ),
    tag = "Session"
)]
pub async fn disconnect_session(
    State(state): State<Arc<AppState>>,
) -> Json<SessionActionResponse> {
    let was_connected = state.session.disconnect();
    info!("Disconnect requested over HTTP");
    Json(SessionActionResponse {
        success: true,
        message: if was_connected {
            "Disconnected".to_string()
        } else {
            "Already disconnected".to_string()
        },
        session: state.session.health(),
    })
}
