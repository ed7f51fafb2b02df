//! Periodic liveness probe on a connected session.

use super::{SessionHandle, SessionManager};
use crate::broker::Command;
use crate::correlator::RequestError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Heartbeat parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Time between probes.
    pub interval: Duration,
    /// Deadline for each probe.
    pub timeout: Duration,
}

/// Sends a current-time request every `interval`; a probe timeout degrades
/// the session of generation `generation`.
pub(super) async fn run(
    manager: Arc<SessionManager>,
    handle: SessionHandle,
    generation: u64,
    config: HeartbeatConfig,
) {
    let mut ticker = tokio::time::interval(config.interval);
    // First tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let probe = handle
            .request(|req_id| Command::CurrentTime { req_id }, Some(config.timeout))
            .await;
        match probe {
            Ok(_) => debug!("Heartbeat ok"),
            Err(RequestError::Timeout { after, .. }) => {
                warn!("Heartbeat got no answer within {:?}", after);
                manager.on_transport_lost(generation, "heartbeat timed out");
                return;
            }
            Err(RequestError::Disconnected(_) | RequestError::Transport(_)) => return,
            Err(e) => debug!("Heartbeat answered with error: {}", e),
        }
    }
}
