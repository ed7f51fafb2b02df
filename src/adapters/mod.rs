//! Domain Adapters.
//!
//! Each adapter turns one functional area's requests into session calls
//! and shapes the platform's payloads into response models. Adapters hold
//! no state: every call borrows the [`SessionManager`], obtains a handle
//! (failing fast when not connected) and returns.
//!
//! | Adapter | Area |
//! |---------|------|
//! | [`account`] | managed accounts, values, positions, portfolio, account updates |
//! | [`trading`] | contract qualification, order placement and cancellation, order and execution lists |
//! | [`market_data`] | historical bars, ticker and 5-second bar streams, snapshots |
//! | [`research`] | contract details, fundamentals, news, market scanner |

pub mod account;
pub mod market_data;
pub mod research;
pub mod trading;

use crate::broker::Payload;
use crate::correlator::{Reply, RequestError};
use crate::session::{NotConnectedError, SessionHandle, SessionManager};
use crate::subscriptions::SubscribeError;
use std::time::Duration;
use thiserror::Error;

/// Failure of an adapter operation.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// No live session.
    #[error(transparent)]
    NotConnected(#[from] NotConnectedError),
    /// A platform request failed.
    #[error(transparent)]
    Request(#[from] RequestError),
    /// A subscription could not be created or released.
    #[error(transparent)]
    Subscribe(#[from] SubscribeError),
    /// The request is malformed.
    #[error("{0}")]
    Invalid(String),
    /// The platform has no such data.
    #[error("{0}")]
    NotFound(String),
}

/// Result alias for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

pub(crate) fn connected(session: &SessionManager) -> AdapterResult<SessionHandle> {
    Ok(session.with_connection(SessionHandle::clone)?)
}

pub(crate) fn deadline(timeout_ms: Option<u64>) -> Option<Duration> {
    timeout_ms.map(Duration::from_millis)
}

/// Keeps the payloads `pick` accepts, in delivery order.
pub(crate) fn collect<T, F>(reply: Reply, pick: F) -> Vec<T>
where
    F: FnMut(Payload) -> Option<T>,
{
    reply.into_iter().filter_map(pick).collect()
}

/// Explicit account, or the first managed one.
pub(crate) fn resolve_account(
    handle: &SessionHandle,
    account: Option<String>,
) -> AdapterResult<String> {
    match account.filter(|a| !a.trim().is_empty()) {
        Some(account) => Ok(account),
        None => handle
            .managed_accounts()
            .first()
            .cloned()
            .ok_or_else(|| AdapterError::NotFound("No accounts found".to_string())),
    }
}

pub(crate) fn subscriber_or_new(subscriber: Option<String>) -> String {
    subscriber
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::broker::sim::SimulatedBroker;
    use crate::session::{RequestTimeouts, SessionConfig, SessionManager};
    use std::sync::Arc;
    use std::time::Duration;

    /// Session connected to a fresh simulated broker.
    pub(crate) async fn connected_session() -> (SimulatedBroker, Arc<SessionManager>) {
        let broker = SimulatedBroker::new();
        let config = SessionConfig {
            heartbeat: None,
            timeouts: RequestTimeouts {
                default: Duration::from_millis(300),
                historical: Duration::from_millis(300),
                order_ack: Duration::from_millis(300),
            },
            ..SessionConfig::default()
        };
        let session = SessionManager::new(Arc::new(broker.clone()), config);
        session.connect().await.unwrap();
        (broker, session)
    }
}
