//! Application state management.

use crate::broker::Connector;
use crate::config::Config;
use crate::session::SessionManager;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The one session to the trading platform.
    pub session: Arc<SessionManager>,
    /// Application configuration.
    pub config: Config,
    /// Server start time.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Creates the state and its session manager from configuration.
    ///
    /// Nothing connects until [`AppState::connect_on_startup`] or an explicit
    /// connect request.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, config: Config) -> Self {
        let session = SessionManager::new(connector, config.session_config());
        Self {
            session,
            config,
            started_at: Utc::now(),
        }
    }

    /// Connects when configured to. A failure is logged and the server keeps
    /// running so the session can be connected later.
    pub async fn connect_on_startup(&self) {
        if !self.config.broker.connect_on_startup {
            info!("Startup connect disabled, waiting for an explicit connect");
            return;
        }
        match self.session.connect().await {
            Ok(handle) => info!(
                "Connected to {}:{} (server version {})",
                self.config.broker.host,
                self.config.broker.port,
                handle.server_version()
            ),
            Err(e) => warn!(
                "Initial connection to {}:{} failed: {}",
                self.config.broker.host, self.config.broker.port, e
            ),
        }
    }

    /// Waits for `signal`, then tears the session down.
    ///
    /// Used as the server's graceful-shutdown future, so requests still in
    /// flight fail with `DISCONNECTED` instead of running out their deadlines
    /// while the server drains.
    pub async fn shutdown_after<F>(&self, signal: F)
    where
        F: Future<Output = ()>,
    {
        signal.await;
        info!("Shutdown requested, disconnecting the session");
        self.session.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{Command, ConnectionError};
    use crate::correlator::RequestError;
    use std::time::Duration;
    use crate::broker::sim::SimulatedBroker;
    use crate::session::SessionState;

    fn config(connect_on_startup: bool) -> Config {
        let mut config = Config::default();
        config.broker.connect_on_startup = connect_on_startup;
        config.heartbeat.interval_ms = 0;
        config
    }

    #[tokio::test]
    async fn test_connect_on_startup() {
        let broker = SimulatedBroker::new();
        let state = AppState::new(Arc::new(broker.clone()), config(true));

        state.connect_on_startup().await;

        assert_eq!(state.session.state(), SessionState::Connected);
        assert_eq!(broker.connect_params()[0].port, 4002);
    }

    #[tokio::test]
    async fn test_startup_connect_disabled() {
        let broker = SimulatedBroker::new();
        let state = AppState::new(Arc::new(broker.clone()), config(false));

        state.connect_on_startup().await;

        assert_eq!(state.session.state(), SessionState::Disconnected);
        assert_eq!(broker.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_startup_failure_is_not_fatal() {
        let broker = SimulatedBroker::new();
        broker.fail_next_connect(ConnectionError::Io("connection refused".to_string()));
        let state = AppState::new(Arc::new(broker), config(true));

        state.connect_on_startup().await;

        assert_eq!(state.session.state(), SessionState::Disconnected);
        assert!(state.session.health().last_error.is_some());
    }

    #[tokio::test]
    async fn test_shutdown_fails_in_flight_requests_at_once() {
        let broker = SimulatedBroker::new();
        let state = AppState::new(Arc::new(broker), config(true));
        state.connect_on_startup().await;
        let handle = state.session.handle().unwrap();

        let in_flight = tokio::spawn(async move {
            handle
                .request(
                    |req_id| Command::Executions { req_id },
                    Some(Duration::from_secs(60)),
                )
                .await
        });
        for _ in 0..200 {
            if state.session.correlator().pending_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        state.shutdown_after(std::future::ready(())).await;

        let result = tokio::time::timeout(Duration::from_secs(1), in_flight)
            .await
            .expect("request should not wait out its deadline")
            .unwrap();
        assert!(matches!(result, Err(RequestError::Disconnected(_))));
        assert_eq!(state.session.state(), SessionState::Disconnected);
    }
}
