//! Session Manager: owns the one connection to the trading platform.
//!
//! ```text
//!  Disconnected ──connect ok──▶ Connected ──transport loss / heartbeat──▶ Degraded
//!       ▲                          ▲                                         │
//!       │                          └───────────── reconnect ok ──────────────┤
//!       └──────────── explicit disconnect / retries exhausted ───────────────┘
//! ```
//!
//! Every connection gets a generation number. Background tasks (event loop,
//! heartbeat, reconnect) carry the generation they were started for and
//! stop acting as soon as it is no longer current, so a stale task can never
//! tear down a newer connection.

mod dispatch;
pub mod heartbeat;
pub mod reconnect;

#[cfg(test)]
mod tests;

use crate::broker::{
    BrokerEvent, BrokerLink, Command, CommandSink, ConnectParams, ConnectionError, Connector,
    Contract, OrderSpec, OrderStatus, Payload,
};
use crate::correlator::{CorrelationKey, Correlator, Reply, RequestError};
use crate::subscriptions::{
    Feed, LastValue, SubscribeError, SubscriptionHandle, SubscriptionKey, SubscriptionRegistry,
};
use chrono::{DateTime, Utc};
use dispatch::Flow;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use utoipa::ToSchema;

pub use heartbeat::HeartbeatConfig;
pub use reconnect::{ReconnectConfig, ReconnectPolicy};

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    /// Connection lost; reconnecting.
    Degraded,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Degraded => "degraded",
        };
        f.write_str(name)
    }
}

/// The session is not usable right now.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("session is {state}")]
pub struct NotConnectedError {
    /// State at the time of the call.
    pub state: SessionState,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SessionStatus {
    pub state: SessionState,
    pub host: String,
    pub port: u16,
    pub client_id: i32,
    pub read_only: bool,
    pub server_version: Option<i32>,
    pub connected_since: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Attempts made by the current or last reconnect cycle.
    pub reconnect_attempts: u32,
    pub pending_requests: usize,
    pub active_subscriptions: usize,
}

/// Deadlines used by request helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTimeouts {
    pub default: Duration,
    pub historical: Duration,
    pub order_ack: Duration,
}

impl Default for RequestTimeouts {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(10),
            historical: Duration::from_secs(60),
            order_ack: Duration::from_secs(10),
        }
    }
}

/// Everything the session needs to connect and stay connected.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub params: ConnectParams,
    pub connect_timeout: Duration,
    pub timeouts: RequestTimeouts,
    /// `None` disables the heartbeat.
    pub heartbeat: Option<HeartbeatConfig>,
    pub reconnect: ReconnectConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            params: ConnectParams {
                host: "127.0.0.1".to_string(),
                port: 4002,
                client_id: 1,
                read_only: false,
            },
            connect_timeout: Duration::from_secs(5),
            timeouts: RequestTimeouts::default(),
            heartbeat: Some(HeartbeatConfig {
                interval: Duration::from_secs(30),
                timeout: Duration::from_secs(5),
            }),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Live connection shared by all handles of one generation.
struct Link {
    commands: Arc<dyn CommandSink>,
    server_version: i32,
    managed_accounts: Vec<String>,
}

/// Access to a connected session.
///
/// Cheap to clone. A handle outlives its connection harmlessly: once the
/// connection is gone every call fails instead of blocking.
#[derive(Clone)]
pub struct SessionHandle {
    link: Arc<Link>,
    /// Registry epoch this connection was opened in.
    epoch: u64,
    ids: Arc<AtomicI64>,
    correlator: Correlator,
    registry: SubscriptionRegistry,
    timeouts: RequestTimeouts,
    read_only: bool,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("server_version", &self.link.server_version)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    /// Allocates a fresh id for a request, order or subscription.
    #[must_use]
    pub fn next_id(&self) -> i64 {
        self.ids.fetch_add(1, Ordering::SeqCst)
    }

    /// Issues the command built for a fresh request id and waits for its
    /// complete reply.
    ///
    /// # Errors
    /// Any [`RequestError`].
    pub async fn request<F>(&self, build: F, timeout: Option<Duration>) -> Result<Reply, RequestError>
    where
        F: FnOnce(i64) -> Command,
    {
        let req_id = self.next_id();
        let command = build(req_id);
        self.correlator
            .issue(
                CorrelationKey::Request(req_id),
                &command,
                self.link.commands.as_ref(),
                timeout,
            )
            .await
    }

    /// Submits an order and waits for its first status.
    ///
    /// The order id is registered before the command leaves, so a status
    /// that arrives before the send returns is still matched. Orders are
    /// never resubmitted.
    ///
    /// # Errors
    /// [`RequestError::ReadOnly`] on a read-only session, or any failure of
    /// the submission.
    pub async fn place_order(
        &self,
        contract: Contract,
        order: OrderSpec,
        timeout: Option<Duration>,
    ) -> Result<OrderStatus, RequestError> {
        if self.read_only {
            return Err(RequestError::ReadOnly);
        }
        let order_id = self.next_id();
        let command = Command::PlaceOrder {
            order_id,
            contract,
            order,
        };
        let reply = self
            .correlator
            .issue(
                CorrelationKey::Order(order_id),
                &command,
                self.link.commands.as_ref(),
                Some(timeout.unwrap_or(self.timeouts.order_ack)),
            )
            .await?;
        info!("Order {} acknowledged", order_id);
        first_status(order_id, reply)
    }

    /// Requests cancellation and waits for the next status of the order.
    ///
    /// # Errors
    /// [`RequestError::ReadOnly`], [`RequestError::KeyInUse`] while the
    /// placement itself is unacknowledged, or the platform's rejection.
    pub async fn cancel_order(
        &self,
        order_id: i64,
        timeout: Option<Duration>,
    ) -> Result<OrderStatus, RequestError> {
        if self.read_only {
            return Err(RequestError::ReadOnly);
        }
        let reply = self
            .correlator
            .issue(
                CorrelationKey::Order(order_id),
                &Command::CancelOrder { order_id },
                self.link.commands.as_ref(),
                Some(timeout.unwrap_or(self.timeouts.order_ack)),
            )
            .await?;
        first_status(order_id, reply)
    }

    /// Joins or creates the shared subscription for `feed`.
    ///
    /// # Errors
    /// Any [`SubscribeError`].
    pub fn subscribe(
        &self,
        feed: Feed,
        subscriber: &str,
    ) -> Result<SubscriptionHandle, SubscribeError> {
        let req_id = self.next_id();
        self.registry.subscribe_at(
            self.epoch,
            feed,
            subscriber,
            req_id,
            self.link.commands.as_ref(),
        )
    }

    /// Releases a subscription.
    ///
    /// # Errors
    /// [`SubscribeError::Unknown`] for a subscription that is not current,
    /// [`SubscribeError::Stale`] once this handle's connection is gone.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), SubscribeError> {
        self.registry
            .unsubscribe_at(self.epoch, handle, self.link.commands.as_ref())
    }

    /// Drops everything held by `subscriber`.
    ///
    /// # Errors
    /// [`SubscribeError::Stale`] once this handle's connection is gone.
    pub fn release_subscriber(&self, subscriber: &str) -> Result<usize, SubscribeError> {
        self.registry
            .release_subscriber_at(self.epoch, subscriber, self.link.commands.as_ref())
    }

    /// Cached value of a feed.
    #[must_use]
    pub fn snapshot(&self, key: &SubscriptionKey) -> Option<LastValue> {
        self.registry.snapshot(key)
    }

    #[must_use]
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Accounts reported at handshake.
    #[must_use]
    pub fn managed_accounts(&self) -> &[String] {
        &self.link.managed_accounts
    }

    #[must_use]
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    #[must_use]
    pub fn server_version(&self) -> i32 {
        self.link.server_version
    }

    #[must_use]
    pub fn timeouts(&self) -> RequestTimeouts {
        self.timeouts
    }
}

fn first_status(order_id: i64, reply: Reply) -> Result<OrderStatus, RequestError> {
    reply
        .into_iter()
        .find_map(|payload| match payload {
            Payload::OrderStatus(status) => Some(status),
            _ => None,
        })
        .ok_or_else(|| {
            RequestError::Disconnected(format!("order {} resolved without a status", order_id))
        })
}

struct SessionInner {
    state: SessionState,
    handle: Option<SessionHandle>,
    generation: u64,
    tasks: Vec<JoinHandle<()>>,
    last_error: Option<String>,
    connected_since: Option<DateTime<Utc>>,
    server_version: Option<i32>,
    reconnect_attempts: u32,
}

/// Owner of the single platform session.
pub struct SessionManager {
    connector: Arc<dyn Connector>,
    config: SessionConfig,
    correlator: Correlator,
    registry: SubscriptionRegistry,
    ids: Arc<AtomicI64>,
    inner: Mutex<SessionInner>,
    connect_lock: tokio::sync::Mutex<()>,
    state_tx: watch::Sender<SessionState>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Creates a disconnected session.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, config: SessionConfig) -> Arc<Self> {
        let correlator = Correlator::new(config.timeouts.default);
        correlator.cancel_all("session not connected");
        let (state_tx, _) = watch::channel(SessionState::Disconnected);

        Arc::new(Self {
            connector,
            config,
            correlator,
            registry: SubscriptionRegistry::new(),
            ids: Arc::new(AtomicI64::new(1)),
            inner: Mutex::new(SessionInner {
                state: SessionState::Disconnected,
                handle: None,
                generation: 0,
                tasks: Vec::new(),
                last_error: None,
                connected_since: None,
                server_version: None,
                reconnect_attempts: 0,
            }),
            connect_lock: tokio::sync::Mutex::new(()),
            state_tx,
        })
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    #[must_use]
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Connects, or returns the live handle if already connected.
    ///
    /// Calling this while degraded stops the reconnect cycle and makes one
    /// immediate attempt instead.
    ///
    /// # Errors
    /// [`ConnectionError`] on timeout, rejection or duplicate client id. The
    /// session is left disconnected with the error recorded.
    pub async fn connect(self: &Arc<Self>) -> Result<SessionHandle, ConnectionError> {
        let _guard = self.connect_lock.lock().await;

        let (generation, stale) = {
            let mut inner = self.inner.lock();
            if let (SessionState::Connected, Some(handle)) = (inner.state, inner.handle.as_ref()) {
                return Ok(handle.clone());
            }
            inner.generation += 1;
            inner.state = SessionState::Connecting;
            inner.reconnect_attempts = 0;
            (inner.generation, std::mem::take(&mut inner.tasks))
        };
        for task in stale {
            task.abort();
        }
        self.state_tx.send_replace(SessionState::Connecting);
        info!(
            "Connecting to {}:{} as client {}",
            self.config.params.host, self.config.params.port, self.config.params.client_id
        );

        match self.establish(generation).await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                error!("Connect failed: {}", e);
                let mut inner = self.inner.lock();
                if inner.generation == generation {
                    inner.state = SessionState::Disconnected;
                    inner.last_error = Some(e.to_string());
                    drop(inner);
                    self.state_tx.send_replace(SessionState::Disconnected);
                }
                Err(e)
            }
        }
    }

    /// Performs one connection attempt for `generation` and installs it.
    async fn establish(self: &Arc<Self>, generation: u64) -> Result<SessionHandle, ConnectionError> {
        let timeout = self.config.connect_timeout;
        let link = tokio::time::timeout(timeout, self.connector.connect(&self.config.params))
            .await
            .map_err(|_| ConnectionError::Timeout(timeout))??;
        let BrokerLink {
            handshake,
            commands,
            events,
        } = link;

        self.ids.fetch_max(handshake.next_order_id, Ordering::SeqCst);
        let link = Arc::new(Link {
            commands: Arc::clone(&commands),
            server_version: handshake.server_version,
            managed_accounts: handshake.managed_accounts.clone(),
        });

        let handle = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                drop(inner);
                commands.close();
                return Err(ConnectionError::Protocol(
                    "connect superseded by a newer session request".to_string(),
                ));
            }

            // Teardown clears the registry under this lock, so the epoch
            // read here belongs to this connection alone.
            let handle = SessionHandle {
                link,
                epoch: self.registry.epoch(),
                ids: Arc::clone(&self.ids),
                correlator: self.correlator.clone(),
                registry: self.registry.clone(),
                timeouts: self.config.timeouts,
                read_only: self.config.params.read_only,
            };

            self.correlator.reopen();
            let mut tasks = vec![tokio::spawn(
                Arc::clone(self).run_events(generation, events),
            )];
            if let Some(config) = self.config.heartbeat {
                tasks.push(tokio::spawn(heartbeat::run(
                    Arc::clone(self),
                    handle.clone(),
                    generation,
                    config,
                )));
            }

            inner.state = SessionState::Connected;
            inner.handle = Some(handle.clone());
            inner.tasks = tasks;
            inner.last_error = None;
            inner.connected_since = Some(Utc::now());
            inner.server_version = Some(handshake.server_version);
            handle
        };
        self.state_tx.send_replace(SessionState::Connected);
        info!(
            "Session connected (server version {}, accounts {:?})",
            handshake.server_version, handshake.managed_accounts
        );
        Ok(handle)
    }

    async fn run_events(
        self: Arc<Self>,
        generation: u64,
        mut events: mpsc::UnboundedReceiver<BrokerEvent>,
    ) {
        let reason = loop {
            match events.recv().await {
                Some(event) => {
                    if let Flow::Closed(reason) =
                        dispatch::dispatch(event, &self.correlator, &self.registry)
                    {
                        break reason;
                    }
                }
                None => break "event stream ended".to_string(),
            }
        };
        self.on_transport_lost(generation, &reason);
    }

    /// Moves a connected session of `generation` to Degraded and starts
    /// reconnecting. Stale generations are ignored.
    fn on_transport_lost(self: &Arc<Self>, generation: u64, reason: &str) {
        let (tasks, next_generation) = {
            let mut inner = self.inner.lock();
            if inner.generation != generation || inner.state != SessionState::Connected {
                return;
            }
            inner.generation += 1;
            inner.state = SessionState::Degraded;
            inner.last_error = Some(reason.to_string());
            inner.connected_since = None;
            inner.reconnect_attempts = 0;
            let handle = inner.handle.take();
            self.tear_down(handle.as_ref(), &format!("connection lost: {}", reason));
            (std::mem::take(&mut inner.tasks), inner.generation)
        };

        warn!("Connection lost: {}", reason);
        // May include the calling task; it is about to return anyway.
        for task in tasks {
            task.abort();
        }
        self.state_tx.send_replace(SessionState::Degraded);

        let task = tokio::spawn(Arc::clone(self).reconnect(next_generation, reason.to_string()));
        let mut inner = self.inner.lock();
        if inner.generation == next_generation {
            inner.tasks.push(task);
        } else {
            task.abort();
        }
    }

    async fn reconnect(self: Arc<Self>, generation: u64, mut last_error: String) {
        let mut policy = ReconnectPolicy::new(self.config.reconnect);

        while let Some(delay) = policy.next_backoff() {
            let attempt = policy.current_attempt();
            {
                let mut inner = self.inner.lock();
                if inner.generation != generation {
                    return;
                }
                inner.reconnect_attempts = attempt;
            }
            tokio::time::sleep(delay).await;

            let _guard = self.connect_lock.lock().await;
            if !self.is_current(generation, SessionState::Degraded) {
                return;
            }
            info!(
                "Reconnect attempt {}/{}",
                attempt,
                policy.max_attempts()
            );
            match self.establish(generation).await {
                Ok(_) => {
                    info!("Reconnected after {} attempt(s)", attempt);
                    return;
                }
                Err(e @ ConnectionError::Rejected { .. }) => {
                    last_error = e.to_string();
                    error!("Reconnect rejected by the platform: {}", e);
                    break;
                }
                Err(e) => {
                    warn!("Reconnect attempt {} failed: {}", attempt, e);
                    last_error = e.to_string();
                }
            }
        }

        let mut inner = self.inner.lock();
        if inner.generation != generation || inner.state != SessionState::Degraded {
            return;
        }
        let failure = ConnectionError::Exhausted {
            attempts: policy.current_attempt(),
            last_error,
        };
        error!("Giving up on the session: {}", failure);
        inner.state = SessionState::Disconnected;
        inner.last_error = Some(failure.to_string());
        // The reconnect task is the only entry left in `tasks`.
        inner.tasks.clear();
        drop(inner);
        self.state_tx.send_replace(SessionState::Disconnected);
    }

    /// Closes the link, then fails every pending request and drops every
    /// subscription. Runs with `inner` locked: by the time the new state is
    /// observable, no command can leave through the old link.
    fn tear_down(&self, handle: Option<&SessionHandle>, reason: &str) {
        if let Some(handle) = handle {
            handle.link.commands.close();
        }
        self.correlator.cancel_all(reason);
        self.registry.clear();
    }

    fn is_current(&self, generation: u64, state: SessionState) -> bool {
        let inner = self.inner.lock();
        inner.generation == generation && inner.state == state
    }

    /// Tears the session down.
    ///
    /// Pending requests fail with `Disconnected`, subscriptions are dropped
    /// and any reconnect cycle stops. Returns whether anything was torn down.
    pub fn disconnect(&self) -> bool {
        let (was, tasks) = {
            let mut inner = self.inner.lock();
            let was = inner.state != SessionState::Disconnected;
            inner.generation += 1;
            inner.state = SessionState::Disconnected;
            inner.connected_since = None;
            inner.reconnect_attempts = 0;
            let handle = inner.handle.take();
            self.tear_down(handle.as_ref(), "session disconnected");
            (was, std::mem::take(&mut inner.tasks))
        };

        for task in tasks {
            task.abort();
        }
        self.state_tx.send_replace(SessionState::Disconnected);
        if was {
            info!("Session disconnected");
        }
        was
    }

    /// Current state without blocking.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Full status snapshot.
    #[must_use]
    pub fn health(&self) -> SessionStatus {
        let inner = self.inner.lock();
        let params = &self.config.params;
        SessionStatus {
            state: inner.state,
            host: params.host.clone(),
            port: params.port,
            client_id: params.client_id,
            read_only: params.read_only,
            server_version: inner.server_version,
            connected_since: inner.connected_since,
            last_error: inner.last_error.clone(),
            reconnect_attempts: inner.reconnect_attempts,
            pending_requests: self.correlator.pending_count(),
            active_subscriptions: self.registry.active_count(),
        }
    }

    /// Receiver of state transitions.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Live handle, failing fast unless connected.
    ///
    /// # Errors
    /// [`NotConnectedError`] in any state other than Connected.
    pub fn handle(&self) -> Result<SessionHandle, NotConnectedError> {
        let inner = self.inner.lock();
        match (inner.state, inner.handle.as_ref()) {
            (SessionState::Connected, Some(handle)) => Ok(handle.clone()),
            (state, _) => Err(NotConnectedError { state }),
        }
    }

    /// Runs `f` with the live handle.
    ///
    /// # Errors
    /// [`NotConnectedError`] without calling `f` when not connected.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T, NotConnectedError>
    where
        F: FnOnce(&SessionHandle) -> T,
    {
        let handle = self.handle()?;
        Ok(f(&handle))
    }
}
