//! Request correlation between outbound commands and inbound events.
//!
//! Every command that expects an answer registers a pending entry under a
//! [`CorrelationKey`] *before* it is sent, so an event that races ahead of
//! the sender still finds its entry. Each entry is resolved exactly once, by
//! whichever comes first: the matching event, a failure, the deadline, or a
//! session-wide cancellation. Anything that arrives for a key with no entry
//! is a late or duplicate delivery and is dropped with a debug log.
//!
//! The table lock is only held for O(1) map updates; no lock is held while
//! a caller awaits its reply.

use crate::broker::{Command, CommandSink, Payload, TransportError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info};

/// Complete reply to a request: every item delivered before its end marker.
pub type Reply = Vec<Payload>;

/// Identity linking a command to its asynchronous answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorrelationKey {
    /// Locally allocated request id.
    Request(i64),
    /// Client-assigned order id.
    Order(i64),
}

impl std::fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request(id) => write!(f, "request {}", id),
            Self::Order(id) => write!(f, "order {}", id),
        }
    }
}

/// Failure of a single request.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RequestError {
    /// The platform rejected or errored the command.
    #[error("platform error {code}: {message}")]
    Rejected {
        /// Platform error code.
        code: i32,
        /// Platform error text.
        message: String,
    },
    /// No matching event arrived before the deadline.
    #[error("no response for {key} within {after:?}")]
    Timeout {
        /// Key that timed out.
        key: CorrelationKey,
        /// Deadline that elapsed.
        after: Duration,
    },
    /// The session went away while the request was outstanding.
    #[error("request aborted: {0}")]
    Disconnected(String),
    /// The command could not be handed to the transport.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// Another request with the same key is still outstanding.
    #[error("{0} already has a request in flight")]
    KeyInUse(CorrelationKey),
    /// The session does not allow trading commands.
    #[error("session is read-only")]
    ReadOnly,
}

/// Outcome of a resolution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A pending entry existed and was updated or fulfilled.
    Delivered,
    /// No pending entry: late or duplicate delivery, dropped.
    Unmatched,
}

type ReplySender = oneshot::Sender<Result<Reply, RequestError>>;

struct Pending {
    token: u64,
    tx: ReplySender,
    parts: Vec<Payload>,
    created_at: Instant,
}

struct Table {
    entries: HashMap<CorrelationKey, Pending>,
    accepting: bool,
    closed_reason: String,
    next_token: u64,
}

/// Pending-request table shared by request handlers and the event loop.
#[derive(Clone)]
pub struct Correlator {
    table: Arc<Mutex<Table>>,
    default_timeout: Duration,
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("pending", &self.pending_count())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl Correlator {
    /// Creates an open correlator.
    #[must_use]
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            table: Arc::new(Mutex::new(Table {
                entries: HashMap::new(),
                accepting: true,
                closed_reason: String::new(),
                next_token: 0,
            })),
            default_timeout,
        }
    }

    /// Deadline applied when the caller does not specify one.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Registers a pending entry without sending anything.
    ///
    /// # Errors
    /// - [`RequestError::Disconnected`] while the correlator is closed.
    /// - [`RequestError::KeyInUse`] if `key` already has an entry.
    pub fn register(
        &self,
        key: CorrelationKey,
        timeout: Option<Duration>,
    ) -> Result<Waiter, RequestError> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let (tx, rx) = oneshot::channel();

        let mut table = self.table.lock();
        if !table.accepting {
            return Err(RequestError::Disconnected(table.closed_reason.clone()));
        }
        if table.entries.contains_key(&key) {
            return Err(RequestError::KeyInUse(key));
        }
        table.next_token += 1;
        let token = table.next_token;
        let now = Instant::now();
        table.entries.insert(
            key,
            Pending {
                token,
                tx,
                parts: Vec::new(),
                created_at: now,
            },
        );
        drop(table);

        Ok(Waiter {
            key,
            token,
            rx,
            deadline: now + timeout,
            timeout,
            correlator: self.clone(),
            settled: false,
        })
    }

    /// Registers `key`, sends `command`, and waits for the reply.
    ///
    /// # Errors
    /// Any [`RequestError`]; a failed send removes the entry again.
    pub async fn issue(
        &self,
        key: CorrelationKey,
        command: &Command,
        sink: &dyn CommandSink,
        timeout: Option<Duration>,
    ) -> Result<Reply, RequestError> {
        let waiter = self.register(key, timeout)?;
        sink.send(command)?;
        debug!("Issued {} as {}", command.name(), key);
        waiter.wait().await
    }

    /// Adds one part to a multi-part reply.
    pub fn append(&self, key: CorrelationKey, payload: Payload) -> Resolution {
        let mut table = self.table.lock();
        match table.entries.get_mut(&key) {
            Some(pending) => {
                pending.parts.push(payload);
                Resolution::Delivered
            }
            None => {
                debug!("Dropping late or duplicate item for {}", key);
                Resolution::Unmatched
            }
        }
    }

    /// Completes a multi-part reply with everything appended so far.
    pub fn finish(&self, key: CorrelationKey) -> Resolution {
        let pending = self.table.lock().entries.remove(&key);
        match pending {
            Some(pending) => {
                let Pending { tx, parts, created_at, .. } = pending;
                debug!(
                    "Resolved {} with {} item(s) after {:?}",
                    key,
                    parts.len(),
                    created_at.elapsed()
                );
                let _ = tx.send(Ok(parts));
                Resolution::Delivered
            }
            None => {
                debug!("Dropping late or duplicate end marker for {}", key);
                Resolution::Unmatched
            }
        }
    }

    /// Fulfills the entry for `key` with `reply`.
    ///
    /// A second resolution for the same key is a no-op.
    pub fn resolve(&self, key: CorrelationKey, reply: Reply) -> Resolution {
        self.settle(key, Ok(reply))
    }

    /// Fails the entry for `key`.
    pub fn fail(&self, key: CorrelationKey, error: RequestError) -> Resolution {
        self.settle(key, Err(error))
    }

    fn settle(&self, key: CorrelationKey, result: Result<Reply, RequestError>) -> Resolution {
        let pending = self.table.lock().entries.remove(&key);
        match pending {
            Some(pending) => {
                let _ = pending.tx.send(result);
                Resolution::Delivered
            }
            None => {
                debug!("Dropping late or duplicate resolution for {}", key);
                Resolution::Unmatched
            }
        }
    }

    /// Fails every outstanding entry and refuses new ones until [`Self::reopen`].
    ///
    /// Returns the number of entries cancelled.
    pub fn cancel_all(&self, reason: &str) -> usize {
        let drained: Vec<(CorrelationKey, Pending)> = {
            let mut table = self.table.lock();
            table.accepting = false;
            table.closed_reason = reason.to_string();
            table.entries.drain().collect()
        };

        let count = drained.len();
        for (_, pending) in drained {
            let _ = pending
                .tx
                .send(Err(RequestError::Disconnected(reason.to_string())));
        }
        if count > 0 {
            info!("Cancelled {} pending request(s): {}", count, reason);
        }
        count
    }

    /// Accepts new registrations again.
    pub fn reopen(&self) {
        let mut table = self.table.lock();
        table.accepting = true;
        table.closed_reason.clear();
    }

    /// Returns whether new registrations are accepted.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.table.lock().accepting
    }

    /// Number of outstanding entries.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.table.lock().entries.len()
    }

    /// Returns whether `key` has an outstanding entry.
    #[must_use]
    pub fn is_pending(&self, key: CorrelationKey) -> bool {
        self.table.lock().entries.contains_key(&key)
    }

    /// Removes the entry for `key` if it still belongs to `token`.
    fn discard(&self, key: CorrelationKey, token: u64) -> bool {
        let mut table = self.table.lock();
        match table.entries.get(&key) {
            Some(pending) if pending.token == token => {
                table.entries.remove(&key);
                true
            }
            _ => false,
        }
    }
}

/// Caller side of a pending entry.
///
/// Dropping a waiter before it settles removes its entry.
pub struct Waiter {
    key: CorrelationKey,
    token: u64,
    rx: oneshot::Receiver<Result<Reply, RequestError>>,
    deadline: Instant,
    timeout: Duration,
    correlator: Correlator,
    settled: bool,
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter")
            .field("key", &self.key)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Waiter {
    /// Key this waiter is registered under.
    #[must_use]
    pub fn key(&self) -> CorrelationKey {
        self.key
    }

    /// Waits for the reply or the deadline.
    ///
    /// # Errors
    /// [`RequestError::Timeout`] once the deadline passes; otherwise the
    /// failure the entry was resolved with.
    pub async fn wait(mut self) -> Result<Reply, RequestError> {
        let outcome = tokio::time::timeout_at(self.deadline, &mut self.rx).await;
        self.settled = true;
        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RequestError::Disconnected(
                "pending request dropped".to_string(),
            )),
            Err(_) => {
                self.correlator.discard(self.key, self.token);
                debug!("{} timed out after {:?}", self.key, self.timeout);
                Err(RequestError::Timeout {
                    key: self.key,
                    after: self.timeout,
                })
            }
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if !self.settled {
            self.correlator.discard(self.key, self.token);
        }
    }
}
