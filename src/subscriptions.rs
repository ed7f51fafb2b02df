//! Reference-counted registry of streaming feeds.
//!
//! One platform subscription exists per [`SubscriptionKey`] no matter how
//! many subscribers share it. The platform subscribe command is sent on the
//! 0 → 1 transition and the cancel command on the 1 → 0 transition, and
//! nowhere else. Incoming ticks, bars and account values are cached as the
//! key's [`LastValue`] and republished on a broadcast channel.
//!
//! On session loss the registry is cleared without sending anything; the
//! epoch is bumped so handles issued before the clear become inert.

use crate::broker::{
    AccountValue, Bar, Command, CommandSink, Contract, TickField, TransportError,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

const UPDATE_CHANNEL_CAPACITY: usize = 1024;

/// A streaming data feed offered by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "feed", rename_all = "snake_case")]
pub enum Feed {
    /// Top-of-book market data.
    Ticker {
        /// Instrument.
        contract: Contract,
        /// Comma-separated generic tick list.
        #[serde(default)]
        generic_ticks: String,
    },
    /// 5-second bars.
    RealTimeBars {
        /// Instrument.
        contract: Contract,
        /// Data type (TRADES, MIDPOINT, BID, ASK).
        what_to_show: String,
        /// Regular trading hours only.
        use_rth: bool,
    },
    /// Account value updates.
    AccountUpdates {
        /// Account id.
        account: String,
    },
}

impl Feed {
    /// Registry key of this feed.
    ///
    /// Ticker keys ignore `generic_ticks`: one platform stream per contract.
    #[must_use]
    pub fn key(&self) -> SubscriptionKey {
        match self {
            Self::Ticker { contract, .. } => {
                SubscriptionKey(format!("ticker:{}", contract.signature()))
            }
            Self::RealTimeBars { contract, .. } => {
                SubscriptionKey(format!("bars5s:{}", contract.signature()))
            }
            Self::AccountUpdates { account } => SubscriptionKey(format!("account:{}", account)),
        }
    }

    /// Checks that the feed can be requested.
    ///
    /// # Errors
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Ticker { contract, .. } => contract.validate(),
            Self::RealTimeBars {
                contract,
                what_to_show,
                ..
            } => {
                contract.validate()?;
                match what_to_show.as_str() {
                    "TRADES" | "MIDPOINT" | "BID" | "ASK" => Ok(()),
                    other => Err(format!("Unsupported what_to_show for 5s bars: {}", other)),
                }
            }
            Self::AccountUpdates { account } => {
                if account.trim().is_empty() {
                    Err("Account must not be empty".to_string())
                } else {
                    Ok(())
                }
            }
        }
    }

    fn subscribe_command(&self, req_id: i64) -> Command {
        match self {
            Self::Ticker {
                contract,
                generic_ticks,
            } => Command::MarketData {
                req_id,
                contract: contract.clone(),
                generic_ticks: generic_ticks.clone(),
            },
            Self::RealTimeBars {
                contract,
                what_to_show,
                use_rth,
            } => Command::RealTimeBars {
                req_id,
                contract: contract.clone(),
                what_to_show: what_to_show.clone(),
                use_rth: *use_rth,
            },
            Self::AccountUpdates { account } => Command::AccountUpdates {
                req_id,
                account: account.clone(),
            },
        }
    }

    fn cancel_command(&self, req_id: i64) -> Command {
        match self {
            Self::Ticker { .. } => Command::CancelMarketData { req_id },
            Self::RealTimeBars { .. } => Command::CancelRealTimeBars { req_id },
            Self::AccountUpdates { .. } => Command::CancelAccountUpdates { req_id },
        }
    }
}

/// Identity of a shared feed, e.g. `ticker:AAPL-STK-SMART-USD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct SubscriptionKey(pub String);

impl SubscriptionKey {
    /// Key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriptionKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// One subscriber's claim on a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionHandle {
    /// Feed key.
    pub key: SubscriptionKey,
    /// Subscriber id.
    pub subscriber: String,
    /// Platform request id of the shared subscription.
    pub req_id: i64,
    /// Registry epoch the handle was issued in.
    pub epoch: u64,
}

/// Merged top-of-book state of a ticker feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TickerSnapshot {
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last: Option<f64>,
    pub bid_size: Option<f64>,
    pub ask_size: Option<f64>,
    pub last_size: Option<f64>,
    pub volume: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub open: Option<f64>,
    pub halted: Option<bool>,
}

impl TickerSnapshot {
    fn apply(&mut self, field: TickField, value: f64) {
        let slot = match field {
            TickField::Bid => &mut self.bid,
            TickField::Ask => &mut self.ask,
            TickField::Last => &mut self.last,
            TickField::BidSize => &mut self.bid_size,
            TickField::AskSize => &mut self.ask_size,
            TickField::LastSize => &mut self.last_size,
            TickField::Volume => &mut self.volume,
            TickField::High => &mut self.high,
            TickField::Low => &mut self.low,
            TickField::Close => &mut self.close,
            TickField::Open => &mut self.open,
            TickField::Halted => {
                self.halted = Some(value != 0.0);
                return;
            }
        };
        *slot = Some(value);
    }

    /// Midpoint of bid and ask when both are known.
    #[must_use]
    pub fn mid(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            _ => None,
        }
    }
}

/// Last value received on a feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LastValue {
    /// Ticker state.
    Ticker(TickerSnapshot),
    /// Latest bar.
    Bar(Bar),
    /// Account values keyed by tag (and currency when present).
    Account {
        /// Values by key.
        values: BTreeMap<String, AccountValue>,
    },
}

/// Update published to streaming clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FeedUpdate {
    /// Feed key.
    pub key: SubscriptionKey,
    /// New cached value.
    pub value: LastValue,
    /// Time the update was applied.
    pub at: DateTime<Utc>,
}

/// Read-only view of one registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionInfo {
    pub key: SubscriptionKey,
    pub feed: Feed,
    pub req_id: i64,
    pub subscribers: Vec<String>,
    pub subscriber_count: usize,
    /// False once the platform reported an error for the feed.
    pub active: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_value: Option<LastValue>,
}

/// Subscription failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SubscribeError {
    /// The subscriber already holds this key.
    #[error("{subscriber} is already subscribed to {key}")]
    Duplicate {
        key: SubscriptionKey,
        subscriber: String,
    },
    /// The feed request is malformed.
    #[error("invalid subscription: {0}")]
    Invalid(String),
    /// No such subscription for this subscriber.
    #[error("{subscriber} has no subscription to {key}")]
    Unknown {
        key: SubscriptionKey,
        subscriber: String,
    },
    /// The call came through a connection that has since been replaced.
    #[error("connection replaced (epoch {held}, now {current})")]
    Stale { held: u64, current: u64 },
    /// The subscribe command could not be sent.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

struct Entry {
    feed: Feed,
    req_id: i64,
    subscribers: BTreeSet<String>,
    active: bool,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    last: Option<LastValue>,
}

impl Entry {
    fn info(&self, key: &SubscriptionKey) -> SubscriptionInfo {
        SubscriptionInfo {
            key: key.clone(),
            feed: self.feed.clone(),
            req_id: self.req_id,
            subscribers: self.subscribers.iter().cloned().collect(),
            subscriber_count: self.subscribers.len(),
            active: self.active,
            error: self.error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_value: self.last.clone(),
        }
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<SubscriptionKey, Entry>,
    by_req: HashMap<i64, SubscriptionKey>,
    epoch: u64,
}

/// Registry of live feeds shared by request handlers and the event loop.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<Mutex<Inner>>,
    updates: broadcast::Sender<FeedUpdate>,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SubscriptionRegistry")
            .field("entries", &inner.entries.len())
            .field("epoch", &inner.epoch)
            .finish()
    }
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            updates,
        }
    }

    /// Adds `subscriber` to the feed, subscribing on the platform if it is
    /// the first one.
    ///
    /// `req_id` is used only when a new platform subscription is created.
    ///
    /// # Errors
    /// - [`SubscribeError::Invalid`] for a malformed feed.
    /// - [`SubscribeError::Duplicate`] if the subscriber already holds the key.
    ///   A feed already marked inactive by a platform error is subscribed
    ///   again instead.
    /// - [`SubscribeError::Transport`] if the subscribe command fails to send;
    ///   the registry is left unchanged.
    pub fn subscribe(
        &self,
        feed: Feed,
        subscriber: &str,
        req_id: i64,
        sink: &dyn CommandSink,
    ) -> Result<SubscriptionHandle, SubscribeError> {
        self.subscribe_checked(None, feed, subscriber, req_id, sink)
    }

    /// [`Self::subscribe`] through the sink of a connection opened at `epoch`.
    ///
    /// # Errors
    /// [`SubscribeError::Stale`] once the registry has moved past `epoch`,
    /// otherwise as [`Self::subscribe`].
    pub fn subscribe_at(
        &self,
        epoch: u64,
        feed: Feed,
        subscriber: &str,
        req_id: i64,
        sink: &dyn CommandSink,
    ) -> Result<SubscriptionHandle, SubscribeError> {
        self.subscribe_checked(Some(epoch), feed, subscriber, req_id, sink)
    }

    fn subscribe_checked(
        &self,
        expected: Option<u64>,
        feed: Feed,
        subscriber: &str,
        req_id: i64,
        sink: &dyn CommandSink,
    ) -> Result<SubscriptionHandle, SubscribeError> {
        feed.validate().map_err(SubscribeError::Invalid)?;
        let key = feed.key();

        let mut guard = self.inner.lock();
        let epoch = Self::check_epoch(&guard, expected)?;
        let inner = &mut *guard;

        if let Some(entry) = inner.entries.get_mut(&key) {
            if !entry.active {
                // A feed the platform killed is restarted, never joined.
                sink.send(&feed.subscribe_command(req_id))?;
                warn!(
                    "Restarting failed subscription {} as request {}",
                    key, req_id
                );
                inner.by_req.remove(&entry.req_id);
                inner.by_req.insert(req_id, key.clone());
                entry.req_id = req_id;
                entry.active = true;
                entry.error = None;
                entry.last = None;
                entry.subscribers.insert(subscriber.to_string());
                return Ok(SubscriptionHandle {
                    key,
                    subscriber: subscriber.to_string(),
                    req_id,
                    epoch,
                });
            }
            if !entry.subscribers.insert(subscriber.to_string()) {
                return Err(SubscribeError::Duplicate {
                    key,
                    subscriber: subscriber.to_string(),
                });
            }
            debug!(
                "{} joined {} ({} subscriber(s))",
                subscriber,
                key,
                entry.subscribers.len()
            );
            return Ok(SubscriptionHandle {
                key,
                subscriber: subscriber.to_string(),
                req_id: entry.req_id,
                epoch,
            });
        }

        sink.send(&feed.subscribe_command(req_id))?;
        info!("Subscribed {} on the platform as request {}", key, req_id);

        inner.by_req.insert(req_id, key.clone());
        inner.entries.insert(
            key.clone(),
            Entry {
                feed,
                req_id,
                subscribers: BTreeSet::from([subscriber.to_string()]),
                active: true,
                error: None,
                created_at: Utc::now(),
                updated_at: None,
                last: None,
            },
        );

        Ok(SubscriptionHandle {
            key,
            subscriber: subscriber.to_string(),
            req_id,
            epoch,
        })
    }

    /// Releases one subscriber, cancelling on the platform if it was the last.
    ///
    /// `sink` is `None` when there is no live connection; the entry is still
    /// dropped. Handles from an earlier epoch are rejected as unknown.
    ///
    /// # Errors
    /// Returns [`SubscribeError::Unknown`] if the handle does not refer to a
    /// current subscription.
    pub fn unsubscribe(
        &self,
        handle: &SubscriptionHandle,
        sink: Option<&dyn CommandSink>,
    ) -> Result<(), SubscribeError> {
        self.unsubscribe_checked(None, handle, sink)
    }

    /// [`Self::unsubscribe`] through the sink of a connection opened at
    /// `epoch`. The platform cancel is only sent while that connection is
    /// still the live one.
    ///
    /// # Errors
    /// [`SubscribeError::Stale`] once the registry has moved past `epoch`,
    /// otherwise as [`Self::unsubscribe`].
    pub fn unsubscribe_at(
        &self,
        epoch: u64,
        handle: &SubscriptionHandle,
        sink: &dyn CommandSink,
    ) -> Result<(), SubscribeError> {
        self.unsubscribe_checked(Some(epoch), handle, Some(sink))
    }

    fn unsubscribe_checked(
        &self,
        expected: Option<u64>,
        handle: &SubscriptionHandle,
        sink: Option<&dyn CommandSink>,
    ) -> Result<(), SubscribeError> {
        let unknown = || SubscribeError::Unknown {
            key: handle.key.clone(),
            subscriber: handle.subscriber.clone(),
        };

        let mut inner = self.inner.lock();
        Self::check_epoch(&inner, expected)?;
        if handle.epoch != inner.epoch {
            debug!("Ignoring stale handle for {}", handle.key);
            return Err(unknown());
        }
        let Some(entry) = inner.entries.get_mut(&handle.key) else {
            return Err(unknown());
        };
        if !entry.subscribers.remove(&handle.subscriber) {
            return Err(unknown());
        }
        if !entry.subscribers.is_empty() {
            debug!(
                "{} left {} ({} subscriber(s) remain)",
                handle.subscriber,
                handle.key,
                entry.subscribers.len()
            );
            return Ok(());
        }

        if let Some(entry) = inner.entries.remove(&handle.key) {
            inner.by_req.remove(&entry.req_id);
            Self::cancel_on_platform(&handle.key, &entry, sink);
        }
        Ok(())
    }

    fn check_epoch(inner: &Inner, expected: Option<u64>) -> Result<u64, SubscribeError> {
        match expected {
            Some(held) if held != inner.epoch => Err(SubscribeError::Stale {
                held,
                current: inner.epoch,
            }),
            _ => Ok(inner.epoch),
        }
    }

    fn cancel_on_platform(key: &SubscriptionKey, entry: &Entry, sink: Option<&dyn CommandSink>) {
        if !entry.active {
            debug!("{} already inactive, no cancel sent", key);
            return;
        }
        match sink {
            Some(sink) => match sink.send(&entry.feed.cancel_command(entry.req_id)) {
                Ok(()) => info!("Unsubscribed {} on the platform", key),
                Err(e) => warn!("Failed to cancel {}: {}", key, e),
            },
            None => debug!("No connection, dropping {} locally", key),
        }
    }

    /// Builds a handle for an existing subscription of `subscriber`.
    #[must_use]
    pub fn handle_for(&self, key: &SubscriptionKey, subscriber: &str) -> Option<SubscriptionHandle> {
        let inner = self.inner.lock();
        let entry = inner.entries.get(key)?;
        entry.subscribers.contains(subscriber).then(|| SubscriptionHandle {
            key: key.clone(),
            subscriber: subscriber.to_string(),
            req_id: entry.req_id,
            epoch: inner.epoch,
        })
    }

    /// Drops every subscription held by `subscriber`.
    ///
    /// Returns how many subscriptions were released.
    pub fn release_subscriber(&self, subscriber: &str, sink: Option<&dyn CommandSink>) -> usize {
        self.handles_of(subscriber)
            .iter()
            .filter(|handle| self.unsubscribe(handle, sink).is_ok())
            .count()
    }

    /// [`Self::release_subscriber`] through the sink of a connection opened
    /// at `epoch`.
    ///
    /// # Errors
    /// [`SubscribeError::Stale`] once the registry has moved past `epoch`;
    /// nothing is released then.
    pub fn release_subscriber_at(
        &self,
        epoch: u64,
        subscriber: &str,
        sink: &dyn CommandSink,
    ) -> Result<usize, SubscribeError> {
        let mut released = 0;
        for handle in self.handles_of(subscriber) {
            match self.unsubscribe_checked(Some(epoch), &handle, Some(sink)) {
                Ok(()) => released += 1,
                Err(e @ SubscribeError::Stale { .. }) => return Err(e),
                Err(_) => {}
            }
        }
        Ok(released)
    }

    fn handles_of(&self, subscriber: &str) -> Vec<SubscriptionHandle> {
        let inner = self.inner.lock();
        inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.subscribers.contains(subscriber))
            .map(|(key, entry)| SubscriptionHandle {
                key: key.clone(),
                subscriber: subscriber.to_string(),
                req_id: entry.req_id,
                epoch: inner.epoch,
            })
            .collect()
    }

    /// Last cached value of a feed, if any has arrived.
    #[must_use]
    pub fn snapshot(&self, key: &SubscriptionKey) -> Option<LastValue> {
        self.inner.lock().entries.get(key)?.last.clone()
    }

    /// Details of one subscription.
    #[must_use]
    pub fn info(&self, key: &SubscriptionKey) -> Option<SubscriptionInfo> {
        self.inner.lock().entries.get(key).map(|entry| entry.info(key))
    }

    /// All subscriptions, ordered by key.
    #[must_use]
    pub fn list(&self) -> Vec<SubscriptionInfo> {
        let inner = self.inner.lock();
        let mut infos: Vec<SubscriptionInfo> = inner
            .entries
            .iter()
            .map(|(key, entry)| entry.info(key))
            .collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        infos
    }

    /// Number of platform subscriptions held.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Current epoch.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.inner.lock().epoch
    }

    /// Returns whether `req_id` belongs to a subscription.
    #[must_use]
    pub fn owns(&self, req_id: i64) -> bool {
        self.inner.lock().by_req.contains_key(&req_id)
    }

    /// Receiver of every cached update.
    #[must_use]
    pub fn updates(&self) -> broadcast::Receiver<FeedUpdate> {
        self.updates.subscribe()
    }

    /// Applies a market data tick. Returns `false` for unknown ids.
    pub fn on_tick(&self, req_id: i64, field: TickField, value: f64) -> bool {
        self.update(req_id, |last| {
            let mut snapshot = match last.take() {
                Some(LastValue::Ticker(snapshot)) => snapshot,
                _ => TickerSnapshot::default(),
            };
            snapshot.apply(field, value);
            LastValue::Ticker(snapshot)
        })
    }

    /// Replaces the latest bar. Returns `false` for unknown ids.
    pub fn on_bar(&self, req_id: i64, bar: Bar) -> bool {
        self.update(req_id, |_| LastValue::Bar(bar))
    }

    /// Merges an account value. Returns `false` for unknown ids.
    pub fn on_account_value(&self, req_id: i64, value: AccountValue) -> bool {
        self.update(req_id, |last| {
            let mut values = match last.take() {
                Some(LastValue::Account { values }) => values,
                _ => BTreeMap::new(),
            };
            let key = if value.currency.is_empty() {
                value.tag.clone()
            } else {
                format!("{}/{}", value.tag, value.currency)
            };
            values.insert(key, value);
            LastValue::Account { values }
        })
    }

    fn update<F>(&self, req_id: i64, apply: F) -> bool
    where
        F: FnOnce(&mut Option<LastValue>) -> LastValue,
    {
        let update = {
            let mut inner = self.inner.lock();
            let Some(key) = inner.by_req.get(&req_id).cloned() else {
                debug!("Dropping data for unknown subscription {}", req_id);
                return false;
            };
            let Some(entry) = inner.entries.get_mut(&key) else {
                return false;
            };
            let value = apply(&mut entry.last);
            let at = Utc::now();
            entry.last = Some(value.clone());
            entry.updated_at = Some(at);
            FeedUpdate { key, value, at }
        };
        // No receivers is fine.
        let _ = self.updates.send(update);
        true
    }

    /// Marks the subscription for `req_id` inactive after a platform error.
    ///
    /// Returns `false` if `req_id` is not a subscription.
    pub fn on_error(&self, req_id: i64, code: i32, message: &str) -> bool {
        let mut inner = self.inner.lock();
        let Some(key) = inner.by_req.get(&req_id).cloned() else {
            return false;
        };
        if let Some(entry) = inner.entries.get_mut(&key) {
            warn!("Subscription {} failed ({}): {}", key, code, message);
            entry.active = false;
            entry.error = Some(format!("{}: {}", code, message));
        }
        true
    }

    /// Drops every subscription without contacting the platform.
    ///
    /// Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.entries.len();
        inner.entries.clear();
        inner.by_req.clear();
        inner.epoch += 1;
        if count > 0 {
            info!("Discarded {} subscription(s) after session loss", count);
        }
        count
    }
}
