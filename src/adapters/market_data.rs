//! Market data adapter: historical bars and shared streaming feeds.

use super::{AdapterError, AdapterResult, collect, connected, deadline, subscriber_or_new};
use crate::broker::{Command, Payload};
use crate::models::{
    BarsResponse, HistoricalBarsRequest, RealTimeBarsSubscribeRequest, SnapshotResponse,
    SubscribeResponse, SubscriptionsResponse, TickerSubscribeRequest, UnsubscribeResponse,
};
use crate::session::{SessionHandle, SessionManager};
use crate::subscriptions::{Feed, SubscriptionKey};
use tracing::info;

/// Historical bars for a contract.
pub async fn historical_bars(
    session: &SessionManager,
    request: HistoricalBarsRequest,
) -> AdapterResult<BarsResponse> {
    let handle = connected(session)?;
    request.contract.validate().map_err(AdapterError::Invalid)?;

    let symbol = request.contract.symbol.clone();
    let timeout = deadline(request.timeout_ms).or(Some(handle.timeouts().historical));
    let reply = handle
        .request(
            |req_id| Command::HistoricalData {
                req_id,
                contract: request.contract,
                end_date_time: request.end_datetime.unwrap_or_default(),
                duration: request.duration,
                bar_size: request.bar_size,
                what_to_show: request.what_to_show,
                use_rth: request.use_rth,
            },
            timeout,
        )
        .await?;

    let bars = collect(reply, |payload| match payload {
        Payload::Bar(bar) => Some(bar),
        _ => None,
    });
    info!("Received {} bars for {}", bars.len(), symbol);
    Ok(BarsResponse {
        count: bars.len(),
        bars,
    })
}

fn subscribe(
    handle: &SessionHandle,
    feed: Feed,
    subscriber: Option<String>,
) -> AdapterResult<SubscribeResponse> {
    let subscriber = subscriber_or_new(subscriber);
    let subscription = handle.subscribe(feed, &subscriber)?;
    let info = handle.registry().info(&subscription.key);
    Ok(SubscribeResponse {
        subscriber_count: info.as_ref().map_or(1, |i| i.subscriber_count),
        snapshot: info.and_then(|i| i.last_value),
        handle: subscription,
    })
}

/// Starts or joins a ticker stream.
pub fn subscribe_ticker(
    session: &SessionManager,
    request: TickerSubscribeRequest,
) -> AdapterResult<SubscribeResponse> {
    let handle = connected(session)?;
    let feed = Feed::Ticker {
        contract: request.contract,
        generic_ticks: request.generic_ticks,
    };
    subscribe(&handle, feed, request.subscriber)
}

/// Starts or joins a 5-second bar stream.
pub fn subscribe_realtime_bars(
    session: &SessionManager,
    request: RealTimeBarsSubscribeRequest,
) -> AdapterResult<SubscribeResponse> {
    let handle = connected(session)?;
    let feed = Feed::RealTimeBars {
        contract: request.contract,
        what_to_show: request.what_to_show,
        use_rth: request.use_rth,
    };
    subscribe(&handle, feed, request.subscriber)
}

/// Every live subscription.
pub fn list_subscriptions(session: &SessionManager) -> AdapterResult<SubscriptionsResponse> {
    let handle = connected(session)?;
    let subscriptions = handle.registry().list();
    Ok(SubscriptionsResponse {
        count: subscriptions.len(),
        subscriptions,
    })
}

/// Cached value of a feed, without waiting for a new update.
pub fn snapshot(
    session: &SessionManager,
    key: &SubscriptionKey,
) -> AdapterResult<SnapshotResponse> {
    let handle = connected(session)?;
    let info = handle
        .registry()
        .info(key)
        .ok_or_else(|| AdapterError::NotFound(format!("No subscription {}", key)))?;
    Ok(SnapshotResponse {
        key: info.key,
        value: info.last_value,
        active: info.active,
        error: info.error,
    })
}

/// Releases `subscriber`'s claim on a feed.
pub fn unsubscribe(
    session: &SessionManager,
    key: &SubscriptionKey,
    subscriber: &str,
) -> AdapterResult<UnsubscribeResponse> {
    let handle = connected(session)?;
    let subscription = handle
        .registry()
        .handle_for(key, subscriber)
        .ok_or_else(|| {
            AdapterError::NotFound(format!("{} has no subscription {}", subscriber, key))
        })?;
    handle.unsubscribe(&subscription)?;

    let remaining = handle
        .registry()
        .info(key)
        .map_or(0, |i| i.subscriber_count);
    Ok(UnsubscribeResponse {
        key: key.clone(),
        subscriber: subscriber.to_string(),
        remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::connected_session;
    use crate::broker::{Bar, BrokerEvent, Contract, TickField};
    use crate::correlator::RequestError;
    use crate::subscriptions::{LastValue, SubscribeError};
    use std::time::Duration;

    fn ticker(subscriber: &str) -> TickerSubscribeRequest {
        TickerSubscribeRequest {
            contract: Contract::stock("AAPL"),
            generic_ticks: String::new(),
            subscriber: Some(subscriber.to_string()),
        }
    }

    fn bar(close: f64) -> Bar {
        Bar {
            date: "20240102 09:30:00".to_string(),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close,
            volume: 1000.0,
            average: 1.2,
            bar_count: 12,
        }
    }

    #[tokio::test]
    async fn test_historical_bars() {
        let (broker, session) = connected_session().await;
        broker.respond_with(|command| match command {
            Command::HistoricalData {
                req_id, bar_size, ..
            } if bar_size == "1 day" => vec![
                BrokerEvent::Item {
                    req_id: *req_id,
                    item: Payload::Bar(bar(1.5)),
                },
                BrokerEvent::Item {
                    req_id: *req_id,
                    item: Payload::Bar(bar(1.7)),
                },
                BrokerEvent::End { req_id: *req_id },
            ],
            _ => Vec::new(),
        });
        let request: HistoricalBarsRequest = serde_json::from_str(
            r#"{"contract": {"symbol": "AAPL"}, "bar_size": "1 day", "duration": "2 D"}"#,
        )
        .unwrap();

        let response = historical_bars(&session, request).await.unwrap();

        assert_eq!(response.count, 2);
        assert_eq!(response.bars[1].close, 1.7);
    }

    #[tokio::test]
    async fn test_historical_error_is_surfaced() {
        let (broker, session) = connected_session().await;
        broker.respond_with(|command| match command {
            Command::HistoricalData { req_id, .. } => vec![BrokerEvent::Error {
                id: *req_id,
                code: 162,
                message: "Historical Market Data Service error message: no data".to_string(),
            }],
            _ => Vec::new(),
        });
        let request: HistoricalBarsRequest =
            serde_json::from_str(r#"{"contract": {"symbol": "AAPL"}}"#).unwrap();

        let err = historical_bars(&session, request).await.unwrap_err();
        assert!(matches!(
            err,
            AdapterError::Request(RequestError::Rejected { code: 162, .. })
        ));
    }

    #[tokio::test]
    async fn test_ticker_refcount_through_adapter() {
        let (broker, session) = connected_session().await;

        let first = subscribe_ticker(&session, ticker("alice")).unwrap();
        let second = subscribe_ticker(&session, ticker("bob")).unwrap();
        assert_eq!(second.subscriber_count, 2);
        assert_eq!(
            broker.count_commands(|c| matches!(c, Command::MarketData { .. })),
            1
        );

        let released = unsubscribe(&session, &first.handle.key, "alice").unwrap();
        assert_eq!(released.remaining, 1);
        let released = unsubscribe(&session, &first.handle.key, "bob").unwrap();
        assert_eq!(released.remaining, 0);
        assert_eq!(
            broker.count_commands(|c| matches!(c, Command::CancelMarketData { .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_duplicate_subscriber_conflicts() {
        let (_broker, session) = connected_session().await;
        subscribe_ticker(&session, ticker("alice")).unwrap();

        let err = subscribe_ticker(&session, ticker("alice")).unwrap_err();
        assert!(matches!(
            err,
            AdapterError::Subscribe(SubscribeError::Duplicate { .. })
        ));
    }

    #[tokio::test]
    async fn test_snapshot_after_ticks() {
        let (broker, session) = connected_session().await;
        let sub = subscribe_ticker(&session, ticker("alice")).unwrap();

        let empty = snapshot(&session, &sub.handle.key).unwrap();
        assert!(empty.value.is_none());

        broker.emit(BrokerEvent::Tick {
            req_id: sub.handle.req_id,
            field: TickField::Bid,
            value: 10.0,
        });
        for _ in 0..100 {
            if session.registry().snapshot(&sub.handle.key).is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let response = snapshot(&session, &sub.handle.key).unwrap();
        assert!(matches!(
            response.value,
            Some(LastValue::Ticker(ref t)) if t.bid == Some(10.0)
        ));
        assert!(response.active);
    }

    #[tokio::test]
    async fn test_unknown_snapshot_and_unsubscribe() {
        let (_broker, session) = connected_session().await;
        let key = SubscriptionKey::from("ticker:NOPE-STK-SMART-USD");

        assert!(matches!(
            snapshot(&session, &key),
            Err(AdapterError::NotFound(_))
        ));
        assert!(matches!(
            unsubscribe(&session, &key, "alice"),
            Err(AdapterError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_realtime_bars_subscription() {
        let (broker, session) = connected_session().await;
        let response = subscribe_realtime_bars(
            &session,
            RealTimeBarsSubscribeRequest {
                contract: Contract::stock("MSFT"),
                what_to_show: "MIDPOINT".to_string(),
                use_rth: false,
                subscriber: None,
            },
        )
        .unwrap();

        assert_eq!(response.handle.key.as_str(), "bars5s:MSFT-STK-SMART-USD");
        assert!(!response.handle.subscriber.is_empty());
        assert_eq!(list_subscriptions(&session).unwrap().count, 1);
        assert_eq!(
            broker.count_commands(|c| matches!(c, Command::RealTimeBars { use_rth: false, .. })),
            1
        );
    }
}
