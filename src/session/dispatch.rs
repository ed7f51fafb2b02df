//! Routing of inbound platform events.
//!
//! Runs on the single event-loop task, so events are handled strictly in
//! platform delivery order.

use crate::broker::{BrokerEvent, ORDER_CANCELLED_CODE, Payload, is_warning_code};
use crate::correlator::{CorrelationKey, Correlator, RequestError};
use crate::subscriptions::SubscriptionRegistry;
use tracing::{debug, warn};

/// What the event loop should do after an event.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Closed(String),
}

pub(crate) fn dispatch(
    event: BrokerEvent,
    correlator: &Correlator,
    registry: &SubscriptionRegistry,
) -> Flow {
    match event {
        BrokerEvent::Item { req_id, item } => {
            correlator.append(CorrelationKey::Request(req_id), item);
        }
        BrokerEvent::End { req_id } => {
            correlator.finish(CorrelationKey::Request(req_id));
        }
        BrokerEvent::OrderStatus(status) => {
            debug!("Order {} is {}", status.order_id, status.status);
            correlator.resolve(
                CorrelationKey::Order(status.order_id),
                vec![Payload::OrderStatus(status)],
            );
        }
        BrokerEvent::Error { id, code, message } => {
            route_error(id, code, message, correlator, registry);
        }
        BrokerEvent::Tick {
            req_id,
            field,
            value,
        } => {
            registry.on_tick(req_id, field, value);
        }
        BrokerEvent::RealTimeBar { req_id, bar } => {
            registry.on_bar(req_id, bar);
        }
        BrokerEvent::AccountUpdate { req_id, value } => {
            registry.on_account_value(req_id, value);
        }
        BrokerEvent::ConnectionClosed { reason } => return Flow::Closed(reason),
    }
    Flow::Continue
}

/// Order entries are tried first, then requests, then subscriptions.
fn route_error(
    id: i64,
    code: i32,
    message: String,
    correlator: &Correlator,
    registry: &SubscriptionRegistry,
) {
    if is_warning_code(code) {
        warn!("Platform warning {} (id {}): {}", code, id, message);
        return;
    }
    if id < 0 {
        warn!("Platform notice {}: {}", code, message);
        return;
    }
    if code == ORDER_CANCELLED_CODE && correlator.is_pending(CorrelationKey::Order(id)) {
        debug!("Order {} cancel confirmed: {}", id, message);
        return;
    }

    for key in [CorrelationKey::Order(id), CorrelationKey::Request(id)] {
        if correlator.is_pending(key) {
            debug!("Failing {} with platform error {}", key, code);
            correlator.fail(key, RequestError::Rejected { code, message });
            return;
        }
    }

    if registry.on_error(id, code, &message) {
        return;
    }

    warn!("Unmatched platform error {} for id {}: {}", code, id, message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{Command, CommandSink, Contract, OrderStatus, TickField, TransportError};
    use crate::subscriptions::{Feed, LastValue};
    use std::time::Duration;

    struct NullSink;

    impl CommandSink for NullSink {
        fn send(&self, _command: &Command) -> Result<(), TransportError> {
            Ok(())
        }

        fn close(&self) {}
    }

    fn fixtures() -> (Correlator, SubscriptionRegistry) {
        (
            Correlator::new(Duration::from_secs(1)),
            SubscriptionRegistry::new(),
        )
    }

    fn error(id: i64, code: i32) -> BrokerEvent {
        BrokerEvent::Error {
            id,
            code,
            message: "boom".to_string(),
        }
    }

    #[tokio::test]
    async fn test_warning_does_not_fail_request() {
        let (correlator, registry) = fixtures();
        let waiter = correlator
            .register(CorrelationKey::Request(4), None)
            .unwrap();

        dispatch(error(4, 2104), &correlator, &registry);
        assert!(correlator.is_pending(CorrelationKey::Request(4)));

        dispatch(BrokerEvent::End { req_id: 4 }, &correlator, &registry);
        assert_eq!(waiter.wait().await, Ok(vec![]));
    }

    #[tokio::test]
    async fn test_error_prefers_order_entry() {
        let (correlator, registry) = fixtures();
        let order = correlator.register(CorrelationKey::Order(5), None).unwrap();
        let request = correlator
            .register(CorrelationKey::Request(5), None)
            .unwrap();

        dispatch(error(5, 201), &correlator, &registry);

        assert_eq!(
            order.wait().await,
            Err(RequestError::Rejected {
                code: 201,
                message: "boom".to_string()
            })
        );
        assert!(correlator.is_pending(CorrelationKey::Request(5)));
        drop(request);
    }

    #[tokio::test]
    async fn test_cancel_confirmation_is_not_a_rejection() {
        let (correlator, registry) = fixtures();
        let waiter = correlator.register(CorrelationKey::Order(6), None).unwrap();

        dispatch(error(6, 202), &correlator, &registry);
        assert!(correlator.is_pending(CorrelationKey::Order(6)));

        dispatch(
            BrokerEvent::OrderStatus(OrderStatus {
                order_id: 6,
                status: "Cancelled".to_string(),
                filled: 0.0,
                remaining: 100.0,
                avg_fill_price: 0.0,
                perm_id: 0,
                last_fill_price: 0.0,
                why_held: String::new(),
            }),
            &correlator,
            &registry,
        );
        let reply = waiter.wait().await.unwrap();
        assert!(matches!(
            reply.as_slice(),
            [Payload::OrderStatus(s)] if s.status == "Cancelled"
        ));
    }

    #[tokio::test]
    async fn test_error_falls_through_to_subscription() {
        let (correlator, registry) = fixtures();
        let feed = Feed::Ticker {
            contract: Contract::stock("AAPL"),
            generic_ticks: String::new(),
        };
        let handle = registry.subscribe(feed, "a", 12, &NullSink).unwrap();

        dispatch(error(12, 354), &correlator, &registry);
        assert!(!registry.info(&handle.key).unwrap().active);
    }

    #[test]
    fn test_ticks_reach_registry() {
        let (correlator, registry) = fixtures();
        let feed = Feed::Ticker {
            contract: Contract::stock("AAPL"),
            generic_ticks: String::new(),
        };
        let handle = registry.subscribe(feed, "a", 3, &NullSink).unwrap();

        let flow = dispatch(
            BrokerEvent::Tick {
                req_id: 3,
                field: TickField::Last,
                value: 190.0,
            },
            &correlator,
            &registry,
        );
        assert_eq!(flow, Flow::Continue);
        assert!(matches!(
            registry.snapshot(&handle.key),
            Some(LastValue::Ticker(ref s)) if s.last == Some(190.0)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_order_status_is_noop() {
        let (correlator, registry) = fixtures();
        let waiter = correlator.register(CorrelationKey::Order(8), None).unwrap();
        let status = |s: &str| {
            BrokerEvent::OrderStatus(OrderStatus {
                order_id: 8,
                status: s.to_string(),
                filled: 0.0,
                remaining: 1.0,
                avg_fill_price: 0.0,
                perm_id: 0,
                last_fill_price: 0.0,
                why_held: String::new(),
            })
        };

        dispatch(status("Submitted"), &correlator, &registry);
        dispatch(status("Submitted"), &correlator, &registry);
        dispatch(status("Filled"), &correlator, &registry);

        let reply = waiter.wait().await.unwrap();
        assert!(matches!(
            &reply[..],
            [Payload::OrderStatus(s)] if s.status == "Submitted"
        ));
    }

    #[test]
    fn test_connection_closed_stops_loop() {
        let (correlator, registry) = fixtures();
        assert_eq!(
            dispatch(
                BrokerEvent::ConnectionClosed {
                    reason: "eof".to_string()
                },
                &correlator,
                &registry
            ),
            Flow::Closed("eof".to_string())
        );
    }
}
