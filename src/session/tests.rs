use super::*;
use crate::broker::sim::SimulatedBroker;
use crate::broker::{Handshake, OrderAction, TickField};

fn config() -> SessionConfig {
    SessionConfig {
        params: ConnectParams {
            host: "sim".to_string(),
            port: 4002,
            client_id: 11,
            read_only: false,
        },
        connect_timeout: Duration::from_millis(500),
        timeouts: RequestTimeouts {
            default: Duration::from_millis(500),
            historical: Duration::from_millis(500),
            order_ack: Duration::from_millis(500),
        },
        heartbeat: None,
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            multiplier: 2.0,
            max_attempts: 3,
        },
    }
}

fn manager_with(broker: &SimulatedBroker, config: SessionConfig) -> Arc<SessionManager> {
    SessionManager::new(Arc::new(broker.clone()), config)
}

async fn wait_for_state(manager: &SessionManager, state: SessionState) -> bool {
    let mut rx = manager.watch();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == state))
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false)
}

async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

fn answer_current_time(broker: &SimulatedBroker) {
    broker.respond_with(|command| match command {
        Command::CurrentTime { req_id } => vec![
            BrokerEvent::Item {
                req_id: *req_id,
                item: Payload::CurrentTime { epoch: 1_700_000_000 },
            },
            BrokerEvent::End { req_id: *req_id },
        ],
        _ => Vec::new(),
    });
}

fn market_order() -> OrderSpec {
    OrderSpec::market(OrderAction::Buy, 10.0)
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let broker = SimulatedBroker::new();
    let manager = manager_with(&broker, config());

    let first = manager.connect().await.unwrap();
    let second = manager.connect().await.unwrap();

    assert_eq!(broker.connect_count(), 1);
    assert_eq!(first.managed_accounts(), second.managed_accounts());
    assert_eq!(manager.state(), SessionState::Connected);

    let status = manager.health();
    assert_eq!(status.client_id, 11);
    assert_eq!(status.server_version, Some(176));
    assert!(status.connected_since.is_some());
    assert!(status.last_error.is_none());
}

#[tokio::test]
async fn test_connect_passes_params() {
    let broker = SimulatedBroker::new();
    let mut config = config();
    config.params.read_only = true;
    let manager = manager_with(&broker, config);

    let handle = manager.connect().await.unwrap();

    assert!(handle.read_only());
    assert_eq!(broker.connect_params()[0].client_id, 11);
    assert!(broker.connect_params()[0].read_only);
}

#[tokio::test]
async fn test_connect_failure_leaves_disconnected() {
    let broker = SimulatedBroker::new();
    broker.fail_next_connect(ConnectionError::DuplicateClientId(11));
    let manager = manager_with(&broker, config());

    let err = manager.connect().await.unwrap_err();

    assert_eq!(err, ConnectionError::DuplicateClientId(11));
    assert_eq!(manager.state(), SessionState::Disconnected);
    assert!(manager.health().last_error.unwrap().contains("already in use"));

    // A later explicit connect may succeed.
    assert!(manager.connect().await.is_ok());
}

#[tokio::test]
async fn test_not_connected_fails_fast() {
    let broker = SimulatedBroker::new();
    let manager = manager_with(&broker, config());

    let started = std::time::Instant::now();
    let err = manager.with_connection(|h| h.clone()).unwrap_err();

    assert_eq!(
        err,
        NotConnectedError {
            state: SessionState::Disconnected
        }
    );
    assert!(started.elapsed() < Duration::from_millis(50));
    assert!(broker.commands().is_empty());
}

#[tokio::test]
async fn test_request_round_trip() {
    let broker = SimulatedBroker::new();
    answer_current_time(&broker);
    let manager = manager_with(&broker, config());
    let handle = manager.connect().await.unwrap();

    let reply = handle
        .request(|req_id| Command::CurrentTime { req_id }, None)
        .await
        .unwrap();

    assert_eq!(reply, vec![Payload::CurrentTime { epoch: 1_700_000_000 }]);
    assert_eq!(manager.correlator().pending_count(), 0);
}

#[tokio::test]
async fn test_ids_seeded_from_handshake() {
    let broker = SimulatedBroker::new();
    broker.set_handshake(Handshake {
        server_version: 176,
        next_order_id: 500,
        managed_accounts: vec!["DU1".to_string()],
    });
    let manager = manager_with(&broker, config());
    let handle = manager.connect().await.unwrap();

    assert_eq!(handle.next_id(), 500);
    assert_eq!(handle.next_id(), 501);
}

#[tokio::test]
async fn test_order_status_before_ack_is_correlated() {
    let broker = SimulatedBroker::new();
    broker.set_handshake(Handshake {
        server_version: 176,
        next_order_id: 42,
        managed_accounts: vec!["DU1".to_string()],
    });
    // Status is emitted from inside send, before place_order regains control.
    broker.respond_with(|command| match command {
        Command::PlaceOrder { order_id, .. } => vec![BrokerEvent::OrderStatus(OrderStatus {
            order_id: *order_id,
            status: "PreSubmitted".to_string(),
            filled: 0.0,
            remaining: 10.0,
            avg_fill_price: 0.0,
            perm_id: 9001,
            last_fill_price: 0.0,
            why_held: String::new(),
        })],
        _ => Vec::new(),
    });
    let manager = manager_with(&broker, config());
    let handle = manager.connect().await.unwrap();

    let status = handle
        .place_order(Contract::stock("AAPL"), market_order(), None)
        .await
        .unwrap();

    assert_eq!(status.order_id, 42);
    assert_eq!(status.status, "PreSubmitted");
    assert_eq!(
        broker.count_commands(|c| matches!(c, Command::PlaceOrder { .. })),
        1
    );
}

#[tokio::test]
async fn test_order_rejection_is_not_retried() {
    let broker = SimulatedBroker::new();
    broker.respond_with(|command| match command {
        Command::PlaceOrder { order_id, .. } => vec![BrokerEvent::Error {
            id: *order_id,
            code: 201,
            message: "Order rejected - reason: margin".to_string(),
        }],
        _ => Vec::new(),
    });
    let manager = manager_with(&broker, config());
    let handle = manager.connect().await.unwrap();

    let err = handle
        .place_order(Contract::stock("AAPL"), market_order(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, RequestError::Rejected { code: 201, .. }));
    assert_eq!(
        broker.count_commands(|c| matches!(c, Command::PlaceOrder { .. })),
        1
    );
}

#[tokio::test]
async fn test_read_only_refuses_orders() {
    let broker = SimulatedBroker::new();
    let mut config = config();
    config.params.read_only = true;
    let manager = manager_with(&broker, config);
    let handle = manager.connect().await.unwrap();

    assert_eq!(
        handle
            .place_order(Contract::stock("AAPL"), market_order(), None)
            .await,
        Err(RequestError::ReadOnly)
    );
    assert_eq!(handle.cancel_order(1, None).await, Err(RequestError::ReadOnly));
    assert!(broker.commands().is_empty());
}

#[tokio::test]
async fn test_timeout_then_late_event() {
    let broker = SimulatedBroker::new();
    let manager = manager_with(&broker, config());
    let handle = manager.connect().await.unwrap();

    let err = handle
        .request(
            |req_id| Command::OpenOrders { req_id },
            Some(Duration::from_millis(20)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::Timeout { .. }));

    let req_id = match broker.commands().last() {
        Some(Command::OpenOrders { req_id }) => *req_id,
        other => panic!("unexpected command {:?}", other),
    };
    assert!(broker.emit(BrokerEvent::End { req_id }));

    // The session keeps working after the late event.
    answer_current_time(&broker);
    assert!(
        handle
            .request(|req_id| Command::CurrentTime { req_id }, None)
            .await
            .is_ok()
    );
    assert_eq!(manager.state(), SessionState::Connected);
}

#[tokio::test]
async fn test_disconnect_cancels_pending_and_blocks_new_requests() {
    let broker = SimulatedBroker::new();
    let manager = manager_with(&broker, config());
    let handle = manager.connect().await.unwrap();

    let in_flight = {
        let handle = handle.clone();
        tokio::spawn(async move {
            handle
                .request(|req_id| Command::Positions { req_id, account: None }, None)
                .await
        })
    };
    assert!(wait_until(|| manager.correlator().pending_count() == 1).await);

    assert!(manager.disconnect());

    let result = in_flight.await.unwrap();
    assert!(matches!(result, Err(RequestError::Disconnected(_))));
    assert_eq!(manager.state(), SessionState::Disconnected);
    assert!(!broker.is_connected());

    // The stale handle cannot create new entries.
    let stale = handle
        .request(|req_id| Command::CurrentTime { req_id }, None)
        .await;
    assert!(matches!(stale, Err(RequestError::Disconnected(_))));
    assert!(manager.handle().is_err());
}

#[tokio::test]
async fn test_disconnect_clears_subscriptions() {
    let broker = SimulatedBroker::new();
    let manager = manager_with(&broker, config());
    let handle = manager.connect().await.unwrap();
    let feed = Feed::Ticker {
        contract: Contract::stock("AAPL"),
        generic_ticks: String::new(),
    };
    handle.subscribe(feed, "alice").unwrap();

    manager.disconnect();

    assert_eq!(manager.registry().active_count(), 0);
    assert_eq!(
        broker.count_commands(|c| matches!(c, Command::CancelMarketData { .. })),
        0
    );
}

#[tokio::test]
async fn test_shared_subscription_through_handle() {
    let broker = SimulatedBroker::new();
    let manager = manager_with(&broker, config());
    let handle = manager.connect().await.unwrap();
    let feed = || Feed::Ticker {
        contract: Contract::stock("AAPL"),
        generic_ticks: String::new(),
    };

    let a = handle.subscribe(feed(), "a").unwrap();
    let b = handle.subscribe(feed(), "b").unwrap();
    assert_eq!(
        broker.count_commands(|c| matches!(c, Command::MarketData { .. })),
        1
    );

    assert!(broker.emit(BrokerEvent::Tick {
        req_id: a.req_id,
        field: TickField::Last,
        value: 101.5,
    }));
    assert!(wait_until(|| handle.snapshot(&a.key).is_some()).await);

    handle.unsubscribe(&a).unwrap();
    handle.unsubscribe(&b).unwrap();
    assert_eq!(
        broker.count_commands(|c| matches!(c, Command::CancelMarketData { .. })),
        1
    );
}

#[tokio::test]
async fn test_transport_loss_reconnects() {
    let broker = SimulatedBroker::new();
    let manager = manager_with(&broker, config());
    let handle = manager.connect().await.unwrap();
    handle
        .subscribe(
            Feed::AccountUpdates {
                account: "DU123456".to_string(),
            },
            "alice",
        )
        .unwrap();

    let in_flight = {
        let handle = handle.clone();
        tokio::spawn(async move {
            handle
                .request(|req_id| Command::Executions { req_id }, None)
                .await
        })
    };
    assert!(wait_until(|| manager.correlator().pending_count() == 1).await);

    broker.drop_connection("socket reset");

    assert!(matches!(
        in_flight.await.unwrap(),
        Err(RequestError::Disconnected(_))
    ));
    assert!(wait_until(|| broker.connect_count() == 2).await);
    assert!(wait_for_state(&manager, SessionState::Connected).await);

    // Subscriptions are not restored automatically.
    assert_eq!(manager.registry().active_count(), 0);
    assert!(manager.health().last_error.is_none());

    answer_current_time(&broker);
    let fresh = manager.handle().unwrap();
    assert!(
        fresh
            .request(|req_id| Command::CurrentTime { req_id }, None)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_reconnect_exhaustion_surfaces_failure() {
    let broker = SimulatedBroker::new();
    let manager = manager_with(&broker, config());
    manager.connect().await.unwrap();

    broker.refuse_connections(ConnectionError::Io("connection refused".to_string()));
    broker.drop_connection("platform restarting");

    assert!(
        wait_until(|| manager.state() == SessionState::Disconnected).await
    );
    let status = manager.health();
    assert_eq!(status.reconnect_attempts, 3);
    assert!(status.last_error.unwrap().contains("exhausted"));
    // Initial connect plus three refused attempts.
    assert_eq!(broker.connect_params().len(), 4);
    assert_eq!(broker.connect_count(), 1);
}

#[tokio::test]
async fn test_rejection_stops_reconnect_early() {
    let broker = SimulatedBroker::new();
    let manager = manager_with(&broker, config());
    manager.connect().await.unwrap();

    broker.refuse_connections(ConnectionError::Rejected {
        code: 502,
        message: "not authorized".to_string(),
    });
    broker.drop_connection("logged out");

    assert!(
        wait_until(|| manager.state() == SessionState::Disconnected).await
    );
    assert_eq!(broker.connect_params().len(), 2);
}

#[tokio::test]
async fn test_disconnect_during_backoff_stops_retries() {
    let broker = SimulatedBroker::new();
    let mut config = config();
    config.reconnect.initial_delay = Duration::from_millis(200);
    config.reconnect.max_delay = Duration::from_millis(200);
    let manager = manager_with(&broker, config);
    manager.connect().await.unwrap();

    broker.drop_connection("socket reset");
    assert!(wait_until(|| manager.state() == SessionState::Degraded).await);

    manager.disconnect();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(manager.state(), SessionState::Disconnected);
    assert_eq!(broker.connect_params().len(), 1);
}

#[tokio::test]
async fn test_heartbeat_timeout_degrades_session() {
    let broker = SimulatedBroker::new();
    let mut config = config();
    config.heartbeat = Some(HeartbeatConfig {
        interval: Duration::from_millis(20),
        timeout: Duration::from_millis(20),
    });
    let manager = manager_with(&broker, config);
    manager.connect().await.unwrap();

    // No responder: the probe goes unanswered.
    assert!(wait_until(|| broker.connect_count() >= 2).await);
    assert!(broker.count_commands(|c| matches!(c, Command::CurrentTime { .. })) >= 1);

    manager.disconnect();
}

#[tokio::test]
async fn test_answered_heartbeat_keeps_session() {
    let broker = SimulatedBroker::new();
    answer_current_time(&broker);
    let mut config = config();
    config.heartbeat = Some(HeartbeatConfig {
        interval: Duration::from_millis(10),
        timeout: Duration::from_millis(200),
    });
    let manager = manager_with(&broker, config);
    manager.connect().await.unwrap();

    assert!(
        wait_until(|| broker.count_commands(|c| matches!(c, Command::CurrentTime { .. })) >= 3)
            .await
    );
    assert_eq!(manager.state(), SessionState::Connected);
    assert_eq!(broker.connect_count(), 1);
}

#[tokio::test]
async fn test_handle_from_replaced_connection_cannot_release_new_feeds() {
    let broker = SimulatedBroker::new();
    let manager = manager_with(&broker, config());
    let old = manager.connect().await.unwrap();
    let feed = || Feed::Ticker {
        contract: Contract::stock("AAPL"),
        generic_ticks: String::new(),
    };
    old.subscribe(feed(), "alice").unwrap();

    broker.drop_connection("socket reset");
    assert!(wait_until(|| broker.connect_count() == 2).await);
    assert!(wait_for_state(&manager, SessionState::Connected).await);

    let fresh = manager.handle().unwrap();
    fresh.subscribe(feed(), "alice").unwrap();

    assert!(matches!(
        old.release_subscriber("alice"),
        Err(SubscribeError::Stale { .. })
    ));
    assert!(matches!(
        old.subscribe(feed(), "bob"),
        Err(SubscribeError::Stale { .. })
    ));
    assert_eq!(manager.registry().active_count(), 1);

    assert_eq!(fresh.release_subscriber("alice"), Ok(1));
    assert_eq!(
        broker.count_commands(|c| matches!(c, Command::CancelMarketData { .. })),
        1
    );
    assert_eq!(manager.registry().active_count(), 0);
}

#[tokio::test]
async fn test_disconnect_is_complete_once_observable() {
    let broker = SimulatedBroker::new();
    let manager = manager_with(&broker, config());
    let handle = manager.connect().await.unwrap();

    let mut rx = manager.watch();
    let observer = tokio::spawn(async move {
        rx.wait_for(|s| *s == SessionState::Disconnected)
            .await
            .map(|_| ())
            .ok();
        handle
            .request(|req_id| Command::CurrentTime { req_id }, None)
            .await
    });
    tokio::task::yield_now().await;

    manager.disconnect();

    assert!(matches!(
        observer.await.unwrap(),
        Err(RequestError::Disconnected(_))
    ));
    assert_eq!(
        broker.count_commands(|c| matches!(c, Command::CurrentTime { .. })),
        0
    );
    assert_eq!(manager.correlator().pending_count(), 0);
}
