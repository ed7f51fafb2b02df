//! Market data and subscription endpoint tests.

use gateway_client::{
    Contract, HistoricalBarsRequest, SecType, TickerSubscribeRequest,
};
use gateway_tests::{connected_client, unique_subscriber};

#[tokio::test]
#[ignore = "requires a running gateway"]
async fn test_qualify_contract() {
    let client = connected_client().await.expect("Failed to connect");

    let contracts = client
        .qualify_contract(Contract::stock("AAPL"))
        .await
        .expect("Failed to qualify");

    assert!(contracts.count > 0);
    assert!(contracts.contracts[0].con_id.is_some());
    assert_eq!(contracts.contracts[0].sec_type, SecType::Stock);
}

#[tokio::test]
#[ignore = "requires a running gateway"]
async fn test_unknown_contract_is_not_found() {
    let client = connected_client().await.expect("Failed to connect");

    let err = client
        .qualify_contract(Contract::stock("NOSUCHSYMBOLXYZ"))
        .await
        .unwrap_err();

    assert!(matches!(
        err.code(),
        Some("NOT_FOUND") | Some("BROKER_REJECTED")
    ));
}

#[tokio::test]
#[ignore = "requires a running gateway"]
async fn test_historical_bars() {
    let client = connected_client().await.expect("Failed to connect");

    let bars = client
        .historical_bars(&HistoricalBarsRequest::new(Contract::stock("AAPL")))
        .await
        .expect("Failed to get bars");

    assert_eq!(bars.count, bars.bars.len());
}

#[tokio::test]
#[ignore = "requires a running gateway"]
async fn test_shared_ticker_subscription() {
    let client = connected_client().await.expect("Failed to connect");
    let first = unique_subscriber("first");
    let second = unique_subscriber("second");

    let request = |subscriber: &str| TickerSubscribeRequest {
        contract: Contract::stock("MSFT"),
        generic_ticks: String::new(),
        subscriber: Some(subscriber.to_string()),
    };

    let a = client
        .subscribe_ticker(&request(&first))
        .await
        .expect("first subscribe");
    let b = client
        .subscribe_ticker(&request(&second))
        .await
        .expect("second subscribe");
    assert_eq!(a.handle.key, b.handle.key);
    assert_eq!(a.handle.req_id, b.handle.req_id);

    let duplicate = client.subscribe_ticker(&request(&first)).await.unwrap_err();
    assert_eq!(duplicate.code(), Some("CONFLICT"));

    let snapshot = client
        .snapshot(&a.handle.key)
        .await
        .expect("Failed to get snapshot");
    assert_eq!(snapshot.key, a.handle.key);

    let released = client
        .unsubscribe(&a.handle.key, &first)
        .await
        .expect("first release");
    let last = client
        .unsubscribe(&a.handle.key, &second)
        .await
        .expect("second release");
    assert_eq!(last.remaining + 1, released.remaining);
}
