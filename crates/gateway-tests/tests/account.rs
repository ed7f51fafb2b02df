//! Account endpoint tests.

use gateway_client::AccountQuery;
use gateway_tests::connected_client;

#[tokio::test]
#[ignore = "requires a running gateway"]
async fn test_managed_accounts() {
    let client = connected_client().await.expect("Failed to connect");

    let accounts = client
        .managed_accounts()
        .await
        .expect("Failed to get accounts");

    assert!(accounts.count > 0);
    assert_eq!(accounts.count, accounts.accounts.len());
}

#[tokio::test]
#[ignore = "requires a running gateway"]
async fn test_account_summary_defaults_to_first_account() {
    let client = connected_client().await.expect("Failed to connect");

    let accounts = client.managed_accounts().await.expect("accounts");
    let summary = client
        .account_summary(&AccountQuery::default())
        .await
        .expect("Failed to get summary");

    assert_eq!(summary.account, accounts.accounts[0]);
}

#[tokio::test]
#[ignore = "requires a running gateway"]
async fn test_positions_and_portfolio() {
    let client = connected_client().await.expect("Failed to connect");

    let positions = client
        .positions(&AccountQuery::default())
        .await
        .expect("Failed to get positions");
    assert_eq!(positions.count, positions.positions.len());

    let portfolio = client
        .portfolio(&AccountQuery::default())
        .await
        .expect("Failed to get portfolio");
    assert_eq!(portfolio.count, portfolio.portfolio.len());
}
