//! Account adapter.

use super::{
    AdapterResult, collect, connected, deadline, resolve_account, subscriber_or_new,
};
use crate::broker::{AccountValue, Command, Payload};
use crate::models::{
    AccountQuery, AccountSummaryResponse, AccountUpdatesRequest, AccountValueEntry,
    AccountValuesResponse, ManagedAccountsResponse, PortfolioResponse, PositionsResponse,
    SubscribeResponse,
};
use crate::session::{SessionHandle, SessionManager};
use crate::subscriptions::Feed;
use std::collections::BTreeMap;
use tracing::info;

/// Tags reported by the summary endpoint.
pub const SUMMARY_TAGS: &[&str] = &[
    "NetLiquidation",
    "TotalCashValue",
    "SettledCash",
    "AccruedCash",
    "BuyingPower",
    "EquityWithLoanValue",
    "PreviousDayEquityWithLoanValue",
    "GrossPositionValue",
    "RegTEquity",
    "RegTMargin",
    "SMA",
    "InitMarginReq",
    "MaintMarginReq",
    "AvailableFunds",
    "ExcessLiquidity",
    "Cushion",
    "FullInitMarginReq",
    "FullMaintMarginReq",
    "FullAvailableFunds",
    "FullExcessLiquidity",
    "LookAheadNextChange",
    "DayTradesRemaining",
];

impl From<AccountValue> for AccountValueEntry {
    fn from(value: AccountValue) -> Self {
        Self {
            value: value.value,
            currency: value.currency,
            account: value.account,
        }
    }
}

/// Accounts reported by the platform at handshake.
pub fn managed_accounts(session: &SessionManager) -> AdapterResult<ManagedAccountsResponse> {
    let handle = connected(session)?;
    let accounts = handle.managed_accounts().to_vec();
    Ok(ManagedAccountsResponse {
        count: accounts.len(),
        accounts,
    })
}

async fn account_values(
    handle: &SessionHandle,
    query: AccountQuery,
) -> AdapterResult<(String, Vec<AccountValue>)> {
    let account = resolve_account(handle, query.account)?;
    let reply = handle
        .request(
            |req_id| Command::AccountValues {
                req_id,
                account: account.clone(),
            },
            deadline(query.timeout_ms),
        )
        .await?;
    let values = collect(reply, |payload| match payload {
        Payload::AccountValue(value) => Some(value),
        _ => None,
    });
    Ok((account, values))
}

/// Key metrics of one account.
pub async fn summary(
    session: &SessionManager,
    query: AccountQuery,
) -> AdapterResult<AccountSummaryResponse> {
    let handle = connected(session)?;
    let (account, values) = account_values(&handle, query).await?;

    let summary = values
        .into_iter()
        .filter(|v| SUMMARY_TAGS.contains(&v.tag.as_str()))
        .map(|v| (v.tag.clone(), AccountValueEntry::from(v)))
        .collect();

    Ok(AccountSummaryResponse { account, summary })
}

/// Every value of one account, grouped by tag.
pub async fn values(
    session: &SessionManager,
    query: AccountQuery,
) -> AdapterResult<AccountValuesResponse> {
    let handle = connected(session)?;
    let (account, values) = account_values(&handle, query).await?;

    let mut grouped: BTreeMap<String, Vec<AccountValueEntry>> = BTreeMap::new();
    for value in values {
        grouped
            .entry(value.tag.clone())
            .or_default()
            .push(value.into());
    }

    Ok(AccountValuesResponse {
        account,
        values: grouped,
    })
}

/// Positions, optionally restricted to one account.
pub async fn positions(
    session: &SessionManager,
    query: AccountQuery,
) -> AdapterResult<PositionsResponse> {
    let handle = connected(session)?;
    let account = query.account;
    let reply = handle
        .request(
            |req_id| Command::Positions { req_id, account },
            deadline(query.timeout_ms),
        )
        .await?;
    let positions = collect(reply, |payload| match payload {
        Payload::Position(position) => Some(position),
        _ => None,
    });
    Ok(PositionsResponse {
        count: positions.len(),
        positions,
    })
}

/// Portfolio items with P&L, optionally restricted to one account.
pub async fn portfolio(
    session: &SessionManager,
    query: AccountQuery,
) -> AdapterResult<PortfolioResponse> {
    let handle = connected(session)?;
    let account = query.account;
    let reply = handle
        .request(
            |req_id| Command::Portfolio { req_id, account },
            deadline(query.timeout_ms),
        )
        .await?;
    let portfolio = collect(reply, |payload| match payload {
        Payload::PortfolioItem(item) => Some(item),
        _ => None,
    });
    Ok(PortfolioResponse {
        count: portfolio.len(),
        portfolio,
    })
}

/// Starts or joins the account update stream.
pub fn subscribe_updates(
    session: &SessionManager,
    request: AccountUpdatesRequest,
) -> AdapterResult<SubscribeResponse> {
    let handle = connected(session)?;
    let account = resolve_account(&handle, request.account)?;
    let subscriber = subscriber_or_new(request.subscriber);

    let subscription = handle.subscribe(Feed::AccountUpdates { account }, &subscriber)?;
    info!("{} streams {}", subscriber, subscription.key);

    let info = handle.registry().info(&subscription.key);
    Ok(SubscribeResponse {
        subscriber_count: info.as_ref().map_or(1, |i| i.subscriber_count),
        snapshot: info.and_then(|i| i.last_value),
        handle: subscription,
    })
}
