//! Trading adapter.
//!
//! Orders are qualified, validated and sent exactly once. A failed or timed
//! out placement is reported to the caller and never resubmitted.

use super::{AdapterError, AdapterResult, collect, connected, deadline};
use crate::broker::{Command, Contract, Payload};
use crate::models::{
    CancelOrderRequest, CancelOrderResponse, ContractsResponse, ExecutionsResponse,
    OrdersResponse, PlaceOrderRequest, PlaceOrderResponse,
};
use crate::session::{SessionHandle, SessionManager};
use std::time::Duration;
use tracing::{info, warn};

async fn qualify(
    handle: &SessionHandle,
    contract: Contract,
    timeout: Option<Duration>,
) -> AdapterResult<Vec<Contract>> {
    contract.validate().map_err(AdapterError::Invalid)?;
    let reply = handle
        .request(
            |req_id| Command::ContractDetails { req_id, contract },
            timeout,
        )
        .await?;
    let contracts = collect(reply, |payload| match payload {
        Payload::ContractDetails(details) => Some(details.contract),
        _ => None,
    });
    if contracts.is_empty() {
        return Err(AdapterError::NotFound("Contract not found".to_string()));
    }
    Ok(contracts)
}

/// Resolves a contract to the platform's fully specified contracts.
pub async fn qualify_contract(
    session: &SessionManager,
    contract: Contract,
    timeout_ms: Option<u64>,
) -> AdapterResult<ContractsResponse> {
    let handle = connected(session)?;
    let contracts = qualify(&handle, contract, deadline(timeout_ms)).await?;
    Ok(ContractsResponse {
        count: contracts.len(),
        contracts,
    })
}

/// Qualifies the contract, then places the order and waits for its first status.
pub async fn place_order(
    session: &SessionManager,
    request: PlaceOrderRequest,
) -> AdapterResult<PlaceOrderResponse> {
    let handle = connected(session)?;
    request.order.validate().map_err(AdapterError::Invalid)?;
    if handle.read_only() {
        return Err(crate::correlator::RequestError::ReadOnly.into());
    }

    let timeout = deadline(request.timeout_ms);
    let contract = qualify(&handle, request.contract, timeout)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AdapterError::NotFound("Contract not found".to_string()))?;

    info!(
        "Placing {:?} {:?} {} {}",
        request.order.order_type,
        request.order.action,
        request.order.quantity,
        contract.signature()
    );
    let status = handle
        .place_order(contract.clone(), request.order, timeout)
        .await
        .inspect_err(|e| warn!("Order for {} failed: {}", contract.symbol, e))?;

    Ok(PlaceOrderResponse {
        order_id: status.order_id,
        status: status.status.clone(),
        contract,
        order_status: status,
    })
}

/// Cancels an order and reports its resulting status.
pub async fn cancel_order(
    session: &SessionManager,
    request: CancelOrderRequest,
) -> AdapterResult<CancelOrderResponse> {
    let handle = connected(session)?;
    let status = handle
        .cancel_order(request.order_id, deadline(request.timeout_ms))
        .await?;
    info!("Order {} is {} after cancel", request.order_id, status.status);
    Ok(CancelOrderResponse {
        order_id: request.order_id,
        status: status.status.clone(),
        order_status: status,
    })
}

async fn orders(
    session: &SessionManager,
    build: fn(i64) -> Command,
    timeout_ms: Option<u64>,
) -> AdapterResult<OrdersResponse> {
    let handle = connected(session)?;
    let reply = handle.request(build, deadline(timeout_ms)).await?;
    let orders = collect(reply, |payload| match payload {
        Payload::Order(order) => Some(order),
        _ => None,
    });
    Ok(OrdersResponse {
        count: orders.len(),
        orders,
    })
}

/// Orders still working.
pub async fn open_orders(
    session: &SessionManager,
    timeout_ms: Option<u64>,
) -> AdapterResult<OrdersResponse> {
    orders(session, |req_id| Command::OpenOrders { req_id }, timeout_ms).await
}

/// Every order of the session, completed ones included.
pub async fn all_orders(
    session: &SessionManager,
    timeout_ms: Option<u64>,
) -> AdapterResult<OrdersResponse> {
    orders(session, |req_id| Command::AllOrders { req_id }, timeout_ms).await
}

/// Executions reported for the session.
pub async fn executions(
    session: &SessionManager,
    timeout_ms: Option<u64>,
) -> AdapterResult<ExecutionsResponse> {
    let handle = connected(session)?;
    let reply = handle
        .request(|req_id| Command::Executions { req_id }, deadline(timeout_ms))
        .await?;
    let executions = collect(reply, |payload| match payload {
        Payload::Execution(execution) => Some(execution),
        _ => None,
    });
    Ok(ExecutionsResponse {
        count: executions.len(),
        executions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::connected_session;
    use crate::broker::{
        BrokerEvent, ContractDetails, OrderAction, OrderSpec, OrderStatus, OrderType,
    };
    use crate::correlator::RequestError;

    fn details(con_id: i64) -> Payload {
        let mut contract = Contract::stock("AAPL");
        contract.con_id = Some(con_id);
        contract.primary_exchange = Some("NASDAQ".to_string());
        Payload::ContractDetails(ContractDetails {
            contract,
            market_name: "NMS".to_string(),
            min_tick: 0.01,
            long_name: "APPLE INC".to_string(),
            order_types: String::new(),
            valid_exchanges: "SMART,NASDAQ".to_string(),
            trading_hours: String::new(),
            time_zone_id: "US/Eastern".to_string(),
        })
    }

    fn status(order_id: i64, status: &str) -> OrderStatus {
        OrderStatus {
            order_id,
            status: status.to_string(),
            filled: 0.0,
            remaining: 10.0,
            avg_fill_price: 0.0,
            perm_id: 77,
            last_fill_price: 0.0,
            why_held: String::new(),
        }
    }

    fn broker_script(command: &Command) -> Vec<BrokerEvent> {
        match command {
            Command::ContractDetails { req_id, contract } if contract.symbol == "AAPL" => vec![
                BrokerEvent::Item {
                    req_id: *req_id,
                    item: details(265598),
                },
                BrokerEvent::End { req_id: *req_id },
            ],
            Command::ContractDetails { req_id, .. } => vec![BrokerEvent::End { req_id: *req_id }],
            Command::PlaceOrder { order_id, .. } => {
                vec![BrokerEvent::OrderStatus(status(*order_id, "Submitted"))]
            }
            Command::CancelOrder { order_id } => {
                vec![BrokerEvent::OrderStatus(status(*order_id, "Cancelled"))]
            }
            _ => Vec::new(),
        }
    }

    fn order_request(symbol: &str, order: OrderSpec) -> PlaceOrderRequest {
        PlaceOrderRequest {
            contract: Contract::stock(symbol),
            order,
            timeout_ms: None,
        }
    }

    #[tokio::test]
    async fn test_place_order_qualifies_first() {
        let (broker, session) = connected_session().await;
        broker.respond_with(broker_script);

        let response = place_order(
            &session,
            order_request("AAPL", OrderSpec::market(OrderAction::Buy, 10.0)),
        )
        .await
        .unwrap();

        assert_eq!(response.status, "Submitted");
        assert_eq!(response.contract.con_id, Some(265598));

        let commands = broker.commands();
        assert!(matches!(commands[0], Command::ContractDetails { .. }));
        match &commands[1] {
            Command::PlaceOrder {
                order_id, contract, ..
            } => {
                assert_eq!(*order_id, response.order_id);
                assert_eq!(contract.con_id, Some(265598));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_contract_is_not_found() {
        let (broker, session) = connected_session().await;
        broker.respond_with(broker_script);

        let err = place_order(
            &session,
            order_request("NOPE", OrderSpec::market(OrderAction::Sell, 1.0)),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AdapterError::NotFound(_)));
        assert_eq!(
            broker.count_commands(|c| matches!(c, Command::PlaceOrder { .. })),
            0
        );
    }

    #[tokio::test]
    async fn test_limit_order_requires_price() {
        let (broker, session) = connected_session().await;
        let mut order = OrderSpec::market(OrderAction::Buy, 1.0);
        order.order_type = OrderType::Limit;

        let err = place_order(&session, order_request("AAPL", order))
            .await
            .unwrap_err();

        assert!(matches!(err, AdapterError::Invalid(_)));
        assert!(broker.commands().is_empty());
    }

    #[tokio::test]
    async fn test_order_timeout_is_not_retried() {
        let (broker, session) = connected_session().await;
        broker.respond_with(|command| match command {
            Command::PlaceOrder { .. } => Vec::new(),
            other => broker_script(other),
        });

        let mut request = order_request("AAPL", OrderSpec::market(OrderAction::Buy, 1.0));
        request.timeout_ms = Some(30);
        let err = place_order(&session, request).await.unwrap_err();

        assert!(matches!(
            err,
            AdapterError::Request(RequestError::Timeout { .. })
        ));
        assert_eq!(
            broker.count_commands(|c| matches!(c, Command::PlaceOrder { .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_cancel_order() {
        let (broker, session) = connected_session().await;
        broker.respond_with(broker_script);

        let response = cancel_order(
            &session,
            CancelOrderRequest {
                order_id: 17,
                timeout_ms: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(response.status, "Cancelled");
        assert_eq!(response.order_id, 17);
    }

    #[tokio::test]
    async fn test_qualify_contract_lists_matches() {
        let (broker, session) = connected_session().await;
        broker.respond_with(broker_script);

        let response = qualify_contract(&session, Contract::stock("AAPL"), None)
            .await
            .unwrap();
        assert_eq!(response.count, 1);
        assert_eq!(response.contracts[0].primary_exchange.as_deref(), Some("NASDAQ"));
    }

    #[tokio::test]
    async fn test_open_orders_empty() {
        let (broker, session) = connected_session().await;
        broker.respond_with(|command| match command {
            Command::OpenOrders { req_id } => vec![BrokerEvent::End { req_id: *req_id }],
            _ => Vec::new(),
        });

        let response = open_orders(&session, None).await.unwrap();
        assert_eq!(response.count, 0);
    }
}
