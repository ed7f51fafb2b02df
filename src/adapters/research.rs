//! Research adapter: contract details, fundamentals, news and the market scanner.

use super::{AdapterError, AdapterResult, collect, connected, deadline};
use crate::broker::{Command, Contract, ContractDetails, Payload, ScannerParams};
use crate::models::{
    ContractDetailsResponse, FundamentalDataRequest, FundamentalDataResponse, NewsRequest,
    NewsResponse, ScanRequest, ScanResponse, ScannerParametersResponse,
};
use crate::session::{SessionHandle, SessionManager};
use std::time::Duration;
use tracing::{debug, info};

async fn details(
    handle: &SessionHandle,
    contract: Contract,
    timeout: Option<Duration>,
) -> AdapterResult<Vec<ContractDetails>> {
    contract.validate().map_err(AdapterError::Invalid)?;
    let reply = handle
        .request(
            |req_id| Command::ContractDetails { req_id, contract },
            timeout,
        )
        .await?;
    let details = collect(reply, |payload| match payload {
        Payload::ContractDetails(details) => Some(details),
        _ => None,
    });
    if details.is_empty() {
        return Err(AdapterError::NotFound(
            "Contract details not found".to_string(),
        ));
    }
    Ok(details)
}

/// Full platform description of a contract.
pub async fn contract_details(
    session: &SessionManager,
    contract: Contract,
    timeout_ms: Option<u64>,
) -> AdapterResult<ContractDetailsResponse> {
    let handle = connected(session)?;
    let details = details(&handle, contract, deadline(timeout_ms)).await?;
    Ok(ContractDetailsResponse {
        count: details.len(),
        details,
    })
}

/// Fundamental data report for a contract.
pub async fn fundamental_data(
    session: &SessionManager,
    request: FundamentalDataRequest,
) -> AdapterResult<FundamentalDataResponse> {
    let handle = connected(session)?;
    request.contract.validate().map_err(AdapterError::Invalid)?;

    let symbol = request.contract.symbol.clone();
    let report_type = request.report_type.clone();
    let reply = handle
        .request(
            |req_id| Command::FundamentalData {
                req_id,
                contract: request.contract,
                report_type: request.report_type,
            },
            deadline(request.timeout_ms),
        )
        .await?;

    let data = collect(reply, |payload| match payload {
        Payload::FundamentalData { xml } => Some(xml),
        _ => None,
    })
    .into_iter()
    .next()
    .ok_or_else(|| AdapterError::NotFound(format!("No {} report for {}", report_type, symbol)))?;

    Ok(FundamentalDataResponse {
        symbol,
        report_type,
        data,
    })
}

/// Historical headlines for a contract.
///
/// A contract without `con_id` is looked up first.
pub async fn news(session: &SessionManager, request: NewsRequest) -> AdapterResult<NewsResponse> {
    let handle = connected(session)?;
    let timeout = deadline(request.timeout_ms);

    let con_id = match request.contract.con_id {
        Some(con_id) => con_id,
        None => details(&handle, request.contract.clone(), timeout)
            .await?
            .into_iter()
            .find_map(|d| d.contract.con_id)
            .ok_or_else(|| {
                AdapterError::NotFound(format!(
                    "No contract id for {}",
                    request.contract.symbol
                ))
            })?,
    };
    debug!("Requesting news for con_id {}", con_id);

    let reply = handle
        .request(
            |req_id| Command::HistoricalNews {
                req_id,
                con_id,
                provider_codes: request.provider_codes,
                start_time: request.start_time,
                end_time: request.end_time,
                total_results: request.total_results,
            },
            timeout,
        )
        .await?;
    let headlines = collect(reply, |payload| match payload {
        Payload::News(headline) => Some(headline),
        _ => None,
    });
    Ok(NewsResponse {
        count: headlines.len(),
        headlines,
    })
}

/// Runs a market scanner once.
///
/// An empty result usually means invalid parameters and is reported as such.
pub async fn scan(session: &SessionManager, request: ScanRequest) -> AdapterResult<ScanResponse> {
    let handle = connected(session)?;
    if request.number_of_rows == 0 {
        return Err(AdapterError::Invalid(
            "number_of_rows must be positive".to_string(),
        ));
    }
    let params = ScannerParams::from(&request);
    let reply = handle
        .request(
            |req_id| Command::Scanner { req_id, params },
            deadline(request.timeout_ms),
        )
        .await?;

    let results = collect(reply, |payload| match payload {
        Payload::ScanItem(item) => Some(item),
        _ => None,
    });
    if results.is_empty() {
        return Err(AdapterError::Invalid(
            "Scanner request failed - invalid parameters or no results".to_string(),
        ));
    }
    info!("Scanner {} returned {} rows", request.scan_code, results.len());
    Ok(ScanResponse {
        count: results.len(),
        results,
    })
}

/// The platform's scanner parameter document.
pub async fn scanner_parameters(
    session: &SessionManager,
    timeout_ms: Option<u64>,
) -> AdapterResult<ScannerParametersResponse> {
    let handle = connected(session)?;
    let reply = handle
        .request(
            |req_id| Command::ScannerParameters { req_id },
            deadline(timeout_ms),
        )
        .await?;
    let parameters = collect(reply, |payload| match payload {
        Payload::ScannerParameters { xml } => Some(xml),
        _ => None,
    })
    .concat();
    Ok(ScannerParametersResponse { parameters })
}
