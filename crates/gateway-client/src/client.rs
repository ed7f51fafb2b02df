//! HTTP client for the gateway API.

use crate::error::Error;
use crate::types::*;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use url::Url;


/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the gateway (e.g., "http://localhost:8000").
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP client for the Broker Gateway API.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
}

impl GatewayClient {
    /// Creates a new client with the given configuration.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Creates a new client for `base_url` with the default timeout.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn with_base_url(base_url: &str) -> Result<Self, Error> {
        Self::new(ClientConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        })
    }

    /// Base URL without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// WebSocket URL of the gateway stream endpoint.
    ///
    /// # Errors
    /// Returns error if the base URL is not an http(s) URL.
    pub fn ws_url(&self) -> Result<String, Error> {
        let mut url = Url::parse(&self.base_url)?;
        let scheme = match url.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => {
                return Err(Error::InvalidRequest(format!(
                    "unsupported scheme: {}",
                    other
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| Error::InvalidRequest("cannot build WebSocket URL".to_string()))?;
        url.path_segments_mut()
            .map_err(|_| Error::InvalidRequest("base URL cannot have a path".to_string()))?
            .pop_if_empty()
            .push("ws");
        Ok(url.to_string())
    }

    // ========================================================================
    // Health & Session
    // ========================================================================

    /// Performs a health check.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn health_check(&self) -> Result<HealthResponse, Error> {
        let url = format!("{}/health", self.base_url);
        let resp = self.client.get(&url).send().await?;
        self.handle_response(resp).await
    }

    /// Checks readiness. A 503 answer is still a readiness report.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn ready(&self) -> Result<ReadyResponse, Error> {
        let url = format!("{}/ready", self.base_url);
        let resp = self.client.get(&url).send().await?;
        if resp.status().as_u16() == 503 {
            let text = resp.text().await?;
            return Ok(serde_json::from_str(&text)?);
        }
        self.handle_response(resp).await
    }

    /// Gets the session status.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn session_status(&self) -> Result<SessionStatus, Error> {
        let url = format!("{}/api/v1/session", self.base_url);
        let resp = self.client.get(&url).send().await?;
        self.handle_response(resp).await
    }

    /// Connects the session.
    ///
    /// # Errors
    /// Returns error if the request fails or the platform cannot be reached.
    pub async fn connect_session(&self) -> Result<SessionActionResponse, Error> {
        let url = format!("{}/api/v1/session/connect", self.base_url);
        let resp = self.client.post(&url).send().await?;
        self.handle_response(resp).await
    }

    /// Disconnects the session.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn disconnect_session(&self) -> Result<SessionActionResponse, Error> {
        let url = format!("{}/api/v1/session/disconnect", self.base_url);
        let resp = self.client.post(&url).send().await?;
        self.handle_response(resp).await
    }

    // ========================================================================
    // Account
    // ========================================================================

    /// Lists managed accounts.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn managed_accounts(&self) -> Result<ManagedAccountsResponse, Error> {
        let url = format!("{}/api/v1/account/managed-accounts", self.base_url);
        let resp = self.client.get(&url).send().await?;
        self.handle_response(resp).await
    }

    /// Gets key account metrics.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn account_summary(
        &self,
        query: &AccountQuery,
    ) -> Result<AccountSummaryResponse, Error> {
        let url = self.with_query("/api/v1/account/summary", query);
        let resp = self.client.get(&url).send().await?;
        self.handle_response(resp).await
    }

    /// Gets every account value.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn account_values(
        &self,
        query: &AccountQuery,
    ) -> Result<AccountValuesResponse, Error> {
        let url = self.with_query("/api/v1/account/values", query);
        let resp = self.client.get(&url).send().await?;
        self.handle_response(resp).await
    }

    /// Gets positions.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn positions(&self, query: &AccountQuery) -> Result<PositionsResponse, Error> {
        let url = self.with_query("/api/v1/account/positions", query);
        let resp = self.client.get(&url).send().await?;
        self.handle_response(resp).await
    }

    /// Gets the portfolio.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn portfolio(&self, query: &AccountQuery) -> Result<PortfolioResponse, Error> {
        let url = self.with_query("/api/v1/account/portfolio", query);
        let resp = self.client.get(&url).send().await?;
        self.handle_response(resp).await
    }

    /// Starts or joins an account update stream.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn subscribe_account_updates(
        &self,
        request: &AccountUpdatesRequest,
    ) -> Result<SubscribeResponse, Error> {
        let url = format!("{}/api/v1/account/updates/subscribe", self.base_url);
        let resp = self.client.post(&url).json(request).send().await?;
        self.handle_response(resp).await
    }

    // ========================================================================
    // Trading
    // ========================================================================

    /// Resolves a contract to its platform definitions.
    ///
    /// # Errors
    /// Returns error if the request fails or the contract is unknown.
    pub async fn qualify_contract(&self, contract: Contract) -> Result<ContractsResponse, Error> {
        let url = format!("{}/api/v1/trading/contract/qualify", self.base_url);
        let request = ContractRequest {
            contract,
            timeout_ms: None,
        };
        let resp = self.client.post(&url).json(&request).send().await?;
        self.handle_response(resp).await
    }

    /// Places an order.
    ///
    /// # Errors
    /// Returns error if the request fails or the platform rejects the order.
    pub async fn place_order(
        &self,
        request: &PlaceOrderRequest,
    ) -> Result<PlaceOrderResponse, Error> {
        let url = format!("{}/api/v1/trading/orders/place", self.base_url);
        let resp = self.client.post(&url).json(request).send().await?;
        self.handle_response(resp).await
    }

    /// Cancels an order.
    ///
    /// # Errors
    /// Returns error if the request fails or the platform rejects the cancel.
    pub async fn cancel_order(&self, order_id: i64) -> Result<CancelOrderResponse, Error> {
        let url = format!("{}/api/v1/trading/orders/cancel", self.base_url);
        let request = CancelOrderRequest {
            order_id,
            timeout_ms: None,
        };
        let resp = self.client.post(&url).json(&request).send().await?;
        self.handle_response(resp).await
    }

    /// Lists open orders of this session.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn open_orders(&self, query: &TimeoutQuery) -> Result<OrdersResponse, Error> {
        let url = self.with_query("/api/v1/trading/orders/open", query);
        let resp = self.client.get(&url).send().await?;
        self.handle_response(resp).await
    }

    /// Lists open orders of every client.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn all_orders(&self, query: &TimeoutQuery) -> Result<OrdersResponse, Error> {
        let url = self.with_query("/api/v1/trading/orders/all", query);
        let resp = self.client.get(&url).send().await?;
        self.handle_response(resp).await
    }

    /// Lists today's executions.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn executions(&self, query: &TimeoutQuery) -> Result<ExecutionsResponse, Error> {
        let url = self.with_query("/api/v1/trading/executions", query);
        let resp = self.client.get(&url).send().await?;
        self.handle_response(resp).await
    }

    // ========================================================================
    // Market Data
    // ========================================================================

    /// Fetches historical bars.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn historical_bars(
        &self,
        request: &HistoricalBarsRequest,
    ) -> Result<BarsResponse, Error> {
        let url = format!("{}/api/v1/market-data/historical-bars", self.base_url);
        let resp = self.client.post(&url).json(request).send().await?;
        self.handle_response(resp).await
    }

    /// Starts or joins a ticker stream.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn subscribe_ticker(
        &self,
        request: &TickerSubscribeRequest,
    ) -> Result<SubscribeResponse, Error> {
        let url = format!("{}/api/v1/market-data/ticker/subscribe", self.base_url);
        let resp = self.client.post(&url).json(request).send().await?;
        self.handle_response(resp).await
    }

    /// Starts or joins a 5-second bar stream.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn subscribe_realtime_bars(
        &self,
        request: &RealTimeBarsSubscribeRequest,
    ) -> Result<SubscribeResponse, Error> {
        let url = format!(
            "{}/api/v1/market-data/realtime-bars/subscribe",
            self.base_url
        );
        let resp = self.client.post(&url).json(request).send().await?;
        self.handle_response(resp).await
    }

    /// Lists live subscriptions.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn list_subscriptions(&self) -> Result<SubscriptionsResponse, Error> {
        let url = format!("{}/api/v1/market-data/subscriptions", self.base_url);
        let resp = self.client.get(&url).send().await?;
        self.handle_response(resp).await
    }

    /// Gets the cached value of a feed.
    ///
    /// # Errors
    /// Returns error if the request fails or the key is unknown.
    pub async fn snapshot(&self, key: &str) -> Result<SnapshotResponse, Error> {
        let url = self.subscription_url(key, &["snapshot"])?;
        let resp = self.client.get(url).send().await?;
        self.handle_response(resp).await
    }

    /// Releases a subscriber's claim on a feed.
    ///
    /// # Errors
    /// Returns error if the request fails or the subscriber holds no claim.
    pub async fn unsubscribe(
        &self,
        key: &str,
        subscriber: &str,
    ) -> Result<UnsubscribeResponse, Error> {
        let mut url = self.subscription_url(key, &[])?;
        url.query_pairs_mut().append_pair("subscriber", subscriber);
        let resp = self.client.delete(url).send().await?;
        self.handle_response(resp).await
    }

    // ========================================================================
    // Research & Scanner
    // ========================================================================

    /// Gets full contract details.
    ///
    /// # Errors
    /// Returns error if the request fails or nothing matches.
    pub async fn contract_details(
        &self,
        contract: Contract,
    ) -> Result<ContractDetailsResponse, Error> {
        let url = format!("{}/api/v1/research/contract-details", self.base_url);
        let request = ContractRequest {
            contract,
            timeout_ms: None,
        };
        let resp = self.client.post(&url).json(&request).send().await?;
        self.handle_response(resp).await
    }

    /// Gets a fundamental data report.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn fundamental_data(
        &self,
        request: &FundamentalDataRequest,
    ) -> Result<FundamentalDataResponse, Error> {
        let url = format!("{}/api/v1/research/fundamental-data", self.base_url);
        let resp = self.client.post(&url).json(request).send().await?;
        self.handle_response(resp).await
    }

    /// Gets historical news headlines.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn news(&self, request: &NewsRequest) -> Result<NewsResponse, Error> {
        let url = format!("{}/api/v1/research/news", self.base_url);
        let resp = self.client.post(&url).json(request).send().await?;
        self.handle_response(resp).await
    }

    /// Runs a market scan.
    ///
    /// # Errors
    /// Returns error if the request fails or the scan has no results.
    pub async fn scan(&self, request: &ScanRequest) -> Result<ScanResponse, Error> {
        let url = format!("{}/api/v1/scanner/scan", self.base_url);
        let resp = self.client.post(&url).json(request).send().await?;
        self.handle_response(resp).await
    }

    /// Gets the scanner parameter document.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn scanner_parameters(&self) -> Result<ScannerParametersResponse, Error> {
        let url = format!("{}/api/v1/scanner/scanner-parameters", self.base_url);
        let resp = self.client.get(&url).send().await?;
        self.handle_response(resp).await
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn with_query<Q: Serialize>(&self, path: &str, query: &Q) -> String {
        let mut url = format!("{}{}", self.base_url, path);
        let params = serde_urlencoded::to_string(query).unwrap_or_default();
        if !params.is_empty() {
            url.push_str(&format!("?{}", params));
        }
        url
    }

    /// Subscription keys contain `:` and contract signatures, so they are
    /// pushed as escaped path segments.
    fn subscription_url(&self, key: &str, suffix: &[&str]) -> Result<Url, Error> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| Error::InvalidRequest("base URL cannot have a path".to_string()))?
            .pop_if_empty()
            .extend(["api", "v1", "market-data", "subscriptions", key])
            .extend(suffix);
        Ok(url)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, Error> {
        let status = resp.status();

        if status.is_success() {
            Ok(resp.json().await?)
        } else {
            let text = resp.text().await.unwrap_or_default();
            Err(Error::from_response(status.as_u16(), &text))
        }
    }
}
