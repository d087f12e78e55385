//! ProBit REST adapter.

use async_trait::async_trait;
use auth::{ApiCredentials, TokenCache};
use connector_core::{TradeWindow, VenueClient, VenueError};
use execution_core::{
    generate_bounded_client_order_id, CancelAck, FillReport, OrderRef, OrderRequest, OrderSide,
    OrderStatusReport, OrderType,
};
use model::{Balance, BookSnapshot, Exchange, TradingFees, TradingRule};
use rest_client::{RestClient, RestError};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ProbitConfig;
use crate::error::classify;
use crate::mapping;
use crate::responses::{
    BalanceEntry, CancelOrderRequest, DataResponse, MarketEntry, NewOrderRequest, OrderBookEntry,
    OrderEntry, TokenResponse, TradeHistoryEntry,
};

/// ProBit rejects client order ids longer than this.
pub const CLIENT_ORDER_ID_MAX_LEN: usize = 16;

const TOKEN_PATH: &str = "/token";

/// Authenticated ProBit client.
pub struct ProbitClient {
    rest: RestClient,
    accounts: RestClient,
    credentials: ApiCredentials,
    tokens: TokenCache,
    fees: TradingFees,
    /// Version stamped on the last book snapshot.
    last_book_version: AtomicU64,
}

impl ProbitClient {
    /// # Errors
    /// Returns an error if an HTTP client cannot be built.
    pub fn new(credentials: ApiCredentials, config: &ProbitConfig) -> Result<Self, RestError> {
        Ok(Self {
            rest: RestClient::new(&config.rest_url, config.request_timeout)?,
            accounts: RestClient::new(&config.accounts_url, config.request_timeout)?,
            credentials,
            tokens: TokenCache::default(),
            fees: config.fees,
            last_book_version: AtomicU64::new(0),
        })
    }

    pub fn api_key(&self) -> &str {
        self.credentials.api_key()
    }

    /// Snapshot version: the request time in ms, forced to grow strictly
    /// even if the clock stalls or steps back.
    fn next_book_version(&self) -> u64 {
        let now = u64::try_from(now_ms()).unwrap_or(0);
        let mut current = self.last_book_version.load(Ordering::Relaxed);
        loop {
            let next = now.max(current + 1);
            match self.last_book_version.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    // ========================================================================
    // Authentication
    // ========================================================================

    /// Cached bearer token, fetching a new one when it is close to expiry.
    ///
    /// POST {accounts}/token with basic auth (api key / secret).
    async fn token(&self) -> Result<String, VenueError> {
        if let Some(token) = self.tokens.current() {
            return Ok(token);
        }

        let body = serde_json::json!({ "grant_type": "client_credentials" });
        let response: TokenResponse = self
            .accounts
            .post_json_basic_auth(
                TOKEN_PATH,
                &body,
                self.credentials.api_key(),
                self.credentials.expose_secret(),
            )
            .await
            .map_err(classify)?;

        debug!(expires_in = response.expires_in, "Access token refreshed");
        Ok(self
            .tokens
            .store(response.access_token, Duration::from_secs(response.expires_in)))
    }

    /// Classify a failure, dropping the token when the venue refused it.
    fn fail(&self, err: RestError) -> VenueError {
        if err.status() == Some(401) {
            warn!("Access token rejected, will re-authenticate");
            self.tokens.invalidate();
        }
        classify(err)
    }

    async fn get_public<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<&str>,
    ) -> Result<T, VenueError> {
        let response: DataResponse<T> = self
            .rest
            .get(path, query, None)
            .await
            .map_err(|e| self.fail(e))?;
        Ok(response.data)
    }

    async fn get_private<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<&str>,
    ) -> Result<T, VenueError> {
        let bearer = format!("Bearer {}", self.token().await?);
        let headers = [("Authorization", bearer.as_str())];
        let response: DataResponse<T> = self
            .rest
            .get(path, query, Some(&headers))
            .await
            .map_err(|e| self.fail(e))?;
        Ok(response.data)
    }

    async fn post_private<T: DeserializeOwned, B: serde::Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, VenueError> {
        let bearer = format!("Bearer {}", self.token().await?);
        let headers = [("Authorization", bearer.as_str())];
        let response: DataResponse<T> = self
            .rest
            .post_json(path, body, Some(&headers))
            .await
            .map_err(|e| self.fail(e))?;
        Ok(response.data)
    }
}

#[async_trait]
impl VenueClient for ProbitClient {
    fn exchange(&self) -> Exchange {
        Exchange::Probit
    }

    fn new_client_order_id(&self, side: OrderSide, _trading_pair: &str) -> String {
        let prefix = match side {
            OrderSide::Buy => "B",
            OrderSide::Sell => "S",
        };
        generate_bounded_client_order_id(prefix, CLIENT_ORDER_ID_MAX_LEN)
    }

    fn trading_fees(&self) -> TradingFees {
        self.fees
    }

    /// GET /time
    async fn check_network(&self) -> Result<(), VenueError> {
        let _: serde_json::Value = self.get_public("/time", None).await?;
        Ok(())
    }

    // ========================================================================
    // Market Data
    // ========================================================================

    /// GET /order_book?market_id=
    async fn fetch_order_book(&self, trading_pair: &str) -> Result<BookSnapshot, VenueError> {
        let version = self.next_book_version();
        let query = format!("market_id={trading_pair}");
        let entries: Vec<OrderBookEntry> = self.get_public("/order_book", Some(&query)).await?;
        Ok(mapping::book_snapshot(trading_pair, entries, version))
    }

    /// GET /market
    ///
    /// Closed markets are skipped.
    async fn fetch_trading_rules(&self) -> Result<Vec<TradingRule>, VenueError> {
        let markets: Vec<MarketEntry> = self.get_public("/market", None).await?;
        Ok(markets
            .into_iter()
            .filter(|market| {
                if market.closed {
                    debug!(market = %market.id, "Skipping closed market");
                }
                !market.closed
            })
            .map(mapping::trading_rule)
            .collect())
    }

    // ========================================================================
    // Account
    // ========================================================================

    /// GET /trade_history?market_id=&start_time=&end_time=&limit=
    async fn fetch_recent_trades(
        &self,
        trading_pair: &str,
        window: TradeWindow,
    ) -> Result<Vec<FillReport>, VenueError> {
        let query = format!(
            "market_id={}&start_time={}&end_time={}&limit={}",
            trading_pair,
            mapping::format_time(window.since_ms.unwrap_or(0)),
            mapping::format_time(now_ms()),
            window.limit,
        );
        let trades: Vec<TradeHistoryEntry> =
            self.get_private("/trade_history", Some(&query)).await?;
        Ok(mapping::fills(trades))
    }

    /// GET /order?market_id=&order_id= (or client_order_id= before the venue id is known)
    async fn fetch_order_status(&self, order: &OrderRef) -> Result<OrderStatusReport, VenueError> {
        let query = match &order.exchange_order_id {
            Some(id) => format!("market_id={}&order_id={}", order.trading_pair, id),
            None => format!(
                "market_id={}&client_order_id={}",
                order.trading_pair, order.client_order_id
            ),
        };
        let entries: Vec<OrderEntry> = self.get_private("/order", Some(&query)).await?;
        let entry = entries.into_iter().next().ok_or_else(|| VenueError::Rejected {
            code: "ORDER_NOT_FOUND".into(),
            message: format!("no order {} on {}", order.client_order_id, order.trading_pair),
        })?;
        mapping::status_report(&order.client_order_id, entry, now_ms())
    }

    /// GET /balance
    async fn fetch_balances(&self) -> Result<Vec<Balance>, VenueError> {
        let entries: Vec<BalanceEntry> = self.get_private("/balance", None).await?;
        Ok(entries.into_iter().map(mapping::balance).collect())
    }

    // ========================================================================
    // Orders
    // ========================================================================

    /// POST /new_order
    ///
    /// Market buys are sized in base units like every other order.
    async fn submit_order(&self, request: &OrderRequest) -> Result<String, VenueError> {
        let limit_price = match (request.order_type, request.price) {
            (OrderType::Limit, Some(price)) => Some(price.normalize().to_string()),
            (OrderType::Limit, None) => {
                return Err(VenueError::rejected(
                    "MISSING_PRICE",
                    "limit order without a price",
                ))
            }
            (OrderType::Market, _) => None,
        };
        let body = NewOrderRequest {
            market_id: &request.trading_pair,
            side: mapping::side_literal(request.side),
            order_type: mapping::order_type_literal(request.order_type),
            quantity: request.amount.normalize().to_string(),
            client_order_id: &request.client_order_id,
            limit_price,
            time_in_force: mapping::time_in_force_literal(request.order_type),
        };
        let entry: OrderEntry = self.post_private("/new_order", &body).await?;
        debug!(
            client_order_id = %request.client_order_id,
            exchange_order_id = %entry.id,
            "Order accepted"
        );
        Ok(entry.id)
    }

    /// POST /cancel_order
    ///
    /// ProBit cancels by venue id only.
    async fn cancel_order(&self, order: &OrderRef) -> Result<CancelAck, VenueError> {
        let exchange_order_id = order.exchange_order_id.as_deref().ok_or_else(|| {
            VenueError::rejected(
                "NO_EXCHANGE_ID",
                format!("order {} has no venue id yet", order.client_order_id),
            )
        })?;
        let body = CancelOrderRequest {
            market_id: &order.trading_pair,
            order_id: exchange_order_id,
        };
        let entry: OrderEntry = self.post_private("/cancel_order", &body).await?;
        if entry.id != exchange_order_id {
            return Err(VenueError::Parse(format!(
                "cancel acknowledged order {} instead of {}",
                entry.id, exchange_order_id
            )));
        }
        Ok(CancelAck {
            client_order_id: order.client_order_id.clone(),
            exchange_order_id: Some(entry.id),
        })
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ProbitClient {
        ProbitClient::new(
            ApiCredentials::new("key".into(), "secret".into()),
            &ProbitConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_book_versions_strictly_increase() {
        let client = client();
        let first = client.next_book_version();
        let second = client.next_book_version();
        let third = client.next_book_version();
        assert!(first < second && second < third);
    }

    #[test]
    fn test_client_order_id_fits_venue_limit() {
        let client = client();
        let buy = client.new_client_order_id(OrderSide::Buy, "XRP-USDT");
        let sell = client.new_client_order_id(OrderSide::Sell, "XRP-USDT");
        assert_eq!(buy.len(), CLIENT_ORDER_ID_MAX_LEN);
        assert!(buy.starts_with('B'));
        assert!(sell.starts_with('S'));
        assert_ne!(buy, client.new_client_order_id(OrderSide::Buy, "XRP-USDT"));
    }

    #[test]
    fn test_unauthorized_drops_token() {
        let client = client();
        client.tokens.store("abc".into(), Duration::from_secs(900));
        let err = client.fail(RestError::HttpError {
            status: 401,
            message: String::new(),
        });
        assert!(err.is_retryable());
        assert!(client.tokens.current().is_none());
    }

    #[test]
    fn test_other_failures_keep_token() {
        let client = client();
        client.tokens.store("abc".into(), Duration::from_secs(900));
        let _ = client.fail(RestError::Timeout);
        assert_eq!(client.tokens.current().as_deref(), Some("abc"));
    }

    #[test]
    fn test_fees_come_from_config() {
        let fees = client().trading_fees();
        assert_eq!(fees, ProbitConfig::default().fees);
        assert_eq!(fees.maker_pct.to_string(), "0.2");
    }

    #[tokio::test]
    async fn test_cancel_without_exchange_id_is_rejected_locally() {
        let client = client();
        let order = OrderRef {
            client_order_id: "B1".into(),
            exchange_order_id: None,
            trading_pair: "XRP-USDT".into(),
        };
        let err = client.cancel_order(&order).await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
