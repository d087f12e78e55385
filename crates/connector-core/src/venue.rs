//! The request/response contract every venue adapter implements.

use async_trait::async_trait;
use execution_core::{
    generate_client_order_id, CancelAck, FillReport, OrderRef, OrderRequest, OrderSide,
    OrderStatusReport,
};
use model::{Balance, BookSnapshot, Exchange, TradingFees, TradingRule};

use crate::error::VenueError;

/// Which slice of trade history to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeWindow {
    /// Only trades at or after this time (ms since epoch). `None` means from the start.
    pub since_ms: Option<i64>,
    /// Maximum number of trades returned.
    pub limit: usize,
}

/// Authenticated access to one trading venue.
///
/// Adapters map venue literals and field names onto the shared types; nothing
/// venue-specific leaks past this trait.
#[async_trait]
pub trait VenueClient: Send + Sync {
    fn exchange(&self) -> Exchange;

    /// New unique client order id in the venue's accepted format.
    fn new_client_order_id(&self, side: OrderSide, _trading_pair: &str) -> String {
        let prefix = match side {
            OrderSide::Buy => "B",
            OrderSide::Sell => "S",
        };
        generate_client_order_id(prefix)
    }

    /// Full order book. The snapshot's `update_id` must grow between calls.
    async fn fetch_order_book(&self, trading_pair: &str) -> Result<BookSnapshot, VenueError>;

    /// Our own executed trades for a pair, newest first or in any order.
    async fn fetch_recent_trades(
        &self,
        trading_pair: &str,
        window: TradeWindow,
    ) -> Result<Vec<FillReport>, VenueError>;

    async fn fetch_order_status(&self, order: &OrderRef) -> Result<OrderStatusReport, VenueError>;

    async fn fetch_balances(&self) -> Result<Vec<Balance>, VenueError>;

    /// Submit an order, returning the venue's order id.
    async fn submit_order(&self, request: &OrderRequest) -> Result<String, VenueError>;

    async fn cancel_order(&self, order: &OrderRef) -> Result<CancelAck, VenueError>;

    async fn fetch_trading_rules(&self) -> Result<Vec<TradingRule>, VenueError>;

    /// Cheap unauthenticated round trip to see whether the venue answers.
    async fn check_network(&self) -> Result<(), VenueError>;

    /// Configured fee schedule for this account.
    fn trading_fees(&self) -> TradingFees;
}
