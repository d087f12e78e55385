//! Lifecycle events published for tracked orders.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::order::{OrderSide, OrderType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub client_order_id: String,
    pub exchange_order_id: String,
    pub trading_pair: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub amount: Decimal,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilled {
    pub client_order_id: String,
    pub exchange_order_id: String,
    pub trading_pair: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub trade_id: String,
    pub price: Decimal,
    pub amount: Decimal,
    pub fee_asset: String,
    pub fee_amount: Decimal,
    pub timestamp_ms: i64,
}

/// Emitted once per order, carrying the trade-derived totals at that moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCompleted {
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub trading_pair: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub base_amount: Decimal,
    pub quote_amount: Decimal,
    pub fee_asset: Option<String>,
    pub fee_paid: Decimal,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub trading_pair: String,
    pub executed_base: Decimal,
    pub executed_quote: Decimal,
    pub fee_paid: Decimal,
    pub timestamp_ms: i64,
}

/// Submission or venue rejection. Keeps the original order parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFailed {
    pub client_order_id: String,
    pub trading_pair: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub amount: Decimal,
    pub reason: String,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    Created(OrderCreated),
    Filled(OrderFilled),
    Completed(OrderCompleted),
    Cancelled(OrderCancelled),
    Failed(OrderFailed),
}

impl OrderEvent {
    pub fn client_order_id(&self) -> &str {
        match self {
            Self::Created(e) => &e.client_order_id,
            Self::Filled(e) => &e.client_order_id,
            Self::Completed(e) => &e.client_order_id,
            Self::Cancelled(e) => &e.client_order_id,
            Self::Failed(e) => &e.client_order_id,
        }
    }

    pub fn trading_pair(&self) -> &str {
        match self {
            Self::Created(e) => &e.trading_pair,
            Self::Filled(e) => &e.trading_pair,
            Self::Completed(e) => &e.trading_pair,
            Self::Cancelled(e) => &e.trading_pair,
            Self::Failed(e) => &e.trading_pair,
        }
    }

    /// Short event name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Filled(_) => "filled",
            Self::Completed(_) => "completed",
            Self::Cancelled(_) => "cancelled",
            Self::Failed(_) => "failed",
        }
    }
}

/// Per-order outcome of a bulk cancel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationResult {
    pub client_order_id: String,
    pub success: bool,
}
