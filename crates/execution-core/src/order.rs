//! Order enums and the tracked-order record.

use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
}

/// Local lifecycle state of a tracked order.
///
/// `PendingCreate -> Open <-> PartiallyFilled -> Filled`, or `-> Cancelled`, or `-> Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderState {
    /// Submission issued, no venue confirmation yet.
    PendingCreate,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderState {
    /// No further transitions happen from a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

/// Order status as reported by a venue, already mapped from its literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VenueOrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

/// Parameters for a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: String,
    pub trading_pair: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub amount: Decimal,
    /// Limit price; `None` for market orders.
    pub price: Option<Decimal>,
}

/// Identity of an order for status queries and cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRef {
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub trading_pair: String,
}

/// An in-flight order and everything reconciled into it so far.
///
/// Executed amounts only grow, and each trade id is applied at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedOrder {
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub trading_pair: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub amount: Decimal,
    pub executed_base: Decimal,
    pub executed_quote: Decimal,
    pub fee_asset: Option<String>,
    pub fee_paid: Decimal,
    pub state: OrderState,
    /// Last status the venue reported; repeated reports are ignored.
    pub last_venue_status: Option<VenueOrderStatus>,
    pub applied_trade_ids: HashSet<String>,
    /// Whether the completion event has gone out.
    pub completed: bool,
    pub created_at_ms: i64,
    /// Consecutive status polls where the venue did not know the order.
    #[serde(default)]
    pub not_found_polls: u32,
    /// When the venue reported `Filled` before trades covered the amount.
    #[serde(default)]
    pub filled_at_ms: Option<i64>,
}

impl TrackedOrder {
    /// A freshly submitted order in `PendingCreate`.
    pub fn new(request: &OrderRequest, created_at_ms: i64) -> Self {
        Self {
            client_order_id: request.client_order_id.clone(),
            exchange_order_id: None,
            trading_pair: request.trading_pair.clone(),
            side: request.side,
            order_type: request.order_type,
            price: request.price,
            amount: request.amount,
            executed_base: Decimal::ZERO,
            executed_quote: Decimal::ZERO,
            fee_asset: None,
            fee_paid: Decimal::ZERO,
            state: OrderState::PendingCreate,
            last_venue_status: None,
            applied_trade_ids: HashSet::new(),
            completed: false,
            created_at_ms,
            not_found_polls: 0,
            filled_at_ms: None,
        }
    }

    pub fn remaining(&self) -> Decimal {
        (self.amount - self.executed_base).max(Decimal::ZERO)
    }

    /// Trade fills cover the whole requested amount.
    pub fn is_fully_executed(&self) -> bool {
        self.executed_base >= self.amount
    }

    /// Average execution price, if anything executed.
    pub fn average_price(&self) -> Option<Decimal> {
        if self.executed_base.is_zero() {
            None
        } else {
            Some(self.executed_quote / self.executed_base)
        }
    }

    pub fn order_ref(&self) -> OrderRef {
        OrderRef {
            client_order_id: self.client_order_id.clone(),
            exchange_order_id: self.exchange_order_id.clone(),
            trading_pair: self.trading_pair.clone(),
        }
    }
}
