//! Normalized venue reports consumed by the tracker.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::order::VenueOrderStatus;

/// One executed trade on one of our orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillReport {
    pub trade_id: String,
    pub exchange_order_id: String,
    pub trading_pair: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub fee_asset: String,
    pub fee_amount: Decimal,
    pub timestamp_ms: i64,
}

impl FillReport {
    pub fn quote_quantity(&self) -> Decimal {
        self.price * self.quantity
    }
}

/// Result of an order-status query.
///
/// Reported fill totals lag behind trade polls and are kept for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusReport {
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub trading_pair: String,
    pub status: VenueOrderStatus,
    pub reported_filled: Decimal,
    pub timestamp_ms: i64,
}

/// Venue acknowledgment of a cancel request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAck {
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
}
