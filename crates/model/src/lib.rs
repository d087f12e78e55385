//! Venue-neutral market data types shared across the workspace.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Exchange {
    Probit,
}

impl Exchange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Exchange::Probit => "probit",
        }
    }
}

/// One side of a book as `(price, size)` pairs.
pub type Levels = Vec<(Decimal, Decimal)>;

/// Full point-in-time order book for one trading pair.
///
/// `update_id` is the version token: a venue sequence number when the venue
/// provides one, otherwise the request-issue time in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub trading_pair: String,
    pub bids: Levels,
    pub asks: Levels,
    pub update_id: u64,
}

/// Incremental book update covering `first_update_id..=update_id`.
///
/// A zero size removes the level at that price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookDiff {
    pub trading_pair: String,
    pub bids: Levels,
    pub asks: Levels,
    pub first_update_id: u64,
    pub update_id: u64,
}

/// Per-asset account balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub free: Decimal,
    pub total: Decimal,
}

/// Venue limits for one trading pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingRule {
    pub trading_pair: String,
    pub min_order_size: Decimal,
    pub max_order_size: Decimal,
    pub min_price_increment: Decimal,
    pub min_base_amount_increment: Decimal,
}

impl TradingRule {
    /// Build a rule from a digit-count quantity precision (`2` means `0.01`).
    pub fn with_quantity_precision(
        trading_pair: impl Into<String>,
        min_order_size: Decimal,
        max_order_size: Decimal,
        min_price_increment: Decimal,
        quantity_precision: u32,
    ) -> Self {
        Self {
            trading_pair: trading_pair.into(),
            min_order_size,
            max_order_size,
            min_price_increment,
            min_base_amount_increment: precision_to_increment(quantity_precision),
        }
    }

    /// Round a price down to the price increment.
    pub fn quantize_price(&self, price: Decimal) -> Decimal {
        floor_to_increment(price, self.min_price_increment)
    }

    /// Round an amount down to the base amount increment.
    pub fn quantize_amount(&self, amount: Decimal) -> Decimal {
        floor_to_increment(amount, self.min_base_amount_increment)
    }

    /// Whether a (quantized) amount lies within the order size limits.
    pub fn accepts_amount(&self, amount: Decimal) -> bool {
        amount >= self.min_order_size && amount <= self.max_order_size
    }
}

/// Maker and taker fees as percentages of the quote amount (`0.2` means 0.2%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingFees {
    pub maker_pct: Decimal,
    pub taker_pct: Decimal,
}

impl TradingFees {
    pub fn new(maker_pct: Decimal, taker_pct: Decimal) -> Self {
        Self {
            maker_pct,
            taker_pct,
        }
    }

    pub fn pct(&self, is_maker: bool) -> Decimal {
        if is_maker {
            self.maker_pct
        } else {
            self.taker_pct
        }
    }

    /// Fee in quote currency for trading `amount` at `price`.
    pub fn quote_fee(&self, is_maker: bool, amount: Decimal, price: Decimal) -> Decimal {
        amount * price * self.pct(is_maker) / Decimal::ONE_HUNDRED
    }
}

/// `10^-precision`. Precisions beyond what `Decimal` can represent saturate at 28.
pub fn precision_to_increment(precision: u32) -> Decimal {
    Decimal::new(1, precision.min(28))
}

fn floor_to_increment(value: Decimal, increment: Decimal) -> Decimal {
    if increment <= Decimal::ZERO {
        return value;
    }
    (value / increment).floor() * increment
}
