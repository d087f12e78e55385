//! ProBit literals and response conversion into shared types.

use chrono::{DateTime, SecondsFormat, Utc};
use connector_core::VenueError;
use execution_core::{FillReport, OrderSide, OrderStatusReport, OrderType, VenueOrderStatus};
use model::{Balance, BookSnapshot, Levels, TradingRule};
use rust_decimal::Decimal;

use crate::responses::{BalanceEntry, MarketEntry, OrderBookEntry, OrderEntry, TradeHistoryEntry};

/// Only settled trades count as fills.
const SETTLED: &str = "settled";

pub fn side_literal(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "buy",
        OrderSide::Sell => "sell",
    }
}

pub fn order_type_literal(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Limit => "limit",
        OrderType::Market => "market",
    }
}

/// Limit orders rest on the book, market orders fill what they can.
pub fn time_in_force_literal(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Limit => "gtc",
        OrderType::Market => "ioc",
    }
}

/// ProBit only reports `open`; partial fills show up as a non-zero filled quantity.
pub fn order_status(status: &str, filled: Option<Decimal>) -> Result<VenueOrderStatus, VenueError> {
    match status {
        "open" if filled.is_some_and(|f| f > Decimal::ZERO) => Ok(VenueOrderStatus::PartiallyFilled),
        "open" => Ok(VenueOrderStatus::Open),
        "filled" => Ok(VenueOrderStatus::Filled),
        "cancelled" => Ok(VenueOrderStatus::Cancelled),
        "rejected" => Ok(VenueOrderStatus::Rejected),
        other => Err(VenueError::Parse(format!("unknown order status `{other}`"))),
    }
}

/// API timestamp format, e.g. `2021-03-02T10:11:12.345Z`.
pub fn format_time(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn book_snapshot(trading_pair: &str, entries: Vec<OrderBookEntry>, update_id: u64) -> BookSnapshot {
    let mut bids: Levels = Vec::new();
    let mut asks: Levels = Vec::new();
    for entry in entries {
        match entry.side.as_str() {
            "buy" => bids.push((entry.price, entry.quantity)),
            "sell" => asks.push((entry.price, entry.quantity)),
            _ => {}
        }
    }
    BookSnapshot {
        trading_pair: trading_pair.to_string(),
        bids,
        asks,
        update_id,
    }
}

/// Settled trades only.
pub fn fills(entries: Vec<TradeHistoryEntry>) -> Vec<FillReport> {
    entries
        .into_iter()
        .filter(|trade| trade.status == SETTLED)
        .map(|trade| FillReport {
            trade_id: trade.id,
            exchange_order_id: trade.order_id,
            trading_pair: trade.market_id,
            price: trade.price,
            quantity: trade.quantity,
            fee_asset: trade.fee_currency_id.to_uppercase(),
            fee_amount: trade.fee_amount,
            timestamp_ms: trade.time.timestamp_millis(),
        })
        .collect()
}

pub fn status_report(
    client_order_id: &str,
    entry: OrderEntry,
    now_ms: i64,
) -> Result<OrderStatusReport, VenueError> {
    let status = order_status(&entry.status, entry.filled_quantity)?;
    Ok(OrderStatusReport {
        client_order_id: entry
            .client_order_id
            .unwrap_or_else(|| client_order_id.to_string()),
        exchange_order_id: Some(entry.id),
        trading_pair: entry.market_id,
        status,
        reported_filled: entry.filled_quantity.unwrap_or_default(),
        timestamp_ms: now_ms,
    })
}

pub fn balance(entry: BalanceEntry) -> Balance {
    Balance {
        asset: entry.currency_id.to_uppercase(),
        free: entry.available,
        total: entry.total,
    }
}

pub fn trading_rule(entry: MarketEntry) -> TradingRule {
    TradingRule::with_quantity_precision(
        entry.id,
        entry.min_quantity,
        entry.max_quantity,
        entry.price_increment,
        entry.quantity_precision,
    )
}
