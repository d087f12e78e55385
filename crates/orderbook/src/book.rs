//! Order book with sorted price levels and a version token.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use model::{BookDiff, BookSnapshot, Levels};
use rust_decimal::Decimal;
use tracing::warn;

use crate::error::OrderBookError;
use crate::level::PriceLevel;

/// Local order book for one trading pair.
///
/// - Bids use `Reverse<Decimal>` keys so iteration yields the highest price first
/// - Asks use `Decimal` keys so iteration yields the lowest price first
///
/// A book only exists once a snapshot has been seen; `update_id` then only
/// moves forward.
#[derive(Debug, Clone)]
pub struct OrderBook {
    trading_pair: String,
    bids: BTreeMap<Reverse<Decimal>, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
    update_id: u64,
}

impl OrderBook {
    /// Builds a fully populated book from a snapshot.
    pub fn from_snapshot(snapshot: &BookSnapshot) -> Self {
        let mut book = Self {
            trading_pair: snapshot.trading_pair.clone(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            update_id: snapshot.update_id,
        };
        book.fill(&snapshot.bids, &snapshot.asks);
        book
    }

    pub fn trading_pair(&self) -> &str {
        &self.trading_pair
    }

    /// Version token of the last applied snapshot or diff.
    pub fn update_id(&self) -> u64 {
        self.update_id
    }

    /// Whether a snapshot with this version would be ignored.
    pub fn is_stale(&self, update_id: u64) -> bool {
        update_id <= self.update_id
    }

    /// Applies an incremental diff.
    ///
    /// Returns `Ok(false)` when the diff is entirely at or below the current
    /// version, and `SequenceGap` when it does not connect to the frontier.
    pub fn apply_diff(&mut self, diff: &BookDiff) -> Result<bool, OrderBookError> {
        let last_id = self.update_id;

        if diff.update_id <= last_id {
            return Ok(false);
        }

        let expected = last_id + 1;
        if diff.first_update_id > expected {
            warn!(
                symbol = %self.trading_pair,
                expected,
                got = diff.first_update_id,
                "sequence gap detected"
            );
            return Err(OrderBookError::SequenceGap {
                expected,
                actual: diff.first_update_id,
            });
        }

        for (price, size) in &diff.bids {
            if size.is_zero() {
                self.bids.remove(&Reverse(*price));
            } else {
                self.bids.insert(Reverse(*price), *size);
            }
        }
        for (price, size) in &diff.asks {
            if size.is_zero() {
                self.asks.remove(price);
            } else {
                self.asks.insert(*price, *size);
            }
        }

        self.update_id = diff.update_id;
        Ok(true)
    }

    fn fill(&mut self, bids: &[(Decimal, Decimal)], asks: &[(Decimal, Decimal)]) {
        for (price, size) in bids {
            if !size.is_zero() {
                self.bids.insert(Reverse(*price), *size);
            }
        }
        for (price, size) in asks {
            if !size.is_zero() {
                self.asks.insert(*price, *size);
            }
        }
    }

    /// Returns the best (highest) bid price level.
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids
            .iter()
            .next()
            .map(|(Reverse(price), qty)| PriceLevel::new(*price, *qty))
    }

    /// Returns the best (lowest) ask price level.
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks
            .iter()
            .next()
            .map(|(price, qty)| PriceLevel::new(*price, *qty))
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        let bid = self.best_bid()?;
        let ask = self.best_ask()?;
        Some((bid.price + ask.price) / Decimal::TWO)
    }

    pub fn spread(&self) -> Option<Decimal> {
        let bid = self.best_bid()?;
        let ask = self.best_ask()?;
        Some(ask.price - bid.price)
    }

    /// Returns the top N bid levels (highest to lowest).
    pub fn top_bids(&self, n: usize) -> Vec<PriceLevel> {
        self.bids
            .iter()
            .take(n)
            .map(|(Reverse(price), qty)| PriceLevel::new(*price, *qty))
            .collect()
    }

    /// Returns the top N ask levels (lowest to highest).
    pub fn top_asks(&self, n: usize) -> Vec<PriceLevel> {
        self.asks
            .iter()
            .take(n)
            .map(|(price, qty)| PriceLevel::new(*price, *qty))
            .collect()
    }

    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    /// Copies the full book out as a snapshot (bids descending, asks ascending).
    pub fn to_snapshot(&self) -> BookSnapshot {
        let bids: Levels = self.bids.iter().map(|(Reverse(p), q)| (*p, *q)).collect();
        let asks: Levels = self.asks.iter().map(|(p, q)| (*p, *q)).collect();
        BookSnapshot {
            trading_pair: self.trading_pair.clone(),
            bids,
            asks,
            update_id: self.update_id,
        }
    }
}
