//! Per-pair book assembly from snapshots and optional diffs.
//!
//! Protocol:
//! 1. Snapshots replace the book wholesale when their version is strictly newer
//! 2. Diffs that connect to the frontier (`first <= last+1 <= final`) are applied
//! 3. Diffs that arrive before the first snapshot, or after a gap, are buffered
//!    in a bounded window (oldest dropped first)
//! 4. The next accepted snapshot replays buffered diffs newer than its version,
//!    stopping at the first gap

use std::collections::{HashMap, VecDeque};

use model::{BookDiff, BookSnapshot};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::book::OrderBook;
use crate::level::PriceLevel;

/// Default number of diffs kept per pair while waiting for a snapshot.
pub const DEFAULT_DIFF_WINDOW: usize = 1000;

/// Outcome of [`BookAssembler::apply_snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// Book replaced. `replayed` buffered diffs were applied on top.
    Applied { replayed: usize, in_sync: bool },
    /// Version was not newer than the current book; nothing changed.
    Stale { current: u64 },
}

/// Outcome of [`BookAssembler::apply_diff`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOutcome {
    Applied,
    /// Held until the next snapshot.
    Buffered,
    /// Already covered by the current book.
    Stale,
    /// Did not connect to the frontier; buffered and a fresh snapshot is needed.
    Gap,
}

#[derive(Debug)]
struct PairState {
    book: Option<OrderBook>,
    pending: VecDeque<BookDiff>,
    /// Set after a gap until a snapshot brings the book back in line.
    resync: bool,
}

impl PairState {
    fn new() -> Self {
        Self {
            book: None,
            pending: VecDeque::new(),
            resync: false,
        }
    }
}

/// Order-book assembler for many trading pairs.
///
/// Readers never observe a half-applied snapshot: the replacement book is
/// built before the write lock is taken.
#[derive(Debug)]
pub struct BookAssembler {
    pairs: RwLock<HashMap<String, PairState>>,
    diff_window: usize,
}

impl Default for BookAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_DIFF_WINDOW)
    }
}

impl BookAssembler {
    pub fn new(diff_window: usize) -> Self {
        Self {
            pairs: RwLock::new(HashMap::new()),
            diff_window: diff_window.max(1),
        }
    }

    /// Replace the book for `snapshot.trading_pair` if the snapshot is newer.
    pub fn apply_snapshot(&self, snapshot: &BookSnapshot) -> SnapshotOutcome {
        let mut fresh = OrderBook::from_snapshot(snapshot);

        let mut pairs = self.pairs.write();
        let state = pairs
            .entry(snapshot.trading_pair.clone())
            .or_insert_with(PairState::new);

        if let Some(book) = state.book.as_ref().filter(|book| book.is_stale(snapshot.update_id)) {
            let current = book.update_id();
            debug!(
                symbol = %snapshot.trading_pair,
                current,
                received = snapshot.update_id,
                "stale snapshot ignored"
            );
            return SnapshotOutcome::Stale { current };
        }

        let mut replayed = 0;
        let mut in_sync = true;
        while let Some(diff) = state.pending.pop_front() {
            match fresh.apply_diff(&diff) {
                Ok(true) => replayed += 1,
                Ok(false) => {}
                Err(_) => {
                    state.pending.push_front(diff);
                    in_sync = false;
                    break;
                }
            }
        }

        state.book = Some(fresh);
        state.resync = !in_sync;

        if replayed > 0 || !in_sync {
            info!(
                symbol = %snapshot.trading_pair,
                update_id = snapshot.update_id,
                replayed,
                in_sync,
                "snapshot applied with buffered diffs"
            );
        }

        SnapshotOutcome::Applied { replayed, in_sync }
    }

    /// Apply an incremental update, buffering it when it cannot be applied yet.
    pub fn apply_diff(&self, diff: BookDiff) -> DiffOutcome {
        let mut pairs = self.pairs.write();
        let state = pairs
            .entry(diff.trading_pair.clone())
            .or_insert_with(PairState::new);

        let book = match state.book.as_mut() {
            Some(book) if !state.resync => book,
            _ => {
                Self::buffer(state, diff, self.diff_window);
                return DiffOutcome::Buffered;
            }
        };

        match book.apply_diff(&diff) {
            Ok(true) => DiffOutcome::Applied,
            Ok(false) => DiffOutcome::Stale,
            Err(_) => {
                state.resync = true;
                Self::buffer(state, diff, self.diff_window);
                DiffOutcome::Gap
            }
        }
    }

    fn buffer(state: &mut PairState, diff: BookDiff, window: usize) {
        if state.pending.len() >= window {
            if let Some(dropped) = state.pending.pop_front() {
                warn!(
                    symbol = %dropped.trading_pair,
                    update_id = dropped.update_id,
                    window,
                    "diff window full, dropping oldest buffered diff"
                );
            }
        }
        state.pending.push_back(diff);
    }

    /// Forget a pair entirely.
    pub fn remove(&self, trading_pair: &str) {
        self.pairs.write().remove(trading_pair);
    }

    pub fn best_bid(&self, trading_pair: &str) -> Option<PriceLevel> {
        self.with_book(trading_pair, OrderBook::best_bid)
    }

    pub fn best_ask(&self, trading_pair: &str) -> Option<PriceLevel> {
        self.with_book(trading_pair, OrderBook::best_ask)
    }

    pub fn mid_price(&self, trading_pair: &str) -> Option<rust_decimal::Decimal> {
        self.with_book(trading_pair, OrderBook::mid_price)
    }

    /// Full copy of the current book.
    pub fn snapshot(&self, trading_pair: &str) -> Option<BookSnapshot> {
        self.with_book(trading_pair, |book| Some(book.to_snapshot()))
    }

    pub fn update_id(&self, trading_pair: &str) -> Option<u64> {
        self.with_book(trading_pair, |book| Some(book.update_id()))
    }

    /// Number of diffs waiting for a snapshot.
    pub fn pending_diffs(&self, trading_pair: &str) -> usize {
        self.pairs
            .read()
            .get(trading_pair)
            .map_or(0, |state| state.pending.len())
    }

    /// Whether the pair lost sync and needs a fresh snapshot.
    pub fn needs_snapshot(&self, trading_pair: &str) -> bool {
        self.pairs
            .read()
            .get(trading_pair)
            .map_or(true, |state| state.book.is_none() || state.resync)
    }

    /// Whether every listed pair has a book.
    pub fn all_initialized<'a>(&self, pairs: impl IntoIterator<Item = &'a str>) -> bool {
        let books = self.pairs.read();
        pairs
            .into_iter()
            .all(|pair| books.get(pair).is_some_and(|state| state.book.is_some()))
    }

    fn with_book<T>(&self, trading_pair: &str, f: impl FnOnce(&OrderBook) -> Option<T>) -> Option<T> {
        let pairs = self.pairs.read();
        pairs.get(trading_pair)?.book.as_ref().and_then(f)
    }
}
