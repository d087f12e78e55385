//! Local order books assembled from venue snapshots and diffs.
//!
//! [`OrderBook`] keeps sorted levels for one pair; [`BookAssembler`] owns the
//! books for all pairs and enforces the version and replay rules.
//!
//! # Example
//!
//! ```rust
//! use model::BookSnapshot;
//! use orderbook::{BookAssembler, SnapshotOutcome};
//! use rust_decimal_macros::dec;
//!
//! let assembler = BookAssembler::default();
//! let snapshot = BookSnapshot {
//!     trading_pair: "ETH-USDT".to_string(),
//!     bids: vec![(dec!(100.0), dec!(1.0))],
//!     asks: vec![(dec!(101.0), dec!(1.5))],
//!     update_id: 1000,
//! };
//!
//! assert!(matches!(assembler.apply_snapshot(&snapshot), SnapshotOutcome::Applied { .. }));
//! println!("Best bid: {:?}", assembler.best_bid("ETH-USDT"));
//! ```

mod assembler;
mod book;
mod error;
mod level;

pub use assembler::{BookAssembler, DiffOutcome, SnapshotOutcome, DEFAULT_DIFF_WINDOW};
pub use book::OrderBook;
pub use error::OrderBookError;
pub use level::PriceLevel;
