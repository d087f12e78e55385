//! Venue reconciliation: a local mirror of one venue kept in sync by polling.
//!
//! [`VenueMarket`] owns the tracked orders, trade watermarks, order books,
//! trading rules and balances, and exposes one poll operation per concern.
//! [`PollScheduler`] runs those operations on independent loops.
//!
//! # Example
//!
//! ```rust,ignore
//! let market = Arc::new(VenueMarket::new(client, pairs, &config, events_tx, metrics));
//! let scheduler = PollScheduler::new(market.clone(), config, StreamHeartbeat::shared());
//! tokio::spawn(scheduler.run(shutdown_rx));
//! ```

mod config;
mod error;
mod market;
mod poll;
mod scheduler;

#[cfg(test)]
mod testing;

pub use config::SchedulerConfig;
pub use error::MarketError;
pub use market::{FeeEstimate, MarketStatus, NetworkStatus, VenueMarket};
pub use poll::{Concern, PollFailure, PollReport};
pub use scheduler::{fill_poll_interval, PollScheduler};
