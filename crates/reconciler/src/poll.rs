//! Per-cycle poll results.

use std::fmt;
use std::time::Duration;

use connector_core::VenueError;

/// One independently scheduled polling concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Concern {
    TradingRules,
    Balances,
    OrderStatus,
    Trades,
    OrderBooks,
}

impl Concern {
    pub const ALL: [Concern; 5] = [
        Concern::TradingRules,
        Concern::Balances,
        Concern::OrderStatus,
        Concern::Trades,
        Concern::OrderBooks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Concern::TradingRules => "trading_rules",
            Concern::Balances => "balances",
            Concern::OrderStatus => "order_status",
            Concern::Trades => "trades",
            Concern::OrderBooks => "order_books",
        }
    }

    /// Order status and trade polls share the heartbeat-driven interval.
    pub fn is_order_data(&self) -> bool {
        matches!(self, Concern::OrderStatus | Concern::Trades)
    }
}

impl fmt::Display for Concern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed item: a trading pair, an order, or the whole request.
#[derive(Debug, Clone)]
pub struct PollFailure {
    pub scope: String,
    pub error: VenueError,
}

/// What one poll cycle did.
#[derive(Debug, Clone)]
pub struct PollReport {
    pub concern: Concern,
    /// Nothing to poll (no tracked orders); no request was issued.
    pub skipped: bool,
    pub requests: usize,
    /// Items that were fetched and applied.
    pub applied: usize,
    pub events: usize,
    pub failures: Vec<PollFailure>,
    /// Pairs whose trade poll returned exactly the fetch limit.
    pub truncated: Vec<String>,
}

impl PollReport {
    pub fn new(concern: Concern) -> Self {
        Self {
            concern,
            skipped: false,
            requests: 0,
            applied: 0,
            events: 0,
            failures: Vec::new(),
            truncated: Vec::new(),
        }
    }

    pub fn skipped(concern: Concern) -> Self {
        Self {
            skipped: true,
            ..Self::new(concern)
        }
    }

    pub fn fail(&mut self, scope: impl Into<String>, error: VenueError) {
        self.failures.push(PollFailure {
            scope: scope.into(),
            error,
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Every request issued failed.
    pub fn failed_entirely(&self) -> bool {
        !self.failures.is_empty() && self.failures.len() >= self.requests
    }

    pub fn is_rate_limited(&self) -> bool {
        self.failures.iter().any(|f| f.error.is_rate_limited())
    }

    /// Longest `Retry-After` hint among the failures.
    pub fn retry_after(&self) -> Option<Duration> {
        self.failures.iter().filter_map(|f| f.error.retry_after()).max()
    }
}
