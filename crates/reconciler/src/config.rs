//! Polling intervals and backoff settings.

use std::time::Duration;

/// Timing for the polling loops.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    // === Order status / trade history ===
    /// Order status and trade poll interval while the user stream is silent.
    pub short_poll_interval: Duration,
    /// Order status and trade poll interval while the user stream is alive.
    pub long_poll_interval: Duration,
    /// Stream silence after which the short interval applies.
    pub heartbeat_silence_threshold: Duration,

    // === Other concerns ===
    pub balance_interval: Duration,
    pub trading_rules_interval: Duration,
    pub order_book_interval: Duration,

    // === Failure handling ===
    /// Fixed delay after a transient error.
    pub error_backoff: Duration,
    /// First delay after a rate-limit response, doubled on each repeat.
    pub rate_limit_backoff: Duration,
    pub rate_limit_backoff_max: Duration,
    /// Random spread applied to rate-limit delays (fraction of the delay).
    pub backoff_jitter: f64,

    // === Fetch sizes ===
    /// Maximum trades requested per pair and poll.
    pub trade_fetch_limit: usize,
    /// Diffs kept per pair while waiting for a snapshot.
    pub diff_window: usize,

    // === Order reconciliation ===
    /// Consecutive not-found status polls before a pending order is failed.
    pub not_found_threshold: u32,
    /// How long an order reported `Filled` may wait for its trades.
    pub fill_reconcile_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            short_poll_interval: Duration::from_secs(3),
            long_poll_interval: Duration::from_secs(5),
            heartbeat_silence_threshold: Duration::from_secs(60),

            balance_interval: Duration::from_secs(5),
            trading_rules_interval: Duration::from_secs(60),
            order_book_interval: Duration::from_secs(5),

            error_backoff: Duration::from_secs(5),
            rate_limit_backoff: Duration::from_secs(60),
            rate_limit_backoff_max: Duration::from_secs(300),
            backoff_jitter: 0.1,

            trade_fetch_limit: 1000,
            diff_window: 1000,

            not_found_threshold: 3,
            fill_reconcile_timeout: Duration::from_secs(60),
        }
    }
}

impl SchedulerConfig {
    /// Defaults overridden by `*_MS` variables (and `TRADE_FETCH_LIMIT`,
    /// `DIFF_WINDOW`, `NOT_FOUND_THRESHOLD`).
    ///
    /// Unparseable or zero values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let millis = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|raw| raw.trim().parse::<u64>().ok())
                .filter(|&ms| ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(default)
        };
        let count = |key: &str, default: usize| {
            lookup(key)
                .and_then(|raw| raw.trim().parse::<usize>().ok())
                .filter(|&n| n > 0)
                .unwrap_or(default)
        };

        let d = Self::default();
        Self {
            short_poll_interval: millis("SHORT_POLL_INTERVAL_MS", d.short_poll_interval),
            long_poll_interval: millis("LONG_POLL_INTERVAL_MS", d.long_poll_interval),
            heartbeat_silence_threshold: millis(
                "HEARTBEAT_SILENCE_THRESHOLD_MS",
                d.heartbeat_silence_threshold,
            ),
            balance_interval: millis("BALANCE_INTERVAL_MS", d.balance_interval),
            trading_rules_interval: millis("TRADING_RULES_INTERVAL_MS", d.trading_rules_interval),
            order_book_interval: millis("ORDER_BOOK_INTERVAL_MS", d.order_book_interval),
            error_backoff: millis("ERROR_BACKOFF_MS", d.error_backoff),
            rate_limit_backoff: millis("RATE_LIMIT_BACKOFF_MS", d.rate_limit_backoff),
            rate_limit_backoff_max: millis("RATE_LIMIT_BACKOFF_MAX_MS", d.rate_limit_backoff_max),
            backoff_jitter: d.backoff_jitter,
            trade_fetch_limit: count("TRADE_FETCH_LIMIT", d.trade_fetch_limit),
            diff_window: count("DIFF_WINDOW", d.diff_window),
            not_found_threshold: lookup("NOT_FOUND_THRESHOLD")
                .and_then(|raw| raw.trim().parse::<u32>().ok())
                .filter(|&n| n > 0)
                .unwrap_or(d.not_found_threshold),
            fill_reconcile_timeout: millis("FILL_RECONCILE_TIMEOUT_MS", d.fill_reconcile_timeout),
        }
    }

    pub fn with_poll_intervals(mut self, short: Duration, long: Duration) -> Self {
        self.short_poll_interval = short;
        self.long_poll_interval = long;
        self
    }

    pub fn with_balance_interval(mut self, interval: Duration) -> Self {
        self.balance_interval = interval;
        self
    }

    pub fn with_trading_rules_interval(mut self, interval: Duration) -> Self {
        self.trading_rules_interval = interval;
        self
    }

    pub fn with_order_book_interval(mut self, interval: Duration) -> Self {
        self.order_book_interval = interval;
        self
    }

    pub fn with_error_backoff(mut self, delay: Duration) -> Self {
        self.error_backoff = delay;
        self
    }

    pub fn with_rate_limit_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.rate_limit_backoff = base;
        self.rate_limit_backoff_max = max;
        self
    }

    pub fn with_backoff_jitter(mut self, jitter: f64) -> Self {
        self.backoff_jitter = jitter;
        self
    }

    pub fn with_trade_fetch_limit(mut self, limit: usize) -> Self {
        self.trade_fetch_limit = limit.max(1);
        self
    }

    pub fn with_not_found_threshold(mut self, polls: u32) -> Self {
        self.not_found_threshold = polls.max(1);
        self
    }

    pub fn with_fill_reconcile_timeout(mut self, timeout: Duration) -> Self {
        self.fill_reconcile_timeout = timeout;
        self
    }
}
