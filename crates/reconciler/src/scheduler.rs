//! Polling loops.
//!
//! One task per [`Concern`], each with its own interval and [`RetryPolicy`].
//! A failing or rate-limited concern never slows down the others, and no loop
//! ends on an error; only the shutdown signal stops them.

use std::sync::Arc;
use std::time::Duration;

use common::RetryPolicy;
use connector_core::SharedHeartbeat;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::market::VenueMarket;
use crate::poll::{Concern, PollReport};

/// Drives every poll concern of a [`VenueMarket`] until shutdown.
pub struct PollScheduler {
    market: Arc<VenueMarket>,
    config: SchedulerConfig,
    heartbeat: SharedHeartbeat,
}

impl PollScheduler {
    pub fn new(market: Arc<VenueMarket>, config: SchedulerConfig, heartbeat: SharedHeartbeat) -> Self {
        Self {
            market,
            config,
            heartbeat,
        }
    }

    /// Run all loops until `shutdown_rx` turns true (or its sender is dropped).
    ///
    /// Events restored from a previous run are delivered and trade
    /// watermarks are primed once before the loops start.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            pairs = ?self.market.trading_pairs(),
            short_poll_ms = self.config.short_poll_interval.as_millis() as u64,
            long_poll_ms = self.config.long_poll_interval.as_millis() as u64,
            "starting poll scheduler"
        );

        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown_rx) => {
                info!("shutdown before watermark priming finished");
                return;
            }
            report = async {
                self.market.flush_events().await;
                self.market.prime_trade_watermarks().await
            } => {
                if !report.is_clean() {
                    warn!(
                        failed = report.failures.len(),
                        "watermark priming incomplete, unprimed pairs replay recent history"
                    );
                }
            }
        }

        let handles: Vec<_> = Concern::ALL
            .into_iter()
            .map(|concern| {
                let poller = ConcernLoop {
                    concern,
                    market: self.market.clone(),
                    config: self.config.clone(),
                    heartbeat: self.heartbeat.clone(),
                };
                tokio::spawn(poller.run(shutdown_rx.clone()))
            })
            .collect();

        for (concern, handle) in Concern::ALL.into_iter().zip(handles) {
            if let Err(e) = handle.await {
                error!(concern = %concern, error = %e, "poll loop panicked");
            }
        }
        info!("poll scheduler stopped");
    }
}

/// Current order status / trade poll interval.
///
/// Polls faster while no fresh order data has arrived for a while.
pub fn fill_poll_interval(config: &SchedulerConfig, heartbeat: &SharedHeartbeat) -> Duration {
    if heartbeat.is_silent(config.heartbeat_silence_threshold) {
        config.short_poll_interval
    } else {
        config.long_poll_interval
    }
}

/// Delay before the next cycle, given the last report.
fn next_delay(report: &PollReport, policy: &mut RetryPolicy, interval: Duration) -> Duration {
    if report.is_rate_limited() {
        policy.on_rate_limited(report.retry_after())
    } else if report.failed_entirely() {
        policy.on_error()
    } else {
        policy.on_success();
        interval
    }
}

async fn wait_for_shutdown(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}

struct ConcernLoop {
    concern: Concern,
    market: Arc<VenueMarket>,
    config: SchedulerConfig,
    heartbeat: SharedHeartbeat,
}

impl ConcernLoop {
    fn interval(&self) -> Duration {
        match self.concern {
            Concern::TradingRules => self.config.trading_rules_interval,
            Concern::Balances => self.config.balance_interval,
            Concern::OrderStatus | Concern::Trades => fill_poll_interval(&self.config, &self.heartbeat),
            Concern::OrderBooks => self.config.order_book_interval,
        }
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut policy = RetryPolicy::new(
            self.config.error_backoff,
            self.config.rate_limit_backoff,
            self.config.rate_limit_backoff_max,
            self.config.backoff_jitter,
        );
        debug!(concern = %self.concern, "poll loop started");

        loop {
            let report = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown_rx) => break,
                report = self.market.poll(self.concern) => report,
            };

            if self.concern.is_order_data() && report.is_clean() && !report.skipped {
                self.heartbeat.record();
            }

            let delay = next_delay(&report, &mut policy, self.interval());
            if report.is_rate_limited() {
                warn!(
                    concern = %self.concern,
                    delay_ms = delay.as_millis() as u64,
                    streak = policy.rate_limit_streak(),
                    "rate limited, backing off"
                );
            } else if !report.is_clean() {
                debug!(
                    concern = %self.concern,
                    failed = report.failures.len(),
                    delay_ms = delay.as_millis() as u64,
                    "poll had failures"
                );
            }

            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown_rx) => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        debug!(concern = %self.concern, "poll loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedVenue;
    use connector_core::{create_event_channel, EventReceiver, StreamHeartbeat, VenueError};
    use metrics::create_metrics;
    use model::TradingRule;
    use rust_decimal_macros::dec;

    const PAIR: &str = "XRP-USDT";

    fn config() -> SchedulerConfig {
        SchedulerConfig::default()
            .with_poll_intervals(Duration::from_secs(3), Duration::from_secs(5))
            .with_balance_interval(Duration::from_secs(5))
            .with_trading_rules_interval(Duration::from_secs(60))
            .with_order_book_interval(Duration::from_secs(5))
            .with_error_backoff(Duration::from_secs(5))
            .with_rate_limit_backoff(Duration::from_secs(60), Duration::from_secs(300))
            .with_backoff_jitter(0.0)
    }

    struct Running {
        market: Arc<VenueMarket>,
        shutdown_tx: watch::Sender<bool>,
        handle: tokio::task::JoinHandle<()>,
        _events: EventReceiver,
    }

    impl Running {
        async fn stop(self) {
            self.shutdown_tx.send(true).unwrap();
            self.handle.await.unwrap();
        }
    }

    fn start(venue: &Arc<ScriptedVenue>, config: SchedulerConfig) -> Running {
        start_with(venue, config, StreamHeartbeat::shared())
    }

    fn start_with(
        venue: &Arc<ScriptedVenue>,
        config: SchedulerConfig,
        heartbeat: SharedHeartbeat,
    ) -> Running {
        let (tx, events) = create_event_channel(256);
        let market = Arc::new(VenueMarket::new(
            venue.clone(),
            vec![PAIR.to_string()],
            &config,
            tx,
            create_metrics(),
        ));
        let scheduler = PollScheduler::new(market.clone(), config, heartbeat);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(scheduler.run(shutdown_rx));
        Running {
            market,
            shutdown_tx,
            handle,
            _events: events,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_scheduler_issues_no_order_requests() {
        let venue = Arc::new(ScriptedVenue::new());
        let running = start(&venue, config());

        tokio::time::sleep(Duration::from_secs(30)).await;
        running.stop().await;

        assert_eq!(venue.calls("fetch_order_status"), 0);
        // Only the startup priming request.
        assert_eq!(venue.calls("fetch_recent_trades"), 1);
        assert!(venue.calls("fetch_balances") >= 6);
        assert!(venue.calls("fetch_order_book") >= 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_backs_off_only_that_concern() {
        let venue = Arc::new(ScriptedVenue::new());
        venue.push_balances(Err(VenueError::RateLimited { retry_after_ms: None }));
        let running = start(&venue, config());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(venue.calls("fetch_balances"), 1);
        let books_before = venue.calls("fetch_order_book");
        assert!(books_before >= 6);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(venue.calls("fetch_balances"), 2);

        running.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_hint_extends_backoff() {
        let venue = Arc::new(ScriptedVenue::new());
        venue.push_balances(Err(VenueError::RateLimited {
            retry_after_ms: Some(90_000),
        }));
        let running = start(&venue, config());

        tokio::time::sleep(Duration::from_secs(80)).await;
        assert_eq!(venue.calls("fetch_balances"), 1);
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(venue.calls("fetch_balances"), 2);

        running.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_retries_after_error_backoff() {
        let venue = Arc::new(ScriptedVenue::new());
        venue.push_rules(Err(VenueError::Transport("reset".into())));
        venue.push_rules(Ok(vec![TradingRule::with_quantity_precision(
            PAIR,
            dec!(1),
            dec!(1000),
            dec!(0.0001),
            2,
        )]));
        let running = start(&venue, config());
        let market = running.market.clone();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(market.trading_rule(PAIR).is_none());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(venue.calls("fetch_trading_rules"), 2);
        assert!(market.trading_rule(PAIR).is_some());

        running.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracked_orders_are_polled() {
        let venue = Arc::new(ScriptedVenue::new());
        venue.push_rules(Ok(vec![TradingRule::with_quantity_precision(
            PAIR,
            dec!(1),
            dec!(1000),
            dec!(0.0001),
            2,
        )]));
        let running = start(&venue, config());
        let market = running.market.clone();

        tokio::time::sleep(Duration::from_millis(10)).await;
        market
            .place_order(
                execution_core::OrderSide::Buy,
                PAIR,
                dec!(10),
                execution_core::OrderType::Limit,
                Some(dec!(1)),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(venue.calls("fetch_order_status") >= 2);
        assert!(venue.calls("fetch_recent_trades") >= 3);

        running.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_order_polls_keep_long_interval() {
        let venue = Arc::new(ScriptedVenue::new());
        venue.push_rules(Ok(vec![TradingRule::with_quantity_precision(
            PAIR,
            dec!(1),
            dec!(1000),
            dec!(0.0001),
            2,
        )]));
        let heartbeat = StreamHeartbeat::shared();
        let running = start_with(&venue, config(), heartbeat.clone());
        let market = running.market.clone();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(heartbeat.silence().is_none());
        market
            .place_order(
                execution_core::OrderSide::Buy,
                PAIR,
                dec!(10),
                execution_core::OrderType::Limit,
                Some(dec!(1)),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        running.stop().await;

        // First poll at 3s on the short interval, then every 5s.
        let polls = venue.calls("fetch_order_status");
        assert!((5..=7).contains(&polls), "status polls: {polls}");
        assert!(!heartbeat.is_silent(Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_skipped_order_polls_leave_heartbeat_silent() {
        let venue = Arc::new(ScriptedVenue::new());
        let heartbeat = StreamHeartbeat::shared();
        let running = start_with(&venue, config(), heartbeat.clone());

        // Nothing tracked: every order poll is skipped.
        tokio::time::sleep(Duration::from_secs(20)).await;
        running.stop().await;

        assert!(heartbeat.silence().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_selects_poll_interval() {
        let config = config();
        let heartbeat = StreamHeartbeat::shared();
        assert_eq!(fill_poll_interval(&config, &heartbeat), Duration::from_secs(3));

        heartbeat.record();
        assert_eq!(fill_poll_interval(&config, &heartbeat), Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(fill_poll_interval(&config, &heartbeat), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_shutdown_sender_stops_loops() {
        let venue = Arc::new(ScriptedVenue::new());
        let running = start(&venue, config());
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(running.shutdown_tx);
        running.handle.await.unwrap();
    }

    #[test]
    fn test_next_delay() {
        let mut policy = RetryPolicy::new(
            Duration::from_secs(5),
            Duration::from_secs(60),
            Duration::from_secs(300),
            0.0,
        );
        let interval = Duration::from_secs(3);

        let mut report = PollReport::new(Concern::Balances);
        report.requests = 1;
        assert_eq!(next_delay(&report, &mut policy, interval), interval);

        report.fail("all", VenueError::Transport("timeout".into()));
        assert_eq!(next_delay(&report, &mut policy, interval), Duration::from_secs(5));

        let mut limited = PollReport::new(Concern::Balances);
        limited.requests = 1;
        limited.fail("all", VenueError::RateLimited { retry_after_ms: None });
        assert_eq!(next_delay(&limited, &mut policy, interval), Duration::from_secs(60));
        assert_eq!(next_delay(&limited, &mut policy, interval), Duration::from_secs(120));

        let clean = PollReport::new(Concern::Balances);
        next_delay(&clean, &mut policy, interval);
        assert_eq!(next_delay(&limited, &mut policy, interval), Duration::from_secs(60));
    }

    #[test]
    fn test_partial_failure_keeps_interval() {
        let mut policy = RetryPolicy::new(
            Duration::from_secs(5),
            Duration::from_secs(60),
            Duration::from_secs(300),
            0.0,
        );
        let mut report = PollReport::new(Concern::Trades);
        report.requests = 2;
        report.fail("ETH-USDT", VenueError::Transport("timeout".into()));
        assert_eq!(
            next_delay(&report, &mut policy, Duration::from_secs(3)),
            Duration::from_secs(3)
        );
    }
}
