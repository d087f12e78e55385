//! Venue market facade.
//!
//! Owns the local mirror of one venue: tracked orders, trade watermarks, order
//! books, trading rules and balances. Every poll operation returns a
//! [`PollReport`] with per-item failures instead of stopping at the first one.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use connector_core::{EventSender, TradeWindow, VenueClient, VenueError};
use execution_core::{
    create_order_tracker, CancellationResult, FillReport, OrderEvent, OrderRequest, OrderSide,
    OrderState, OrderType, SharedOrderTracker, TrackedOrder, TrackingState, TradeDeduplicator,
};
use futures_util::future::join_all;
use metrics::SharedMetrics;
use model::{Balance, BookSnapshot, TradingFees, TradingRule};
use orderbook::{BookAssembler, PriceLevel, SnapshotOutcome};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::error::MarketError;
use crate::poll::{Concern, PollReport};

/// Trades fetched per pair when seeding a watermark at startup.
const PRIME_WINDOW: usize = 2;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Readiness of each part of the local mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketStatus {
    pub order_books_initialized: bool,
    pub account_balance: bool,
    pub trading_rule_initialized: bool,
    pub watermarks_initialized: bool,
}

impl MarketStatus {
    pub fn is_ready(&self) -> bool {
        self.order_books_initialized
            && self.account_balance
            && self.trading_rule_initialized
            && self.watermarks_initialized
    }
}

/// Result of [`VenueMarket::check_network`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Connected,
    NotConnected,
}

/// Expected fee for a prospective order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeEstimate {
    /// Fee rate in percent of the quote amount.
    pub pct: Decimal,
    /// Fee in quote currency; `None` when no price is known yet.
    pub quote_amount: Option<Decimal>,
}

/// Local mirror of one venue, driven by the poll operations.
pub struct VenueMarket {
    client: Arc<dyn VenueClient>,
    trading_pairs: Vec<String>,
    tracker: SharedOrderTracker,
    dedup: TradeDeduplicator<i64>,
    books: BookAssembler,
    rules: RwLock<HashMap<String, TradingRule>>,
    balances: RwLock<HashMap<String, Balance>>,
    balances_synced: AtomicBool,
    /// Pairs whose trade watermark was seeded or restored.
    primed: Mutex<HashSet<String>>,
    events: EventSender,
    /// Events produced but not yet handed to the channel, oldest first.
    outbox: Mutex<VecDeque<OrderEvent>>,
    metrics: SharedMetrics,
    trade_fetch_limit: usize,
    not_found_threshold: u32,
    fill_reconcile_timeout: Duration,
}

impl VenueMarket {
    pub fn new(
        client: Arc<dyn VenueClient>,
        trading_pairs: Vec<String>,
        config: &SchedulerConfig,
        events: EventSender,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            client,
            trading_pairs,
            tracker: create_order_tracker(),
            dedup: TradeDeduplicator::new(),
            books: BookAssembler::new(config.diff_window),
            rules: RwLock::new(HashMap::new()),
            balances: RwLock::new(HashMap::new()),
            balances_synced: AtomicBool::new(false),
            primed: Mutex::new(HashSet::new()),
            events,
            outbox: Mutex::new(VecDeque::new()),
            metrics,
            trade_fetch_limit: config.trade_fetch_limit.max(1),
            not_found_threshold: config.not_found_threshold.max(1),
            fill_reconcile_timeout: config.fill_reconcile_timeout,
        }
    }

    pub fn trading_pairs(&self) -> &[String] {
        &self.trading_pairs
    }

    pub fn tracker(&self) -> &SharedOrderTracker {
        &self.tracker
    }

    /// Queue events behind any still undelivered ones, then deliver.
    ///
    /// Queued events survive a cancelled delivery and are exported with the
    /// tracking state.
    async fn emit(&self, events: Vec<OrderEvent>) -> usize {
        let count = events.len();
        self.outbox.lock().extend(events);
        self.metrics.add_events_emitted(count as u64);
        self.flush_events().await;
        count
    }

    /// Deliver queued events, waiting for channel capacity as needed.
    ///
    /// Returns the number delivered. Stops early if the receiver is gone; the
    /// rest stay queued.
    pub async fn flush_events(&self) -> usize {
        let mut delivered = 0;
        loop {
            let pending = self.outbox.lock().len();
            if pending == 0 {
                break;
            }
            let Ok(permit) = self.events.reserve().await else {
                warn!(pending, "event channel closed, order events kept queued");
                break;
            };
            let Some(event) = self.outbox.lock().pop_front() else {
                break;
            };
            debug!(
                kind = event.kind(),
                client_order_id = %event.client_order_id(),
                "emitting order event"
            );
            permit.send(event);
            delivered += 1;
        }
        delivered
    }

    /// Remove and return every undelivered event.
    pub fn take_pending_events(&self) -> Vec<OrderEvent> {
        self.outbox.lock().drain(..).collect()
    }

    pub fn pending_events(&self) -> usize {
        self.outbox.lock().len()
    }

    /// Log and count a finished poll.
    fn finish(&self, report: PollReport) -> PollReport {
        for failure in &report.failures {
            if failure.error.is_parse() {
                self.metrics.inc_parse_errors();
                error!(
                    concern = %report.concern,
                    scope = %failure.scope,
                    error = %failure.error,
                    "response parse error, possible API contract drift"
                );
            } else if failure.error.is_rate_limited() {
                self.metrics.inc_rate_limited();
                warn!(concern = %report.concern, scope = %failure.scope, "rate limited");
            } else {
                warn!(
                    concern = %report.concern,
                    scope = %failure.scope,
                    error = %failure.error,
                    "poll failed"
                );
            }
            self.metrics.inc_poll_failures();
        }
        if report.is_clean() && !report.skipped {
            self.metrics.inc_polls_completed();
        }
        report
    }

    // ========================================================================
    // Orders
    // ========================================================================

    /// Place an order and return its client order id.
    ///
    /// Amount and price are rounded down to the pair's increments. Orders
    /// outside the size limits fail locally with a failure event. A venue
    /// rejection also emits a failure event; a transport failure leaves the
    /// order tracked as pending for the status poll to settle.
    pub async fn place_order(
        &self,
        side: OrderSide,
        trading_pair: &str,
        amount: Decimal,
        order_type: OrderType,
        price: Option<Decimal>,
    ) -> Result<String, MarketError> {
        let client_order_id = self.client.new_client_order_id(side, trading_pair);
        let original = OrderRequest {
            client_order_id: client_order_id.clone(),
            trading_pair: trading_pair.to_string(),
            side,
            order_type,
            amount,
            price,
        };

        let request = match self.validate(&original) {
            Ok(request) => request,
            Err(reason) => {
                self.tracker.start_tracking(TrackedOrder::new(&original, now_ms()))?;
                return Err(self.reject(&client_order_id, reason).await);
            }
        };

        self.tracker.start_tracking(TrackedOrder::new(&request, now_ms()))?;
        info!(
            client_order_id = %client_order_id,
            symbol = %trading_pair,
            side = ?side,
            order_type = ?order_type,
            amount = %request.amount,
            price = ?request.price,
            "submitting order"
        );

        match self.client.submit_order(&request).await {
            Ok(exchange_order_id) => {
                let events = self
                    .tracker
                    .confirm_created(&client_order_id, &exchange_order_id)?;
                self.emit(events).await;
                Ok(client_order_id)
            }
            Err(VenueError::Rejected { code, message }) => {
                let reason = format!("{code}: {message}");
                Err(self.reject(&client_order_id, reason).await)
            }
            Err(source) => {
                self.tracker.submission_unresolved(&client_order_id);
                warn!(
                    client_order_id = %client_order_id,
                    error = %source,
                    "order submission unconfirmed, left pending"
                );
                Err(MarketError::SubmissionUnconfirmed {
                    client_order_id,
                    source,
                })
            }
        }
    }

    /// Quantized copy of the request, or the reason it cannot be sent.
    fn validate(&self, request: &OrderRequest) -> Result<OrderRequest, String> {
        let rules = self.rules.read();
        let Some(rule) = rules.get(&request.trading_pair) else {
            return Err(format!("no trading rule for {}", request.trading_pair));
        };

        let amount = rule.quantize_amount(request.amount);
        if !rule.accepts_amount(amount) {
            return Err(format!(
                "amount {} outside [{}, {}]",
                amount, rule.min_order_size, rule.max_order_size
            ));
        }

        let price = match (request.order_type, request.price) {
            (OrderType::Limit, Some(price)) => {
                let price = rule.quantize_price(price);
                if price <= Decimal::ZERO {
                    return Err(format!("price {price} is not positive"));
                }
                Some(price)
            }
            (OrderType::Limit, None) => return Err("limit order requires a price".to_string()),
            (OrderType::Market, _) => None,
        };

        Ok(OrderRequest {
            amount,
            price,
            ..request.clone()
        })
    }

    async fn reject(&self, client_order_id: &str, reason: String) -> MarketError {
        let events = self.tracker.fail_submission(client_order_id, &reason);
        self.emit(events).await;
        MarketError::OrderRejected {
            client_order_id: client_order_id.to_string(),
            reason,
        }
    }

    /// Send a cancel request. On failure the order stays tracked.
    pub async fn cancel(&self, client_order_id: &str) -> Result<(), MarketError> {
        let order = self
            .tracker
            .get(client_order_id)
            .ok_or_else(|| MarketError::UnknownOrder(client_order_id.to_string()))?;

        match self.client.cancel_order(&order.order_ref()).await {
            Ok(ack) => {
                let events = self.tracker.apply_cancel_ack(&ack);
                self.emit(events).await;
                Ok(())
            }
            Err(e) => {
                warn!(
                    client_order_id,
                    symbol = %order.trading_pair,
                    error = %e,
                    "cancel failed, order stays tracked"
                );
                Err(e.into())
            }
        }
    }

    /// Cancel and wait up to `timeout` for the order to be cancelled.
    ///
    /// Returns `false` on timeout or if the order ended in another state.
    pub async fn cancel_and_wait(
        &self,
        client_order_id: &str,
        timeout: Duration,
    ) -> Result<bool, MarketError> {
        self.cancel(client_order_id).await?;
        let state = self.tracker.wait_for_terminal(client_order_id, timeout).await;
        Ok(state == Some(OrderState::Cancelled))
    }

    /// Cancel every active order under one shared deadline.
    ///
    /// Reports success or failure per order; a cancel still in flight at the
    /// deadline counts as a failure.
    pub async fn cancel_all(&self, timeout: Duration) -> Vec<CancellationResult> {
        let deadline = tokio::time::Instant::now() + timeout;
        let ids: Vec<String> = self
            .tracker
            .active_orders()
            .into_iter()
            .map(|order| order.client_order_id)
            .collect();

        let attempts = ids.iter().map(|id| async move {
            let success = matches!(
                tokio::time::timeout_at(deadline, self.cancel(id)).await,
                Ok(Ok(()))
            );
            CancellationResult {
                client_order_id: id.clone(),
                success,
            }
        });
        let results = join_all(attempts).await;

        let failed = results.iter().filter(|r| !r.success).count();
        if failed > 0 {
            warn!(total = results.len(), failed, "cancel all incomplete");
        } else {
            info!(total = results.len(), "all orders cancelled");
        }
        results
    }

    // ========================================================================
    // Polling
    // ========================================================================

    pub async fn poll(&self, concern: Concern) -> PollReport {
        match concern {
            Concern::TradingRules => self.refresh_trading_rules().await,
            Concern::Balances => self.refresh_balances().await,
            Concern::OrderStatus => self.refresh_order_status().await,
            Concern::Trades => self.refresh_trades().await,
            Concern::OrderBooks => self.refresh_order_books().await,
        }
    }

    /// Replace all trading rules.
    pub async fn refresh_trading_rules(&self) -> PollReport {
        let mut report = PollReport::new(Concern::TradingRules);
        report.requests = 1;
        match self.client.fetch_trading_rules().await {
            Ok(rules) => {
                report.applied = rules.len();
                let rules = rules
                    .into_iter()
                    .map(|rule| (rule.trading_pair.clone(), rule))
                    .collect();
                *self.rules.write() = rules;
                debug!(count = report.applied, "trading rules refreshed");
            }
            Err(e) => report.fail("all", e),
        }
        self.finish(report)
    }

    /// Replace balances; assets the venue no longer reports are removed.
    pub async fn refresh_balances(&self) -> PollReport {
        let mut report = PollReport::new(Concern::Balances);
        report.requests = 1;
        match self.client.fetch_balances().await {
            Ok(balances) => {
                report.applied = balances.len();
                let fresh: HashMap<String, Balance> = balances
                    .into_iter()
                    .map(|balance| (balance.asset.clone(), balance))
                    .collect();
                let mut current = self.balances.write();
                for asset in current.keys().filter(|asset| !fresh.contains_key(*asset)) {
                    debug!(asset = %asset, "asset no longer reported");
                }
                *current = fresh;
                self.balances_synced.store(true, Ordering::Relaxed);
            }
            Err(e) => report.fail("all", e),
        }
        self.finish(report)
    }

    /// Query the status of every tracked order whose submission has resolved.
    ///
    /// No request when there is nothing to poll. An order the venue does not
    /// know fails only after `not_found_threshold` consecutive polls.
    pub async fn refresh_order_status(&self) -> PollReport {
        let orders = self.tracker.pollable_orders();
        if orders.is_empty() {
            return PollReport::skipped(Concern::OrderStatus);
        }

        let mut report = PollReport::new(Concern::OrderStatus);
        report.requests = orders.len();
        debug!(count = orders.len(), "polling order status");

        let results = join_all(orders.iter().map(|order| {
            let order_ref = order.order_ref();
            async move { self.client.fetch_order_status(&order_ref).await }
        }))
        .await;

        let mut events = Vec::new();
        for (order, result) in orders.iter().zip(results) {
            match result {
                Ok(status) => {
                    report.applied += 1;
                    events.extend(self.tracker.apply_status(&status));
                }
                Err(VenueError::Rejected { code, message })
                    if self.tracker.state_of(&order.client_order_id)
                        == Some(OrderState::PendingCreate) =>
                {
                    let reason = format!("not found on venue ({code}: {message})");
                    events.extend(self.tracker.record_not_found(
                        &order.client_order_id,
                        &reason,
                        self.not_found_threshold,
                    ));
                    report.applied += 1;
                }
                Err(e) => report.fail(order.client_order_id.clone(), e),
            }
        }
        report.events = self.emit(events).await;
        self.finish(report)
    }

    /// Fetch trade history once per tracked pair and apply unseen fills.
    ///
    /// No request when nothing is tracked.
    pub async fn refresh_trades(&self) -> PollReport {
        let pairs = self.tracker.tracked_pairs();
        if pairs.is_empty() {
            return PollReport::skipped(Concern::Trades);
        }

        let mut report = PollReport::new(Concern::Trades);
        report.requests = pairs.len();
        let limit = self.trade_fetch_limit;

        let results = join_all(pairs.iter().map(|pair| {
            let window = TradeWindow {
                since_ms: self.dedup.watermark(pair),
                limit,
            };
            async move { self.client.fetch_recent_trades(pair, window).await }
        }))
        .await;

        let mut events = Vec::new();
        for (pair, result) in pairs.iter().zip(results) {
            match result {
                Ok(trades) => {
                    if trades.len() >= limit {
                        warn!(
                            symbol = %pair,
                            limit,
                            "trade poll hit the fetch limit, older trades may be skipped"
                        );
                        report.truncated.push(pair.clone());
                    }
                    let admitted = self.dedup.admit(
                        pair,
                        trades,
                        |t: &FillReport| t.timestamp_ms,
                        |t: &FillReport| t.trade_id.clone(),
                    );
                    report.applied += 1;
                    for fill in &admitted {
                        events.extend(self.tracker.apply_fill(fill));
                    }
                }
                Err(e) => report.fail(pair.clone(), e),
            }
        }

        let max_age_ms = i64::try_from(self.fill_reconcile_timeout.as_millis()).unwrap_or(i64::MAX);
        for order in self.tracker.expire_unreconciled_fills(now_ms(), max_age_ms) {
            self.metrics.inc_unreconciled_fills();
            debug!(
                client_order_id = %order.client_order_id,
                missing = %order.remaining(),
                "gave up waiting for trades"
            );
        }

        report.events = self.emit(events).await;
        self.finish(report)
    }

    /// Fetch a snapshot for every configured pair.
    pub async fn refresh_order_books(&self) -> PollReport {
        let mut report = PollReport::new(Concern::OrderBooks);
        report.requests = self.trading_pairs.len();

        let results = join_all(
            self.trading_pairs
                .iter()
                .map(|pair| self.client.fetch_order_book(pair)),
        )
        .await;

        for (pair, result) in self.trading_pairs.iter().zip(results) {
            match result {
                Ok(snapshot) => {
                    report.applied += 1;
                    if let SnapshotOutcome::Stale { current } = self.books.apply_snapshot(&snapshot) {
                        debug!(
                            symbol = %pair,
                            current,
                            received = snapshot.update_id,
                            "stale snapshot ignored"
                        );
                        self.metrics.inc_stale_snapshots();
                    }
                }
                Err(e) => report.fail(pair.clone(), e),
            }
        }
        self.finish(report)
    }

    /// Seed trade watermarks so fills from before startup are not replayed.
    ///
    /// Pairs that already have a watermark (restored state) are left alone.
    pub async fn prime_trade_watermarks(&self) -> PollReport {
        let mut report = PollReport::new(Concern::Trades);
        let pending: Vec<&String> = self
            .trading_pairs
            .iter()
            .filter(|pair| !self.dedup.has_watermark(pair))
            .collect();
        {
            let mut primed = self.primed.lock();
            for pair in &self.trading_pairs {
                if self.dedup.has_watermark(pair) {
                    primed.insert(pair.clone());
                }
            }
        }
        report.requests = pending.len();

        let window = TradeWindow {
            since_ms: None,
            limit: PRIME_WINDOW,
        };
        let results = join_all(
            pending
                .iter()
                .map(|pair| self.client.fetch_recent_trades(pair, window)),
        )
        .await;

        for (pair, result) in pending.into_iter().zip(results) {
            match result {
                Ok(trades) => {
                    if trades.is_empty() {
                        self.dedup.prime(pair, 0);
                    } else {
                        self.dedup.admit(
                            pair,
                            trades,
                            |t: &FillReport| t.timestamp_ms,
                            |t: &FillReport| t.trade_id.clone(),
                        );
                    }
                    let latest = self.dedup.watermark(pair).unwrap_or(0);
                    self.primed.lock().insert(pair.clone());
                    report.applied += 1;
                    info!(symbol = %pair, watermark = latest, "trade watermark primed");
                }
                Err(e) => report.fail(pair.clone(), e),
            }
        }
        self.finish(report)
    }

    // ========================================================================
    // Read API
    // ========================================================================

    pub fn status(&self) -> MarketStatus {
        let primed = self.primed.lock();
        MarketStatus {
            order_books_initialized: self
                .books
                .all_initialized(self.trading_pairs.iter().map(String::as_str)),
            account_balance: self.balances_synced.load(Ordering::Relaxed),
            trading_rule_initialized: !self.rules.read().is_empty(),
            watermarks_initialized: self.trading_pairs.iter().all(|pair| primed.contains(pair)),
        }
    }

    pub fn ready(&self) -> bool {
        self.status().is_ready()
    }

    pub fn balances(&self) -> Vec<Balance> {
        let mut balances: Vec<Balance> = self.balances.read().values().cloned().collect();
        balances.sort_by(|a, b| a.asset.cmp(&b.asset));
        balances
    }

    pub fn balance(&self, asset: &str) -> Option<Balance> {
        self.balances.read().get(asset).cloned()
    }

    pub fn trading_rule(&self, trading_pair: &str) -> Option<TradingRule> {
        self.rules.read().get(trading_pair).cloned()
    }

    pub fn best_bid(&self, trading_pair: &str) -> Option<PriceLevel> {
        self.books.best_bid(trading_pair)
    }

    pub fn best_ask(&self, trading_pair: &str) -> Option<PriceLevel> {
        self.books.best_ask(trading_pair)
    }

    pub fn order_book(&self, trading_pair: &str) -> Option<BookSnapshot> {
        self.books.snapshot(trading_pair)
    }

    pub fn in_flight_orders(&self) -> Vec<TrackedOrder> {
        self.tracker.tracked_orders()
    }

    /// Whether the venue answers at all.
    pub async fn check_network(&self) -> NetworkStatus {
        match self.client.check_network().await {
            Ok(()) => NetworkStatus::Connected,
            Err(e) => {
                warn!(exchange = self.client.exchange().as_str(), error = %e, "venue unreachable");
                NetworkStatus::NotConnected
            }
        }
    }

    pub fn trading_fees(&self) -> TradingFees {
        self.client.trading_fees()
    }

    /// Expected fee for an order. Limit orders pay the maker rate, market
    /// orders the taker rate.
    ///
    /// Without a price the book's mid price is used; the quote amount is
    /// `None` if neither is known.
    pub fn estimate_fee(
        &self,
        trading_pair: &str,
        order_type: OrderType,
        amount: Decimal,
        price: Option<Decimal>,
    ) -> FeeEstimate {
        let fees = self.client.trading_fees();
        let is_maker = order_type == OrderType::Limit;
        let price = price.or_else(|| self.books.mid_price(trading_pair));
        FeeEstimate {
            pct: fees.pct(is_maker),
            quote_amount: price.map(|price| fees.quote_fee(is_maker, amount, price)),
        }
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    pub fn export_tracking_state(&self) -> TrackingState {
        TrackingState {
            orders: self.tracker.export_orders(),
            watermarks: self.dedup.export(),
            pending_events: self.outbox.lock().iter().cloned().collect(),
        }
    }

    /// Restore orders, watermarks and undelivered events. Returns the number
    /// of orders restored.
    ///
    /// Restored events go out on the next [`flush_events`](Self::flush_events).
    pub fn import_tracking_state(&self, state: TrackingState) -> usize {
        let watermarks = state.watermarks.len();
        let pending = state.pending_events.len();
        self.outbox.lock().extend(state.pending_events);
        self.dedup.restore(state.watermarks);
        {
            let mut primed = self.primed.lock();
            for pair in &self.trading_pairs {
                if self.dedup.has_watermark(pair) {
                    primed.insert(pair.clone());
                }
            }
        }
        let restored = self.tracker.import_orders(state.orders.into_values());
        info!(orders = restored, watermarks, pending, "tracking state restored");
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedVenue;
    use connector_core::{create_event_channel, EventReceiver};
    use execution_core::{OrderStatusReport, VenueOrderStatus};
    use metrics::create_metrics;
    use rust_decimal_macros::dec;

    const PAIR: &str = "XRP-USDT";

    fn setup_with(pairs: &[&str]) -> (Arc<ScriptedVenue>, VenueMarket, EventReceiver) {
        setup_custom(pairs, &SchedulerConfig::default(), 256)
    }

    fn setup_custom(
        pairs: &[&str],
        config: &SchedulerConfig,
        capacity: usize,
    ) -> (Arc<ScriptedVenue>, VenueMarket, EventReceiver) {
        let venue = Arc::new(ScriptedVenue::new());
        let (tx, rx) = create_event_channel(capacity);
        let market = VenueMarket::new(
            venue.clone(),
            pairs.iter().map(|p| p.to_string()).collect(),
            config,
            tx,
            create_metrics(),
        );
        (venue, market, rx)
    }

    fn setup() -> (Arc<ScriptedVenue>, VenueMarket, EventReceiver) {
        setup_with(&[PAIR])
    }

    fn rule() -> TradingRule {
        TradingRule::with_quantity_precision(PAIR, dec!(1), dec!(1000), dec!(0.0001), 2)
    }

    async fn with_rules(venue: &ScriptedVenue, market: &VenueMarket) {
        venue.push_rules(Ok(vec![rule()]));
        market.refresh_trading_rules().await;
    }

    fn drain(rx: &mut EventReceiver) -> Vec<OrderEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn fill(trade_id: &str, order_id: &str, qty: Decimal, ts: i64) -> FillReport {
        FillReport {
            trade_id: trade_id.to_string(),
            exchange_order_id: order_id.to_string(),
            trading_pair: PAIR.to_string(),
            price: dec!(1.0),
            quantity: qty,
            fee_asset: "USDT".to_string(),
            fee_amount: dec!(0.01),
            timestamp_ms: ts,
        }
    }

    fn status(client_order_id: &str, status: VenueOrderStatus) -> OrderStatusReport {
        OrderStatusReport {
            client_order_id: client_order_id.to_string(),
            exchange_order_id: Some("7001".to_string()),
            trading_pair: PAIR.to_string(),
            status,
            reported_filled: Decimal::ZERO,
            timestamp_ms: 0,
        }
    }

    fn book(update_id: u64, bid: Decimal) -> BookSnapshot {
        BookSnapshot {
            trading_pair: PAIR.to_string(),
            bids: vec![(bid, dec!(100))],
            asks: vec![(dec!(0.60), dec!(50))],
            update_id,
        }
    }

    async fn place_limit(venue: &ScriptedVenue, market: &VenueMarket, exchange_id: &str) -> String {
        venue.push_submit(Ok(exchange_id.to_string()));
        market
            .place_order(OrderSide::Buy, PAIR, dec!(10), OrderType::Limit, Some(dec!(1.0)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_place_order_quantizes_and_emits_created() {
        let (venue, market, mut rx) = setup();
        with_rules(&venue, &market).await;

        venue.push_submit(Ok("7001".into()));
        let id = market
            .place_order(OrderSide::Buy, PAIR, dec!(10.009), OrderType::Limit, Some(dec!(0.51239)))
            .await
            .unwrap();

        let sent = venue.submitted();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].amount, dec!(10.00));
        assert_eq!(sent[0].price, Some(dec!(0.5123)));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], OrderEvent::Created(e) if e.client_order_id == id));
        assert_eq!(market.tracker().state_of(&id), Some(OrderState::Open));
    }

    #[tokio::test]
    async fn test_order_below_minimum_fails_locally() {
        let (venue, market, mut rx) = setup();
        with_rules(&venue, &market).await;

        let err = market
            .place_order(OrderSide::Sell, PAIR, dec!(0.5), OrderType::Market, None)
            .await
            .unwrap_err();

        assert!(matches!(err, MarketError::OrderRejected { .. }));
        assert_eq!(venue.calls("submit_order"), 0);
        let events = drain(&mut rx);
        match &events[..] {
            [OrderEvent::Failed(failed)] => {
                assert_eq!(failed.side, OrderSide::Sell);
                assert_eq!(failed.order_type, OrderType::Market);
                assert_eq!(failed.amount, dec!(0.5));
            }
            other => panic!("unexpected events: {other:?}"),
        }
        assert!(market.tracker().is_empty());
    }

    #[tokio::test]
    async fn test_order_without_rules_fails_locally() {
        let (venue, market, mut rx) = setup();
        let err = market
            .place_order(OrderSide::Buy, PAIR, dec!(10), OrderType::Limit, Some(dec!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::OrderRejected { .. }));
        assert_eq!(venue.calls("submit_order"), 0);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn test_venue_rejection_emits_failure() {
        let (venue, market, mut rx) = setup();
        with_rules(&venue, &market).await;

        venue.push_submit(Err(VenueError::rejected("NOT_ENOUGH_BALANCE", "insufficient")));
        let err = market
            .place_order(OrderSide::Buy, PAIR, dec!(10), OrderType::Limit, Some(dec!(1)))
            .await
            .unwrap_err();

        match err {
            MarketError::OrderRejected { reason, .. } => assert!(reason.contains("NOT_ENOUGH_BALANCE")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(&drain(&mut rx)[..], [OrderEvent::Failed(_)]));
        assert!(market.tracker().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_leaves_order_pending() {
        let (venue, market, mut rx) = setup();
        with_rules(&venue, &market).await;

        venue.push_submit(Err(VenueError::Transport("timeout".into())));
        let err = market
            .place_order(OrderSide::Buy, PAIR, dec!(10), OrderType::Limit, Some(dec!(1)))
            .await
            .unwrap_err();

        let MarketError::SubmissionUnconfirmed { client_order_id, .. } = err else {
            panic!("expected unconfirmed submission");
        };
        assert_eq!(
            market.tracker().state_of(&client_order_id),
            Some(OrderState::PendingCreate)
        );
        assert!(drain(&mut rx).is_empty());

        // The venue never saw it: repeated not-found polls settle the order as failed.
        for _ in 0..3 {
            venue.push_status(
                &client_order_id,
                Err(VenueError::rejected("ORDER_NOT_FOUND", "no such order")),
            );
        }
        for _ in 0..2 {
            assert!(market.refresh_order_status().await.is_clean());
        }
        assert!(drain(&mut rx).is_empty());
        assert_eq!(
            market.tracker().state_of(&client_order_id),
            Some(OrderState::PendingCreate)
        );

        let report = market.refresh_order_status().await;
        assert!(report.is_clean());
        assert!(matches!(&drain(&mut rx)[..], [OrderEvent::Failed(_)]));
        assert!(market.tracker().is_empty());
    }

    #[tokio::test]
    async fn test_status_poll_waits_for_submission_to_resolve() {
        let (venue, market, mut rx) = setup();
        let market = Arc::new(market);
        with_rules(&venue, &market).await;
        let gate = venue.gate_submits();
        venue.push_submit(Ok("7001".into()));

        let placing = {
            let market = market.clone();
            tokio::spawn(async move {
                market
                    .place_order(OrderSide::Buy, PAIR, dec!(10), OrderType::Limit, Some(dec!(1)))
                    .await
            })
        };
        while venue.calls("submit_order") == 0 {
            tokio::task::yield_now().await;
        }
        let id = market.in_flight_orders()[0].client_order_id.clone();
        venue.push_status(&id, Err(VenueError::rejected("ORDER_NOT_FOUND", "no such order")));

        let report = market.refresh_order_status().await;
        assert!(report.skipped);
        assert_eq!(venue.calls("fetch_order_status"), 0);
        assert_eq!(market.tracker().len(), 1);

        gate.notify_one();
        assert_eq!(placing.await.unwrap().unwrap(), id);
        assert_eq!(market.tracker().state_of(&id), Some(OrderState::Open));
        assert!(matches!(&drain(&mut rx)[..], [OrderEvent::Created(_)]));
    }

    #[tokio::test]
    async fn test_two_fills_then_filled_status_completes_once() {
        let (venue, market, mut rx) = setup();
        with_rules(&venue, &market).await;
        let id = place_limit(&venue, &market, "7001").await;

        venue.push_status(&id, Ok(status(&id, VenueOrderStatus::Open)));
        market.refresh_order_status().await;

        venue.push_trades(
            PAIR,
            Ok(vec![fill("t2", "7001", dec!(5), 200), fill("t1", "7001", dec!(5), 100)]),
        );
        market.refresh_trades().await;

        venue.push_status(&id, Ok(status(&id, VenueOrderStatus::Filled)));
        market.refresh_order_status().await;

        let events = drain(&mut rx);
        let completed: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                OrderEvent::Completed(c) => Some(c),
                _ => None,
            })
            .collect();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].base_amount, dec!(10));
        assert_eq!(completed[0].quote_amount, dec!(10.0));
        assert_eq!(completed[0].fee_paid, dec!(0.02));

        let fills = events.iter().filter(|e| matches!(e, OrderEvent::Filled(_))).count();
        assert_eq!(fills, 2);
        assert!(market.tracker().is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_trade_polls_apply_once() {
        let (venue, market, mut rx) = setup();
        with_rules(&venue, &market).await;
        let _id = place_limit(&venue, &market, "7001").await;
        drain(&mut rx);

        let first = vec![fill("t1", "7001", dec!(2), 100)];
        let second = vec![fill("t1", "7001", dec!(2), 100), fill("t2", "7001", dec!(3), 150)];
        venue.push_trades(PAIR, Ok(first));
        venue.push_trades(PAIR, Ok(second));
        market.refresh_trades().await;
        market.refresh_trades().await;

        let fills = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, OrderEvent::Filled(_)))
            .count();
        assert_eq!(fills, 2);

        let windows = venue.trade_windows();
        assert_eq!(windows[0].1.since_ms, None);
        assert_eq!(windows[1].1.since_ms, Some(100));
        assert_eq!(market.export_tracking_state().watermarks[PAIR].key, 150);
    }

    #[tokio::test]
    async fn test_same_millisecond_fill_on_later_poll_is_applied() {
        let (venue, market, mut rx) = setup();
        with_rules(&venue, &market).await;
        let id = place_limit(&venue, &market, "7001").await;
        drain(&mut rx);

        venue.push_trades(PAIR, Ok(vec![fill("t1", "7001", dec!(5), 1000)]));
        venue.push_trades(
            PAIR,
            Ok(vec![fill("t1", "7001", dec!(5), 1000), fill("t2", "7001", dec!(5), 1000)]),
        );
        market.refresh_trades().await;
        market.refresh_trades().await;

        let events = drain(&mut rx);
        let fills = events.iter().filter(|e| matches!(e, OrderEvent::Filled(_))).count();
        assert_eq!(fills, 2);
        let completed = events
            .iter()
            .find_map(|e| match e {
                OrderEvent::Completed(c) => Some(c),
                _ => None,
            })
            .unwrap();
        assert_eq!(completed.base_amount, dec!(10));
        assert_eq!(market.tracker().state_of(&id), Some(OrderState::Filled));
        assert!(market.tracker().is_empty());
    }

    #[tokio::test]
    async fn test_filled_order_without_trades_is_dropped_after_timeout() {
        let config = SchedulerConfig::default().with_fill_reconcile_timeout(Duration::ZERO);
        let (venue, market, mut rx) = setup_custom(&[PAIR], &config, 256);
        with_rules(&venue, &market).await;
        let id = place_limit(&venue, &market, "7001").await;

        venue.push_status(&id, Ok(status(&id, VenueOrderStatus::Filled)));
        market.refresh_order_status().await;
        assert_eq!(market.tracker().len(), 1);
        assert!(market.tracker().pollable_orders().is_empty());

        market.refresh_trades().await;

        assert!(market.tracker().is_empty());
        assert_eq!(market.tracker().state_of(&id), Some(OrderState::Filled));
        let completions = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, OrderEvent::Completed(_)))
            .count();
        assert_eq!(completions, 1);
        assert_eq!(market.metrics.unreconciled_fills(), 1);
    }

    #[tokio::test]
    async fn test_filled_order_waits_for_trades_within_timeout() {
        let (venue, market, _rx) = setup();
        with_rules(&venue, &market).await;
        let id = place_limit(&venue, &market, "7001").await;

        venue.push_status(&id, Ok(status(&id, VenueOrderStatus::Filled)));
        market.refresh_order_status().await;
        market.refresh_trades().await;

        assert_eq!(market.tracker().len(), 1);
        assert_eq!(market.metrics.unreconciled_fills(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_survive_cancelled_delivery() {
        let (venue, market, mut rx) = setup_custom(&[PAIR], &SchedulerConfig::default(), 1);
        with_rules(&venue, &market).await;
        place_limit(&venue, &market, "7001").await;

        venue.push_trades(
            PAIR,
            Ok(vec![fill("t1", "7001", dec!(5), 100), fill("t2", "7001", dec!(5), 200)]),
        );
        let cut_short = tokio::time::timeout(Duration::from_secs(1), market.refresh_trades()).await;
        assert!(cut_short.is_err());
        assert!(matches!(&drain(&mut rx)[..], [OrderEvent::Created(_)]));

        let state = market.export_tracking_state();
        assert_eq!(state.pending_events.len(), 3);

        let (_venue2, restored, mut rx2) = setup();
        restored.import_tracking_state(state);
        assert_eq!(restored.flush_events().await, 3);

        let kinds: Vec<&str> = drain(&mut rx2).iter().map(OrderEvent::kind).collect();
        assert_eq!(kinds, vec!["filled", "filled", "completed"]);
        assert_eq!(restored.pending_events(), 0);
    }

    #[tokio::test]
    async fn test_closed_channel_keeps_events_queued() {
        let (venue, market, rx) = setup();
        with_rules(&venue, &market).await;
        drop(rx);

        place_limit(&venue, &market, "7001").await;

        let pending = market.take_pending_events();
        assert!(matches!(&pending[..], [OrderEvent::Created(_)]));
        assert_eq!(market.pending_events(), 0);
    }

    #[tokio::test]
    async fn test_check_network() {
        let (venue, market, _rx) = setup();
        assert_eq!(market.check_network().await, NetworkStatus::Connected);

        venue.push_network(Err(VenueError::Transport("connection refused".into())));
        assert_eq!(market.check_network().await, NetworkStatus::NotConnected);
    }

    #[tokio::test]
    async fn test_fee_estimate_by_order_type() {
        let (venue, market, _rx) = setup();

        let limit = market.estimate_fee(PAIR, OrderType::Limit, dec!(10), Some(dec!(2)));
        assert_eq!(limit.pct, dec!(0.1));
        assert_eq!(limit.quote_amount, Some(dec!(0.02)));

        let unpriced = market.estimate_fee(PAIR, OrderType::Market, dec!(10), None);
        assert_eq!(unpriced.pct, dec!(0.2));
        assert_eq!(unpriced.quote_amount, None);

        venue.push_book(PAIR, Ok(book(1, dec!(0.50))));
        market.refresh_order_books().await;
        let at_mid = market.estimate_fee(PAIR, OrderType::Market, dec!(10), None);
        assert_eq!(at_mid.quote_amount, Some(dec!(0.011)));
    }

    #[tokio::test]
    async fn test_no_requests_without_tracked_orders() {
        let (venue, market, _rx) = setup();

        let status = market.refresh_order_status().await;
        let trades = market.refresh_trades().await;

        assert!(status.skipped);
        assert!(trades.skipped);
        assert_eq!(venue.calls("fetch_order_status"), 0);
        assert_eq!(venue.calls("fetch_recent_trades"), 0);
    }

    #[tokio::test]
    async fn test_status_failure_for_one_order_does_not_block_others() {
        let (venue, market, mut rx) = setup();
        with_rules(&venue, &market).await;
        let a = place_limit(&venue, &market, "7001").await;
        let b = place_limit(&venue, &market, "7002").await;
        drain(&mut rx);

        venue.push_status(&a, Err(VenueError::Transport("reset".into())));
        let mut cancelled = status(&b, VenueOrderStatus::Cancelled);
        cancelled.exchange_order_id = Some("7002".into());
        venue.push_status(&b, Ok(cancelled));

        let report = market.refresh_order_status().await;
        assert_eq!(report.requests, 2);
        assert_eq!(report.applied, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].scope, a);
        assert!(matches!(&drain(&mut rx)[..], [OrderEvent::Cancelled(_)]));
        assert_eq!(market.tracker().state_of(&a), Some(OrderState::Open));
    }

    #[tokio::test]
    async fn test_cancel_all_reports_each_order() {
        let (venue, market, mut rx) = setup();
        with_rules(&venue, &market).await;
        let a = place_limit(&venue, &market, "7001").await;
        let b = place_limit(&venue, &market, "7002").await;
        let c = place_limit(&venue, &market, "7003").await;
        drain(&mut rx);
        venue.fail_cancel(&b);

        let mut results = market.cancel_all(Duration::from_secs(5)).await;
        results.sort_by(|x, y| x.client_order_id.cmp(&y.client_order_id));

        assert_eq!(results.len(), 3);
        let succeeded: Vec<_> = results.iter().filter(|r| r.success).collect();
        assert_eq!(succeeded.len(), 2);
        assert!(results.iter().any(|r| r.client_order_id == b && !r.success));
        assert_eq!(market.tracker().state_of(&a), Some(OrderState::Cancelled));
        assert_eq!(market.tracker().state_of(&c), Some(OrderState::Cancelled));
        assert_eq!(market.tracker().state_of(&b), Some(OrderState::Open));

        let cancelled = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, OrderEvent::Cancelled(_)))
            .count();
        assert_eq!(cancelled, 2);
    }

    #[tokio::test]
    async fn test_cancel_and_wait() {
        let (venue, market, _rx) = setup();
        with_rules(&venue, &market).await;
        let id = place_limit(&venue, &market, "7001").await;

        assert!(market.cancel_and_wait(&id, Duration::from_secs(1)).await.unwrap());
        assert!(matches!(
            market.cancel("missing").await,
            Err(MarketError::UnknownOrder(_))
        ));
    }

    #[tokio::test]
    async fn test_late_snapshot_is_ignored() {
        let (venue, market, _rx) = setup();
        venue.push_book(PAIR, Ok(book(100, dec!(0.55))));
        venue.push_book(PAIR, Ok(book(98, dec!(0.40))));

        market.refresh_order_books().await;
        market.refresh_order_books().await;

        assert_eq!(market.best_bid(PAIR).unwrap().price, dec!(0.55));
        assert_eq!(market.order_book(PAIR).unwrap().update_id, 100);
    }

    #[tokio::test]
    async fn test_book_failure_for_one_pair_keeps_others() {
        let (venue, market, _rx) = setup_with(&[PAIR, "ETH-USDT"]);
        venue.push_book(PAIR, Ok(book(1, dec!(0.55))));
        venue.push_book("ETH-USDT", Err(VenueError::Parse("unexpected field".into())));

        let report = market.refresh_order_books().await;

        assert_eq!(report.applied, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].scope, "ETH-USDT");
        assert!(market.best_bid(PAIR).is_some());
        assert!(market.best_bid("ETH-USDT").is_none());
    }

    #[tokio::test]
    async fn test_balances_replaced() {
        let (venue, market, _rx) = setup();
        let balance = |asset: &str, total| Balance {
            asset: asset.to_string(),
            free: total,
            total,
        };
        venue.push_balances(Ok(vec![balance("XRP", dec!(10)), balance("USDT", dec!(5))]));
        venue.push_balances(Ok(vec![balance("USDT", dec!(7))]));

        market.refresh_balances().await;
        assert_eq!(market.balances().len(), 2);

        market.refresh_balances().await;
        assert!(market.balance("XRP").is_none());
        assert_eq!(market.balance("USDT").unwrap().total, dec!(7));
    }

    #[tokio::test]
    async fn test_truncated_trade_window_is_flagged() {
        let venue = Arc::new(ScriptedVenue::new());
        let (tx, _rx) = create_event_channel(64);
        let market = VenueMarket::new(
            venue.clone(),
            vec![PAIR.to_string()],
            &SchedulerConfig::default().with_trade_fetch_limit(2),
            tx,
            create_metrics(),
        );
        with_rules(&venue, &market).await;
        place_limit(&venue, &market, "7001").await;

        venue.push_trades(
            PAIR,
            Ok(vec![fill("a", "9", dec!(1), 10), fill("b", "9", dec!(1), 11)]),
        );
        let report = market.refresh_trades().await;
        assert_eq!(report.truncated, vec![PAIR.to_string()]);
    }

    #[tokio::test]
    async fn test_priming_skips_history_without_events() {
        let (venue, market, mut rx) = setup();
        with_rules(&venue, &market).await;

        venue.push_trades(PAIR, Ok(vec![fill("old", "7001", dec!(5), 500)]));
        market.prime_trade_watermarks().await;
        assert_eq!(venue.trade_windows()[0].1.limit, PRIME_WINDOW);

        place_limit(&venue, &market, "7001").await;
        drain(&mut rx);

        venue.push_trades(
            PAIR,
            Ok(vec![fill("old", "7001", dec!(5), 500), fill("new", "7001", dec!(3), 600)]),
        );
        market.refresh_trades().await;

        let filled: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                OrderEvent::Filled(f) => Some(f.trade_id),
                _ => None,
            })
            .collect();
        assert_eq!(filled, vec!["new".to_string()]);
    }

    #[tokio::test]
    async fn test_status_and_readiness() {
        let (venue, market, _rx) = setup();
        assert!(!market.ready());

        with_rules(&venue, &market).await;
        market.refresh_balances().await;
        venue.push_book(PAIR, Ok(book(1, dec!(0.5))));
        market.refresh_order_books().await;
        let status = market.status();
        assert!(status.trading_rule_initialized);
        assert!(status.account_balance);
        assert!(status.order_books_initialized);
        assert!(!status.watermarks_initialized);

        market.prime_trade_watermarks().await;
        assert!(market.ready());
    }

    #[tokio::test]
    async fn test_tracking_state_round_trip() {
        let (venue, market, _rx) = setup();
        with_rules(&venue, &market).await;
        let id = place_limit(&venue, &market, "7001").await;
        venue.push_trades(PAIR, Ok(vec![fill("t1", "7001", dec!(4), 100)]));
        market.refresh_trades().await;

        let state = market.export_tracking_state();
        assert_eq!(state.orders.len(), 1);

        let (venue2, restored, mut rx2) = setup();
        assert_eq!(restored.import_tracking_state(state), 1);
        assert!(restored.status().watermarks_initialized);

        // A replay of the same trade after restart is filtered by the watermark.
        venue2.push_trades(
            PAIR,
            Ok(vec![fill("t1", "7001", dec!(4), 100), fill("t2", "7001", dec!(6), 200)]),
        );
        restored.refresh_trades().await;

        let order = restored.tracker().state_of(&id);
        assert_eq!(order, Some(OrderState::Filled));
        let completed = drain(&mut rx2)
            .into_iter()
            .find_map(|e| match e {
                OrderEvent::Completed(c) => Some(c),
                _ => None,
            })
            .unwrap();
        assert_eq!(completed.base_amount, dec!(10));
    }
}
