//! Scripted in-memory venue for tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use connector_core::{TradeWindow, VenueClient, VenueError};
use execution_core::{
    CancelAck, FillReport, OrderRef, OrderRequest, OrderSide, OrderStatusReport, VenueOrderStatus,
};
use model::{Balance, BookSnapshot, Exchange, TradingFees, TradingRule};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::Notify;

type Scripted<T> = VecDeque<Result<T, VenueError>>;

#[derive(Default)]
struct Script {
    books: HashMap<String, Scripted<BookSnapshot>>,
    trades: HashMap<String, Scripted<Vec<FillReport>>>,
    statuses: HashMap<String, Scripted<OrderStatusReport>>,
    balances: Scripted<Vec<Balance>>,
    rules: Scripted<Vec<TradingRule>>,
    submits: Scripted<String>,
    network: Scripted<()>,
    failing_cancels: HashSet<String>,
    calls: HashMap<&'static str, usize>,
    submitted: Vec<OrderRequest>,
    trade_windows: Vec<(String, TradeWindow)>,
    next_id: u64,
}

/// Venue whose responses are queued up front.
///
/// Each call pops the next scripted response; an empty queue falls back to a
/// harmless default (empty lists, an accepted order, an empty book).
#[derive(Default)]
pub struct ScriptedVenue {
    script: Mutex<Script>,
    /// When set, `submit_order` waits for a permit before answering.
    submit_gate: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedVenue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_book(&self, pair: &str, snapshot: Result<BookSnapshot, VenueError>) {
        self.script
            .lock()
            .books
            .entry(pair.to_string())
            .or_default()
            .push_back(snapshot);
    }

    pub fn push_trades(&self, pair: &str, trades: Result<Vec<FillReport>, VenueError>) {
        self.script
            .lock()
            .trades
            .entry(pair.to_string())
            .or_default()
            .push_back(trades);
    }

    pub fn push_status(&self, client_order_id: &str, status: Result<OrderStatusReport, VenueError>) {
        self.script
            .lock()
            .statuses
            .entry(client_order_id.to_string())
            .or_default()
            .push_back(status);
    }

    pub fn push_balances(&self, balances: Result<Vec<Balance>, VenueError>) {
        self.script.lock().balances.push_back(balances);
    }

    pub fn push_rules(&self, rules: Result<Vec<TradingRule>, VenueError>) {
        self.script.lock().rules.push_back(rules);
    }

    pub fn push_submit(&self, result: Result<String, VenueError>) {
        self.script.lock().submits.push_back(result);
    }

    /// Hold every submission until the returned handle is notified.
    pub fn gate_submits(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.submit_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn push_network(&self, result: Result<(), VenueError>) {
        self.script.lock().network.push_back(result);
    }

    pub fn fail_cancel(&self, client_order_id: &str) {
        self.script
            .lock()
            .failing_cancels
            .insert(client_order_id.to_string());
    }

    pub fn calls(&self, method: &str) -> usize {
        self.script.lock().calls.get(method).copied().unwrap_or(0)
    }

    pub fn submitted(&self) -> Vec<OrderRequest> {
        self.script.lock().submitted.clone()
    }

    pub fn trade_windows(&self) -> Vec<(String, TradeWindow)> {
        self.script.lock().trade_windows.clone()
    }

    fn record(&self, method: &'static str) -> parking_lot::MutexGuard<'_, Script> {
        let mut script = self.script.lock();
        *script.calls.entry(method).or_default() += 1;
        script
    }
}

#[async_trait]
impl VenueClient for ScriptedVenue {
    fn exchange(&self) -> Exchange {
        Exchange::Probit
    }

    fn new_client_order_id(&self, side: OrderSide, _trading_pair: &str) -> String {
        let mut script = self.script.lock();
        script.next_id += 1;
        let prefix = match side {
            OrderSide::Buy => "B",
            OrderSide::Sell => "S",
        };
        format!("{prefix}{}", script.next_id)
    }

    async fn fetch_order_book(&self, trading_pair: &str) -> Result<BookSnapshot, VenueError> {
        let mut script = self.record("fetch_order_book");
        let calls = script.calls["fetch_order_book"] as u64;
        script
            .books
            .get_mut(trading_pair)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Ok(BookSnapshot {
                    trading_pair: trading_pair.to_string(),
                    bids: Vec::new(),
                    asks: Vec::new(),
                    update_id: calls,
                })
            })
    }

    async fn fetch_recent_trades(
        &self,
        trading_pair: &str,
        window: TradeWindow,
    ) -> Result<Vec<FillReport>, VenueError> {
        let mut script = self.record("fetch_recent_trades");
        script.trade_windows.push((trading_pair.to_string(), window));
        script
            .trades
            .get_mut(trading_pair)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn fetch_order_status(&self, order: &OrderRef) -> Result<OrderStatusReport, VenueError> {
        let mut script = self.record("fetch_order_status");
        script
            .statuses
            .get_mut(&order.client_order_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Ok(OrderStatusReport {
                    client_order_id: order.client_order_id.clone(),
                    exchange_order_id: order.exchange_order_id.clone(),
                    trading_pair: order.trading_pair.clone(),
                    status: VenueOrderStatus::Open,
                    reported_filled: Decimal::ZERO,
                    timestamp_ms: 0,
                })
            })
    }

    async fn fetch_balances(&self) -> Result<Vec<Balance>, VenueError> {
        self.record("fetch_balances")
            .balances
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn submit_order(&self, request: &OrderRequest) -> Result<String, VenueError> {
        let result = {
            let mut script = self.record("submit_order");
            script.submitted.push(request.clone());
            let fallback = format!("X-{}", request.client_order_id);
            script.submits.pop_front().unwrap_or(Ok(fallback))
        };
        let gate = self.submit_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        result
    }

    async fn cancel_order(&self, order: &OrderRef) -> Result<CancelAck, VenueError> {
        let script = self.record("cancel_order");
        if script.failing_cancels.contains(&order.client_order_id) {
            return Err(VenueError::Transport("connection reset".into()));
        }
        Ok(CancelAck {
            client_order_id: order.client_order_id.clone(),
            exchange_order_id: order.exchange_order_id.clone(),
        })
    }

    async fn fetch_trading_rules(&self) -> Result<Vec<TradingRule>, VenueError> {
        self.record("fetch_trading_rules")
            .rules
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn check_network(&self) -> Result<(), VenueError> {
        self.record("check_network")
            .network
            .pop_front()
            .unwrap_or(Ok(()))
    }

    fn trading_fees(&self) -> TradingFees {
        TradingFees::new(Decimal::new(1, 1), Decimal::new(2, 1))
    }
}
