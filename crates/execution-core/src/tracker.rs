//! In-flight order tracking and lifecycle reconciliation.
//!
//! Status polls, trade fills and cancel acknowledgments all flow through the
//! tracker. Every transition emits its event at most once: whichever source
//! observes a terminal condition first wins, later observations are no-ops.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::TrackerError;
use crate::event::{
    OrderCancelled, OrderCompleted, OrderCreated, OrderEvent, OrderFailed, OrderFilled,
};
use crate::order::{OrderState, TrackedOrder, VenueOrderStatus};
use crate::report::{CancelAck, FillReport, OrderStatusReport};

/// How many finished orders are remembered for late waiters.
const FINISHED_CAPACITY: usize = 1000;

/// Shared tracker handle.
pub type SharedOrderTracker = Arc<OrderTracker>;

pub fn create_order_tracker() -> SharedOrderTracker {
    Arc::new(OrderTracker::new())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Bounded memory of orders that left the tracked set.
#[derive(Debug, Default)]
struct FinishedOrders {
    order: VecDeque<String>,
    states: HashMap<String, OrderState>,
}

impl FinishedOrders {
    fn record(&mut self, client_order_id: String, state: OrderState) {
        if self.states.insert(client_order_id.clone(), state).is_none() {
            self.order.push_back(client_order_id);
        }
        while self.order.len() > FINISHED_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.states.remove(&oldest);
            }
        }
    }

    fn get(&self, client_order_id: &str) -> Option<OrderState> {
        self.states.get(client_order_id).copied()
    }
}

#[derive(Debug, Default)]
struct Inner {
    orders: HashMap<String, TrackedOrder>,
    by_exchange_id: HashMap<String, String>,
    /// Orders whose submission request has not returned yet.
    submitting: HashSet<String>,
    finished: FinishedOrders,
}

impl Inner {
    fn finish(&mut self, client_order_id: &str) -> Option<TrackedOrder> {
        let order = self.orders.remove(client_order_id)?;
        if let Some(exchange_id) = &order.exchange_order_id {
            self.by_exchange_id.remove(exchange_id);
        }
        self.submitting.remove(client_order_id);
        self.finished
            .record(order.client_order_id.clone(), order.state);
        Some(order)
    }
}

/// Owner of the in-flight order set.
#[derive(Debug)]
pub struct OrderTracker {
    inner: RwLock<Inner>,
    changes: watch::Sender<u64>,
}

impl Default for OrderTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderTracker {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: RwLock::new(Inner::default()),
            changes,
        }
    }

    fn notify(&self) {
        self.changes.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    fn publish(&self, events: Vec<OrderEvent>) -> Vec<OrderEvent> {
        if !events.is_empty() {
            self.notify();
        }
        events
    }

    /// Start tracking an order as its submission goes out.
    ///
    /// The order is left out of [`pollable_orders`](Self::pollable_orders)
    /// until the submission resolves.
    pub fn start_tracking(&self, order: TrackedOrder) -> Result<(), TrackerError> {
        let mut inner = self.inner.write();
        if inner.orders.contains_key(&order.client_order_id) {
            return Err(TrackerError::DuplicateOrder(order.client_order_id));
        }
        if let Some(exchange_id) = &order.exchange_order_id {
            inner
                .by_exchange_id
                .insert(exchange_id.clone(), order.client_order_id.clone());
        }
        debug!(
            client_order_id = %order.client_order_id,
            symbol = %order.trading_pair,
            "tracking order"
        );
        inner.submitting.insert(order.client_order_id.clone());
        inner.orders.insert(order.client_order_id.clone(), order);
        Ok(())
    }

    /// The submission request failed in transit; status polls may now settle
    /// the order.
    pub fn submission_unresolved(&self, client_order_id: &str) {
        self.inner.write().submitting.remove(client_order_id);
    }

    /// Venue accepted the order and assigned an id.
    pub fn confirm_created(
        &self,
        client_order_id: &str,
        exchange_order_id: &str,
    ) -> Result<Vec<OrderEvent>, TrackerError> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let order = inner
            .orders
            .get_mut(client_order_id)
            .ok_or_else(|| TrackerError::UnknownOrder(client_order_id.to_string()))?;
        inner.submitting.remove(client_order_id);

        bind_exchange_id(order, &mut inner.by_exchange_id, exchange_order_id)?;

        let mut events = Vec::new();
        if order.state == OrderState::PendingCreate {
            order.state = OrderState::Open;
            info!(
                client_order_id,
                exchange_order_id,
                symbol = %order.trading_pair,
                "order created"
            );
            events.push(created_event(order, exchange_order_id));
        }
        drop(guard);
        Ok(self.publish(events))
    }

    /// Submission failed; the order is dropped with a failure event.
    pub fn fail_submission(&self, client_order_id: &str, reason: &str) -> Vec<OrderEvent> {
        let mut inner = self.inner.write();
        let Some(order) = inner.orders.get_mut(client_order_id) else {
            return Vec::new();
        };
        order.state = OrderState::Rejected;
        warn!(
            client_order_id,
            symbol = %order.trading_pair,
            side = ?order.side,
            order_type = ?order.order_type,
            amount = %order.amount,
            reason,
            "order submission failed"
        );
        let event = failed_event(order, reason);
        inner.finish(client_order_id);
        drop(inner);
        self.publish(vec![event])
    }

    /// The venue answered a status poll without knowing the order.
    ///
    /// A `PendingCreate` order fails once `threshold` consecutive polls came
    /// back not-found; a status report in between resets the count.
    pub fn record_not_found(
        &self,
        client_order_id: &str,
        reason: &str,
        threshold: u32,
    ) -> Vec<OrderEvent> {
        {
            let mut inner = self.inner.write();
            let Some(order) = inner.orders.get_mut(client_order_id) else {
                return Vec::new();
            };
            if order.state != OrderState::PendingCreate {
                return Vec::new();
            }
            order.not_found_polls += 1;
            if order.not_found_polls < threshold.max(1) {
                debug!(
                    client_order_id,
                    polls = order.not_found_polls,
                    threshold,
                    "order not found on venue yet"
                );
                return Vec::new();
            }
        }
        self.fail_submission(client_order_id, reason)
    }

    /// Reconcile an order-status poll result.
    pub fn apply_status(&self, report: &OrderStatusReport) -> Vec<OrderEvent> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let Some(order) = inner.orders.get_mut(&report.client_order_id) else {
            debug!(client_order_id = %report.client_order_id, "status for untracked order");
            return Vec::new();
        };
        order.not_found_polls = 0;

        if order.last_venue_status == Some(report.status) {
            return Vec::new();
        }

        if let Some(exchange_id) = &report.exchange_order_id {
            if let Err(e) = bind_exchange_id(order, &mut inner.by_exchange_id, exchange_id) {
                warn!(error = %e, "ignoring status report");
                return Vec::new();
            }
        }
        order.last_venue_status = Some(report.status);

        if order.state.is_terminal() {
            return Vec::new();
        }

        let mut events = Vec::new();
        if order.state == OrderState::PendingCreate {
            if let Some(exchange_id) = order.exchange_order_id.clone() {
                events.push(created_event(order, &exchange_id));
            }
        }

        let mut finished = false;
        match report.status {
            VenueOrderStatus::Open => {
                order.state = if order.executed_base.is_zero() {
                    OrderState::Open
                } else {
                    OrderState::PartiallyFilled
                };
            }
            VenueOrderStatus::PartiallyFilled => {
                order.state = OrderState::PartiallyFilled;
            }
            VenueOrderStatus::Filled => {
                order.state = OrderState::Filled;
                if !order.completed {
                    order.completed = true;
                    info!(
                        client_order_id = %order.client_order_id,
                        symbol = %order.trading_pair,
                        base = %order.executed_base,
                        quote = %order.executed_quote,
                        "order completed (status poll)"
                    );
                    events.push(completed_event(order));
                }
                finished = order.is_fully_executed();
                if !finished {
                    order.filled_at_ms = Some(now_ms());
                }
            }
            VenueOrderStatus::Cancelled => {
                order.state = OrderState::Cancelled;
                info!(
                    client_order_id = %order.client_order_id,
                    symbol = %order.trading_pair,
                    "order cancelled (status poll)"
                );
                events.push(cancelled_event(order));
                finished = true;
            }
            VenueOrderStatus::Rejected => {
                order.state = OrderState::Rejected;
                warn!(
                    client_order_id = %order.client_order_id,
                    symbol = %order.trading_pair,
                    "order rejected by venue"
                );
                events.push(failed_event(order, "rejected by venue"));
                finished = true;
            }
        }

        if finished {
            let client_order_id = report.client_order_id.clone();
            inner.finish(&client_order_id);
        }
        drop(guard);
        self.publish(events)
    }

    /// Apply one deduplicated trade fill.
    pub fn apply_fill(&self, fill: &FillReport) -> Vec<OrderEvent> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let Some(client_order_id) = inner.by_exchange_id.get(&fill.exchange_order_id).cloned()
        else {
            return Vec::new();
        };
        let Some(order) = inner.orders.get_mut(&client_order_id) else {
            return Vec::new();
        };

        if !order.applied_trade_ids.insert(fill.trade_id.clone()) {
            debug!(
                client_order_id = %client_order_id,
                trade_id = %fill.trade_id,
                "trade already applied"
            );
            return Vec::new();
        }

        order.executed_base += fill.quantity;
        order.executed_quote += fill.quote_quantity();
        order.fee_paid += fill.fee_amount;
        order.fee_asset = Some(fill.fee_asset.clone());

        info!(
            client_order_id = %client_order_id,
            symbol = %order.trading_pair,
            trade_id = %fill.trade_id,
            price = %fill.price,
            quantity = %fill.quantity,
            executed = %order.executed_base,
            "order filled"
        );

        let mut events = vec![filled_event(order, fill)];
        let mut finished = false;

        if order.is_fully_executed() {
            if !order.completed {
                order.state = OrderState::Filled;
                order.completed = true;
                info!(
                    client_order_id = %client_order_id,
                    symbol = %order.trading_pair,
                    base = %order.executed_base,
                    quote = %order.executed_quote,
                    "order completed (trade fills)"
                );
                events.push(completed_event(order));
            }
            finished = order.state == OrderState::Filled;
        } else if matches!(order.state, OrderState::PendingCreate | OrderState::Open) {
            order.state = OrderState::PartiallyFilled;
        }

        if finished {
            inner.finish(&client_order_id);
        }
        drop(guard);
        self.publish(events)
    }

    /// Apply a synchronous cancel acknowledgment.
    pub fn apply_cancel_ack(&self, ack: &CancelAck) -> Vec<OrderEvent> {
        let mut inner = self.inner.write();
        let Some(order) = inner.orders.get_mut(&ack.client_order_id) else {
            return Vec::new();
        };

        if let (Some(ours), Some(theirs)) = (&order.exchange_order_id, &ack.exchange_order_id) {
            if ours != theirs {
                warn!(
                    client_order_id = %ack.client_order_id,
                    expected = %ours,
                    got = %theirs,
                    "cancel ack for a different exchange order"
                );
                return Vec::new();
            }
        }
        if order.state.is_terminal() {
            return Vec::new();
        }

        order.state = OrderState::Cancelled;
        info!(
            client_order_id = %ack.client_order_id,
            symbol = %order.trading_pair,
            "order cancelled"
        );
        let event = cancelled_event(order);
        inner.finish(&ack.client_order_id);
        drop(inner);
        self.publish(vec![event])
    }

    pub fn get(&self, client_order_id: &str) -> Option<TrackedOrder> {
        self.inner.read().orders.get(client_order_id).cloned()
    }

    /// Current state, including recently finished orders.
    pub fn state_of(&self, client_order_id: &str) -> Option<OrderState> {
        let inner = self.inner.read();
        inner
            .orders
            .get(client_order_id)
            .map(|order| order.state)
            .or_else(|| inner.finished.get(client_order_id))
    }

    /// All tracked orders (including filled orders still awaiting trades).
    pub fn tracked_orders(&self) -> Vec<TrackedOrder> {
        self.inner.read().orders.values().cloned().collect()
    }

    /// Tracked orders worth a status poll: submission resolved and not yet
    /// terminal.
    pub fn pollable_orders(&self) -> Vec<TrackedOrder> {
        let inner = self.inner.read();
        inner
            .orders
            .values()
            .filter(|order| {
                order.state.is_active() && !inner.submitting.contains(&order.client_order_id)
            })
            .cloned()
            .collect()
    }

    /// Drop orders the venue reported `Filled` at least `max_age_ms` ago whose
    /// trades never covered the amount.
    ///
    /// Returns the dropped orders as last reconciled.
    pub fn expire_unreconciled_fills(&self, now_ms: i64, max_age_ms: i64) -> Vec<TrackedOrder> {
        let mut inner = self.inner.write();
        let expired: Vec<String> = inner
            .orders
            .values()
            .filter(|order| {
                order.state == OrderState::Filled
                    && order
                        .filled_at_ms
                        .is_some_and(|filled_at| now_ms - filled_at >= max_age_ms)
            })
            .map(|order| order.client_order_id.clone())
            .collect();

        let dropped: Vec<TrackedOrder> = expired
            .iter()
            .filter_map(|client_order_id| inner.finish(client_order_id))
            .collect();
        drop(inner);

        for order in &dropped {
            warn!(
                client_order_id = %order.client_order_id,
                symbol = %order.trading_pair,
                amount = %order.amount,
                executed = %order.executed_base,
                "filled order never reconciled with trades, no longer tracked"
            );
        }
        if !dropped.is_empty() {
            self.notify();
        }
        dropped
    }

    /// Tracked orders that can still be cancelled.
    pub fn active_orders(&self) -> Vec<TrackedOrder> {
        self.inner
            .read()
            .orders
            .values()
            .filter(|order| order.state.is_active())
            .cloned()
            .collect()
    }

    /// Distinct trading pairs with at least one tracked order.
    pub fn tracked_pairs(&self) -> BTreeSet<String> {
        self.inner
            .read()
            .orders
            .values()
            .map(|order| order.trading_pair.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().orders.is_empty()
    }

    fn terminal_state(&self, client_order_id: &str) -> Result<Option<OrderState>, ()> {
        match self.state_of(client_order_id) {
            Some(state) if state.is_terminal() => Ok(Some(state)),
            Some(_) => Ok(None),
            None => Err(()),
        }
    }

    /// Wait until the order reaches a terminal state.
    ///
    /// Returns `None` on timeout or if the order is unknown. The order stays
    /// tracked after a timeout.
    pub async fn wait_for_terminal(
        &self,
        client_order_id: &str,
        timeout: Duration,
    ) -> Option<OrderState> {
        let deadline = Instant::now() + timeout;
        let mut changes = self.changes.subscribe();
        loop {
            match self.terminal_state(client_order_id) {
                Ok(Some(state)) => return Some(state),
                Ok(None) => {}
                Err(()) => return None,
            }
            match tokio::time::timeout_at(deadline, changes.changed()).await {
                Ok(Ok(())) => continue,
                _ => return None,
            }
        }
    }

    /// Copy of all tracked orders, keyed by client order id.
    pub fn export_orders(&self) -> HashMap<String, TrackedOrder> {
        self.inner.read().orders.clone()
    }

    /// Restore previously exported orders. Already tracked ids are skipped.
    ///
    /// Returns the number of orders restored.
    pub fn import_orders(&self, orders: impl IntoIterator<Item = TrackedOrder>) -> usize {
        let mut inner = self.inner.write();
        let mut restored = 0;
        for order in orders {
            if inner.orders.contains_key(&order.client_order_id) {
                continue;
            }
            if let Some(exchange_id) = &order.exchange_order_id {
                inner
                    .by_exchange_id
                    .insert(exchange_id.clone(), order.client_order_id.clone());
            }
            inner.orders.insert(order.client_order_id.clone(), order);
            restored += 1;
        }
        restored
    }
}

fn bind_exchange_id(
    order: &mut TrackedOrder,
    index: &mut HashMap<String, String>,
    exchange_order_id: &str,
) -> Result<(), TrackerError> {
    match &order.exchange_order_id {
        Some(existing) if existing != exchange_order_id => Err(TrackerError::ExchangeIdConflict {
            client_order_id: order.client_order_id.clone(),
            existing: existing.clone(),
            received: exchange_order_id.to_string(),
        }),
        Some(_) => Ok(()),
        None => {
            order.exchange_order_id = Some(exchange_order_id.to_string());
            index.insert(exchange_order_id.to_string(), order.client_order_id.clone());
            Ok(())
        }
    }
}

fn created_event(order: &TrackedOrder, exchange_order_id: &str) -> OrderEvent {
    OrderEvent::Created(OrderCreated {
        client_order_id: order.client_order_id.clone(),
        exchange_order_id: exchange_order_id.to_string(),
        trading_pair: order.trading_pair.clone(),
        side: order.side,
        order_type: order.order_type,
        price: order.price,
        amount: order.amount,
        timestamp_ms: now_ms(),
    })
}

fn filled_event(order: &TrackedOrder, fill: &FillReport) -> OrderEvent {
    OrderEvent::Filled(OrderFilled {
        client_order_id: order.client_order_id.clone(),
        exchange_order_id: fill.exchange_order_id.clone(),
        trading_pair: order.trading_pair.clone(),
        side: order.side,
        order_type: order.order_type,
        trade_id: fill.trade_id.clone(),
        price: fill.price,
        amount: fill.quantity,
        fee_asset: fill.fee_asset.clone(),
        fee_amount: fill.fee_amount,
        timestamp_ms: fill.timestamp_ms,
    })
}

fn completed_event(order: &TrackedOrder) -> OrderEvent {
    OrderEvent::Completed(OrderCompleted {
        client_order_id: order.client_order_id.clone(),
        exchange_order_id: order.exchange_order_id.clone(),
        trading_pair: order.trading_pair.clone(),
        side: order.side,
        order_type: order.order_type,
        base_amount: order.executed_base,
        quote_amount: order.executed_quote,
        fee_asset: order.fee_asset.clone(),
        fee_paid: order.fee_paid,
        timestamp_ms: now_ms(),
    })
}

fn cancelled_event(order: &TrackedOrder) -> OrderEvent {
    OrderEvent::Cancelled(OrderCancelled {
        client_order_id: order.client_order_id.clone(),
        exchange_order_id: order.exchange_order_id.clone(),
        trading_pair: order.trading_pair.clone(),
        executed_base: order.executed_base,
        executed_quote: order.executed_quote,
        fee_paid: order.fee_paid,
        timestamp_ms: now_ms(),
    })
}

fn failed_event(order: &TrackedOrder, reason: &str) -> OrderEvent {
    OrderEvent::Failed(OrderFailed {
        client_order_id: order.client_order_id.clone(),
        trading_pair: order.trading_pair.clone(),
        side: order.side,
        order_type: order.order_type,
        price: order.price,
        amount: order.amount,
        reason: reason.to_string(),
        timestamp_ms: now_ms(),
    })
}
