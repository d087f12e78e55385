//! Order lifecycle reconciliation.
//!
//! - **Order types**: `TrackedOrder`, `OrderRequest`, `OrderSide`, `OrderType`, `OrderState`
//! - **Venue reports**: `FillReport`, `OrderStatusReport`, `CancelAck`
//! - **Tracker**: `OrderTracker` applies reports and emits `OrderEvent`s exactly once
//! - **Deduplication**: `TradeDeduplicator` gates repeated trade-history polls
//! - **Persistence**: `TrackingState` and the `TrackingStateStore` load/save interface
//!
//! # Order Lifecycle
//!
//! 1. A `client_order_id` is generated and the order is tracked as `PendingCreate`
//! 2. The submission goes out; the venue id arrives via `confirm_created` or a status poll
//! 3. Trade polls add fills; status polls move the order between open states
//! 4. The first terminal observation emits the final event and later ones are ignored
//! 5. The order leaves the tracked set once nothing is left to reconcile

mod client_id;
mod dedup;
mod error;
mod event;
mod order;
mod persistence;
mod report;
mod tracker;

pub use client_id::{generate_bounded_client_order_id, generate_client_order_id};
pub use dedup::{TradeDeduplicator, Watermark};
pub use error::{PersistenceError, TrackerError};
pub use event::{
    CancellationResult, OrderCancelled, OrderCompleted, OrderCreated, OrderEvent, OrderFailed,
    OrderFilled,
};
pub use order::{
    OrderRef, OrderRequest, OrderSide, OrderState, OrderType, TrackedOrder, VenueOrderStatus,
};
pub use persistence::{JsonFileStore, TrackingState, TrackingStateStore};
pub use report::{CancelAck, FillReport, OrderStatusReport};
pub use tracker::{create_order_tracker, OrderTracker, SharedOrderTracker};
