//! Venue client contract shared by the reconciler and venue adapters.

mod config;
mod error;
mod heartbeat;
mod venue;

use execution_core::OrderEvent;
use tokio::sync::mpsc;

pub use config::ConnectorConfig;
pub use error::VenueError;
pub use heartbeat::{SharedHeartbeat, StreamHeartbeat};
pub use venue::{TradeWindow, VenueClient};

pub type EventSender = mpsc::Sender<OrderEvent>;
pub type EventReceiver = mpsc::Receiver<OrderEvent>;

pub fn create_event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(capacity)
}
