//! Freshness of order data from the venue.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

pub type SharedHeartbeat = Arc<StreamHeartbeat>;

/// Last time fresh order data arrived: a user stream message, or an order
/// status or trade poll that completed without failures.
///
/// Pollers use this to poll faster while order data is stale.
#[derive(Debug, Default)]
pub struct StreamHeartbeat {
    last_recv: Mutex<Option<Instant>>,
}

impl StreamHeartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedHeartbeat {
        Arc::new(Self::new())
    }

    /// Record that fresh order data arrived now.
    pub fn record(&self) {
        *self.last_recv.lock() = Some(Instant::now());
    }

    /// Time since the last record, `None` if nothing was ever recorded.
    pub fn silence(&self) -> Option<Duration> {
        self.last_recv.lock().map(|at| at.elapsed())
    }

    /// Never having recorded anything counts as silent.
    pub fn is_silent(&self, threshold: Duration) -> bool {
        self.silence().map_or(true, |silence| silence > threshold)
    }
}
