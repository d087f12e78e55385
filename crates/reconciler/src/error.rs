//! Venue market error types.

use connector_core::VenueError;
use execution_core::TrackerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarketError {
    /// Refused locally (trading rules) or by the venue. A failure event was emitted.
    #[error("order {client_order_id} rejected: {reason}")]
    OrderRejected {
        client_order_id: String,
        reason: String,
    },

    /// The submission request failed in transit. The order stays tracked as
    /// pending until a status poll settles it.
    #[error("order {client_order_id} submission unconfirmed: {source}")]
    SubmissionUnconfirmed {
        client_order_id: String,
        #[source]
        source: VenueError,
    },

    #[error("unknown order: {0}")]
    UnknownOrder(String),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Venue(#[from] VenueError),
}
