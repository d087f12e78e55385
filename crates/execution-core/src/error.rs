//! Tracker and persistence errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("order not tracked: {0}")]
    UnknownOrder(String),

    #[error("order already tracked: {0}")]
    DuplicateOrder(String),

    #[error("exchange order id for {client_order_id} already set to {existing}, got {received}")]
    ExchangeIdConflict {
        client_order_id: String,
        existing: String,
        received: String,
    },
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
