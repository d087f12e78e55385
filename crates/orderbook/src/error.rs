//! Order book error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderBookError {
    /// Diff does not connect to the book's frontier.
    #[error("sequence gap: expected {expected}, got {actual}")]
    SequenceGap { expected: u64, actual: u64 },
}
