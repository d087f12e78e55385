//! Venue call failures and how pollers classify them.

use std::time::Duration;

use thiserror::Error;

/// Failure of a single venue call.
#[derive(Debug, Clone, Error)]
pub enum VenueError {
    /// Network failure, timeout or venue-side 5xx.
    #[error("transport error: {0}")]
    Transport(String),

    /// Request budget exhausted; back off longer than for other errors.
    #[error("rate limited (retry after {retry_after_ms:?} ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    /// The venue refused the request (bad parameters, insufficient balance, unknown order).
    #[error("rejected by venue [{code}]: {message}")]
    Rejected { code: String, message: String },

    /// Response did not match the expected shape.
    #[error("parse error: {0}")]
    Parse(String),
}

impl VenueError {
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Worth retrying on the next cycle. Rejections are final for the request.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }

    /// Venue-provided wait hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited {
                retry_after_ms: Some(ms),
            } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }
}
