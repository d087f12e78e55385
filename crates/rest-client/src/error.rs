//! REST client error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RestError {
    /// Non-success status other than 429. `message` is the raw body.
    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    #[error("Request timeout")]
    Timeout,

    #[error("Connection error: {0}")]
    Connection(String),

    /// Body was not the expected JSON.
    #[error("JSON parse error: {0}")]
    Parse(String),

    /// HTTP 429. `retry_after_ms` comes from the `Retry-After` header when present.
    #[error("Rate limited (retry after {retry_after_ms:?} ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Request build error: {0}")]
    RequestBuild(String),
}

impl RestError {
    /// Status code for HTTP errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            RestError::HttpError { status, .. } => Some(*status),
            RestError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// Network-level failure or a 5xx; the request may succeed if repeated.
    pub fn is_transient(&self) -> bool {
        match self {
            RestError::Timeout | RestError::Connection(_) => true,
            RestError::HttpError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RestError::RateLimited { .. })
    }
}

impl From<reqwest::Error> for RestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RestError::Timeout
        } else if err.is_connect() {
            RestError::Connection(err.to_string())
        } else if err.is_decode() {
            RestError::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            RestError::HttpError {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            RestError::Connection(err.to_string())
        }
    }
}
