//! Thin `reqwest` wrapper for JSON venue APIs.
//!
//! - GET with a prebuilt query string, POST with a JSON body
//! - Extra headers for bearer tokens, HTTP basic auth for token endpoints
//! - 429 responses surface as `RestError::RateLimited` with the `Retry-After` hint
//!
//! # Example
//!
//! ```rust,ignore
//! use rest_client::RestClient;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct TimeResponse {
//!     data: String,
//! }
//!
//! let client = RestClient::with_default_timeout("https://api.probit.com/api/exchange/v1")?;
//! let time: TimeResponse = client.get("/time", None, None).await?;
//! ```

mod client;
mod error;

pub use client::RestClient;
pub use error::RestError;
