//! Credentials and access tokens for authenticated venue calls.
//!
//! - **Credentials**: the API secret is wrapped in `SecretString` so it never
//!   ends up in logs and is zeroed on drop.
//! - **Token cache**: short-lived OAuth bearer tokens are reused until shortly
//!   before they expire.
//! - **Environment loading**: credentials come from environment variables or a
//!   `.env` file.
//!
//! # Example
//!
//! ```rust,ignore
//! use auth::{ApiCredentials, TokenCache};
//!
//! let credentials = ApiCredentials::from_env()?;
//! let tokens = TokenCache::default();
//!
//! let token = match tokens.current() {
//!     Some(token) => token,
//!     None => {
//!         let fresh = fetch_token(credentials.api_key(), credentials.expose_secret()).await?;
//!         tokens.store(fresh.access_token, Duration::from_secs(fresh.expires_in))
//!     }
//! };
//! ```

mod credentials;
mod error;
mod token;

pub use credentials::ApiCredentials;
pub use error::AuthError;
pub use token::{TokenCache, DEFAULT_REFRESH_MARGIN};
