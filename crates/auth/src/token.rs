//! Cache for short-lived bearer tokens.

use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use std::time::{Duration, Instant};

/// Tokens are treated as expired this long before their real expiry.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(30);

struct CachedToken {
    value: SecretString,
    expires_at: Instant,
}

/// Holds the current access token until it is about to expire.
pub struct TokenCache {
    token: Mutex<Option<CachedToken>>,
    refresh_margin: Duration,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_MARGIN)
    }
}

impl TokenCache {
    pub fn new(refresh_margin: Duration) -> Self {
        Self {
            token: Mutex::new(None),
            refresh_margin,
        }
    }

    /// The cached token if it is still valid for at least the refresh margin.
    pub fn current(&self) -> Option<String> {
        let guard = self.token.lock();
        let token = guard.as_ref()?;
        let valid_until = token.expires_at.checked_sub(self.refresh_margin)?;
        (Instant::now() < valid_until).then(|| token.value.expose_secret().to_string())
    }

    /// Cache a freshly issued token and return it.
    pub fn store(&self, access_token: String, expires_in: Duration) -> String {
        let returned = access_token.clone();
        *self.token.lock() = Some(CachedToken {
            value: SecretString::from(access_token),
            expires_at: Instant::now() + expires_in,
        });
        returned
    }

    /// Drop the cached token, e.g. after the venue answered 401.
    pub fn invalidate(&self) {
        *self.token.lock() = None;
    }
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("cached", &self.token.lock().is_some())
            .field("refresh_margin", &self.refresh_margin)
            .finish()
    }
}
