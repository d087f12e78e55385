//! Endpoint configuration.

use std::str::FromStr;
use std::time::Duration;

use model::TradingFees;
use rust_decimal::Decimal;

const DEFAULT_REST_URL: &str = "https://api.probit.com/api/exchange/v1";
const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.probit.com";

/// Endpoints and timeouts for the ProBit adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbitConfig {
    /// Exchange API base URL.
    pub rest_url: String,
    /// Accounts service base URL (token endpoint lives under it).
    pub accounts_url: String,
    pub request_timeout: Duration,
    /// Account fee schedule; ProBit does not expose it over the API.
    pub fees: TradingFees,
}

impl Default for ProbitConfig {
    fn default() -> Self {
        Self {
            rest_url: DEFAULT_REST_URL.to_string(),
            accounts_url: DEFAULT_ACCOUNTS_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            fees: TradingFees::new(Decimal::new(2, 1), Decimal::new(2, 1)),
        }
    }
}

impl ProbitConfig {
    /// Defaults overridden by `PROBIT_REST_URL`, `PROBIT_ACCOUNTS_URL`,
    /// `PROBIT_REQUEST_TIMEOUT_MS`, `PROBIT_MAKER_FEE_PCT` and
    /// `PROBIT_TAKER_FEE_PCT` when set.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let pct = |key: &str, default: Decimal| {
            std::env::var(key)
                .ok()
                .and_then(|raw| Decimal::from_str(raw.trim()).ok())
                .filter(|pct| !pct.is_sign_negative())
                .unwrap_or(default)
        };
        Self {
            rest_url: std::env::var("PROBIT_REST_URL").unwrap_or(defaults.rest_url),
            accounts_url: std::env::var("PROBIT_ACCOUNTS_URL").unwrap_or(defaults.accounts_url),
            request_timeout: std::env::var("PROBIT_REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            fees: TradingFees::new(
                pct("PROBIT_MAKER_FEE_PCT", defaults.fees.maker_pct),
                pct("PROBIT_TAKER_FEE_PCT", defaults.fees.taker_pct),
            ),
        }
    }
}
