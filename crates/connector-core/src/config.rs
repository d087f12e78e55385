//! Connector settings shared by every venue adapter.

/// Pairs to reconcile and event channel sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorConfig {
    /// Trading pairs in venue notation (e.g. `ETH-USDT`).
    pub trading_pairs: Vec<String>,
    /// Lifecycle event channel capacity.
    pub channel_capacity: usize,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            trading_pairs: vec!["ETH-USDT".to_string()],
            channel_capacity: 1024,
        }
    }
}

impl ConnectorConfig {
    /// Load from `TRADING_PAIRS` (comma separated) and `EVENT_CHANNEL_CAPACITY`.
    ///
    /// Missing or invalid values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let trading_pairs = lookup("TRADING_PAIRS")
            .map(|raw| {
                raw.split(',')
                    .map(|pair| pair.trim().to_uppercase())
                    .filter(|pair| !pair.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|pairs| !pairs.is_empty())
            .unwrap_or(defaults.trading_pairs);

        let channel_capacity = lookup("EVENT_CHANNEL_CAPACITY")
            .and_then(|raw| raw.parse().ok())
            .filter(|&capacity: &usize| capacity > 0)
            .unwrap_or(defaults.channel_capacity);

        Self {
            trading_pairs,
            channel_capacity,
        }
    }
}
