//! ProBit REST response types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Every ProBit payload is wrapped in `{"data": ...}`.
#[derive(Debug, Clone, Deserialize)]
pub struct DataResponse<T> {
    pub data: T,
}

/// `{"errorCode": "...", "message": "..."}` returned with 4xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(rename = "errorCode")]
    pub error_code: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

/// GET /order_book
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBookEntry {
    pub side: String,
    #[serde(deserialize_with = "deserialize_decimal_from_str")]
    pub price: Decimal,
    #[serde(deserialize_with = "deserialize_decimal_from_str")]
    pub quantity: Decimal,
}

/// GET /trade_history
#[derive(Debug, Clone, Deserialize)]
pub struct TradeHistoryEntry {
    pub id: String,
    pub order_id: String,
    pub market_id: String,
    #[serde(deserialize_with = "deserialize_decimal_from_str")]
    pub price: Decimal,
    #[serde(deserialize_with = "deserialize_decimal_from_str")]
    pub quantity: Decimal,
    #[serde(deserialize_with = "deserialize_decimal_from_str")]
    pub fee_amount: Decimal,
    pub fee_currency_id: String,
    pub status: String,
    pub time: DateTime<Utc>,
}

/// GET /order, POST /new_order, POST /cancel_order
#[derive(Debug, Clone, Deserialize)]
pub struct OrderEntry {
    pub id: String,
    #[serde(default)]
    pub client_order_id: Option<String>,
    pub market_id: String,
    pub status: String,
    #[serde(default, deserialize_with = "deserialize_opt_decimal_from_str")]
    pub filled_quantity: Option<Decimal>,
}

/// GET /balance
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceEntry {
    pub currency_id: String,
    #[serde(deserialize_with = "deserialize_decimal_from_str")]
    pub total: Decimal,
    #[serde(deserialize_with = "deserialize_decimal_from_str")]
    pub available: Decimal,
}

/// GET /market
#[derive(Debug, Clone, Deserialize)]
pub struct MarketEntry {
    pub id: String,
    #[serde(deserialize_with = "deserialize_decimal_from_str")]
    pub min_quantity: Decimal,
    #[serde(deserialize_with = "deserialize_decimal_from_str")]
    pub max_quantity: Decimal,
    #[serde(deserialize_with = "deserialize_decimal_from_str")]
    pub price_increment: Decimal,
    pub quantity_precision: u32,
    #[serde(default)]
    pub closed: bool,
}

/// POST /new_order body.
#[derive(Debug, Clone, Serialize)]
pub struct NewOrderRequest<'a> {
    pub market_id: &'a str,
    pub side: &'static str,
    #[serde(rename = "type")]
    pub order_type: &'static str,
    pub quantity: String,
    pub client_order_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<String>,
    pub time_in_force: &'static str,
}

/// POST /cancel_order body.
#[derive(Debug, Clone, Serialize)]
pub struct CancelOrderRequest<'a> {
    pub market_id: &'a str,
    pub order_id: &'a str,
}

fn deserialize_decimal_from_str<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    s.parse::<Decimal>().map_err(serde::de::Error::custom)
}

fn deserialize_opt_decimal_from_str<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Deserialize::deserialize(deserializer)?;
    s.map(|s| s.parse::<Decimal>().map_err(serde::de::Error::custom))
        .transpose()
}
