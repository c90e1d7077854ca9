/*
[INPUT]:  Engine-side order intents
[OUTPUT]: Typed Rust request structs with serialization support
[POS]:    Data layer - venue-neutral request definitions
[UPDATE]: When placement or history query parameters change
*/

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::{OrderStatus, Side};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    /// Venue-specific symbol (already resolved by the caller).
    pub symbol: String,
    pub side: Side,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub qty: Decimal,
    pub client_order_id: String,
    pub post_only: bool,
    /// Venue-side expiry hint; the engine still sweeps timeouts itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_time_ms: Option<i64>,
}

/// Outcome of a placement. The venue may acknowledge, or reveal a terminal
/// outcome (filled or rejected) synchronously.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrderAck {
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange_order_id: Option<String>,
    pub native_status: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub filled_qty: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrdersHistoryRequest {
    pub symbol: String,
    pub since_ms: i64,
}
