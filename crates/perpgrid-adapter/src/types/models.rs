/*
[INPUT]:  Market data and account state as venue adapters report it
[OUTPUT]: Typed Rust structs with serialization support
[POS]:    Data layer - venue-neutral models
[UPDATE]: When quote, order-snapshot, or position schemas change
*/

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::{OrderStatus, Side};

/// A top-of-book quote with the venue's mark price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Venue tag of the adapter that produced this quote.
    pub exchange: String,
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub bid: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub ask: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub mark: Decimal,
    pub ts_ms: i64,
}

impl Quote {
    /// A quote is usable when the book is not crossed and the mark is positive.
    pub fn is_coherent(&self) -> bool {
        self.bid <= self.ask && self.mark > Decimal::ZERO
    }
}

/// Per-symbol trading constraints reported by the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    #[serde(with = "rust_decimal::serde::str")]
    pub min_price_change: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub min_order_size_change: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub maker_fee: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub taker_fee: Decimal,
}

/// The venue's view of one order, used for stream updates and reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub client_order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange_order_id: Option<String>,
    pub symbol: String,
    pub side: Side,
    pub status: OrderStatus,
    /// Venue-native status string, carried opaquely for record keeping.
    pub native_status: String,
    #[serde(with = "rust_decimal::serde::str_option")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str")]
    pub qty: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub filled_qty: Decimal,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

/// A position snapshot from the account stream or a REST query.
///
/// `net_qty` is signed: long positive, short negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub net_qty: Decimal,
}
