/*
[INPUT]:  Engine subscription intents and order commands
[OUTPUT]: The capability-typed ExchangeAdapter trait venue crates implement
[POS]:    Contract layer - the only surface the engine depends on
[UPDATE]: When adding adapter operations or capability flags
*/

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::Result;
use crate::types::{
    MarketConfig, OrderSnapshot, OrdersHistoryRequest, PlaceOrderAck, PlaceOrderRequest,
    PositionUpdate, Quote,
};

/// Feature flags an adapter advertises. The engine refuses to start against
/// an adapter without `mark_price` and `orderbook`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub mark_price: bool,
    pub orderbook: bool,
    pub post_only: bool,
    pub mass_cancel: bool,
}

pub type QuoteCallback = Arc<dyn Fn(Quote) + Send + Sync>;
pub type OrderUpdateCallback = Arc<dyn Fn(Vec<OrderSnapshot>) + Send + Sync>;
pub type PositionUpdateCallback = Arc<dyn Fn(Vec<PositionUpdate>) + Send + Sync>;

pub struct OrderbookSubscription {
    /// Venue-specific symbol.
    pub symbol: String,
    pub on_quote: QuoteCallback,
}

pub struct AccountSubscription {
    pub on_order_updates: OrderUpdateCallback,
    pub on_position_updates: Option<PositionUpdateCallback>,
}

/// Handle returned by subscriptions. Dropping it (or calling [`run`]) tears
/// the subscription down; running twice is a no-op.
///
/// [`run`]: Unsubscribe::run
pub struct Unsubscribe(Option<Box<dyn FnOnce() + Send>>);

impl Unsubscribe {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(f)))
    }

    pub fn noop() -> Self {
        Self(None)
    }

    pub fn run(mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Unsubscribe")
            .field(&self.0.is_some())
            .finish()
    }
}

/// The uniform venue surface the engine drives.
///
/// Adapters own the wire protocol, request signing, price/size rounding to
/// tick and lot, native-status mapping into the unified set, and automatic
/// stream resubscription on transient disconnects.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Venue tag, e.g. `"sim"`. Quotes produced by this adapter carry the
    /// same tag in `Quote::exchange`.
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Canonical symbol (e.g. `BTC`) to venue-specific symbol.
    fn resolve_exchange_symbol(&self, symbol: &str) -> Result<String>;

    /// Idempotent. Required before any other operation.
    async fn connect(&self) -> Result<()>;

    /// Idempotent.
    async fn disconnect(&self) -> Result<()>;

    async fn subscribe_orderbook(&self, sub: OrderbookSubscription) -> Result<Unsubscribe>;

    async fn subscribe_account(&self, sub: AccountSubscription) -> Result<Unsubscribe>;

    async fn get_market_config(&self, symbol: &str) -> Result<MarketConfig>;

    /// Signed net position size: long positive, short negative.
    async fn get_net_position(&self, symbol: &str) -> Result<Decimal>;

    /// Lookup for reconciliation; `Ok(None)` means the venue has never seen
    /// this client order id.
    async fn get_order_by_client_order_id(
        &self,
        client_order_id: &str,
    ) -> Result<Option<OrderSnapshot>>;

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<OrderSnapshot>>;

    async fn get_orders_history(&self, req: OrdersHistoryRequest) -> Result<Vec<OrderSnapshot>>;

    /// May acknowledge, or reveal a terminal outcome synchronously.
    async fn place_order(&self, req: PlaceOrderRequest) -> Result<PlaceOrderAck>;

    async fn cancel_order_by_external_id(&self, client_order_id: &str) -> Result<()>;

    /// Optional; callers must check `capabilities().mass_cancel` first.
    async fn mass_cancel(&self, symbol: &str) -> Result<()>;
}
