/*
[INPUT]:  Orders and quote/fill scripts driven by the embedding process
[OUTPUT]: A deterministic in-process venue implementing ExchangeAdapter
[POS]:    Simulation layer - zero-credential venue for local runs and tests
[UPDATE]: When the adapter contract or simulated matching rules change
*/

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::debug;

use crate::contract::{
    AccountSubscription, Capabilities, ExchangeAdapter, OrderbookSubscription, Unsubscribe,
};
use crate::error::{AdapterError, Result};
use crate::types::{
    MarketConfig, OrderSnapshot, OrderStatus, OrdersHistoryRequest, PlaceOrderAck,
    PlaceOrderRequest, PositionUpdate, Quote, Side,
};

const VENUE: &str = "sim";
const CLOCK_BASE_MS: i64 = 1_700_000_000_000;

/// An in-process venue with immediate acknowledgements and scripted fills.
///
/// Every placement rests as an open maker order until the driver fills or
/// cancels it. Quotes, fills, and position snapshots are pushed through the
/// driver methods and dispatched synchronously to subscribers.
pub struct SimAdapter {
    inner: Arc<Mutex<SimState>>,
}

struct SimState {
    connected: bool,
    clock_ticks: i64,
    next_exchange_id: i64,
    next_sub_id: u64,
    open_orders: HashMap<String, OrderSnapshot>,
    all_orders: HashMap<String, OrderSnapshot>,
    positions: HashMap<String, Decimal>,
    quote_subs: Vec<QuoteSub>,
    account_subs: Vec<AccountSub>,
    place_requests: Vec<PlaceOrderRequest>,
    cancel_requests: Vec<String>,
    fail_places: bool,
    fail_cancels: bool,
}

struct QuoteSub {
    id: u64,
    symbol: String,
    callback: crate::contract::QuoteCallback,
}

struct AccountSub {
    id: u64,
    subscription: AccountSubscription,
}

impl SimState {
    fn now_ms(&mut self) -> i64 {
        self.clock_ticks += 1;
        CLOCK_BASE_MS + self.clock_ticks * 1_000
    }
}

impl SimAdapter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimState {
                connected: false,
                clock_ticks: 0,
                next_exchange_id: 1,
                next_sub_id: 1,
                open_orders: HashMap::new(),
                all_orders: HashMap::new(),
                positions: HashMap::new(),
                quote_subs: Vec::new(),
                account_subs: Vec::new(),
                place_requests: Vec::new(),
                cancel_requests: Vec::new(),
                fail_places: false,
                fail_cancels: false,
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish a quote to every orderbook subscriber for `symbol`.
    pub fn push_quote(&self, symbol: &str, bid: Decimal, ask: Decimal, mark: Decimal) {
        let (quote, callbacks) = {
            let mut state = self.lock();
            let quote = Quote {
                exchange: VENUE.to_string(),
                symbol: symbol.to_string(),
                bid,
                ask,
                mark,
                ts_ms: state.now_ms(),
            };
            let callbacks: Vec<_> = state
                .quote_subs
                .iter()
                .filter(|sub| sub.symbol == symbol)
                .map(|sub| sub.callback.clone())
                .collect();
            (quote, callbacks)
        };

        for callback in callbacks {
            callback(quote.clone());
        }
    }

    /// Fully fill an open order, update the net position, and notify account
    /// subscribers with the order update followed by the position snapshot.
    pub fn fill_order(&self, client_order_id: &str) -> bool {
        self.fill_inner(client_order_id, None)
    }

    /// Partially fill an open order by `qty`.
    pub fn partial_fill_order(&self, client_order_id: &str, qty: Decimal) -> bool {
        self.fill_inner(client_order_id, Some(qty))
    }

    fn fill_inner(&self, client_order_id: &str, partial_qty: Option<Decimal>) -> bool {
        let (snapshot, position, order_cbs, position_cbs) = {
            let mut state = self.lock();
            let Some(mut order) = state.open_orders.get(client_order_id).cloned() else {
                return false;
            };

            let fill_qty = match partial_qty {
                Some(qty) => qty.min(order.qty - order.filled_qty),
                None => order.qty - order.filled_qty,
            };
            order.filled_qty += fill_qty;

            let fully_filled = order.filled_qty >= order.qty;
            order.status = if fully_filled {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
            order.native_status = order.status.as_str().to_string();
            order.updated_at_ms = state.now_ms();

            let signed = match order.side {
                Side::Buy => fill_qty,
                Side::Sell => -fill_qty,
            };
            let net = state
                .positions
                .entry(order.symbol.clone())
                .or_insert(Decimal::ZERO);
            *net += signed;
            let position = PositionUpdate {
                symbol: order.symbol.clone(),
                net_qty: *net,
            };

            if fully_filled {
                state.open_orders.remove(client_order_id);
            } else {
                state
                    .open_orders
                    .insert(client_order_id.to_string(), order.clone());
            }
            state
                .all_orders
                .insert(client_order_id.to_string(), order.clone());

            let order_cbs: Vec<_> = state
                .account_subs
                .iter()
                .map(|sub| sub.subscription.on_order_updates.clone())
                .collect();
            let position_cbs: Vec<_> = state
                .account_subs
                .iter()
                .filter_map(|sub| sub.subscription.on_position_updates.clone())
                .collect();

            (order, position, order_cbs, position_cbs)
        };

        for callback in order_cbs {
            callback(vec![snapshot.clone()]);
        }
        for callback in position_cbs {
            callback(vec![position.clone()]);
        }
        true
    }

    /// Push a position snapshot without a fill (e.g. a pre-existing position).
    pub fn push_position(&self, symbol: &str, net_qty: Decimal) {
        let (update, callbacks) = {
            let mut state = self.lock();
            state.positions.insert(symbol.to_string(), net_qty);
            let callbacks: Vec<_> = state
                .account_subs
                .iter()
                .filter_map(|sub| sub.subscription.on_position_updates.clone())
                .collect();
            (
                PositionUpdate {
                    symbol: symbol.to_string(),
                    net_qty,
                },
                callbacks,
            )
        };
        for callback in callbacks {
            callback(vec![update.clone()]);
        }
    }

    /// Seed an already-open order, as if left behind by an earlier run.
    pub fn seed_open_order(&self, snapshot: OrderSnapshot) {
        let mut state = self.lock();
        state
            .all_orders
            .insert(snapshot.client_order_id.clone(), snapshot.clone());
        state
            .open_orders
            .insert(snapshot.client_order_id.clone(), snapshot);
    }

    pub fn set_fail_places(&self, fail: bool) {
        self.lock().fail_places = fail;
    }

    pub fn set_fail_cancels(&self, fail: bool) {
        self.lock().fail_cancels = fail;
    }

    pub fn open_order_count(&self) -> usize {
        self.lock().open_orders.len()
    }

    pub fn open_orders_snapshot(&self) -> Vec<OrderSnapshot> {
        self.lock().open_orders.values().cloned().collect()
    }

    pub fn place_request_count(&self) -> usize {
        self.lock().place_requests.len()
    }

    pub fn place_requests(&self) -> Vec<PlaceOrderRequest> {
        self.lock().place_requests.clone()
    }

    pub fn cancel_request_count(&self) -> usize {
        self.lock().cancel_requests.len()
    }

    fn cancel_open_order(state: &mut SimState, client_order_id: &str) -> Option<OrderSnapshot> {
        let mut order = state.open_orders.remove(client_order_id)?;
        order.status = OrderStatus::Cancelled;
        order.native_status = "canceled".to_string();
        order.updated_at_ms = state.now_ms();
        state
            .all_orders
            .insert(client_order_id.to_string(), order.clone());
        Some(order)
    }
}

impl Default for SimAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeAdapter for SimAdapter {
    fn name(&self) -> &str {
        VENUE
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            mark_price: true,
            orderbook: true,
            post_only: true,
            mass_cancel: true,
        }
    }

    fn resolve_exchange_symbol(&self, symbol: &str) -> Result<String> {
        if symbol.is_empty() {
            return Err(AdapterError::UnknownSymbol(symbol.to_string()));
        }
        Ok(format!("{symbol}-PERP"))
    }

    async fn connect(&self) -> Result<()> {
        self.lock().connected = true;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.lock().connected = false;
        Ok(())
    }

    async fn subscribe_orderbook(&self, sub: OrderbookSubscription) -> Result<Unsubscribe> {
        let mut state = self.lock();
        if !state.connected {
            return Err(AdapterError::Disconnected);
        }
        let id = state.next_sub_id;
        state.next_sub_id += 1;
        state.quote_subs.push(QuoteSub {
            id,
            symbol: sub.symbol,
            callback: sub.on_quote,
        });

        let inner = self.inner.clone();
        Ok(Unsubscribe::new(move || {
            if let Ok(mut state) = inner.lock() {
                state.quote_subs.retain(|s| s.id != id);
            }
        }))
    }

    async fn subscribe_account(&self, sub: AccountSubscription) -> Result<Unsubscribe> {
        let mut state = self.lock();
        if !state.connected {
            return Err(AdapterError::Disconnected);
        }
        let id = state.next_sub_id;
        state.next_sub_id += 1;
        state.account_subs.push(AccountSub {
            id,
            subscription: sub,
        });

        let inner = self.inner.clone();
        Ok(Unsubscribe::new(move || {
            if let Ok(mut state) = inner.lock() {
                state.account_subs.retain(|s| s.id != id);
            }
        }))
    }

    async fn get_market_config(&self, _symbol: &str) -> Result<MarketConfig> {
        Ok(MarketConfig {
            min_price_change: Decimal::from_str("0.1").expect("const decimal"),
            min_order_size_change: Decimal::from_str("0.001").expect("const decimal"),
            maker_fee: Decimal::from_str("0.0002").expect("const decimal"),
            taker_fee: Decimal::from_str("0.0005").expect("const decimal"),
        })
    }

    async fn get_net_position(&self, symbol: &str) -> Result<Decimal> {
        let state = self.lock();
        if !state.connected {
            return Err(AdapterError::Disconnected);
        }
        Ok(state
            .positions
            .get(symbol)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn get_order_by_client_order_id(
        &self,
        client_order_id: &str,
    ) -> Result<Option<OrderSnapshot>> {
        Ok(self.lock().all_orders.get(client_order_id).cloned())
    }

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<OrderSnapshot>> {
        Ok(self
            .lock()
            .open_orders
            .values()
            .filter(|o| o.symbol == symbol)
            .cloned()
            .collect())
    }

    async fn get_orders_history(&self, req: OrdersHistoryRequest) -> Result<Vec<OrderSnapshot>> {
        Ok(self
            .lock()
            .all_orders
            .values()
            .filter(|o| o.symbol == req.symbol && o.created_at_ms >= req.since_ms)
            .cloned()
            .collect())
    }

    async fn place_order(&self, req: PlaceOrderRequest) -> Result<PlaceOrderAck> {
        let mut state = self.lock();
        if !state.connected {
            return Err(AdapterError::Disconnected);
        }
        if state.fail_places {
            return Err(AdapterError::Transport(
                "simulated place failure".to_string(),
            ));
        }

        let exchange_id = state.next_exchange_id;
        state.next_exchange_id += 1;
        let now = state.now_ms();

        let snapshot = OrderSnapshot {
            client_order_id: req.client_order_id.clone(),
            exchange_order_id: Some(exchange_id.to_string()),
            symbol: req.symbol.clone(),
            side: req.side,
            status: OrderStatus::Acked,
            native_status: "open".to_string(),
            price: Some(req.price),
            qty: req.qty,
            filled_qty: Decimal::ZERO,
            created_at_ms: now,
            updated_at_ms: now,
        };
        state
            .open_orders
            .insert(req.client_order_id.clone(), snapshot.clone());
        state
            .all_orders
            .insert(req.client_order_id.clone(), snapshot);
        state.place_requests.push(req);

        Ok(PlaceOrderAck {
            status: OrderStatus::Acked,
            exchange_order_id: Some(exchange_id.to_string()),
            native_status: "open".to_string(),
            filled_qty: Decimal::ZERO,
        })
    }

    async fn cancel_order_by_external_id(&self, client_order_id: &str) -> Result<()> {
        let mut state = self.lock();
        if state.fail_cancels {
            return Err(AdapterError::Transport(
                "simulated cancel failure".to_string(),
            ));
        }
        state.cancel_requests.push(client_order_id.to_string());
        match SimAdapter::cancel_open_order(&mut state, client_order_id) {
            Some(_) => Ok(()),
            None => Err(AdapterError::OrderNotFound(client_order_id.to_string())),
        }
    }

    async fn mass_cancel(&self, symbol: &str) -> Result<()> {
        let mut state = self.lock();
        let ids: Vec<String> = state
            .open_orders
            .values()
            .filter(|o| o.symbol == symbol)
            .map(|o| o.client_order_id.clone())
            .collect();
        debug!(count = ids.len(), %symbol, "sim mass cancel");
        for id in ids {
            SimAdapter::cancel_open_order(&mut state, &id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).expect("valid decimal")
    }

    fn place_req(id: &str, side: Side, price: &str) -> PlaceOrderRequest {
        PlaceOrderRequest {
            symbol: "BTC-PERP".to_string(),
            side,
            price: dec(price),
            qty: dec("1"),
            client_order_id: id.to_string(),
            post_only: true,
            expire_time_ms: None,
        }
    }

    #[tokio::test]
    async fn sim_place_then_fill_updates_position_and_notifies() {
        let sim = SimAdapter::new();
        sim.connect().await.unwrap();

        let updates: Arc<Mutex<Vec<OrderSnapshot>>> = Arc::new(Mutex::new(Vec::new()));
        let positions: Arc<Mutex<Vec<PositionUpdate>>> = Arc::new(Mutex::new(Vec::new()));

        let updates_clone = updates.clone();
        let positions_clone = positions.clone();
        let _sub = sim
            .subscribe_account(AccountSubscription {
                on_order_updates: Arc::new(move |batch| {
                    updates_clone.lock().unwrap().extend(batch);
                }),
                on_position_updates: Some(Arc::new(move |batch| {
                    positions_clone.lock().unwrap().extend(batch);
                })),
            })
            .await
            .unwrap();

        let ack = sim
            .place_order(place_req("ord-1", Side::Buy, "90"))
            .await
            .unwrap();
        assert_eq!(ack.status, OrderStatus::Acked);
        assert_eq!(sim.open_order_count(), 1);

        assert!(sim.fill_order("ord-1"));
        assert_eq!(sim.open_order_count(), 0);
        assert_eq!(sim.get_net_position("BTC-PERP").await.unwrap(), dec("1"));

        let recorded = updates.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].status, OrderStatus::Filled);

        let recorded_positions = positions.lock().unwrap();
        assert_eq!(recorded_positions.len(), 1);
        assert_eq!(recorded_positions[0].net_qty, dec("1"));
    }

    #[tokio::test]
    async fn sim_cancel_unknown_order_returns_not_found() {
        let sim = SimAdapter::new();
        sim.connect().await.unwrap();

        let err = sim.cancel_order_by_external_id("missing").await.unwrap_err();
        assert!(matches!(err, AdapterError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn sim_mass_cancel_clears_symbol_orders() {
        let sim = SimAdapter::new();
        sim.connect().await.unwrap();

        sim.place_order(place_req("a", Side::Buy, "90")).await.unwrap();
        sim.place_order(place_req("b", Side::Sell, "110")).await.unwrap();
        assert_eq!(sim.open_order_count(), 2);

        sim.mass_cancel("BTC-PERP").await.unwrap();
        assert_eq!(sim.open_order_count(), 0);

        let order = sim
            .get_order_by_client_order_id("a")
            .await
            .unwrap()
            .expect("order retained in history");
        assert_eq!(order.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn sim_quote_dispatch_filters_by_symbol() {
        let sim = SimAdapter::new();
        sim.connect().await.unwrap();

        let quotes: Arc<Mutex<Vec<Quote>>> = Arc::new(Mutex::new(Vec::new()));
        let quotes_clone = quotes.clone();
        let unsub = sim
            .subscribe_orderbook(OrderbookSubscription {
                symbol: "BTC-PERP".to_string(),
                on_quote: Arc::new(move |q| quotes_clone.lock().unwrap().push(q)),
            })
            .await
            .unwrap();

        sim.push_quote("BTC-PERP", dec("99"), dec("101"), dec("100"));
        sim.push_quote("ETH-PERP", dec("9"), dec("11"), dec("10"));
        assert_eq!(quotes.lock().unwrap().len(), 1);

        unsub.run();
        sim.push_quote("BTC-PERP", dec("99"), dec("101"), dec("100"));
        assert_eq!(quotes.lock().unwrap().len(), 1);
    }
}
