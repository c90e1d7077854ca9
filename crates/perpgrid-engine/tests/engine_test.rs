/*
[INPUT]:  A live Engine wired to the sim venue
[OUTPUT]: End-to-end assertions on grid layout, fills, and shutdown
[POS]:    Integration tests - full runtime, real channels and tasks
[UPDATE]: When startup wiring or end-to-end flows change
*/

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use perpgrid_adapter::{
    AccountSubscription, AdapterError, Capabilities, ExchangeAdapter, MarketConfig,
    OrderSnapshot, OrderbookSubscription, OrdersHistoryRequest, PlaceOrderAck, PlaceOrderRequest,
    Side, SimAdapter, Unsubscribe,
};
use rust_decimal::Decimal;

use perpgrid_engine::geometry::SpacingConfig;
use perpgrid_engine::{Engine, GridSettings, NullSink};

fn dec(value: &str) -> Decimal {
    Decimal::from_str(value).expect("valid decimal")
}

fn settings() -> GridSettings {
    GridSettings {
        strategy_id: "grid-default".to_string(),
        symbol: "BTC".to_string(),
        exchange: "sim".to_string(),
        levels_per_side: 3,
        spacing: SpacingConfig::Abs { step: dec("10") },
        order_qty: dec("1"),
        post_only: false,
        cancel_timeout: Duration::from_secs(30),
        max_position: dec("10"),
        max_open_orders: 10,
        db_path: None,
    }
}

async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..250 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

fn open_prices(sim: &SimAdapter, side: Side) -> Vec<Decimal> {
    let mut prices: Vec<Decimal> = sim
        .open_orders_snapshot()
        .into_iter()
        .filter(|o| o.side == side)
        .filter_map(|o| o.price)
        .collect();
    prices.sort();
    prices
}

#[tokio::test]
async fn engine_lays_grid_from_first_quote_and_follows_fills() {
    let sim = Arc::new(SimAdapter::new());
    let mut engine = Engine::new(settings(), sim.clone(), Arc::new(NullSink));
    engine.start().await.expect("engine starts");

    sim.push_quote("BTC-PERP", dec("99"), dec("101"), dec("100"));

    let sim_for_wait = sim.clone();
    assert!(
        eventually(move || sim_for_wait.open_order_count() == 6).await,
        "expected six resting orders, got {}",
        sim.open_order_count()
    );
    assert_eq!(
        open_prices(&sim, Side::Buy),
        vec![dec("70"), dec("80"), dec("90")]
    );
    assert_eq!(
        open_prices(&sim, Side::Sell),
        vec![dec("110"), dec("120"), dec("130")]
    );

    let status_rx = engine.status().expect("status available after start");
    let mut center_rx = status_rx.clone();
    assert!(
        eventually(move || center_rx.borrow_and_update().center_price == Some(dec("100"))).await,
        "status snapshot never published the center"
    );

    // Fill the closest buy: the grid must recenter one level down without
    // waiting for any price confirmation.
    let filled = sim
        .open_orders_snapshot()
        .into_iter()
        .find(|o| o.side == Side::Buy && o.price == Some(dec("90")))
        .expect("buy at 90");
    assert!(sim.fill_order(&filled.client_order_id));

    let sim_for_wait = sim.clone();
    assert!(
        eventually(move || {
            let prices = open_prices(&sim_for_wait, Side::Buy);
            prices.contains(&dec("60")) && sim_for_wait.open_order_count() == 6
        })
        .await,
        "expected the grid to recenter at 90"
    );
    assert_eq!(
        open_prices(&sim, Side::Sell),
        vec![dec("100"), dec("110"), dec("120")]
    );
    let mut center_rx = status_rx.clone();
    assert!(
        eventually(move || center_rx.borrow_and_update().center_price == Some(dec("90"))).await,
        "status snapshot never moved to the new center"
    );

    engine.stop().await.expect("engine stops");

    // Streams are torn down; late quotes go nowhere.
    sim.push_quote("BTC-PERP", dec("99"), dec("101"), dec("100"));
}

#[tokio::test]
async fn engine_clean_shutdown_before_any_quote() {
    let sim = Arc::new(SimAdapter::new());
    let mut engine = Engine::new(settings(), sim.clone(), Arc::new(NullSink));
    engine.start().await.expect("engine starts");
    engine.stop().await.expect("engine stops");
    assert_eq!(sim.open_order_count(), 0);
}

/// Adapter stub with no market data streams; only the capability check and
/// `name` are ever reached.
struct HistoryOnlyVenue;

#[async_trait]
impl ExchangeAdapter for HistoryOnlyVenue {
    fn name(&self) -> &str {
        "history-only"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            mark_price: false,
            orderbook: false,
            post_only: false,
            mass_cancel: false,
        }
    }

    fn resolve_exchange_symbol(&self, symbol: &str) -> perpgrid_adapter::Result<String> {
        Ok(symbol.to_string())
    }

    async fn connect(&self) -> perpgrid_adapter::Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> perpgrid_adapter::Result<()> {
        Ok(())
    }

    async fn subscribe_orderbook(
        &self,
        _sub: OrderbookSubscription,
    ) -> perpgrid_adapter::Result<Unsubscribe> {
        Err(AdapterError::NotSupported {
            adapter: self.name().to_string(),
            operation: "subscribe_orderbook",
        })
    }

    async fn subscribe_account(
        &self,
        _sub: AccountSubscription,
    ) -> perpgrid_adapter::Result<Unsubscribe> {
        Err(AdapterError::NotSupported {
            adapter: self.name().to_string(),
            operation: "subscribe_account",
        })
    }

    async fn get_market_config(&self, _symbol: &str) -> perpgrid_adapter::Result<MarketConfig> {
        Err(AdapterError::Disconnected)
    }

    async fn get_net_position(&self, _symbol: &str) -> perpgrid_adapter::Result<Decimal> {
        Err(AdapterError::Disconnected)
    }

    async fn get_order_by_client_order_id(
        &self,
        _client_order_id: &str,
    ) -> perpgrid_adapter::Result<Option<OrderSnapshot>> {
        Ok(None)
    }

    async fn get_open_orders(&self, _symbol: &str) -> perpgrid_adapter::Result<Vec<OrderSnapshot>> {
        Ok(Vec::new())
    }

    async fn get_orders_history(
        &self,
        _req: OrdersHistoryRequest,
    ) -> perpgrid_adapter::Result<Vec<OrderSnapshot>> {
        Ok(Vec::new())
    }

    async fn place_order(&self, _req: PlaceOrderRequest) -> perpgrid_adapter::Result<PlaceOrderAck> {
        Err(AdapterError::Disconnected)
    }

    async fn cancel_order_by_external_id(
        &self,
        _client_order_id: &str,
    ) -> perpgrid_adapter::Result<()> {
        Err(AdapterError::Disconnected)
    }

    async fn mass_cancel(&self, _symbol: &str) -> perpgrid_adapter::Result<()> {
        Err(AdapterError::NotSupported {
            adapter: self.name().to_string(),
            operation: "mass_cancel",
        })
    }
}

#[tokio::test]
async fn engine_refuses_adapter_without_required_capabilities() {
    let mut engine = Engine::new(settings(), Arc::new(HistoryOnlyVenue), Arc::new(NullSink));
    let err = engine.start().await.expect_err("start must fail");
    assert!(err.to_string().contains("mark price"), "got: {err}");
}
