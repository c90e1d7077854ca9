/*
[INPUT]:  Settings, one adapter, one sink
[OUTPUT]: A wired, running engine with ordered startup and bounded shutdown
[POS]:    Orchestration layer - owns task lifetimes, no trading logic
[UPDATE]: When changing start/stop ordering or tick cadences
*/

use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use perpgrid_adapter::{
    AccountSubscription, ExchangeAdapter, OrderbookSubscription, QuoteCallback, Unsubscribe,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::GridSettings;
use crate::health::{HealthChecker, HealthThresholds};
use crate::manager::{EngineCommand, OrderManager, StatusSnapshot};
use crate::market_data::MarketDataHub;
use crate::rate_limit::RateLimitGuard;
use crate::sink::OrderSink;
use crate::ticker::{TickDriver, TickHandler, TickTask};

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(1);
const RECONCILE_INTERVAL: Duration = Duration::from_secs(5);
const HEALTH_INTERVAL: Duration = Duration::from_secs(5);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

static PANIC_HOOK_ONCE: Once = Once::new();

pub fn ensure_panic_hook_installed() {
    PANIC_HOOK_ONCE.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!("panic in engine task: {info}");
            previous(info);
        }));
    });
}

/// Owns the wiring between the adapter, the market-data hub, the order
/// manager, the tick driver, and the health checker.
///
/// Startup order: capability check, connect, resolve symbol, subscribe
/// streams, spawn the manager (which refreshes the position before placing
/// anything), start ticks. Shutdown runs the same steps in reverse.
pub struct Engine {
    settings: GridSettings,
    adapter: Arc<dyn ExchangeAdapter>,
    sink: Arc<dyn OrderSink>,
    hub: Arc<MarketDataHub>,
    shutdown: CancellationToken,
    subscriptions: Vec<Unsubscribe>,
    manager_handle: Option<JoinHandle<Result<()>>>,
    ticker: Option<TickDriver>,
    status_rx: Option<watch::Receiver<StatusSnapshot>>,
}

impl Engine {
    pub fn new(
        settings: GridSettings,
        adapter: Arc<dyn ExchangeAdapter>,
        sink: Arc<dyn OrderSink>,
    ) -> Self {
        Self {
            settings,
            adapter,
            sink,
            hub: Arc::new(MarketDataHub::new()),
            shutdown: CancellationToken::new(),
            subscriptions: Vec::new(),
            manager_handle: None,
            ticker: None,
            status_rx: None,
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Latest status snapshot feed, available after `start`.
    pub fn status(&self) -> Option<watch::Receiver<StatusSnapshot>> {
        self.status_rx.clone()
    }

    pub async fn start(&mut self) -> Result<()> {
        let venue = self.adapter.name().to_string();
        let capabilities = self.adapter.capabilities();
        if !capabilities.mark_price {
            bail!("adapter {venue} does not publish a mark price stream");
        }
        if !capabilities.orderbook {
            bail!("adapter {venue} does not publish an orderbook stream");
        }

        self.adapter
            .connect()
            .await
            .map_err(|err| anyhow!("connect to {venue} failed: {err}"))?;

        let exchange_symbol = self
            .adapter
            .resolve_exchange_symbol(&self.settings.symbol)
            .map_err(|err| anyhow!("symbol resolution failed: {err}"))?;

        let market_config = self
            .adapter
            .get_market_config(&exchange_symbol)
            .await
            .map_err(|err| anyhow!("market config for {exchange_symbol} unavailable: {err}"))?;
        info!(
            %venue,
            symbol = %exchange_symbol,
            min_price_change = %market_config.min_price_change,
            min_order_size_change = %market_config.min_order_size_change,
            "market config loaded"
        );

        let guard = Arc::new(RateLimitGuard::new());
        let (manager, channels) = OrderManager::new(
            self.settings.clone(),
            exchange_symbol.clone(),
            self.adapter.clone(),
            guard,
            self.sink.clone(),
        )
        .map_err(|err| anyhow!("grid construction failed: {err}"))?;

        // Market data path: adapter stream -> hub -> the manager's
        // latest-wins quote slot.
        let hub = self.hub.clone();
        let on_quote: QuoteCallback = Arc::new(move |quote| hub.publish(quote));
        let book_sub = self
            .adapter
            .subscribe_orderbook(OrderbookSubscription {
                symbol: exchange_symbol.clone(),
                on_quote,
            })
            .await
            .map_err(|err| anyhow!("orderbook subscription failed: {err}"))?;
        self.subscriptions.push(book_sub);

        let quote_tx = channels.quote_tx;
        self.hub.subscribe(
            vec![venue.clone()],
            Arc::new(move |snapshot| {
                let _ = quote_tx.send(Some(snapshot.source_quote));
            }),
        );

        // Account path: order and position events into the command channel.
        let orders_tx = channels.cmd_tx.clone();
        let positions_tx = channels.cmd_tx.clone();
        let account_sub = self
            .adapter
            .subscribe_account(AccountSubscription {
                on_order_updates: Arc::new(move |updates| {
                    let _ = orders_tx.send(EngineCommand::OrderUpdates(updates));
                }),
                on_position_updates: Some(Arc::new(move |updates| {
                    let _ = positions_tx.send(EngineCommand::PositionUpdates(updates));
                })),
            })
            .await
            .map_err(|err| anyhow!("account subscription failed: {err}"))?;
        self.subscriptions.push(account_sub);

        self.manager_handle = Some(tokio::spawn(manager.run(self.shutdown.child_token())));

        let checker = Arc::new(HealthChecker::new(
            HealthThresholds::default(),
            Instant::now(),
        ));
        let status_rx = channels.status_rx.clone();
        self.status_rx = Some(channels.status_rx);

        let tasks = vec![
            TickTask {
                name: "maintenance",
                interval: MAINTENANCE_INTERVAL,
                run_on_start: false,
                handler: command_tick(channels.cmd_tx.clone(), EngineCommand::Maintenance),
            },
            TickTask {
                name: "reconcile",
                interval: RECONCILE_INTERVAL,
                run_on_start: false,
                handler: command_tick(channels.cmd_tx.clone(), EngineCommand::Reconcile),
            },
            TickTask {
                name: "health",
                interval: HEALTH_INTERVAL,
                run_on_start: false,
                handler: health_tick(checker, status_rx, self.hub.clone(), venue.clone()),
            },
        ];
        self.ticker = Some(TickDriver::start(tasks, self.shutdown.child_token()));

        info!(%venue, symbol = %self.settings.symbol, "engine started");
        Ok(())
    }

    /// Tear everything down in reverse order of initialization. In-flight
    /// adapter calls are abandoned, not drained.
    pub async fn stop(mut self) -> Result<()> {
        info!("engine stopping");

        for subscription in self.subscriptions.drain(..) {
            subscription.run();
        }

        self.shutdown.cancel();
        if let Some(ticker) = self.ticker.take() {
            ticker.stop().await;
        }

        if let Some(mut handle) = self.manager_handle.take() {
            tokio::select! {
                result = &mut handle => match result {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => warn!(error = %err, "order manager exited with error"),
                    Err(join_err) => warn!(error = %join_err, "order manager task did not join cleanly"),
                },
                _ = tokio::time::sleep(SHUTDOWN_TIMEOUT) => {
                    warn!("order manager did not stop in time; aborting");
                    handle.abort();
                }
            }
        }

        if let Err(err) = self.adapter.disconnect().await {
            warn!(error = %err, "adapter disconnect failed");
        }

        info!("engine stopped");
        Ok(())
    }
}

fn command_tick(
    cmd_tx: mpsc::UnboundedSender<EngineCommand>,
    make: fn(oneshot::Sender<()>) -> EngineCommand,
) -> TickHandler {
    Arc::new(move || {
        let cmd_tx = cmd_tx.clone();
        Box::pin(async move {
            let (done_tx, done_rx) = oneshot::channel();
            cmd_tx
                .send(make(done_tx))
                .map_err(|_| anyhow!("order manager is gone"))?;
            done_rx
                .await
                .context("order manager dropped the request")?;
            Ok(())
        })
    })
}

fn health_tick(
    checker: Arc<HealthChecker>,
    status_rx: watch::Receiver<StatusSnapshot>,
    hub: Arc<MarketDataHub>,
    venue: String,
) -> TickHandler {
    Arc::new(move || {
        let checker = checker.clone();
        let status_rx = status_rx.clone();
        let hub = hub.clone();
        let venue = venue.clone();
        Box::pin(async move {
            let status = status_rx.borrow().clone();
            let report = checker.check(Instant::now(), &status, hub.last_update_at(&venue));
            if report.ok {
                debug!(market_age = ?report.market_age, "health ok");
            } else {
                for warning in &report.warnings {
                    warn!(%warning, "health check warning");
                }
            }
            Ok(())
        })
    })
}
