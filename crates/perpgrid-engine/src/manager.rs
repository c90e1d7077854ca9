/*
[INPUT]:  Quotes (latest-wins slot), account events, maintenance/reconcile ticks
[OUTPUT]: Placements and cancels against the adapter, order records, status
[POS]:    Core layer - the single writer of grid state
[UPDATE]: When the event-loop priorities, sync pass, or reconcile rules change
*/

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use perpgrid_adapter::{
    Capabilities, ExchangeAdapter, OrderSnapshot, OrderStatus, PlaceOrderRequest, PositionUpdate,
    Quote, Side,
};
use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::GridSettings;
use crate::errors::GridError;
use crate::grid::{GridOrder, GridState};
use crate::order_id::OrderIdFactory;
use crate::rate_limit::RateLimitGuard;
use crate::risk;
use crate::sink::{OrderRecord, OrderSink};

/// Quotes inside the window must keep signalling the same direction for this
/// long before a shift executes.
const MARK_SHIFT_CONFIRM: Duration = Duration::from_millis(2_000);
const POSITION_FRESH: Duration = Duration::from_secs(15);
const POSITION_REST_MIN_INTERVAL: Duration = Duration::from_secs(2);
/// A post-only placement without a quote newer than this is suppressed.
const QUOTE_FRESH: Duration = Duration::from_secs(15);

/// Work delivered to the manager's loop from stream callbacks and ticks.
pub enum EngineCommand {
    OrderUpdates(Vec<OrderSnapshot>),
    PositionUpdates(Vec<PositionUpdate>),
    Maintenance(oneshot::Sender<()>),
    Reconcile(oneshot::Sender<()>),
}

/// Timestamps the health checker reads; all published by the manager.
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    pub center_price: Option<Decimal>,
    pub last_order_update_at: Option<Instant>,
    pub last_position_update_at: Option<Instant>,
    pub last_maintenance_at: Option<Instant>,
    pub last_reconcile_at: Option<Instant>,
}

/// Sender-side handles the runtime wires into callbacks and ticks.
pub struct ManagerChannels {
    pub cmd_tx: mpsc::UnboundedSender<EngineCommand>,
    pub quote_tx: watch::Sender<Option<Quote>>,
    pub status_rx: watch::Receiver<StatusSnapshot>,
}

#[derive(Debug, Clone, Copy)]
struct PendingShift {
    started_at: Instant,
    sign: i8,
}

#[derive(Debug, Default)]
struct PositionCache {
    net: Option<Decimal>,
    snapshot_ready: bool,
    last_update_at: Option<Instant>,
    last_rest_refresh_at: Option<Instant>,
}

/// The order manager: sole mutator of grid state and sole issuer of
/// place/cancel commands. Everything else talks to it through channels, and
/// its loop handles one work unit at a time with fill shifts drained before
/// any pending quote.
pub struct OrderManager {
    settings: GridSettings,
    venue: String,
    exchange_symbol: String,
    capabilities: Capabilities,
    adapter: Arc<dyn ExchangeAdapter>,
    guard: Arc<RateLimitGuard>,
    sink: Arc<dyn OrderSink>,
    grid: GridState,
    ids: OrderIdFactory,
    pending_fill_shifts: VecDeque<i32>,
    pending_cancels: HashSet<String>,
    pending_shift: Option<PendingShift>,
    position: PositionCache,
    last_quote: Option<Quote>,
    last_quote_at: Option<Instant>,
    last_order_update_at: Option<Instant>,
    last_maintenance_at: Option<Instant>,
    last_reconcile_at: Option<Instant>,
    status_tx: watch::Sender<StatusSnapshot>,
    cmd_rx: mpsc::UnboundedReceiver<EngineCommand>,
    quote_rx: watch::Receiver<Option<Quote>>,
}

impl OrderManager {
    pub fn new(
        settings: GridSettings,
        exchange_symbol: String,
        adapter: Arc<dyn ExchangeAdapter>,
        guard: Arc<RateLimitGuard>,
        sink: Arc<dyn OrderSink>,
    ) -> Result<(Self, ManagerChannels), GridError> {
        let grid = GridState::new(settings.levels_per_side, settings.spacing)?;
        let ids = OrderIdFactory::new(&settings.strategy_id, &settings.symbol);

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (quote_tx, quote_rx) = watch::channel(None);
        let (status_tx, status_rx) = watch::channel(StatusSnapshot::default());

        let manager = Self {
            venue: adapter.name().to_string(),
            capabilities: adapter.capabilities(),
            settings,
            exchange_symbol,
            adapter,
            guard,
            sink,
            grid,
            ids,
            pending_fill_shifts: VecDeque::new(),
            pending_cancels: HashSet::new(),
            pending_shift: None,
            position: PositionCache::default(),
            last_quote: None,
            last_quote_at: None,
            last_order_update_at: None,
            last_maintenance_at: None,
            last_reconcile_at: None,
            status_tx,
            cmd_rx,
            quote_rx,
        };
        let channels = ManagerChannels {
            cmd_tx,
            quote_tx,
            status_rx,
        };
        Ok((manager, channels))
    }

    /// The event loop. Fill shifts carry newer causal information than any
    /// earlier quote, so they drain first; among channel inputs, account
    /// events win over the pending quote.
    pub async fn run(mut self, shutdown: CancellationToken) -> anyhow::Result<()> {
        // Populate the position cache before the first placement pass.
        self.refresh_position_via_rest().await;

        loop {
            if let Some(steps) = self.pending_fill_shifts.pop_front() {
                self.process_fill_shift(steps).await;
                continue;
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!(symbol = %self.settings.symbol, "order manager stopping");
                    return Ok(());
                }
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => return Ok(()),
                    }
                }
                changed = self.quote_rx.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                    let quote = self.quote_rx.borrow_and_update().clone();
                    if let Some(quote) = quote {
                        self.process_quote(quote).await;
                    }
                }
            }
        }
    }

    async fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::OrderUpdates(updates) => self.apply_order_updates(updates),
            EngineCommand::PositionUpdates(updates) => self.apply_position_updates(updates),
            EngineCommand::Maintenance(done) => {
                self.run_maintenance().await;
                let _ = done.send(());
            }
            EngineCommand::Reconcile(done) => {
                self.run_reconcile().await;
                let _ = done.send(());
            }
        }
    }

    // ─── quote path ────────────────────────────────────────────────────

    async fn process_quote(&mut self, quote: Quote) {
        if quote.exchange != self.venue {
            debug!(exchange = %quote.exchange, "ignoring quote from foreign exchange");
            return;
        }
        if !quote.is_coherent() {
            warn!(bid = %quote.bid, ask = %quote.ask, mark = %quote.mark, "ignoring incoherent quote");
            return;
        }

        let mark = quote.mark;
        self.grid.update_mark(mark, quote.ts_ms);
        self.last_quote_at = Some(Instant::now());
        self.last_quote = Some(quote);

        let Some(center) = self.grid.center_price() else {
            self.handle_first_quote(mark).await;
            return;
        };

        self.sweep_timeouts().await;

        let steps = match self.grid.spacing().cross_steps(center, mark) {
            Ok(steps) => steps,
            Err(err) => {
                warn!(error = %err, "cross-step computation failed; skipping quote");
                return;
            }
        };
        let n = self.settings.levels_per_side as i32;

        if steps == 0 {
            self.pending_shift = None;
            self.sync_levels().await;
            self.publish_status();
            return;
        }

        if steps.unsigned_abs() >= n as u32 {
            self.full_rebuild(mark).await;
            self.publish_status();
            return;
        }

        if steps.abs() < 2 {
            // One spacing of drift is jitter, not a trend.
            self.pending_shift = None;
            self.sync_levels().await;
            self.publish_status();
            return;
        }

        let sign: i8 = if steps > 0 { 1 } else { -1 };
        let now = Instant::now();
        let confirmed = match self.pending_shift {
            Some(pending) if pending.sign == sign => {
                now.duration_since(pending.started_at) >= MARK_SHIFT_CONFIRM
            }
            _ => {
                self.pending_shift = Some(PendingShift {
                    started_at: now,
                    sign,
                });
                false
            }
        };

        if confirmed {
            self.pending_shift = None;
            self.apply_shift(steps).await;
        }
        self.sync_levels().await;
        self.publish_status();
    }

    async fn handle_first_quote(&mut self, mark: Decimal) {
        info!(%mark, "first quote; laying out the grid");
        if let Err(err) = self.grid.reset(mark, Instant::now()) {
            warn!(error = %err, "could not establish grid center");
            return;
        }
        // A previous run may have left managed orders on the venue.
        self.cancel_managed_open_orders().await;
        self.sync_levels().await;
        self.publish_status();
    }

    async fn full_rebuild(&mut self, mark: Decimal) {
        info!(%mark, "mark moved beyond the outer level; full rebuild");
        self.pending_shift = None;
        // Queued fill shifts refer to levels that no longer exist.
        self.pending_fill_shifts.clear();
        self.cancel_managed_open_orders().await;
        if let Err(err) = self.grid.reset(mark, Instant::now()) {
            warn!(error = %err, "full rebuild failed to reset the grid");
            return;
        }
        self.sync_levels().await;
    }

    // ─── fill path ─────────────────────────────────────────────────────

    async fn process_fill_shift(&mut self, level_index: i32) {
        if level_index == 0 || self.grid.center_price().is_none() {
            return;
        }
        info!(level_index, "fill-driven shift");
        // The fill is a physical event; it supersedes any pending mark signal.
        self.pending_shift = None;
        self.apply_shift(level_index).await;
        self.sync_levels().await;
        self.publish_status();
    }

    #[cfg(test)]
    async fn drain_fill_shifts(&mut self) {
        while let Some(steps) = self.pending_fill_shifts.pop_front() {
            self.process_fill_shift(steps).await;
        }
    }

    async fn apply_shift(&mut self, steps: i32) {
        match self.grid.shift_center(steps, Instant::now()) {
            Ok(result) => {
                info!(
                    steps,
                    new_center = %result.new_center_price,
                    dropped = result.out_of_range_orders.len(),
                    "grid center shifted"
                );
                for order in result.out_of_range_orders {
                    self.cancel_order(&order.client_order_id).await;
                }
            }
            Err(err) => warn!(steps, error = %err, "center shift failed"),
        }
    }

    // ─── account events ────────────────────────────────────────────────

    fn apply_order_updates(&mut self, updates: Vec<OrderSnapshot>) {
        let now = Instant::now();
        let mut saw_fill = false;

        for update in updates {
            if update.symbol != self.exchange_symbol {
                continue;
            }
            if matches!(
                update.status,
                OrderStatus::Filled | OrderStatus::PartiallyFilled
            ) {
                saw_fill = true;
            }
            if !self.ids.owns(&update.client_order_id) {
                debug!(client_order_id = %update.client_order_id, "ignoring unmanaged order update");
                continue;
            }

            let Some(local) = self.grid.order(&update.client_order_id).cloned() else {
                debug!(
                    client_order_id = %update.client_order_id,
                    "update for unknown managed order; reconcile will adopt it if still open"
                );
                continue;
            };

            let merged = merge_snapshot(local, &update, now);
            if merged.status == OrderStatus::Filled && merged.level_index != 0 {
                self.pending_fill_shifts.push_back(merged.level_index);
            }
            self.record_order(&merged);
            self.grid.upsert_order(merged);
        }

        if saw_fill {
            // Inventory moved; force the next sync pass to refresh.
            self.position.last_update_at = None;
        }
        self.last_order_update_at = Some(now);
        self.publish_status();
    }

    fn apply_position_updates(&mut self, updates: Vec<PositionUpdate>) {
        let now = Instant::now();
        let first_snapshot = !self.position.snapshot_ready;
        self.position.snapshot_ready = true;

        let mut matched = false;
        for update in &updates {
            if update.symbol == self.exchange_symbol || update.symbol == self.settings.symbol {
                self.position.net = Some(update.net_qty);
                matched = true;
            }
        }

        if matched {
            self.position.last_update_at = Some(now);
        } else if first_snapshot && self.position.net.is_none() {
            // No position reported for our symbol: flat until told otherwise.
            self.position.net = Some(Decimal::ZERO);
            self.position.last_update_at = Some(now);
        }
        self.publish_status();
    }

    // ─── position cache ────────────────────────────────────────────────

    async fn load_net_position(&mut self) -> Option<Decimal> {
        let now = Instant::now();
        if let (Some(net), Some(at)) = (self.position.net, self.position.last_update_at)
            && now.duration_since(at) < POSITION_FRESH
        {
            return Some(net);
        }

        let can_refresh = self
            .position
            .last_rest_refresh_at
            .is_none_or(|at| now.duration_since(at) >= POSITION_REST_MIN_INTERVAL);
        if can_refresh && let Some(net) = self.refresh_position_via_rest().await {
            return Some(net);
        }

        // Stale cache beats no data.
        self.position.net
    }

    async fn refresh_position_via_rest(&mut self) -> Option<Decimal> {
        self.position.last_rest_refresh_at = Some(Instant::now());
        self.guard.acquire().await;
        let result = self.adapter.get_net_position(&self.exchange_symbol).await;
        self.guard.note(&result).await;
        match result {
            Ok(net) => {
                self.position.net = Some(net);
                self.position.snapshot_ready = true;
                self.position.last_update_at = Some(Instant::now());
                self.publish_status();
                Some(net)
            }
            Err(err) => {
                warn!(error = %err, "position refresh failed");
                None
            }
        }
    }

    // ─── sync pass ─────────────────────────────────────────────────────

    async fn sync_levels(&mut self) {
        if self.grid.center_price().is_none() {
            return;
        }
        let Some(net) = self.load_net_position().await else {
            warn!("net position unavailable; skipping sync pass");
            return;
        };

        let (mut pending_buy, mut pending_sell) = self.grid.pending_totals();
        let qty = self.settings.order_qty;
        let indices: Vec<i32> = self.grid.levels().keys().copied().collect();

        for index in indices {
            let Some(level) = self.grid.level(index).cloned() else {
                continue;
            };
            let Some(side) = level.target_side else {
                continue;
            };
            if self.grid.bound_order_id(index).is_some() {
                continue;
            }
            if self.grid.active_order_count() >= self.settings.max_open_orders {
                debug!(max = self.settings.max_open_orders, "open-order cap reached; ending sync pass");
                break;
            }
            if !risk::admits(
                side,
                net,
                pending_buy,
                pending_sell,
                qty,
                self.settings.max_position,
            ) {
                debug!(index, %side, "placement rejected by max-position guard");
                continue;
            }
            if self.settings.post_only && self.would_cross(side, level.price) {
                debug!(index, %side, price = %level.price, "post-only placement would cross; suppressed");
                continue;
            }

            match self.place_order(side, index, level.price).await {
                Some(status) if !status.is_terminal() => match side {
                    Side::Buy => pending_buy += qty,
                    Side::Sell => pending_sell += qty,
                },
                _ => {}
            }
        }
    }

    fn would_cross(&self, side: Side, price: Decimal) -> bool {
        let Some(quote) = &self.last_quote else {
            return true;
        };
        let fresh = self
            .last_quote_at
            .is_some_and(|at| Instant::now().duration_since(at) < QUOTE_FRESH);
        if !fresh {
            return true;
        }
        match side {
            Side::Buy => price >= quote.ask,
            Side::Sell => price <= quote.bid,
        }
    }

    async fn place_order(&mut self, side: Side, level_index: i32, price: Decimal) -> Option<OrderStatus> {
        let client_order_id = self.ids.next(side, level_index);
        let now = Instant::now();
        let now_utc = Utc::now();

        let order = GridOrder {
            client_order_id: client_order_id.clone(),
            exchange_order_id: None,
            status: OrderStatus::PendingSend,
            native_status: String::new(),
            side,
            price,
            qty: self.settings.order_qty,
            filled_qty: Decimal::ZERO,
            level_index,
            placed_at: now,
            placed_at_utc: now_utc,
            updated_at: now,
        };
        self.record_order(&order);
        self.grid.upsert_order(order.clone());

        let request = PlaceOrderRequest {
            symbol: self.exchange_symbol.clone(),
            side,
            price,
            qty: self.settings.order_qty,
            client_order_id: client_order_id.clone(),
            post_only: self.settings.post_only,
            expire_time_ms: Some(
                now_utc.timestamp_millis() + self.settings.cancel_timeout.as_millis() as i64,
            ),
        };

        self.guard.acquire().await;
        let result = self.adapter.place_order(request).await;
        self.guard.note(&result).await;

        match result {
            Ok(ack) => {
                let mut placed = order;
                placed.status = ack.status;
                placed.native_status = ack.native_status;
                placed.exchange_order_id = ack.exchange_order_id;
                placed.filled_qty = ack.filled_qty;
                placed.updated_at = Instant::now();
                debug!(
                    client_order_id = %placed.client_order_id,
                    %side,
                    %price,
                    status = %placed.status,
                    "order placed"
                );
                if placed.status == OrderStatus::Filled && level_index != 0 {
                    self.pending_fill_shifts.push_back(level_index);
                }
                let status = placed.status;
                self.record_order(&placed);
                self.grid.upsert_order(placed);
                Some(status)
            }
            Err(err) if err.is_retryable() => {
                warn!(client_order_id = %client_order_id, error = %err, "place outcome unknown; keeping level reserved");
                let mut unknown = order;
                unknown.status = OrderStatus::Unknown;
                unknown.updated_at = Instant::now();
                self.record_order(&unknown);
                self.grid.upsert_order(unknown);
                Some(OrderStatus::Unknown)
            }
            Err(err) => {
                warn!(client_order_id = %client_order_id, error = %err, "placement rejected");
                let mut rejected = order;
                rejected.status = OrderStatus::Rejected;
                rejected.updated_at = Instant::now();
                self.record_order(&rejected);
                self.grid.upsert_order(rejected);
                None
            }
        }
    }

    // ─── cancels & timeouts ────────────────────────────────────────────

    async fn sweep_timeouts(&mut self) {
        let now = Instant::now();
        let overdue: Vec<String> = self
            .grid
            .orders()
            .values()
            .filter(|order| {
                matches!(
                    order.status,
                    OrderStatus::Acked | OrderStatus::PartiallyFilled
                ) && now.duration_since(order.placed_at) >= self.settings.cancel_timeout
            })
            .map(|order| order.client_order_id.clone())
            .collect();

        for client_order_id in overdue {
            self.cancel_order(&client_order_id).await;
        }
    }

    async fn cancel_order(&mut self, client_order_id: &str) {
        if !self.pending_cancels.insert(client_order_id.to_string()) {
            return;
        }

        self.guard.acquire().await;
        let result = self
            .adapter
            .cancel_order_by_external_id(client_order_id)
            .await;
        self.guard.note(&result).await;
        self.pending_cancels.remove(client_order_id);

        match result {
            Ok(()) => self.mark_order_cancelled(client_order_id),
            Err(err) => {
                warn!(%client_order_id, error = %err, "cancel failed; adopting venue state instead");
                self.reconcile_order_by_id(client_order_id).await;
            }
        }
    }

    fn mark_order_cancelled(&mut self, client_order_id: &str) {
        let Some(mut order) = self.grid.order(client_order_id).cloned() else {
            return;
        };
        order.status = OrderStatus::Cancelled;
        order.updated_at = Instant::now();
        self.record_order(&order);
        self.grid.upsert_order(order);
    }

    async fn cancel_managed_open_orders(&mut self) {
        if self.capabilities.mass_cancel {
            self.guard.acquire().await;
            let result = self.adapter.mass_cancel(&self.exchange_symbol).await;
            self.guard.note(&result).await;
            match result {
                Ok(()) => {
                    let ids: Vec<String> = self.grid.orders().keys().cloned().collect();
                    for client_order_id in ids {
                        self.mark_order_cancelled(&client_order_id);
                    }
                    return;
                }
                Err(err) => {
                    warn!(error = %err, "mass cancel failed; falling back to per-order cancels");
                }
            }
        }

        let mut targets: Vec<String> = self.grid.orders().keys().cloned().collect();
        self.guard.acquire().await;
        let result = self.adapter.get_open_orders(&self.exchange_symbol).await;
        self.guard.note(&result).await;
        match result {
            Ok(open) => {
                for order in open {
                    if self.ids.owns(&order.client_order_id)
                        && !targets.contains(&order.client_order_id)
                    {
                        targets.push(order.client_order_id);
                    }
                }
            }
            Err(err) => warn!(error = %err, "could not list open orders before cancel sweep"),
        }
        for client_order_id in targets {
            self.cancel_order(&client_order_id).await;
        }
    }

    // ─── maintenance & reconcile ───────────────────────────────────────

    async fn run_maintenance(&mut self) {
        self.sweep_timeouts().await;
        self.last_maintenance_at = Some(Instant::now());
        self.publish_status();
    }

    async fn run_reconcile(&mut self) {
        self.guard.acquire().await;
        let result = self.adapter.get_open_orders(&self.exchange_symbol).await;
        self.guard.note(&result).await;

        let open = match result {
            Ok(open) => open,
            Err(err) => {
                warn!(error = %err, "reconcile could not list open orders");
                return;
            }
        };

        let now = Instant::now();
        let mut seen: HashSet<String> = HashSet::new();

        for snapshot in open {
            if !self.ids.owns(&snapshot.client_order_id) {
                continue;
            }
            seen.insert(snapshot.client_order_id.clone());

            match self.grid.order(&snapshot.client_order_id).cloned() {
                Some(local) => {
                    let merged = merge_snapshot(local, &snapshot, now);
                    self.record_order(&merged);
                    self.grid.upsert_order(merged);
                }
                None => self.adopt_orphan(snapshot, now),
            }
        }

        let missing: Vec<String> = self
            .grid
            .orders()
            .keys()
            .filter(|id| !seen.contains(*id))
            .cloned()
            .collect();
        for client_order_id in missing {
            self.reconcile_order_by_id(&client_order_id).await;
        }

        self.last_reconcile_at = Some(Instant::now());
        self.publish_status();
    }

    /// Look one order up by client id and adopt whatever the venue says.
    /// Absent remotely means UNKNOWN, never CANCELLED.
    async fn reconcile_order_by_id(&mut self, client_order_id: &str) {
        self.guard.acquire().await;
        let result = self
            .adapter
            .get_order_by_client_order_id(client_order_id)
            .await;
        self.guard.note(&result).await;

        let now = Instant::now();
        match result {
            Ok(Some(snapshot)) => match self.grid.order(client_order_id).cloned() {
                Some(local) => {
                    let merged = merge_snapshot(local, &snapshot, now);
                    if merged.status == OrderStatus::Filled {
                        self.position.last_update_at = None;
                        if merged.level_index != 0 {
                            self.pending_fill_shifts.push_back(merged.level_index);
                        }
                    }
                    self.record_order(&merged);
                    self.grid.upsert_order(merged);
                }
                None => self.adopt_orphan(snapshot, now),
            },
            Ok(None) => {
                let Some(mut order) = self.grid.order(client_order_id).cloned() else {
                    return;
                };
                warn!(%client_order_id, "order unknown to the venue; marking UNKNOWN");
                order.status = OrderStatus::Unknown;
                order.updated_at = now;
                self.record_order(&order);
                self.grid.upsert_order(order);
            }
            Err(err) => {
                warn!(%client_order_id, error = %err, "order lookup failed; will retry next pass");
            }
        }
    }

    /// A managed order the venue knows but we do not (e.g. after a restart).
    fn adopt_orphan(&mut self, snapshot: OrderSnapshot, now: Instant) {
        let Some(parsed) = self.ids.parse(&snapshot.client_order_id) else {
            return;
        };
        if snapshot.status.is_terminal() {
            return;
        }
        let price = snapshot.price.unwrap_or_else(|| {
            self.grid
                .level(parsed.level_index)
                .map(|level| level.price)
                .unwrap_or(Decimal::ZERO)
        });
        info!(
            client_order_id = %snapshot.client_order_id,
            level_index = parsed.level_index,
            "adopting managed order found on the venue"
        );
        let order = GridOrder {
            client_order_id: snapshot.client_order_id.clone(),
            exchange_order_id: snapshot.exchange_order_id.clone(),
            status: snapshot.status,
            native_status: snapshot.native_status.clone(),
            side: snapshot.side,
            price,
            qty: snapshot.qty,
            filled_qty: snapshot.filled_qty,
            level_index: parsed.level_index,
            placed_at: now,
            placed_at_utc: chrono::DateTime::from_timestamp_millis(snapshot.created_at_ms)
                .unwrap_or_else(Utc::now),
            updated_at: now,
        };
        self.record_order(&order);
        self.grid.upsert_order(order);
    }

    // ─── plumbing ──────────────────────────────────────────────────────

    fn record_order(&self, order: &GridOrder) {
        self.sink.record_order(OrderRecord {
            exchange: self.settings.exchange.clone(),
            symbol: self.settings.symbol.clone(),
            client_order_id: order.client_order_id.clone(),
            exchange_order_id: order.exchange_order_id.clone(),
            side: order.side,
            price: order.price,
            qty: order.qty,
            filled_qty: order.filled_qty,
            status: order.status,
            native_status: order.native_status.clone(),
            level_index: order.level_index,
            created_at: order.placed_at_utc,
            updated_at: Utc::now(),
        });
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(StatusSnapshot {
            center_price: self.grid.center_price(),
            last_order_update_at: self.last_order_update_at,
            last_position_update_at: self.position.last_update_at,
            last_maintenance_at: self.last_maintenance_at,
            last_reconcile_at: self.last_reconcile_at,
        });
    }
}

/// Merge an exchange snapshot into a local record, preserving the local
/// `level_index`, `placed_at`, and price.
fn merge_snapshot(mut local: GridOrder, snapshot: &OrderSnapshot, now: Instant) -> GridOrder {
    local.status = snapshot.status;
    local.native_status = snapshot.native_status.clone();
    if snapshot.exchange_order_id.is_some() {
        local.exchange_order_id = snapshot.exchange_order_id.clone();
    }
    local.qty = snapshot.qty;
    local.filled_qty = snapshot.filled_qty;
    local.updated_at = now;
    local
}
