/*
[INPUT]:  Center/mark prices and local order records
[OUTPUT]: The level table, the order table, and shift/rebuild results
[POS]:    State layer - the single source of truth the manager mutates
[UPDATE]: When level binding rules or shift semantics change
*/

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use perpgrid_adapter::{OrderStatus, Side};
use rust_decimal::Decimal;
use tokio::time::Instant;

use crate::errors::GridError;
use crate::geometry::SpacingConfig;

const MAX_LEVELS_PER_SIDE: u32 = 10_000;

/// A discrete price tier at a signed offset from the center.
///
/// Index 0 is the reference level and takes no orders; negative indices are
/// buy levels, positive indices are sell levels.
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    pub index: i32,
    pub target_side: Option<Side>,
    pub price: Decimal,
}

pub fn target_side_for_index(index: i32) -> Option<Side> {
    match index {
        0 => None,
        i if i < 0 => Some(Side::Buy),
        _ => Some(Side::Sell),
    }
}

/// Local record of one managed order.
#[derive(Debug, Clone, PartialEq)]
pub struct GridOrder {
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub status: OrderStatus,
    /// Venue-native status string as last reported.
    pub native_status: String,
    pub side: Side,
    pub price: Decimal,
    pub qty: Decimal,
    pub filled_qty: Decimal,
    pub level_index: i32,
    pub placed_at: Instant,
    pub placed_at_utc: DateTime<Utc>,
    pub updated_at: Instant,
}

impl GridOrder {
    pub fn remaining_qty(&self) -> Decimal {
        if self.filled_qty >= self.qty {
            Decimal::ZERO
        } else {
            self.qty - self.filled_qty
        }
    }
}

/// Outcome of a center shift.
#[derive(Debug, Clone)]
pub struct ShiftResult {
    pub new_center_price: Decimal,
    pub steps: i32,
    /// Orders whose remapped index left the grid or disagrees with the new
    /// level's side. Their status is untouched; cancelling is the caller's
    /// job.
    pub out_of_range_orders: Vec<GridOrder>,
}

/// The in-memory grid: symmetric levels around a center plus the table of
/// live managed orders. Terminal orders are evicted on upsert and never
/// occupy a level.
#[derive(Debug)]
pub struct GridState {
    levels_per_side: u32,
    spacing: SpacingConfig,
    center_price: Option<Decimal>,
    last_mark: Option<Decimal>,
    last_quote_ts_ms: Option<i64>,
    last_rebuild_at: Option<Instant>,
    levels: BTreeMap<i32, Level>,
    orders: HashMap<String, GridOrder>,
    bound: HashMap<i32, String>,
}

impl GridState {
    pub fn new(levels_per_side: u32, spacing: SpacingConfig) -> Result<Self, GridError> {
        if levels_per_side == 0 || levels_per_side > MAX_LEVELS_PER_SIDE {
            return Err(GridError::LevelCountOutOfRange {
                levels: levels_per_side,
            });
        }
        spacing.validate()?;
        Ok(Self {
            levels_per_side,
            spacing,
            center_price: None,
            last_mark: None,
            last_quote_ts_ms: None,
            last_rebuild_at: None,
            levels: BTreeMap::new(),
            orders: HashMap::new(),
            bound: HashMap::new(),
        })
    }

    pub fn levels_per_side(&self) -> u32 {
        self.levels_per_side
    }

    pub fn spacing(&self) -> &SpacingConfig {
        &self.spacing
    }

    pub fn center_price(&self) -> Option<Decimal> {
        self.center_price
    }

    pub fn last_mark(&self) -> Option<Decimal> {
        self.last_mark
    }

    pub fn last_quote_ts_ms(&self) -> Option<i64> {
        self.last_quote_ts_ms
    }

    pub fn last_rebuild_at(&self) -> Option<Instant> {
        self.last_rebuild_at
    }

    pub fn levels(&self) -> &BTreeMap<i32, Level> {
        &self.levels
    }

    pub fn level(&self, index: i32) -> Option<&Level> {
        self.levels.get(&index)
    }

    pub fn orders(&self) -> &HashMap<String, GridOrder> {
        &self.orders
    }

    pub fn order(&self, client_order_id: &str) -> Option<&GridOrder> {
        self.orders.get(client_order_id)
    }

    pub fn bound_order_id(&self, index: i32) -> Option<&String> {
        self.bound.get(&index)
    }

    /// Count of live (non-terminal) managed orders.
    pub fn active_order_count(&self) -> usize {
        self.orders.len()
    }

    /// Worst-case unfilled exposure per side.
    pub fn pending_totals(&self) -> (Decimal, Decimal) {
        let mut buy = Decimal::ZERO;
        let mut sell = Decimal::ZERO;
        for order in self.orders.values() {
            match order.side {
                Side::Buy => buy += order.remaining_qty(),
                Side::Sell => sell += order.remaining_qty(),
            }
        }
        (buy, sell)
    }

    /// Rebuild the symmetric level table around `center`, dropping every
    /// order record.
    pub fn reset(&mut self, center: Decimal, now: Instant) -> Result<(), GridError> {
        if center <= Decimal::ZERO {
            return Err(GridError::NonPositivePrice {
                field: "center",
                value: center.to_string(),
            });
        }
        self.rebuild_levels(center);
        self.center_price = Some(center);
        self.orders.clear();
        self.bound.clear();
        self.last_rebuild_at = Some(now);
        Ok(())
    }

    /// Record the latest mark; levels are untouched.
    pub fn update_mark(&mut self, mark: Decimal, ts_ms: i64) {
        self.last_mark = Some(mark);
        self.last_quote_ts_ms = Some(ts_ms);
    }

    /// Insert or replace an order record. Terminal orders are removed and
    /// detached from their level; live orders bind to their level only when
    /// the sides agree (a mismatch leaves the record tracked but unbound).
    pub fn upsert_order(&mut self, order: GridOrder) {
        let id = order.client_order_id.clone();

        if let Some(previous) = self.orders.get(&id)
            && self.bound.get(&previous.level_index).map(String::as_str) == Some(id.as_str())
        {
            self.bound.remove(&previous.level_index);
        }

        if order.status.is_terminal() {
            self.orders.remove(&id);
            return;
        }

        let bindable = self
            .levels
            .get(&order.level_index)
            .is_some_and(|level| level.target_side == Some(order.side));
        if bindable && !self.bound.contains_key(&order.level_index) {
            self.bound.insert(order.level_index, id.clone());
        }

        self.orders.insert(id, order);
    }

    /// Move the center by `steps` levels, rebuilding the level table and
    /// remapping every order's index. Zero steps is a no-op.
    pub fn shift_center(&mut self, steps: i32, now: Instant) -> Result<ShiftResult, GridError> {
        let center = self.center_price.ok_or(GridError::CenterNotSet)?;
        if steps == 0 {
            return Ok(ShiftResult {
                new_center_price: center,
                steps: 0,
                out_of_range_orders: Vec::new(),
            });
        }

        let new_center = self.spacing.level_price(center, steps);
        if new_center <= Decimal::ZERO {
            return Err(GridError::NonPositivePrice {
                field: "shifted center",
                value: new_center.to_string(),
            });
        }

        self.rebuild_levels(new_center);
        self.center_price = Some(new_center);
        self.last_rebuild_at = Some(now);
        self.bound.clear();

        let n = self.levels_per_side as i32;
        let mut out_of_range = Vec::new();
        for order in self.orders.values_mut() {
            order.level_index -= steps;
            let index = order.level_index;
            let keeps_level = (-n..=n).contains(&index)
                && self
                    .levels
                    .get(&index)
                    .is_some_and(|level| level.target_side == Some(order.side));
            if keeps_level {
                self.bound
                    .entry(index)
                    .or_insert_with(|| order.client_order_id.clone());
            } else {
                out_of_range.push(order.clone());
            }
        }

        Ok(ShiftResult {
            new_center_price: new_center,
            steps,
            out_of_range_orders: out_of_range,
        })
    }

    fn rebuild_levels(&mut self, center: Decimal) {
        let n = self.levels_per_side as i32;
        self.levels.clear();
        for index in -n..=n {
            self.levels.insert(
                index,
                Level {
                    index,
                    target_side: target_side_for_index(index),
                    price: self.spacing.level_price(center, index),
                },
            );
        }
    }
}
