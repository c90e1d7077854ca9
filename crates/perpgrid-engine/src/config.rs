/*
[INPUT]:  Process environment (GRID_*, EXCHANGE, DB_PATH)
[OUTPUT]: Validated engine settings
[POS]:    Configuration layer - engine setup
[UPDATE]: When adding new configuration options
*/

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use rust_decimal::Decimal;

use crate::geometry::{SpacingConfig, SpacingMode};

/// Everything the engine needs to run one symmetric grid on one venue.
#[derive(Debug, Clone)]
pub struct GridSettings {
    /// Client-order-id prefix identifying this strategy instance.
    pub strategy_id: String,
    /// Canonical symbol, e.g. `BTC`.
    pub symbol: String,
    /// Venue tag selecting an adapter.
    pub exchange: String,
    pub levels_per_side: u32,
    pub spacing: SpacingConfig,
    pub order_qty: Decimal,
    pub post_only: bool,
    pub cancel_timeout: Duration,
    pub max_position: Decimal,
    pub max_open_orders: usize,
    pub db_path: Option<PathBuf>,
}

impl GridSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let strategy_id = lookup("GRID_STRATEGY_ID").unwrap_or_else(|| "grid-default".to_string());
        let symbol = required(&lookup, "GRID_SYMBOL")?;
        let exchange = required(&lookup, "EXCHANGE")?;

        let levels_per_side: u32 = parse(&lookup, "GRID_LEVELS")?;

        let mode_raw = required(&lookup, "GRID_SPACING_MODE")?;
        let mode = match mode_raw.trim().to_ascii_uppercase().as_str() {
            "ABS" => SpacingMode::Abs,
            "PERCENT" => SpacingMode::Percent,
            other => return Err(anyhow!("GRID_SPACING_MODE must be ABS or PERCENT, got {other}")),
        };
        let spacing = match mode {
            SpacingMode::Abs => SpacingConfig::Abs {
                step: parse_decimal(&lookup, "GRID_SPACING")?,
            },
            SpacingMode::Percent => SpacingConfig::Percent {
                ratio: parse_decimal(&lookup, "GRID_SPACING_PERCENT")?,
            },
        };

        let order_qty = parse_decimal(&lookup, "GRID_QUANTITY")?;
        let post_only = match lookup("GRID_POST_ONLY") {
            Some(raw) => parse_bool("GRID_POST_ONLY", &raw)?,
            None => false,
        };
        let cancel_timeout_ms: u64 = parse(&lookup, "GRID_CANCEL_TIMEOUT_MS")?;
        let max_position = parse_decimal(&lookup, "GRID_MAX_POSITION")?;
        let max_open_orders: usize = parse(&lookup, "GRID_MAX_OPEN_ORDERS")?;
        let db_path = lookup("DB_PATH").map(PathBuf::from);

        let settings = Self {
            strategy_id,
            symbol,
            exchange,
            levels_per_side,
            spacing,
            order_qty,
            post_only,
            cancel_timeout: Duration::from_millis(cancel_timeout_ms),
            max_position,
            max_open_orders,
            db_path,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.strategy_id.trim().is_empty() {
            return Err(anyhow!("strategy id cannot be empty"));
        }
        if self.symbol.trim().is_empty() {
            return Err(anyhow!("symbol cannot be empty"));
        }
        if self.exchange.trim().is_empty() {
            return Err(anyhow!("exchange cannot be empty"));
        }
        if self.levels_per_side < 1 {
            return Err(anyhow!("GRID_LEVELS must be at least 1"));
        }
        if let Err(err) = self.spacing.validate() {
            return Err(anyhow!("invalid spacing: {err}"));
        }
        if self.order_qty <= Decimal::ZERO {
            return Err(anyhow!("GRID_QUANTITY must be positive"));
        }
        if self.cancel_timeout < Duration::from_millis(1) {
            return Err(anyhow!("GRID_CANCEL_TIMEOUT_MS must be at least 1"));
        }
        if self.max_position < Decimal::ZERO {
            return Err(anyhow!("GRID_MAX_POSITION cannot be negative"));
        }
        if self.max_open_orders < 1 {
            return Err(anyhow!("GRID_MAX_OPEN_ORDERS must be at least 1"));
        }
        Ok(())
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .with_context(|| format!("{key} is required"))
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = required(lookup, key)?;
    raw.trim()
        .parse::<T>()
        .map_err(|err| anyhow!("{key} is invalid ({err}): {raw}"))
}

fn parse_decimal(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Decimal> {
    let raw = required(lookup, key)?;
    Decimal::from_str(raw.trim()).map_err(|err| anyhow!("{key} is invalid ({err}): {raw}"))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(anyhow!("{key} must be a boolean, got {other}")),
    }
}
