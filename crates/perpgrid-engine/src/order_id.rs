/*
[INPUT]:  Strategy identity, order side, level index
[OUTPUT]: Parseable client order ids with a per-process sequence
[POS]:    Identity layer - ownership tagging and crash recovery
[UPDATE]: When the id layout changes (breaks recovery of live orders)
*/

use std::sync::atomic::{AtomicU64, Ordering};

use perpgrid_adapter::Side;

/// Fields recovered from a managed client order id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOrderId {
    pub side: Side,
    pub level_index: i32,
    pub sequence: u64,
}

/// Issues ids of the form `<strategy_id>-<symbol>-<SIDE>-<level_index>-<seq>`.
///
/// The prefix identifies the owning strategy instance; ids with any other
/// prefix are not ours and must be left alone.
#[derive(Debug)]
pub struct OrderIdFactory {
    prefix: String,
    sequence: AtomicU64,
}

impl OrderIdFactory {
    pub fn new(strategy_id: &str, symbol: &str) -> Self {
        Self {
            prefix: format!("{strategy_id}-{symbol}-"),
            sequence: AtomicU64::new(1),
        }
    }

    pub fn next(&self, side: Side, level_index: i32) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{}{}-{}-{}", self.prefix, side.as_str(), level_index, seq)
    }

    /// Parse a received id; `None` means the order is not owned by this
    /// instance.
    pub fn parse(&self, client_order_id: &str) -> Option<ParsedOrderId> {
        let rest = client_order_id.strip_prefix(&self.prefix)?;
        let (side, rest) = if let Some(rest) = rest.strip_prefix("BUY-") {
            (Side::Buy, rest)
        } else if let Some(rest) = rest.strip_prefix("SELL-") {
            (Side::Sell, rest)
        } else {
            return None;
        };
        let (index_str, seq_str) = rest.rsplit_once('-')?;
        let level_index = index_str.parse::<i32>().ok()?;
        let sequence = seq_str.parse::<u64>().ok()?;
        Some(ParsedOrderId {
            side,
            level_index,
            sequence,
        })
    }

    pub fn owns(&self, client_order_id: &str) -> bool {
        self.parse(client_order_id).is_some()
    }
}
