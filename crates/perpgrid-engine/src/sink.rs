/*
[INPUT]:  Order records emitted on every observed state mutation
[OUTPUT]: Fire-and-forget persistence; JSON lines on disk or nothing
[POS]:    Persistence boundary - the engine never awaits the sink
[UPDATE]: When the record schema or writer behavior changes
*/

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use perpgrid_adapter::{OrderStatus, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::warn;

/// One observed order-state mutation, carrying everything needed to replay
/// order history. Consumers upsert keyed on `(exchange, client_order_id)`;
/// `created_at` is stable per order while `updated_at` moves forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub exchange: String,
    pub symbol: String,
    pub client_order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange_order_id: Option<String>,
    pub side: Side,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub qty: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub filled_qty: Decimal,
    pub status: OrderStatus,
    pub native_status: String,
    pub level_index: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fire-and-forget order record sink. `record_order` must return without
/// blocking; failures are the sink's to log.
pub trait OrderSink: Send + Sync {
    fn record_order(&self, record: OrderRecord);
}

/// Discards every record. Used for dry runs and tests that assert elsewhere.
pub struct NullSink;

impl OrderSink for NullSink {
    fn record_order(&self, _record: OrderRecord) {}
}

/// Appends one JSON object per record to a file, from a dedicated writer
/// task fed over an unbounded channel.
pub struct JsonlOrderSink {
    tx: mpsc::UnboundedSender<OrderRecord>,
}

impl JsonlOrderSink {
    /// Spawns the writer task. The parent directory must exist.
    pub fn create(path: PathBuf) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(path, rx));
        Self { tx }
    }
}

impl OrderSink for JsonlOrderSink {
    fn record_order(&self, record: OrderRecord) {
        // Send failure means the writer is gone; the engine keeps trading.
        let _ = self.tx.send(record);
    }
}

async fn write_loop(path: PathBuf, mut rx: mpsc::UnboundedReceiver<OrderRecord>) {
    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await;

    let mut file = match file {
        Ok(file) => file,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "order sink unavailable; records will be dropped");
            while rx.recv().await.is_some() {}
            return;
        }
    };

    while let Some(record) = rx.recv().await {
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "failed to encode order record");
                continue;
            }
        };
        if let Err(err) = file.write_all(format!("{line}\n").as_bytes()).await {
            warn!(path = %path.display(), error = %err, "failed to append order record");
        }
    }

    let _ = file.flush().await;
}
