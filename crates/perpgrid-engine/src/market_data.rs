/*
[INPUT]:  Quotes pushed by one stream callback per exchange source
[OUTPUT]: Latest-per-exchange snapshots dispatched to filtered subscribers
[POS]:    Data layer - shared market data distribution (no trading logic)
[UPDATE]: When changing snapshot shape or subscriber filtering
*/

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use perpgrid_adapter::Quote;
use tokio::time::Instant;
use tracing::debug;

/// What a subscriber receives on every accepted quote: the quote that
/// triggered the dispatch plus the latest cached quote per exchange.
#[derive(Debug, Clone)]
pub struct QuoteSnapshot {
    pub source_quote: Quote,
    pub latest: HashMap<String, Quote>,
}

pub type SnapshotCallback = Arc<dyn Fn(QuoteSnapshot) + Send + Sync>;

struct Subscriber {
    exchanges: Vec<String>,
    callback: SnapshotCallback,
}

struct HubInner {
    latest: HashMap<String, (Quote, Instant)>,
    subscribers: Vec<Subscriber>,
}

/// Process-wide quote aggregator. Holds only the last quote per exchange and
/// dispatches synchronously on the publishing thread; there is no queue.
///
/// Incoherent quotes (crossed book, non-positive mark) are dropped. Every
/// coherent quote is cached under its own exchange tag before subscriber
/// filtering runs, so the latest map can hold exchanges no subscriber asked
/// for.
pub struct MarketDataHub {
    inner: Mutex<HubInner>,
}

impl MarketDataHub {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HubInner {
                latest: HashMap::new(),
                subscribers: Vec::new(),
            }),
        }
    }

    /// Register a subscriber for quotes from the given exchanges.
    pub fn subscribe(&self, exchanges: Vec<String>, callback: SnapshotCallback) {
        let mut inner = self.lock();
        inner.subscribers.push(Subscriber {
            exchanges,
            callback,
        });
    }

    /// Feed one quote in. Intended to be called from an adapter's stream
    /// callback.
    pub fn publish(&self, quote: Quote) {
        if !quote.is_coherent() {
            debug!(
                exchange = %quote.exchange,
                symbol = %quote.symbol,
                "dropping incoherent quote"
            );
            return;
        }

        let (snapshot, callbacks) = {
            let mut inner = self.lock();
            inner
                .latest
                .insert(quote.exchange.clone(), (quote.clone(), Instant::now()));

            let latest: HashMap<String, Quote> = inner
                .latest
                .iter()
                .map(|(exchange, (q, _))| (exchange.clone(), q.clone()))
                .collect();

            let callbacks: Vec<SnapshotCallback> = inner
                .subscribers
                .iter()
                .filter(|sub| sub.exchanges.iter().any(|e| e == &quote.exchange))
                .map(|sub| sub.callback.clone())
                .collect();

            (
                QuoteSnapshot {
                    source_quote: quote,
                    latest,
                },
                callbacks,
            )
        };

        for callback in callbacks {
            callback(snapshot.clone());
        }
    }

    pub fn get_latest_quote(&self, exchange: &str) -> Option<Quote> {
        self.lock().latest.get(exchange).map(|(q, _)| q.clone())
    }

    pub fn get_latest_snapshot(&self) -> HashMap<String, Quote> {
        self.lock()
            .latest
            .iter()
            .map(|(exchange, (q, _))| (exchange.clone(), q.clone()))
            .collect()
    }

    /// When the last quote for `exchange` was received, for staleness checks.
    pub fn last_update_at(&self, exchange: &str) -> Option<Instant> {
        self.lock().latest.get(exchange).map(|(_, at)| *at)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MarketDataHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn quote(exchange: &str, mark: &str) -> Quote {
        let mark = Decimal::from_str(mark).unwrap();
        Quote {
            exchange: exchange.to_string(),
            symbol: "BTC-PERP".to_string(),
            bid: mark - Decimal::ONE,
            ask: mark + Decimal::ONE,
            mark,
            ts_ms: 0,
        }
    }

    #[test]
    fn hub_caches_latest_quote_per_exchange() {
        let hub = MarketDataHub::new();
        hub.publish(quote("sim", "100"));
        hub.publish(quote("sim", "105"));
        hub.publish(quote("other", "50"));

        assert_eq!(hub.get_latest_quote("sim").unwrap().mark, Decimal::from(105));
        assert_eq!(hub.get_latest_snapshot().len(), 2);
    }

    #[test]
    fn hub_filters_dispatch_by_exchange_but_caches_first() {
        let hub = MarketDataHub::new();
        let received: Arc<Mutex<Vec<QuoteSnapshot>>> = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        hub.subscribe(
            vec!["sim".to_string()],
            Arc::new(move |snap| received_clone.lock().unwrap().push(snap)),
        );

        hub.publish(quote("other", "50"));
        assert!(received.lock().unwrap().is_empty());
        // The foreign quote was cached anyway.
        assert!(hub.get_latest_quote("other").is_some());

        hub.publish(quote("sim", "100"));
        let snapshots = received.lock().unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].source_quote.exchange, "sim");
        assert_eq!(snapshots[0].latest.len(), 2);
    }

    #[test]
    fn hub_drops_incoherent_quotes() {
        let hub = MarketDataHub::new();
        let mut crossed = quote("sim", "100");
        crossed.bid = crossed.ask + Decimal::ONE;
        hub.publish(crossed);

        let mut zero_mark = quote("sim", "100");
        zero_mark.mark = Decimal::ZERO;
        hub.publish(zero_mark);

        assert!(hub.get_latest_quote("sim").is_none());
    }
}
