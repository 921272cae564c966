use dashmap::DashMap;
use scanner_core::feed::{normalize_batch, RawTrade};
use scanner_core::storage::TradeStore;
use scanner_core::{Result, Trade};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::aggregator::{AggregationReport, TradeAggregator};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionReport {
    pub received: usize,
    /// Unreadable records plus records tagged with another instrument.
    pub malformed: usize,
    pub duplicates: usize,
    pub stored: usize,
    pub candles: AggregationReport,
}

/// Stores incoming trades, then folds every stored trade that has not yet
/// reached its candles. A trade contributes to each timeframe exactly once
/// no matter how often the feed replays it or how many attempts it takes.
///
/// Ingestion for one instrument is serialised; different instruments run
/// concurrently.
pub struct IngestionJob {
    trades: Arc<dyn TradeStore>,
    aggregator: TradeAggregator,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl IngestionJob {
    pub fn new(trades: Arc<dyn TradeStore>, aggregator: TradeAggregator) -> Self {
        Self {
            trades,
            aggregator,
            locks: DashMap::new(),
        }
    }

    pub async fn ingest_raw(&self, instrument_id: &str, raw: Vec<RawTrade>) -> Result<IngestionReport> {
        let received = raw.len();
        let trades = normalize_batch(instrument_id, raw);
        let malformed = received - trades.len();

        let mut report = self.ingest_trades(instrument_id, trades).await?;
        report.received = received;
        report.malformed += malformed;
        Ok(report)
    }

    pub async fn ingest_trades(&self, instrument_id: &str, trades: Vec<Trade>) -> Result<IngestionReport> {
        let received = trades.len();
        let (own, foreign): (Vec<Trade>, Vec<Trade>) = trades
            .into_iter()
            .partition(|t| t.instrument_id == instrument_id);
        for trade in &foreign {
            warn!(
                "Dropping trade {} for {}: belongs to {}",
                trade.trade_id, instrument_id, trade.instrument_id
            );
        }
        let own_count = own.len();

        let lock = self
            .locks
            .entry(instrument_id.to_string())
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        let fresh = self.trades.insert_trades(own).await?;
        let candles = self
            .aggregator
            .aggregate_pending(self.trades.as_ref(), instrument_id)
            .await?;

        let report = IngestionReport {
            received,
            malformed: foreign.len(),
            duplicates: own_count - fresh.len(),
            stored: fresh.len(),
            candles,
        };

        info!(
            "Ingested {} for {}: {} new, {} duplicate, {} candles touched",
            received,
            instrument_id,
            report.stored,
            report.duplicates,
            report.candles.total()
        );

        Ok(report)
    }
}
