use chrono::{DateTime, Utc};
use scanner_core::storage::{CandleStore, TradeStore, UpsertOutcome};
use scanner_core::{Candle, Result, Timeframe, Trade};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl AggregationReport {
    /// Candles touched across all timeframes.
    pub fn total(&self) -> usize {
        self.created + self.updated
    }
}

/// Folds trades into one partial candle per bucket of `timeframe`.
/// Trades without a positive finite price are ignored.
pub fn bucket_trades(trades: &[Trade], timeframe: Timeframe) -> Vec<Candle> {
    bucket_with_ids(trades, timeframe)
        .into_iter()
        .map(|(candle, _)| candle)
        .collect()
}

/// Like [`bucket_trades`], also returning the ids folded into each candle.
fn bucket_with_ids(trades: &[Trade], timeframe: Timeframe) -> Vec<(Candle, Vec<u64>)> {
    let mut buckets: BTreeMap<DateTime<Utc>, (Candle, Vec<u64>)> = BTreeMap::new();

    for trade in trades.iter().filter(|t| t.has_valid_price()) {
        let period_start = timeframe.period_start(trade.timestamp);
        let (_, ids) = buckets
            .entry(period_start)
            .and_modify(|(candle, _)| candle.apply_trade(trade))
            .or_insert_with(|| (Candle::from_trade(trade, timeframe), Vec::new()));
        ids.push(trade.trade_id);
    }

    buckets.into_values().collect()
}

/// Rolls stored trades into candles for every configured timeframe.
pub struct TradeAggregator {
    store: Arc<dyn CandleStore>,
    timeframes: Vec<Timeframe>,
}

impl TradeAggregator {
    pub fn new(store: Arc<dyn CandleStore>) -> Self {
        Self::with_timeframes(store, Timeframe::ALL.to_vec())
    }

    pub fn with_timeframes(store: Arc<dyn CandleStore>, timeframes: Vec<Timeframe>) -> Self {
        Self { store, timeframes }
    }

    pub fn timeframes(&self) -> &[Timeframe] {
        &self.timeframes
    }

    /// Trades must already be deduplicated against the trade store; feeding
    /// the same trade twice double-counts its volume.
    pub async fn aggregate(&self, instrument_id: &str, trades: &[Trade]) -> Result<AggregationReport> {
        let mut report = AggregationReport::default();
        let mut valid = Vec::with_capacity(trades.len());

        for trade in trades {
            if trade.instrument_id != instrument_id {
                warn!(
                    "Skipping trade {} for {}: belongs to {}",
                    trade.trade_id, instrument_id, trade.instrument_id
                );
                report.skipped += 1;
            } else if !trade.has_valid_price() {
                warn!(
                    "Skipping trade {} for {}: invalid price {}",
                    trade.trade_id, instrument_id, trade.price
                );
                report.skipped += 1;
            } else {
                valid.push(trade.clone());
            }
        }

        if valid.is_empty() {
            debug!("No valid trades to aggregate for {}", instrument_id);
            return Ok(report);
        }

        for &timeframe in &self.timeframes {
            let (created, updated) = self
                .upsert_buckets(instrument_id, timeframe, &valid, None)
                .await?;
            report.created += created;
            report.updated += updated;
        }

        Ok(report)
    }

    /// Folds every trade the store has not yet counted towards each timeframe.
    /// A bucket's trades are marked only once its upsert succeeds, so after a
    /// failure the next call picks up exactly the trades that were left out.
    pub async fn aggregate_pending(
        &self,
        trades: &dyn TradeStore,
        instrument_id: &str,
    ) -> Result<AggregationReport> {
        let mut report = AggregationReport::default();
        let mut rejected = BTreeSet::new();

        for &timeframe in &self.timeframes {
            let pending = trades.pending_trades(instrument_id, timeframe).await?;
            if pending.is_empty() {
                continue;
            }

            let invalid: Vec<u64> = pending
                .iter()
                .filter(|t| !t.has_valid_price())
                .map(|t| t.trade_id)
                .collect();
            if !invalid.is_empty() {
                for id in &invalid {
                    if rejected.insert(*id) {
                        warn!("Skipping trade {} for {}: invalid price", id, instrument_id);
                    }
                }
                trades.mark_aggregated(instrument_id, timeframe, &invalid).await?;
            }

            let (created, updated) = self
                .upsert_buckets(instrument_id, timeframe, &pending, Some(trades))
                .await?;
            report.created += created;
            report.updated += updated;
        }

        report.skipped = rejected.len();
        Ok(report)
    }

    async fn upsert_buckets(
        &self,
        instrument_id: &str,
        timeframe: Timeframe,
        trades: &[Trade],
        marks: Option<&dyn TradeStore>,
    ) -> Result<(usize, usize)> {
        let mut created = 0;
        let mut updated = 0;
        let mut folded = 0;

        for (candle, ids) in bucket_with_ids(trades, timeframe) {
            match self.store.upsert_candle(candle).await? {
                UpsertOutcome::Inserted => created += 1,
                UpsertOutcome::Updated => updated += 1,
            }
            if let Some(marks) = marks {
                marks.mark_aggregated(instrument_id, timeframe, &ids).await?;
            }
            folded += ids.len();
        }

        if folded > 0 {
            info!(
                "Aggregated {} trades for {} {}: {} created, {} updated",
                folded, instrument_id, timeframe, created, updated
            );
        }
        Ok((created, updated))
    }
}
