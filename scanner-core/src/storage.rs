use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use crate::model::{Candle, MarketSnapshot, OhlcvSeries, Timeframe, Trade};
use crate::{Result, ScannerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Durable, deduplicating trade storage.
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Stores the batch and returns only the trades that were not already
    /// known for their `(instrument_id, trade_id)` key.
    async fn insert_trades(&self, trades: Vec<Trade>) -> Result<Vec<Trade>>;

    async fn trade_count(&self, instrument_id: &str) -> Result<usize>;

    /// Stored trades not yet folded into a `timeframe` candle, by trade id.
    async fn pending_trades(
        &self,
        instrument_id: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<Trade>>;

    /// Records that the trades now count towards their `timeframe` candles.
    /// Must only be called after the candle upsert succeeded.
    async fn mark_aggregated(
        &self,
        instrument_id: &str,
        timeframe: Timeframe,
        trade_ids: &[u64],
    ) -> Result<()>;
}

/// Candle storage keyed by `(instrument_id, timeframe, period_start)`.
#[async_trait]
pub trait CandleStore: Send + Sync {
    /// Inserts the candle or merges it into the stored candle for its key.
    async fn upsert_candle(&self, candle: Candle) -> Result<UpsertOutcome>;

    async fn get_candle(
        &self,
        instrument_id: &str,
        timeframe: Timeframe,
        period_start: DateTime<Utc>,
    ) -> Result<Option<Candle>>;

    /// The most recent `limit` candles in chronological order.
    async fn get_series(
        &self,
        instrument_id: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<OhlcvSeries>;
}

#[async_trait]
pub trait MarketSnapshotProvider: Send + Sync {
    async fn list_instruments(&self) -> Result<Vec<String>>;

    async fn snapshot(&self, instrument_id: &str) -> Result<MarketSnapshot>;
}

/// Process-local store used by tests and the demo binary.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    trades: DashMap<String, BTreeMap<u64, Trade>>,
    aggregated: DashMap<(String, Timeframe), BTreeSet<u64>>,
    candles: DashMap<(String, Timeframe), BTreeMap<DateTime<Utc>, Candle>>,
    snapshots: DashMap<String, MarketSnapshot>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_snapshot(&self, snapshot: MarketSnapshot) {
        self.snapshots.insert(snapshot.symbol.clone(), snapshot);
    }

    pub fn candle_count(&self, instrument_id: &str, timeframe: Timeframe) -> usize {
        self.candles
            .get(&(instrument_id.to_string(), timeframe))
            .map(|bucket| bucket.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl TradeStore for InMemoryStore {
    async fn insert_trades(&self, trades: Vec<Trade>) -> Result<Vec<Trade>> {
        let mut fresh = Vec::with_capacity(trades.len());

        for trade in trades {
            let mut stored = self.trades.entry(trade.instrument_id.clone()).or_default();
            if let Entry::Vacant(slot) = stored.entry(trade.trade_id) {
                slot.insert(trade.clone());
                fresh.push(trade);
            }
        }

        Ok(fresh)
    }

    async fn trade_count(&self, instrument_id: &str) -> Result<usize> {
        Ok(self
            .trades
            .get(instrument_id)
            .map(|stored| stored.len())
            .unwrap_or(0))
    }

    async fn pending_trades(
        &self,
        instrument_id: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<Trade>> {
        let Some(stored) = self.trades.get(instrument_id) else {
            return Ok(Vec::new());
        };
        let done = self.aggregated.get(&(instrument_id.to_string(), timeframe));

        Ok(stored
            .values()
            .filter(|t| !done.as_ref().is_some_and(|d| d.contains(&t.trade_id)))
            .cloned()
            .collect())
    }

    async fn mark_aggregated(
        &self,
        instrument_id: &str,
        timeframe: Timeframe,
        trade_ids: &[u64],
    ) -> Result<()> {
        self.aggregated
            .entry((instrument_id.to_string(), timeframe))
            .or_default()
            .extend(trade_ids.iter().copied());
        Ok(())
    }
}

#[async_trait]
impl CandleStore for InMemoryStore {
    async fn upsert_candle(&self, candle: Candle) -> Result<UpsertOutcome> {
        if candle.trade_count == 0 {
            return Err(ScannerError::Storage(format!(
                "refusing to store empty candle for {} {}",
                candle.instrument_id, candle.timeframe
            )));
        }

        let key = (candle.instrument_id.clone(), candle.timeframe);
        let mut bucket = self.candles.entry(key).or_default();

        match bucket.entry(candle.period_start) {
            Entry::Occupied(mut existing) => {
                existing.get_mut().merge(&candle);
                Ok(UpsertOutcome::Updated)
            }
            Entry::Vacant(slot) => {
                slot.insert(candle);
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn get_candle(
        &self,
        instrument_id: &str,
        timeframe: Timeframe,
        period_start: DateTime<Utc>,
    ) -> Result<Option<Candle>> {
        Ok(self
            .candles
            .get(&(instrument_id.to_string(), timeframe))
            .and_then(|bucket| bucket.get(&period_start).cloned()))
    }

    async fn get_series(
        &self,
        instrument_id: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<OhlcvSeries> {
        let candles = self
            .candles
            .get(&(instrument_id.to_string(), timeframe))
            .map(|bucket| {
                let skip = bucket.len().saturating_sub(limit);
                bucket.values().skip(skip).cloned().collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Ok(OhlcvSeries::new(instrument_id, timeframe, candles))
    }
}

#[async_trait]
impl MarketSnapshotProvider for InMemoryStore {
    async fn list_instruments(&self) -> Result<Vec<String>> {
        let mut symbols: Vec<String> = self.snapshots.iter().map(|s| s.key().clone()).collect();
        symbols.sort();
        Ok(symbols)
    }

    async fn snapshot(&self, instrument_id: &str) -> Result<MarketSnapshot> {
        self.snapshots
            .get(instrument_id)
            .map(|s| s.value().clone())
            .ok_or_else(|| ScannerError::MarketData {
                instrument: instrument_id.to_string(),
                reason: "no snapshot available".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TradeSide;
    use chrono::{Duration, TimeZone};
    use rust_decimal::prelude::FromPrimitive;
    use rust_decimal::Decimal;

    fn trade(id: u64, hour: i64, price: f64) -> Trade {
        Trade {
            trade_id: id,
            instrument_id: "BTC-PERP".to_string(),
            price,
            base_qty: 1.0,
            quote_qty: Decimal::from_f64(price).unwrap_or_default(),
            side: TradeSide::Buy,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour),
        }
    }

    #[tokio::test]
    async fn test_insert_trades_returns_only_new() {
        let store = InMemoryStore::new();

        let first = store
            .insert_trades(vec![trade(1, 0, 10.0), trade(2, 0, 11.0)])
            .await
            .unwrap();
        let second = store
            .insert_trades(vec![trade(2, 0, 11.0), trade(3, 0, 12.0), trade(3, 0, 12.0)])
            .await
            .unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second.iter().map(|t| t.trade_id).collect::<Vec<_>>(), vec![3]);
        assert_eq!(store.trade_count("BTC-PERP").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_pending_trades_shrink_as_marked() {
        let store = InMemoryStore::new();
        store
            .insert_trades(vec![trade(1, 0, 10.0), trade(2, 0, 11.0), trade(3, 1, 12.0)])
            .await
            .unwrap();

        store
            .mark_aggregated("BTC-PERP", Timeframe::OneHour, &[1, 3])
            .await
            .unwrap();

        let hourly = store.pending_trades("BTC-PERP", Timeframe::OneHour).await.unwrap();
        let daily = store.pending_trades("BTC-PERP", Timeframe::OneDay).await.unwrap();
        assert_eq!(hourly.iter().map(|t| t.trade_id).collect::<Vec<_>>(), vec![2]);
        assert_eq!(daily.len(), 3);
        assert!(store
            .pending_trades("ETH-PERP", Timeframe::OneHour)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_upsert_merges_existing_bucket() {
        let store = InMemoryStore::new();
        let first = Candle::from_trade(&trade(5, 0, 100.0), Timeframe::OneHour);
        let earlier = Candle::from_trade(&trade(4, 0, 95.0), Timeframe::OneHour);

        assert_eq!(store.upsert_candle(first.clone()).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert_candle(earlier).await.unwrap(), UpsertOutcome::Updated);

        let stored = store
            .get_candle("BTC-PERP", Timeframe::OneHour, first.period_start)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.open, 95.0);
        assert_eq!(stored.close, 100.0);
        assert_eq!(stored.trade_count, 2);
    }

    #[tokio::test]
    async fn test_get_series_returns_latest_in_order() {
        let store = InMemoryStore::new();
        for hour in (0..5).rev() {
            let candle = Candle::from_trade(&trade(hour as u64, hour, 100.0 + hour as f64), Timeframe::OneHour);
            store.upsert_candle(candle).await.unwrap();
        }

        let series = store.get_series("BTC-PERP", Timeframe::OneHour, 3).await.unwrap();

        assert_eq!(series.closes(), vec![102.0, 103.0, 104.0]);
        assert!(store
            .get_series("ETH-PERP", Timeframe::OneHour, 3)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_market_data_error() {
        let store = InMemoryStore::new();
        let err = store.snapshot("DOGE-PERP").await.unwrap_err();
        assert!(matches!(err, ScannerError::MarketData { .. }));
    }
}
