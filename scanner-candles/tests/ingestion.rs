use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use scanner_candles::{IngestionJob, TradeAggregator};
use scanner_core::feed::RawTrade;
use scanner_core::storage::{CandleStore, InMemoryStore, TradeStore, UpsertOutcome};
use scanner_core::{Candle, OhlcvSeries, Result, ScannerError, Timeframe, Trade, TradeSide};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn job(store: &Arc<InMemoryStore>) -> IngestionJob {
    IngestionJob::new(store.clone(), TradeAggregator::new(store.clone()))
}

fn trades(instrument: &str, count: u64) -> Vec<Trade> {
    let start = Utc.with_ymd_and_hms(2024, 2, 10, 0, 0, 0).unwrap();
    (0..count)
        .map(|i| Trade {
            trade_id: i + 1,
            instrument_id: instrument.to_string(),
            price: 100.0 + (i % 7) as f64 - 3.0,
            base_qty: 0.5,
            quote_qty: Decimal::from(50),
            side: if i % 2 == 0 { TradeSide::Buy } else { TradeSide::Sell },
            timestamp: start + Duration::minutes((i * 37) as i64),
        })
        .collect()
}

#[tokio::test]
async fn replaying_a_batch_leaves_candles_unchanged() {
    let store = Arc::new(InMemoryStore::new());
    let job = job(&store);
    let batch = trades("BTC-PERP", 60);

    let first = job.ingest_trades("BTC-PERP", batch.clone()).await.unwrap();
    let before = store.get_series("BTC-PERP", Timeframe::OneHour, 100).await.unwrap();

    let second = job.ingest_trades("BTC-PERP", batch).await.unwrap();
    let after = store.get_series("BTC-PERP", Timeframe::OneHour, 100).await.unwrap();

    assert_eq!(first.stored, 60);
    assert_eq!(second.stored, 0);
    assert_eq!(second.duplicates, 60);
    assert_eq!(second.candles.total(), 0);
    assert_eq!(before, after);
}

#[tokio::test]
async fn arrival_order_does_not_change_candles() {
    let ordered_store = Arc::new(InMemoryStore::new());
    let shuffled_store = Arc::new(InMemoryStore::new());
    let batch = trades("ETH-PERP", 40);

    job(&ordered_store)
        .ingest_trades("ETH-PERP", batch.clone())
        .await
        .unwrap();

    // Deliver in reverse, split across several batches
    let mut reversed = batch;
    reversed.reverse();
    let shuffled_job = job(&shuffled_store);
    for chunk in reversed.chunks(7) {
        shuffled_job
            .ingest_trades("ETH-PERP", chunk.to_vec())
            .await
            .unwrap();
    }

    for timeframe in Timeframe::ALL {
        let expected = ordered_store.get_series("ETH-PERP", timeframe, 100).await.unwrap();
        let actual = shuffled_store.get_series("ETH-PERP", timeframe, 100).await.unwrap();
        assert_eq!(expected.len(), actual.len());
        for (e, a) in expected.candles().iter().zip(actual.candles()) {
            assert_eq!(e.period_start, a.period_start);
            assert_eq!(e.open, a.open);
            assert_eq!(e.close, a.close);
            assert_eq!(e.high, a.high);
            assert_eq!(e.low, a.low);
            assert_eq!(e.trade_count, a.trade_count);
            assert_eq!(e.volume, a.volume);
            assert!(a.is_consistent());
        }
    }
}

#[tokio::test]
async fn raw_feed_with_bad_records_is_partially_ingested() {
    let store = Arc::new(InMemoryStore::new());
    let raw: Vec<RawTrade> = serde_json::from_str(
        r#"[
            {"trade_id": 1, "price": "64000", "base_filled": "0.01", "quote_filled": "640", "timestamp": 1717236000},
            {"trade_id": 2, "price": "-1", "base_filled": "0.01", "quote_filled": "640", "timestamp": 1717236060},
            {"price": "64000", "timestamp": 1717236120},
            {"trade_id": 1, "price": "64000", "base_filled": "0.01", "quote_filled": "640", "timestamp": 1717236000}
        ]"#,
    )
    .unwrap();

    let report = job(&store).ingest_raw("BTC-PERP", raw).await.unwrap();

    assert_eq!(report.received, 4);
    assert_eq!(report.malformed, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.stored, 2);
    assert_eq!(report.candles.skipped, 1);
    assert_eq!(report.candles.created, 4);
    assert_eq!(store.candle_count("BTC-PERP", Timeframe::OneDay), 1);
}

#[tokio::test]
async fn instruments_ingest_concurrently() {
    let store = Arc::new(InMemoryStore::new());
    let job = Arc::new(job(&store));

    let handles = ["BTC-PERP", "ETH-PERP", "SOL-PERP"].map(|symbol| {
        let job = job.clone();
        tokio::spawn(async move { job.ingest_trades(symbol, trades(symbol, 30)).await })
    });

    for result in futures::future::join_all(handles).await {
        assert_eq!(result.unwrap().unwrap().stored, 30);
    }
    for symbol in ["BTC-PERP", "ETH-PERP", "SOL-PERP"] {
        assert!(store.candle_count(symbol, Timeframe::OneHour) > 0);
    }
}

/// Candle store that rejects the upserts whose call index is listed.
struct FailingCandles {
    inner: Arc<InMemoryStore>,
    calls: AtomicUsize,
    fail_on: Vec<usize>,
}

impl FailingCandles {
    fn new(inner: Arc<InMemoryStore>, fail_on: Vec<usize>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            fail_on,
        }
    }
}

#[async_trait]
impl CandleStore for FailingCandles {
    async fn upsert_candle(&self, candle: Candle) -> Result<UpsertOutcome> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.contains(&call) {
            return Err(ScannerError::Storage("connection reset".to_string()));
        }
        self.inner.upsert_candle(candle).await
    }

    async fn get_candle(
        &self,
        instrument_id: &str,
        timeframe: Timeframe,
        period_start: DateTime<Utc>,
    ) -> Result<Option<Candle>> {
        self.inner.get_candle(instrument_id, timeframe, period_start).await
    }

    async fn get_series(
        &self,
        instrument_id: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<OhlcvSeries> {
        self.inner.get_series(instrument_id, timeframe, limit).await
    }
}

async fn assert_single_trade_candles(store: &InMemoryStore, instrument: &str) {
    for timeframe in Timeframe::ALL {
        let series = store.get_series(instrument, timeframe, 10).await.unwrap();
        assert_eq!(series.len(), 1, "{timeframe}");
        let candle = series.last().unwrap();
        assert_eq!(candle.trade_count, 1, "{timeframe}");
        assert_eq!(candle.volume, Decimal::from(50), "{timeframe}");
    }
}

#[tokio::test]
async fn failed_upsert_is_retried_on_next_delivery() {
    let store = Arc::new(InMemoryStore::new());
    let candles = Arc::new(FailingCandles::new(store.clone(), vec![0]));
    let job = IngestionJob::new(store.clone(), TradeAggregator::new(candles));
    let batch = trades("BTC-PERP", 1);

    assert!(job.ingest_trades("BTC-PERP", batch.clone()).await.is_err());
    assert_eq!(store.trade_count("BTC-PERP").await.unwrap(), 1);
    assert_eq!(store.candle_count("BTC-PERP", Timeframe::OneHour), 0);

    let retry = job.ingest_trades("BTC-PERP", batch).await.unwrap();

    assert_eq!(retry.stored, 0);
    assert_eq!(retry.duplicates, 1);
    assert_eq!(retry.candles.created, 4);
    assert_single_trade_candles(&store, "BTC-PERP").await;
}

#[tokio::test]
async fn partial_failure_does_not_double_count() {
    let store = Arc::new(InMemoryStore::new());
    // 1h and 4h go through, 12h fails
    let candles = Arc::new(FailingCandles::new(store.clone(), vec![2]));
    let job = IngestionJob::new(store.clone(), TradeAggregator::new(candles));
    let batch = trades("BTC-PERP", 1);

    assert!(job.ingest_trades("BTC-PERP", batch.clone()).await.is_err());
    assert_eq!(store.candle_count("BTC-PERP", Timeframe::OneHour), 1);
    assert_eq!(store.candle_count("BTC-PERP", Timeframe::OneDay), 0);

    let retry = job.ingest_trades("BTC-PERP", batch).await.unwrap();

    assert_eq!(retry.candles.created, 2);
    assert_eq!(retry.candles.updated, 0);
    assert_single_trade_candles(&store, "BTC-PERP").await;
}

#[tokio::test]
async fn trades_for_other_instruments_are_not_stored() {
    let store = Arc::new(InMemoryStore::new());
    let job = job(&store);
    let stray = trades("ETH-PERP", 1);
    let mut mixed = trades("BTC-PERP", 3);
    mixed.push(stray[0].clone());

    let first = job.ingest_trades("BTC-PERP", mixed).await.unwrap();

    assert_eq!(first.received, 4);
    assert_eq!(first.malformed, 1);
    assert_eq!(first.stored, 3);
    assert_eq!(store.trade_count("ETH-PERP").await.unwrap(), 0);

    let own_feed = job.ingest_trades("ETH-PERP", stray).await.unwrap();

    assert_eq!(own_feed.stored, 1);
    assert_eq!(own_feed.duplicates, 0);
    assert_single_trade_candles(&store, "ETH-PERP").await;
}
