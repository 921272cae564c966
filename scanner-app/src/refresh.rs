use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::RwLock;
use scanner_core::storage::{CandleStore, MarketSnapshotProvider};
use scanner_core::{MarketSnapshot, OhlcvSeries, RefreshConfig, Result, ScannerError, Timeframe};
use scanner_setup::{MultiTimeframeSignal, SetupAnalyzer, TradingSetup};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::summary::MarketSummary;

/// Instrument id recorded when the instrument list itself could not be fetched.
pub const ALL_INSTRUMENTS: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentFailure {
    pub instrument: String,
    pub reason: String,
}

/// Everything one refresh cycle produced. Replaced wholesale by the next cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupBatch {
    pub cycle_id: Uuid,
    pub generated_at: DateTime<Utc>,
    /// Ranked by score, best first.
    pub setups: Vec<TradingSetup>,
    pub timeframes: Vec<MultiTimeframeSignal>,
    pub summary: MarketSummary,
    pub failures: Vec<InstrumentFailure>,
}

impl SetupBatch {
    pub fn empty() -> Self {
        Self {
            cycle_id: Uuid::nil(),
            generated_at: Utc::now(),
            setups: Vec::new(),
            timeframes: Vec::new(),
            summary: MarketSummary::default(),
            failures: Vec::new(),
        }
    }
}

struct InstrumentResult {
    market: MarketSnapshot,
    setup: TradingSetup,
    timeframes: MultiTimeframeSignal,
}

pub struct RefreshOrchestrator {
    candles: Arc<dyn CandleStore>,
    markets: Arc<dyn MarketSnapshotProvider>,
    analyzer: Arc<SetupAnalyzer>,
    instruments: Vec<String>,
    config: RefreshConfig,
    latest: RwLock<Arc<SetupBatch>>,
}

impl RefreshOrchestrator {
    /// An empty `instruments` list means every instrument the provider lists.
    pub fn new(
        candles: Arc<dyn CandleStore>,
        markets: Arc<dyn MarketSnapshotProvider>,
        analyzer: SetupAnalyzer,
        instruments: Vec<String>,
        config: RefreshConfig,
    ) -> Self {
        Self {
            candles,
            markets,
            analyzer: Arc::new(analyzer),
            instruments,
            config,
            latest: RwLock::new(Arc::new(SetupBatch::empty())),
        }
    }

    /// The most recently published batch.
    pub fn latest(&self) -> Arc<SetupBatch> {
        self.latest.read().clone()
    }

    pub async fn run_cycle(&self) -> Arc<SetupBatch> {
        let cycle_id = Uuid::new_v4();
        let mut failures = Vec::new();

        let instruments = match self.instruments().await {
            Ok(instruments) => instruments,
            Err(e) => {
                error!("Refresh cycle {}: cannot list instruments: {}", cycle_id, e);
                failures.push(InstrumentFailure {
                    instrument: ALL_INSTRUMENTS.to_string(),
                    reason: e.to_string(),
                });
                Vec::new()
            }
        };

        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_instruments.max(1)));
        let mut handles = Vec::with_capacity(instruments.len());

        for instrument in instruments {
            let permits = permits.clone();
            let candles = self.candles.clone();
            let markets = self.markets.clone();
            let analyzer = self.analyzer.clone();
            let config = self.config.clone();
            let id = instrument.clone();

            let handle = tokio::spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| ScannerError::Other(e.to_string()))?;
                evaluate(&id, candles.as_ref(), markets.as_ref(), &analyzer, &config).await
            });
            handles.push((instrument, handle));
        }

        let joined = join_all(
            handles
                .into_iter()
                .map(|(instrument, handle)| async move { (instrument, handle.await) }),
        )
        .await;

        let mut results = Vec::new();
        for (instrument, joined) in joined {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => Err(ScannerError::Other(format!("analysis task failed: {e}"))),
            };

            match outcome {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!("Skipping {} this cycle: {}", instrument, e);
                    failures.push(InstrumentFailure {
                        instrument,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let batch = Arc::new(assemble(cycle_id, results, failures));
        *self.latest.write() = batch.clone();

        info!(
            "Refresh cycle {} published: {} setups, {} failures",
            cycle_id,
            batch.setups.len(),
            batch.failures.len()
        );
        batch
    }

    /// Runs a cycle on every tick until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(Duration::from_secs(self.config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!("Refreshing setups every {}s", self.config.interval_secs);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Refresh loop stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
            }
        }
    }

    async fn instruments(&self) -> Result<Vec<String>> {
        if !self.instruments.is_empty() {
            return Ok(self.instruments.clone());
        }
        with_timeout(
            "listing instruments".to_string(),
            self.config.fetch_timeout_ms,
            self.markets.list_instruments(),
        )
        .await
    }
}

async fn evaluate(
    instrument: &str,
    candles: &dyn CandleStore,
    markets: &dyn MarketSnapshotProvider,
    analyzer: &SetupAnalyzer,
    config: &RefreshConfig,
) -> Result<InstrumentResult> {
    let millis = config.fetch_timeout_ms;

    let market = with_timeout(
        format!("fetching snapshot for {instrument}"),
        millis,
        markets.snapshot(instrument),
    )
    .await?;

    let mut primary: Option<OhlcvSeries> = None;
    let mut all = Vec::with_capacity(Timeframe::ALL.len());
    for timeframe in Timeframe::ALL {
        let series = with_timeout(
            format!("fetching {timeframe} candles for {instrument}"),
            millis,
            candles.get_series(instrument, timeframe, config.candle_limit),
        )
        .await?;
        if timeframe == config.timeframe {
            primary = Some(series.clone());
        }
        all.push(series);
    }

    let primary = primary.unwrap_or_else(|| OhlcvSeries::empty(instrument, config.timeframe));
    let setup = analyzer.analyze(&market, &primary);
    let timeframes = analyzer.multi_timeframe(instrument, &all);

    Ok(InstrumentResult {
        market,
        setup,
        timeframes,
    })
}

async fn with_timeout<T, F>(operation: String, millis: u64, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(Duration::from_millis(millis), fut).await {
        Ok(result) => result,
        Err(_) => Err(ScannerError::Timeout { operation, millis }),
    }
}

fn assemble(
    cycle_id: Uuid,
    results: Vec<InstrumentResult>,
    failures: Vec<InstrumentFailure>,
) -> SetupBatch {
    let mut markets = Vec::with_capacity(results.len());
    let mut setups = Vec::with_capacity(results.len());
    let mut timeframes = Vec::with_capacity(results.len());
    for result in results {
        markets.push(result.market);
        setups.push(result.setup);
        timeframes.push(result.timeframes);
    }

    setups.sort_by(|a, b| {
        b.overall_score
            .total_cmp(&a.overall_score)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    timeframes.sort_by(|a, b| a.instrument_id.cmp(&b.instrument_id));

    let summary = MarketSummary::build(&markets, &setups);

    SetupBatch {
        cycle_id,
        generated_at: Utc::now(),
        setups,
        timeframes,
        summary,
        failures,
    }
}
