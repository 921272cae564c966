pub mod feed;
pub mod model;
pub mod storage;

pub use model::{Candle, MarketSnapshot, OhlcvSeries, Timeframe, Trade, TradeSide};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScannerError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Market data error for {instrument}: {reason}")]
    MarketData { instrument: String, reason: String },

    #[error("Timed out after {millis}ms while {operation}")]
    Timeout { operation: String, millis: u64 },

    #[error("Invalid trade: {0}")]
    InvalidTrade(String),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ScannerError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Instruments to evaluate; empty means "everything the snapshot provider lists".
    pub instruments: Vec<String>,
    pub analysis: AnalysisConfig,
    pub refresh: RefreshConfig,
}

/// Deployment-tunable thresholds for the setup pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub rsi_long_confirm_below: f64,
    pub rsi_long_conflict_above: f64,
    pub rsi_short_confirm_above: f64,
    pub rsi_short_conflict_below: f64,
    /// Oversold/overbought bands used by the per-timeframe indicator signal.
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub min_volume_24h: f64,
    /// Distance (percent of price) at which price counts as sitting on a level.
    pub level_proximity_pct: f64,
    pub min_risk_reward: f64,
    /// Buffer (percent) placed beyond support/resistance for stops and targets.
    pub level_buffer_pct: f64,
    pub atr_stop_multiplier: f64,
    /// Reward multiple of risk used when no opposing level is known.
    pub fallback_risk_reward: f64,
    pub liquidity_volume_24h: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            rsi_long_confirm_below: 35.0,
            rsi_long_conflict_above: 70.0,
            rsi_short_confirm_above: 65.0,
            rsi_short_conflict_below: 30.0,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            min_volume_24h: 100_000.0,
            level_proximity_pct: 1.5,
            min_risk_reward: 1.5,
            level_buffer_pct: 0.5,
            atr_stop_multiplier: 1.5,
            fallback_risk_reward: 2.0,
            liquidity_volume_24h: 500_000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_secs: u64,
    pub max_concurrent_instruments: usize,
    pub fetch_timeout_ms: u64,
    pub candle_limit: usize,
    pub timeframe: Timeframe,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            max_concurrent_instruments: 8,
            fetch_timeout_ms: 5_000,
            candle_limit: 100,
            timeframe: Timeframe::OneHour,
        }
    }
}
