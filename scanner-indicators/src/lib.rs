pub mod engine;
pub mod metrics;

pub use engine::IndicatorEngine;
pub use metrics::{BollingerBands, Macd, Supertrend, TrendDirection};

use serde::{Deserialize, Serialize};

/// Indicator values for one series. Each field is `None` until its own
/// history requirement is met.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalIndicatorSet {
    pub rsi_14: Option<f64>,
    pub macd: Option<Macd>,
    pub ema_9: Option<f64>,
    pub ema_12: Option<f64>,
    pub ema_21: Option<f64>,
    pub ema_26: Option<f64>,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub bollinger: Option<BollingerBands>,
    pub atr_14: Option<f64>,
    pub supertrend: Option<Supertrend>,
    pub volume_sma_20: Option<f64>,
    pub candle_count: usize,
}

impl TechnicalIndicatorSet {
    pub fn unavailable(candle_count: usize) -> Self {
        Self {
            candle_count,
            ..Self::default()
        }
    }

    pub fn supertrend_direction(&self) -> Option<TrendDirection> {
        self.supertrend.map(|st| st.direction)
    }

    /// True when none of the primary trend indicators could be computed.
    pub fn is_insufficient(&self) -> bool {
        self.supertrend.is_none() && self.rsi_14.is_none() && self.macd.is_none()
    }
}
