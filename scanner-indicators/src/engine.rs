use scanner_core::OhlcvSeries;
use tracing::debug;

use crate::metrics::{
    atr, bollinger, ema, macd, rsi, sma, supertrend, ATR_PERIOD, BOLLINGER_PERIOD,
    BOLLINGER_WIDTH, RSI_PERIOD, SUPERTREND_MULTIPLIER, SUPERTREND_PERIOD,
};
use crate::TechnicalIndicatorSet;

/// Below this many candles nothing is computed at all.
pub const MIN_CANDLES: usize = 10;

#[derive(Debug, Clone, Copy, Default)]
pub struct IndicatorEngine;

impl IndicatorEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn compute(&self, series: &OhlcvSeries) -> TechnicalIndicatorSet {
        let count = series.len();
        if count < MIN_CANDLES {
            debug!(
                "{} {}: {} candles, indicators unavailable",
                series.instrument_id, series.timeframe, count
            );
            return TechnicalIndicatorSet::unavailable(count);
        }

        let closes = series.closes();
        let highs = series.highs();
        let lows = series.lows();
        let volumes = series.volumes();

        TechnicalIndicatorSet {
            rsi_14: rsi(&closes, RSI_PERIOD),
            macd: macd(&closes),
            ema_9: ema(&closes, 9),
            ema_12: ema(&closes, 12),
            ema_21: ema(&closes, 21),
            ema_26: ema(&closes, 26),
            sma_20: sma(&closes, 20),
            sma_50: sma(&closes, 50),
            bollinger: bollinger(&closes, BOLLINGER_PERIOD, BOLLINGER_WIDTH),
            atr_14: atr(&highs, &lows, &closes, ATR_PERIOD),
            supertrend: supertrend(
                &highs,
                &lows,
                &closes,
                SUPERTREND_PERIOD,
                SUPERTREND_MULTIPLIER,
            ),
            volume_sma_20: sma(&volumes, 20),
            candle_count: count,
        }
    }
}
