//! Indicator-only trend signal per timeframe, and agreement across them.

use scanner_core::{AnalysisConfig, OhlcvSeries, Timeframe};
use scanner_indicators::{IndicatorEngine, TechnicalIndicatorSet, TrendDirection};
use serde::{Deserialize, Serialize};

const SUPERTREND_WEIGHT: i32 = 40;
const RSI_EXTREME_WEIGHT: i32 = 30;
const RSI_LEAN_WEIGHT: i32 = 10;
const MACD_WEIGHT: i32 = 30;
const EMA_WEIGHT: i32 = 10;
const RSI_LEAN_LOW: f64 = 45.0;
const RSI_LEAN_HIGH: f64 = 55.0;
const SIGNAL_THRESHOLD: i32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorSignal {
    Bullish,
    Bearish,
    Neutral,
    Tbd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallSignal {
    StrongBullish,
    Bullish,
    Neutral,
    Bearish,
    StrongBearish,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeSignal {
    pub timeframe: Timeframe,
    pub signal: IndicatorSignal,
    pub score: i32,
    pub reasons: Vec<String>,
    pub indicators: TechnicalIndicatorSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiTimeframeSignal {
    pub instrument_id: String,
    pub timeframes: Vec<TimeframeSignal>,
    pub bullish_count: usize,
    pub bearish_count: usize,
    pub neutral_count: usize,
    pub score: i32,
    pub overall: OverallSignal,
}

/// Weighted vote of Supertrend, RSI, MACD and the EMA 9/21 cross.
pub fn indicator_signal(
    indicators: &TechnicalIndicatorSet,
    config: &AnalysisConfig,
) -> (IndicatorSignal, i32, Vec<String>) {
    if indicators.is_insufficient() {
        return (
            IndicatorSignal::Tbd,
            0,
            vec!["Insufficient data for analysis".to_string()],
        );
    }

    let mut score = 0;
    let mut reasons = Vec::new();

    match indicators.supertrend_direction() {
        Some(TrendDirection::Bullish) => {
            score += SUPERTREND_WEIGHT;
            reasons.push("Supertrend bullish".to_string());
        }
        Some(TrendDirection::Bearish) => {
            score -= SUPERTREND_WEIGHT;
            reasons.push("Supertrend bearish".to_string());
        }
        None => {}
    }

    if let Some(rsi) = indicators.rsi_14 {
        if rsi < config.rsi_oversold {
            score += RSI_EXTREME_WEIGHT;
            reasons.push(format!("RSI oversold ({rsi:.1})"));
        } else if rsi > config.rsi_overbought {
            score -= RSI_EXTREME_WEIGHT;
            reasons.push(format!("RSI overbought ({rsi:.1})"));
        } else if rsi < RSI_LEAN_LOW {
            score += RSI_LEAN_WEIGHT;
        } else if rsi > RSI_LEAN_HIGH {
            score -= RSI_LEAN_WEIGHT;
        }
    }

    if let Some(macd) = indicators.macd {
        if macd.line > macd.signal {
            score += MACD_WEIGHT;
            reasons.push("MACD bullish crossover".to_string());
        } else {
            score -= MACD_WEIGHT;
            reasons.push("MACD bearish crossover".to_string());
        }
    }

    if let (Some(fast), Some(slow)) = (indicators.ema_9, indicators.ema_21) {
        if fast > slow {
            score += EMA_WEIGHT;
            reasons.push("EMA 9 > 21 (uptrend)".to_string());
        } else {
            score -= EMA_WEIGHT;
            reasons.push("EMA 9 < 21 (downtrend)".to_string());
        }
    }

    let signal = if score >= SIGNAL_THRESHOLD {
        IndicatorSignal::Bullish
    } else if score <= -SIGNAL_THRESHOLD {
        IndicatorSignal::Bearish
    } else {
        IndicatorSignal::Neutral
    };

    (signal, score, reasons)
}

/// Evaluates each series and combines the per-timeframe signals.
pub fn multi_timeframe(
    instrument_id: &str,
    series: &[OhlcvSeries],
    engine: &IndicatorEngine,
    config: &AnalysisConfig,
) -> MultiTimeframeSignal {
    let timeframes = series
        .iter()
        .map(|s| {
            let indicators = engine.compute(s);
            let (signal, score, reasons) = indicator_signal(&indicators, config);
            TimeframeSignal {
                timeframe: s.timeframe,
                signal,
                score,
                reasons,
                indicators,
            }
        })
        .collect();

    combine(instrument_id, timeframes)
}

pub fn combine(instrument_id: &str, timeframes: Vec<TimeframeSignal>) -> MultiTimeframeSignal {
    let mut bullish = 0;
    let mut bearish = 0;
    let mut neutral = 0;
    let mut score = 0;

    for tf in &timeframes {
        match tf.signal {
            IndicatorSignal::Bullish => {
                bullish += 1;
                score += tf.score;
            }
            IndicatorSignal::Bearish => {
                bearish += 1;
                score -= tf.score.abs();
            }
            IndicatorSignal::Neutral | IndicatorSignal::Tbd => neutral += 1,
        }
    }

    let overall = if bullish >= 3 {
        OverallSignal::StrongBullish
    } else if bullish >= 2 && bearish == 0 {
        OverallSignal::Bullish
    } else if bearish >= 3 {
        OverallSignal::StrongBearish
    } else if bearish >= 2 && bullish == 0 {
        OverallSignal::Bearish
    } else {
        OverallSignal::Neutral
    };

    MultiTimeframeSignal {
        instrument_id: instrument_id.to_string(),
        timeframes,
        bullish_count: bullish,
        bearish_count: bearish,
        neutral_count: neutral,
        score,
        overall,
    }
}
