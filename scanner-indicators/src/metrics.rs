//! Pure indicator functions over price slices.
//!
//! Every function returns `None` when its window is not yet full or when the
//! result is undefined (0/0, NaN). A value is never padded with zeros.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

pub const RSI_PERIOD: usize = 14;
pub const ATR_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const BOLLINGER_PERIOD: usize = 20;
pub const BOLLINGER_WIDTH: f64 = 2.0;
pub const SUPERTREND_PERIOD: usize = 10;
pub const SUPERTREND_MULTIPLIER: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Macd {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

impl Macd {
    pub fn is_bullish(&self) -> bool {
        self.line > self.signal || self.histogram > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Supertrend {
    pub value: f64,
    pub direction: TrendDirection,
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Mean of the last `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    finite(window.iter().sum::<f64>() / period as f64)
}

/// Full EMA series seeded with the first observation, `alpha = 2/(span+1)`.
/// This is the recursive (non-adjusted) form.
pub fn ema_series(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = None;

    for &value in values {
        let next = match prev {
            None => value,
            Some(p) => alpha * value + (1.0 - alpha) * p,
        };
        out.push(next);
        prev = Some(next);
    }

    out
}

/// Latest EMA, available once `span` values have been seen.
pub fn ema(values: &[f64], span: usize) -> Option<f64> {
    if span == 0 || values.len() < span {
        return None;
    }
    ema_series(values, span).last().copied().and_then(finite)
}

/// RSI using simple rolling means of gains and losses over the last
/// `period` deltas. A window with no losses reads 100; a flat window is
/// undefined.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let window = &closes[closes.len() - period - 1..];
    let (gains, losses) = window
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .fold((0.0, 0.0), |(g, l), delta| {
            if delta > 0.0 {
                (g + delta, l)
            } else {
                (g, l - delta)
            }
        });

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;

    if avg_loss == 0.0 {
        return if avg_gain > 0.0 { Some(100.0) } else { None };
    }

    finite(100.0 - 100.0 / (1.0 + avg_gain / avg_loss))
}

pub fn macd(closes: &[f64]) -> Option<Macd> {
    if closes.len() < MACD_SLOW + MACD_SIGNAL {
        return None;
    }

    let fast = ema_series(closes, MACD_FAST);
    let slow = ema_series(closes, MACD_SLOW);
    let line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
    let signal = ema_series(&line, MACD_SIGNAL);

    let line = finite(*line.last()?)?;
    let signal = finite(*signal.last()?)?;
    Some(Macd {
        line,
        signal,
        histogram: line - signal,
    })
}

/// Bands at `width` sample standard deviations around the SMA.
pub fn bollinger(closes: &[f64], period: usize, width: f64) -> Option<BollingerBands> {
    if period < 2 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let middle = finite(window.iter().copied().mean())?;
    let std_dev = finite(window.iter().copied().std_dev())?;

    Some(BollingerBands {
        upper: middle + width * std_dev,
        middle,
        lower: middle - width * std_dev,
    })
}

/// True range per candle. The first candle has no previous close and uses
/// its high-low range.
pub fn true_ranges(highs: &[f64], lows: &[f64], closes: &[f64]) -> Vec<f64> {
    let len = highs.len().min(lows.len()).min(closes.len());
    (0..len)
        .map(|i| {
            let range = highs[i] - lows[i];
            if i == 0 {
                return range;
            }
            let prev_close = closes[i - 1];
            range
                .max((highs[i] - prev_close).abs())
                .max((lows[i] - prev_close).abs())
        })
        .collect()
}

pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period + 1 {
        return None;
    }
    sma(&true_ranges(highs, lows, closes), period)
}

/// ATR-banded trend follower.
///
/// Starts at index `period` on the upper band, bearish. The direction flips
/// when the close crosses the previous line. While the direction holds, the
/// line only moves toward price: up for bullish, down for bearish.
pub fn supertrend(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    period: usize,
    multiplier: f64,
) -> Option<Supertrend> {
    let len = highs.len().min(lows.len()).min(closes.len());
    if period == 0 || len < period + 1 {
        return None;
    }

    let tr = true_ranges(highs, lows, closes);
    let band = |i: usize| -> Option<(f64, f64)> {
        let atr = tr[i + 1 - period..=i].iter().sum::<f64>() / period as f64;
        let hl2 = (highs[i] + lows[i]) / 2.0;
        Some((finite(hl2 + multiplier * atr)?, finite(hl2 - multiplier * atr)?))
    };

    let (upper, _) = band(period)?;
    let mut line = upper;
    let mut direction = TrendDirection::Bearish;

    for i in period + 1..len {
        let (upper, lower) = band(i)?;
        let close = closes[i];

        match direction {
            TrendDirection::Bullish if close < line => {
                direction = TrendDirection::Bearish;
                line = upper;
            }
            TrendDirection::Bullish => line = line.max(lower),
            TrendDirection::Bearish if close > line => {
                direction = TrendDirection::Bullish;
                line = lower;
            }
            TrendDirection::Bearish => line = line.min(upper),
        }
    }

    Some(Supertrend {
        value: line,
        direction,
    })
}
