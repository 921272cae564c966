use scanner_core::Candle;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Bias, Observation, SetupType};

pub const MIN_CANDLES: usize = 10;
/// Neighbours on each side a swing point must strictly beat.
pub const SWING_RADIUS: usize = 2;
/// Candles whose extreme low/high always count as a level.
pub const RECENT_WINDOW: usize = 10;
pub const TREND_WINDOW: usize = 20;
/// Close-to-close lookback for momentum, counting the latest candle.
pub const MOMENTUM_WINDOW: usize = 5;

const TREND_THRESHOLD_PCT: f64 = 3.0;
const STRONG_TREND_PCT: f64 = 6.0;
const MOMENTUM_THRESHOLD_PCT: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Bullish,
    Bearish,
    Sideways,
    Tbd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendStrength {
    Strong,
    Moderate,
    Weak,
    Tbd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricePosition {
    AtSupport,
    AtResistance,
    MidRange,
    Tbd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Momentum {
    Positive,
    Negative,
    Neutral,
    Tbd,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupportResistance {
    pub nearest_support: Option<f64>,
    pub nearest_resistance: Option<f64>,
    pub distance_to_support_pct: Option<f64>,
    pub distance_to_resistance_pct: Option<f64>,
    pub at_support: bool,
    pub at_resistance: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceActionAssessment {
    pub trend: Trend,
    pub trend_strength: TrendStrength,
    pub trend_change_pct: Option<f64>,
    pub price_position: PricePosition,
    pub momentum: Momentum,
    pub setup_type: Option<SetupType>,
    pub is_actionable: bool,
    pub support: Option<f64>,
    pub resistance: Option<f64>,
    pub distance_to_support_pct: Option<f64>,
    pub distance_to_resistance_pct: Option<f64>,
    pub signals: Vec<Observation>,
}

impl PriceActionAssessment {
    pub fn tbd() -> Self {
        Self {
            trend: Trend::Tbd,
            trend_strength: TrendStrength::Tbd,
            trend_change_pct: None,
            price_position: PricePosition::Tbd,
            momentum: Momentum::Tbd,
            setup_type: None,
            is_actionable: false,
            support: None,
            resistance: None,
            distance_to_support_pct: None,
            distance_to_resistance_pct: None,
            signals: Vec::new(),
        }
    }

    pub fn is_at_level(&self) -> bool {
        matches!(
            self.price_position,
            PricePosition::AtSupport | PricePosition::AtResistance
        )
    }
}

/// Reads trend, levels and momentum straight from candles.
#[derive(Debug, Clone)]
pub struct PriceActionDetector {
    proximity_pct: f64,
}

impl Default for PriceActionDetector {
    fn default() -> Self {
        Self::new(1.5)
    }
}

impl PriceActionDetector {
    pub fn new(proximity_pct: f64) -> Self {
        Self { proximity_pct }
    }

    pub fn assess(&self, candles: &[Candle], price: f64) -> PriceActionAssessment {
        if candles.len() < MIN_CANDLES || !price.is_finite() || price <= 0.0 {
            debug!(
                "Price action unavailable: {} candles, price {}",
                candles.len(),
                price
            );
            return PriceActionAssessment::tbd();
        }

        let levels = self.support_resistance(candles, price);
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

        let (trend, trend_strength, trend_change_pct) = match trend_change(&closes) {
            Some(pct) => {
                let (trend, strength) = classify_trend(pct);
                (trend, strength, Some(pct))
            }
            None => (Trend::Tbd, TrendStrength::Tbd, None),
        };

        let mut signals = Vec::new();
        let price_position = if levels.at_support {
            signals.push(Observation::new(
                Bias::Bullish,
                "Price at support level - potential bounce zone",
            ));
            PricePosition::AtSupport
        } else if levels.at_resistance {
            signals.push(Observation::new(
                Bias::Bearish,
                "Price at resistance level - potential rejection zone",
            ));
            PricePosition::AtResistance
        } else {
            PricePosition::MidRange
        };

        let momentum = momentum(&closes);

        let setup_type = match (trend, price_position) {
            (Trend::Bullish, PricePosition::AtSupport) => Some(SetupType::LongSupportBounce),
            (Trend::Sideways, PricePosition::AtSupport) => Some(SetupType::LongRangeSupport),
            (Trend::Bearish, PricePosition::AtResistance) => {
                Some(SetupType::ShortResistanceRejection)
            }
            (Trend::Sideways, PricePosition::AtResistance) => Some(SetupType::ShortRangeResistance),
            _ => None,
        };

        if let Some(setup) = setup_type {
            let text = match setup {
                SetupType::LongSupportBounce => "SETUP: Long at support in bullish trend",
                SetupType::LongRangeSupport => "SETUP: Long at range support",
                SetupType::ShortResistanceRejection => "SETUP: Short at resistance in bearish trend",
                SetupType::ShortRangeResistance => "SETUP: Short at range resistance",
            };
            signals.push(Observation::new(setup.direction().into(), text));
        }

        PriceActionAssessment {
            trend,
            trend_strength,
            trend_change_pct,
            price_position,
            momentum,
            setup_type,
            is_actionable: setup_type.is_some(),
            support: levels.nearest_support,
            resistance: levels.nearest_resistance,
            distance_to_support_pct: levels.distance_to_support_pct,
            distance_to_resistance_pct: levels.distance_to_resistance_pct,
            signals,
        }
    }

    /// Swing points plus the recent extremes, filtered to the nearest level
    /// on each side of `price`.
    pub fn support_resistance(&self, candles: &[Candle], price: f64) -> SupportResistance {
        let mut result = SupportResistance::default();
        if candles.len() < MIN_CANDLES {
            return result;
        }

        let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();

        let mut supports = swing_points(&lows, |candidate, neighbour| candidate < neighbour);
        let mut resistances = swing_points(&highs, |candidate, neighbour| candidate > neighbour);

        let recent = candles.len().saturating_sub(RECENT_WINDOW);
        supports.extend(lows[recent..].iter().copied().reduce(f64::min));
        resistances.extend(highs[recent..].iter().copied().reduce(f64::max));

        result.nearest_support = supports
            .into_iter()
            .filter(|s| *s < price)
            .reduce(f64::max);
        result.nearest_resistance = resistances
            .into_iter()
            .filter(|r| *r > price)
            .reduce(f64::min);

        if let Some(support) = result.nearest_support {
            let distance = (price - support) / price * 100.0;
            result.distance_to_support_pct = Some(distance);
            result.at_support = distance <= self.proximity_pct;
        }
        if let Some(resistance) = result.nearest_resistance {
            let distance = (resistance - price) / price * 100.0;
            result.distance_to_resistance_pct = Some(distance);
            result.at_resistance = distance <= self.proximity_pct;
        }

        result
    }
}

fn swing_points(values: &[f64], beats: impl Fn(f64, f64) -> bool) -> Vec<f64> {
    if values.len() < 2 * SWING_RADIUS + 1 {
        return Vec::new();
    }

    (SWING_RADIUS..values.len() - SWING_RADIUS)
        .filter(|&i| {
            (1..=SWING_RADIUS)
                .all(|offset| beats(values[i], values[i - offset]) && beats(values[i], values[i + offset]))
        })
        .map(|i| values[i])
        .collect()
}

/// Percent change between the mean of the older and newer halves of the
/// last `TREND_WINDOW` closes.
fn trend_change(closes: &[f64]) -> Option<f64> {
    let window = &closes[closes.len().saturating_sub(TREND_WINDOW)..];
    if window.len() < MIN_CANDLES {
        return None;
    }

    let (older, newer) = window.split_at(window.len() / 2);
    let mean = |xs: &[f64]| xs.iter().sum::<f64>() / xs.len() as f64;
    let older_mean = mean(older);
    if older_mean == 0.0 {
        return None;
    }

    let pct = (mean(newer) - older_mean) / older_mean * 100.0;
    pct.is_finite().then_some(pct)
}

fn classify_trend(pct: f64) -> (Trend, TrendStrength) {
    if pct > TREND_THRESHOLD_PCT {
        let strength = if pct > STRONG_TREND_PCT {
            TrendStrength::Strong
        } else {
            TrendStrength::Moderate
        };
        (Trend::Bullish, strength)
    } else if pct < -TREND_THRESHOLD_PCT {
        let strength = if pct < -STRONG_TREND_PCT {
            TrendStrength::Strong
        } else {
            TrendStrength::Moderate
        };
        (Trend::Bearish, strength)
    } else {
        (Trend::Sideways, TrendStrength::Weak)
    }
}

fn momentum(closes: &[f64]) -> Momentum {
    if closes.len() < MOMENTUM_WINDOW {
        return Momentum::Tbd;
    }

    let base = closes[closes.len() - MOMENTUM_WINDOW];
    let last = closes[closes.len() - 1];
    if base == 0.0 {
        return Momentum::Tbd;
    }

    let change = (last - base) / base * 100.0;
    if change > MOMENTUM_THRESHOLD_PCT {
        Momentum::Positive
    } else if change < -MOMENTUM_THRESHOLD_PCT {
        Momentum::Negative
    } else {
        Momentum::Neutral
    }
}
