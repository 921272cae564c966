use scanner_core::AnalysisConfig;
use serde::{Deserialize, Serialize};

use crate::{Direction, SetupType};

pub const MIN_LEVERAGE: u32 = 1;
pub const MAX_LEVERAGE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskParameters {
    pub entry: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub risk_pct: Option<f64>,
    pub reward_pct: Option<f64>,
    pub risk_reward_ratio: Option<f64>,
    pub leverage: u32,
    pub risk_tier: RiskTier,
}

impl RiskParameters {
    pub fn none(entry: f64) -> Self {
        Self {
            entry,
            stop_loss: None,
            take_profit: None,
            risk_pct: None,
            reward_pct: None,
            risk_reward_ratio: None,
            leverage: MIN_LEVERAGE,
            risk_tier: RiskTier::Unknown,
        }
    }
}

/// Places stops beyond the nearest level, or at an ATR multiple when the
/// level on the stop side is unknown.
#[derive(Debug, Clone)]
pub struct RiskEngine {
    config: AnalysisConfig,
}

impl RiskEngine {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn compute(
        &self,
        price: f64,
        support: Option<f64>,
        resistance: Option<f64>,
        setup_type: Option<SetupType>,
        atr: Option<f64>,
    ) -> RiskParameters {
        let mut result = RiskParameters::none(price);
        let Some(direction) = setup_type.map(|s| s.direction()) else {
            return result;
        };
        if !price.is_finite() || price <= 0.0 {
            return result;
        }

        let buffer = self.config.level_buffer_pct / 100.0;
        let fallback_rr = self.config.fallback_risk_reward;

        let levels = match direction {
            Direction::Long => support.map(|support| {
                let stop = support * (1.0 - buffer);
                let risk_pct = (price - stop) / price * 100.0;
                let target = match resistance {
                    Some(resistance) => resistance * (1.0 - buffer),
                    None => price * (1.0 + risk_pct * fallback_rr / 100.0),
                };
                (stop, target, risk_pct, (target - price) / price * 100.0)
            }),
            Direction::Short => resistance.map(|resistance| {
                let stop = resistance * (1.0 + buffer);
                let risk_pct = (stop - price) / price * 100.0;
                let target = match support {
                    Some(support) => support * (1.0 + buffer),
                    None => price * (1.0 - risk_pct * fallback_rr / 100.0),
                };
                (stop, target, risk_pct, (price - target) / price * 100.0)
            }),
        };

        let levels = levels.or_else(|| {
            let atr = atr.filter(|a| a.is_finite() && *a > 0.0)?;
            let distance = atr * self.config.atr_stop_multiplier;
            let (stop, target) = match direction {
                Direction::Long => (price - distance, price + distance * fallback_rr),
                Direction::Short => (price + distance, price - distance * fallback_rr),
            };
            Some((
                stop,
                target,
                distance / price * 100.0,
                distance * fallback_rr / price * 100.0,
            ))
        });

        let Some((stop, target, risk_pct, reward_pct)) = levels else {
            return result;
        };

        result.stop_loss = Some(stop);
        result.take_profit = Some(target);
        result.risk_pct = Some(risk_pct);
        result.reward_pct = Some(reward_pct);
        if risk_pct > 0.0 {
            result.risk_reward_ratio = Some(reward_pct / risk_pct);
        }

        let (tier, leverage) = tier_for(risk_pct);
        result.risk_tier = tier;
        result.leverage = leverage.clamp(MIN_LEVERAGE, MAX_LEVERAGE);
        result
    }
}

fn tier_for(risk_pct: f64) -> (RiskTier, u32) {
    if risk_pct.is_nan() || risk_pct <= 0.0 {
        return (RiskTier::Unknown, MIN_LEVERAGE);
    }
    if risk_pct < 2.0 {
        (RiskTier::Low, ((5.0 / risk_pct).floor() as u32).min(10))
    } else if risk_pct < 5.0 {
        (RiskTier::Medium, ((3.0 / risk_pct).floor() as u32).min(5))
    } else {
        (RiskTier::High, 2)
    }
}
