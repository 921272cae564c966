pub mod analyzer;
pub mod confluence;
pub mod funding;
pub mod price_action;
pub mod risk;
pub mod scorer;
pub mod timeframes;

pub use analyzer::SetupAnalyzer;
pub use confluence::{ConfluenceAssessment, ConfluenceScorer, Verdict};
pub use funding::{FundingAnalysis, RateTrend};
pub use price_action::{
    Momentum, PriceActionAssessment, PriceActionDetector, PricePosition, SupportResistance,
    Trend, TrendStrength,
};
pub use risk::{RiskEngine, RiskParameters, RiskTier};
pub use scorer::{ScoreGate, ScoreOutcome, SetupScorer};
pub use timeframes::{IndicatorSignal, MultiTimeframeSignal, OverallSignal, TimeframeSignal};

use chrono::{DateTime, Utc};
use scanner_core::MarketSnapshot;
use scanner_indicators::TechnicalIndicatorSet;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupType {
    LongSupportBounce,
    LongRangeSupport,
    ShortResistanceRejection,
    ShortRangeResistance,
}

impl SetupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetupType::LongSupportBounce => "long_support_bounce",
            SetupType::LongRangeSupport => "long_range_support",
            SetupType::ShortResistanceRejection => "short_resistance_rejection",
            SetupType::ShortRangeResistance => "short_range_resistance",
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            SetupType::LongSupportBounce | SetupType::LongRangeSupport => Direction::Long,
            SetupType::ShortResistanceRejection | SetupType::ShortRangeResistance => {
                Direction::Short
            }
        }
    }
}

impl fmt::Display for SetupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradingSignal {
    StrongBuy,
    Buy,
    Neutral,
    Sell,
    StrongSell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SetupQuality {
    Excellent,
    Good,
    Average,
    Poor,
}

/// Which side an observation argues for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bias {
    Bullish,
    Bearish,
}

impl From<Direction> for Bias {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Long => Bias::Bullish,
            Direction::Short => Bias::Bearish,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub bias: Bias,
    pub text: String,
}

impl Observation {
    pub fn new(bias: Bias, text: impl Into<String>) -> Self {
        Self {
            bias,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub trend: f64,
    pub momentum: f64,
    pub funding: f64,
    pub liquidity: f64,
    pub volatility: f64,
}

/// Full evaluation of one instrument for one refresh cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingSetup {
    pub id: uuid::Uuid,
    pub symbol: String,
    pub generated_at: DateTime<Utc>,
    pub market: MarketSnapshot,
    pub indicators: TechnicalIndicatorSet,
    pub price_action: PriceActionAssessment,
    pub confluence: ConfluenceAssessment,
    pub funding: FundingAnalysis,
    pub risk: RiskParameters,
    pub overall_score: f64,
    pub signal: TradingSignal,
    pub quality: SetupQuality,
    pub gate: ScoreGate,
    pub components: ComponentScores,
    pub bullish_factors: Vec<String>,
    pub bearish_factors: Vec<String>,
    pub warnings: Vec<String>,
}

impl TradingSetup {
    pub fn direction(&self) -> Option<Direction> {
        self.price_action.setup_type.map(|s| s.direction())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_value(TradingSignal::StrongBuy).unwrap(), json!("STRONG_BUY"));
        assert_eq!(serde_json::to_value(SetupQuality::Excellent).unwrap(), json!("EXCELLENT"));
        assert_eq!(
            serde_json::to_value(SetupType::ShortResistanceRejection).unwrap(),
            json!("short_resistance_rejection")
        );

        for setup_type in [
            SetupType::LongSupportBounce,
            SetupType::LongRangeSupport,
            SetupType::ShortResistanceRejection,
            SetupType::ShortRangeResistance,
        ] {
            assert_eq!(
                serde_json::to_value(setup_type).unwrap(),
                json!(setup_type.as_str())
            );
        }

        let signal: TradingSignal = serde_json::from_str("\"STRONG_SELL\"").unwrap();
        assert_eq!(signal, TradingSignal::StrongSell);
    }
}
