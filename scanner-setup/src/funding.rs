use serde::{Deserialize, Serialize};

use crate::Direction;

const HOURS_PER_YEAR: f64 = 24.0 * 365.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateTrend {
    Favorable,
    Unfavorable,
    Neutral,
}

/// Cost of carry for the setup's direction. Positive funding means longs
/// pay shorts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FundingAnalysis {
    /// Hourly rate as a fraction.
    pub current_rate: f64,
    pub annual_rate_pct: f64,
    pub rate_trend: RateTrend,
    pub is_favorable_long: bool,
    pub is_favorable_short: bool,
}

impl FundingAnalysis {
    pub fn analyze(current_rate: f64, direction: Option<Direction>) -> Self {
        let is_favorable_long = current_rate <= 0.0;
        let is_favorable_short = current_rate >= 0.0;

        let rate_trend = match direction {
            Some(Direction::Long) if is_favorable_long => RateTrend::Favorable,
            Some(Direction::Short) if is_favorable_short => RateTrend::Favorable,
            Some(_) => RateTrend::Unfavorable,
            None => RateTrend::Neutral,
        };

        Self {
            current_rate,
            annual_rate_pct: current_rate * HOURS_PER_YEAR * 100.0,
            rate_trend,
            is_favorable_long,
            is_favorable_short,
        }
    }

    /// Hourly rate in percent, for display.
    pub fn hourly_pct(&self) -> f64 {
        self.current_rate * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_rate_favours_shorts() {
        let funding = FundingAnalysis::analyze(0.0001, Some(Direction::Short));
        assert_eq!(funding.rate_trend, RateTrend::Favorable);
        assert!(!funding.is_favorable_long);
        assert!((funding.annual_rate_pct - 87.6).abs() < 1e-9);

        let long = FundingAnalysis::analyze(0.0001, Some(Direction::Long));
        assert_eq!(long.rate_trend, RateTrend::Unfavorable);
    }

    #[test]
    fn test_zero_rate_favours_both() {
        let funding = FundingAnalysis::analyze(0.0, None);
        assert!(funding.is_favorable_long);
        assert!(funding.is_favorable_short);
        assert_eq!(funding.rate_trend, RateTrend::Neutral);
    }
}
