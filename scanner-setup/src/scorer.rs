use serde::{Deserialize, Serialize};

use crate::confluence::ConfluenceAssessment;
use crate::price_action::{PriceActionAssessment, TrendStrength};
use crate::risk::RiskParameters;
use crate::{Direction, SetupQuality, TradingSignal};

pub const NOT_ACTIONABLE_SCORE: f64 = 30.0;
pub const NO_CONFLUENCE_SCORE: f64 = 45.0;
pub const WEAK_RISK_REWARD_SCORE: f64 = 50.0;
const BASE_SCORE: f64 = 50.0;

/// The stage at which scoring stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreGate {
    NotActionable,
    NoConfluence,
    RiskRewardTooLow,
    Scored,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreOutcome {
    pub score: f64,
    pub signal: TradingSignal,
    pub quality: SetupQuality,
    pub gate: ScoreGate,
}

impl ScoreOutcome {
    fn gated(gate: ScoreGate, quality: SetupQuality, score: f64) -> Self {
        Self {
            score,
            signal: TradingSignal::Neutral,
            quality,
            gate,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SetupScorer {
    min_risk_reward: f64,
}

impl Default for SetupScorer {
    fn default() -> Self {
        Self::new(1.5)
    }
}

impl SetupScorer {
    pub fn new(min_risk_reward: f64) -> Self {
        Self { min_risk_reward }
    }

    pub fn score(
        &self,
        price_action: &PriceActionAssessment,
        confluence: &ConfluenceAssessment,
        risk: &RiskParameters,
    ) -> ScoreOutcome {
        let direction = match price_action.setup_type {
            Some(setup) if price_action.is_actionable => setup.direction(),
            _ => {
                return ScoreOutcome::gated(
                    ScoreGate::NotActionable,
                    SetupQuality::Poor,
                    NOT_ACTIONABLE_SCORE,
                )
            }
        };

        if !confluence.has_confluence {
            return ScoreOutcome::gated(
                ScoreGate::NoConfluence,
                SetupQuality::Average,
                NO_CONFLUENCE_SCORE,
            );
        }

        let rr = match risk.risk_reward_ratio {
            Some(rr) if rr >= self.min_risk_reward => rr,
            _ => {
                return ScoreOutcome::gated(
                    ScoreGate::RiskRewardTooLow,
                    SetupQuality::Average,
                    WEAK_RISK_REWARD_SCORE,
                )
            }
        };

        let mut score = BASE_SCORE;
        score += match price_action.trend_strength {
            TrendStrength::Strong => 15.0,
            TrendStrength::Moderate => 10.0,
            TrendStrength::Weak | TrendStrength::Tbd => 0.0,
        };
        if price_action.is_at_level() {
            score += 15.0;
        }
        score += 10.0 * confluence.confluence_count as f64;
        score += if rr >= 3.0 {
            20.0
        } else if rr >= 2.0 {
            15.0
        } else {
            10.0
        };
        score -= 5.0 * confluence.conflict_count() as f64;
        let score = score.clamp(0.0, 100.0);

        let (signal, quality) = grade(score, direction);
        ScoreOutcome {
            score,
            signal,
            quality,
            gate: ScoreGate::Scored,
        }
    }
}

fn grade(score: f64, direction: Direction) -> (TradingSignal, SetupQuality) {
    let long = direction == Direction::Long;
    if score >= 75.0 {
        let signal = if long {
            TradingSignal::StrongBuy
        } else {
            TradingSignal::StrongSell
        };
        (signal, SetupQuality::Excellent)
    } else if score >= 65.0 {
        let signal = if long { TradingSignal::Buy } else { TradingSignal::Sell };
        (signal, SetupQuality::Good)
    } else if score >= 55.0 {
        let signal = if long { TradingSignal::Buy } else { TradingSignal::Sell };
        (signal, SetupQuality::Average)
    } else {
        (TradingSignal::Neutral, SetupQuality::Poor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confluence::Verdict;
    use crate::price_action::{Momentum, PricePosition, Trend};
    use crate::risk::RiskTier;
    use crate::SetupType;

    fn price_action(setup: Option<SetupType>, strength: TrendStrength, position: PricePosition) -> PriceActionAssessment {
        PriceActionAssessment {
            trend: Trend::Sideways,
            trend_strength: strength,
            price_position: position,
            momentum: Momentum::Neutral,
            setup_type: setup,
            is_actionable: setup.is_some(),
            ..PriceActionAssessment::tbd()
        }
    }

    fn confluence(count: usize, conflicts: usize) -> ConfluenceAssessment {
        ConfluenceAssessment {
            rsi: Verdict::Neutral,
            macd: Verdict::Neutral,
            volume: Verdict::Neutral,
            confluence_count: count,
            has_confluence: count >= 2,
            confirming_signals: vec!["confirm".to_string(); count],
            conflicting_signals: vec!["conflict".to_string(); conflicts],
        }
    }

    fn risk(rr: Option<f64>) -> RiskParameters {
        RiskParameters {
            risk_reward_ratio: rr,
            risk_pct: Some(1.0),
            risk_tier: RiskTier::Low,
            ..RiskParameters::none(100.0)
        }
    }

    #[test]
    fn test_gates_in_order() {
        let scorer = SetupScorer::default();

        let outcome = scorer.score(
            &price_action(None, TrendStrength::Weak, PricePosition::MidRange),
            &confluence(3, 0),
            &risk(Some(5.0)),
        );
        assert_eq!((outcome.score, outcome.gate), (30.0, ScoreGate::NotActionable));
        assert_eq!(outcome.quality, SetupQuality::Poor);

        let actionable = price_action(
            Some(SetupType::LongRangeSupport),
            TrendStrength::Weak,
            PricePosition::AtSupport,
        );
        let outcome = scorer.score(&actionable, &confluence(1, 0), &risk(Some(5.0)));
        assert_eq!((outcome.score, outcome.quality), (45.0, SetupQuality::Average));

        let outcome = scorer.score(&actionable, &confluence(2, 0), &risk(Some(1.49)));
        assert_eq!((outcome.score, outcome.gate), (50.0, ScoreGate::RiskRewardTooLow));
        let outcome = scorer.score(&actionable, &confluence(2, 0), &risk(None));
        assert_eq!(outcome.signal, TradingSignal::Neutral);
    }

    #[test]
    fn test_short_setup_grades_as_sell() {
        let scorer = SetupScorer::default();
        let outcome = scorer.score(
            &price_action(
                Some(SetupType::ShortRangeResistance),
                TrendStrength::Weak,
                PricePosition::AtResistance,
            ),
            &confluence(2, 1),
            &risk(Some(1.6)),
        );

        // 50 + 15 + 20 + 10 - 5
        assert_eq!(outcome.score, 90.0);
        assert_eq!(outcome.signal, TradingSignal::StrongSell);
    }

    #[test]
    fn test_grade_bands() {
        assert_eq!(grade(75.0, Direction::Long), (TradingSignal::StrongBuy, SetupQuality::Excellent));
        assert_eq!(grade(70.0, Direction::Short), (TradingSignal::Sell, SetupQuality::Good));
        assert_eq!(grade(55.0, Direction::Long), (TradingSignal::Buy, SetupQuality::Average));
        assert_eq!(grade(54.9, Direction::Short), (TradingSignal::Neutral, SetupQuality::Poor));
    }

    #[test]
    fn test_conflicts_reduce_score() {
        let scorer = SetupScorer::default();
        let actionable = price_action(
            Some(SetupType::LongRangeSupport),
            TrendStrength::Weak,
            PricePosition::MidRange,
        );

        let clean = scorer.score(&actionable, &confluence(2, 0), &risk(Some(1.5)));
        let noisy = scorer.score(&actionable, &confluence(2, 2), &risk(Some(1.5)));

        // 50 + 20 + 10
        assert_eq!(clean.score, 80.0);
        assert_eq!(noisy.score, 70.0);
        assert_eq!(noisy.quality, SetupQuality::Good);
    }
}
