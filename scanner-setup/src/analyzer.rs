use chrono::Utc;
use scanner_core::{AnalysisConfig, MarketSnapshot, OhlcvSeries};
use scanner_indicators::{IndicatorEngine, TechnicalIndicatorSet};
use tracing::debug;

use crate::confluence::{ConfluenceAssessment, ConfluenceScorer};
use crate::funding::{FundingAnalysis, RateTrend};
use crate::price_action::{PriceActionAssessment, PriceActionDetector};
use crate::risk::{RiskEngine, RiskParameters};
use crate::scorer::SetupScorer;
use crate::timeframes::{self, MultiTimeframeSignal};
use crate::{Bias, ComponentScores, Direction, TradingSetup};

const HIGH_SCORE: f64 = 70.0;
const LOW_SCORE: f64 = 40.0;
const MID_SCORE: f64 = 50.0;
/// Below this R:R a passing setup still carries a warning.
const COMFORTABLE_RISK_REWARD: f64 = 2.0;

/// Runs price action, confluence, risk and scoring for one instrument.
#[derive(Debug, Clone)]
pub struct SetupAnalyzer {
    config: AnalysisConfig,
    engine: IndicatorEngine,
    detector: PriceActionDetector,
    confluence: ConfluenceScorer,
    risk: RiskEngine,
    scorer: SetupScorer,
}

impl SetupAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            engine: IndicatorEngine::new(),
            detector: PriceActionDetector::new(config.level_proximity_pct),
            confluence: ConfluenceScorer::new(config.clone()),
            risk: RiskEngine::new(config.clone()),
            scorer: SetupScorer::new(config.min_risk_reward),
            config,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn analyze(&self, market: &MarketSnapshot, series: &OhlcvSeries) -> TradingSetup {
        let indicators = self.engine.compute(series);
        self.analyze_with_indicators(market, series, indicators)
    }

    /// Same as [`analyze`](Self::analyze) with precomputed indicators.
    pub fn analyze_with_indicators(
        &self,
        market: &MarketSnapshot,
        series: &OhlcvSeries,
        indicators: TechnicalIndicatorSet,
    ) -> TradingSetup {
        let price = market.last_price;

        let price_action = self.detector.assess(series.candles(), price);
        let confluence = self
            .confluence
            .evaluate(price_action.setup_type, &indicators, market);
        let direction = price_action.setup_type.map(|s| s.direction());
        let funding = FundingAnalysis::analyze(market.funding_rate, direction);
        let risk = self.risk.compute(
            price,
            price_action.support,
            price_action.resistance,
            price_action.setup_type,
            indicators.atr_14,
        );
        let outcome = self.scorer.score(&price_action, &confluence, &risk);

        debug!(
            "{}: {:?} score {:.1} ({:?})",
            market.symbol, outcome.signal, outcome.score, outcome.gate
        );

        let factors = self.factors(market, direction, &price_action, &confluence, &funding, &risk);
        let components = self.components(market, &price_action, &confluence, &funding);

        TradingSetup {
            id: uuid::Uuid::new_v4(),
            symbol: market.symbol.clone(),
            generated_at: Utc::now(),
            market: market.clone(),
            indicators,
            price_action,
            confluence,
            funding,
            risk,
            overall_score: outcome.score,
            signal: outcome.signal,
            quality: outcome.quality,
            gate: outcome.gate,
            components,
            bullish_factors: factors.bullish,
            bearish_factors: factors.bearish,
            warnings: factors.warnings,
        }
    }

    pub fn multi_timeframe(&self, instrument_id: &str, series: &[OhlcvSeries]) -> MultiTimeframeSignal {
        timeframes::multi_timeframe(instrument_id, series, &self.engine, &self.config)
    }

    fn factors(
        &self,
        market: &MarketSnapshot,
        direction: Option<Direction>,
        price_action: &PriceActionAssessment,
        confluence: &ConfluenceAssessment,
        funding: &FundingAnalysis,
        risk: &RiskParameters,
    ) -> Factors {
        let mut factors = Factors::default();

        for observation in &price_action.signals {
            factors.push(observation.bias, observation.text.clone());
        }

        if let Some(direction) = direction {
            for text in &confluence.confirming_signals {
                factors.push(direction.into(), text.clone());
            }
        }
        factors
            .warnings
            .extend(confluence.conflicting_signals.iter().cloned());

        let rate = funding.hourly_pct();
        match (direction, funding.rate_trend) {
            (Some(Direction::Long), RateTrend::Favorable) => factors
                .bullish
                .push(format!("Funding favorable for longs ({rate:.4}%)")),
            (Some(Direction::Short), RateTrend::Favorable) => factors
                .bearish
                .push(format!("Funding favorable for shorts ({rate:.4}%)")),
            (Some(Direction::Long), _) => factors
                .warnings
                .push(format!("Paying funding to hold long ({rate:.4}%/hr)")),
            (Some(Direction::Short), _) => factors
                .warnings
                .push(format!("Paying funding to hold short ({rate:.4}%/hr)")),
            (None, _) => {}
        }

        if let Some(rr) = risk.risk_reward_ratio {
            if rr < COMFORTABLE_RISK_REWARD {
                factors
                    .warnings
                    .push(format!("R:R ratio below 2:1 ({rr:.2})"));
            }
        }

        if market.volume_24h < self.config.min_volume_24h {
            factors
                .warnings
                .push("Low 24h volume - may experience slippage".to_string());
        }

        factors
    }

    fn components(
        &self,
        market: &MarketSnapshot,
        price_action: &PriceActionAssessment,
        confluence: &ConfluenceAssessment,
        funding: &FundingAnalysis,
    ) -> ComponentScores {
        let pick = |cond: bool, high: f64, low: f64| if cond { high } else { low };
        ComponentScores {
            trend: pick(price_action.is_actionable, HIGH_SCORE, LOW_SCORE),
            momentum: pick(confluence.has_confluence, HIGH_SCORE, LOW_SCORE),
            funding: pick(funding.rate_trend == RateTrend::Favorable, HIGH_SCORE, MID_SCORE),
            liquidity: pick(
                market.volume_24h > self.config.liquidity_volume_24h,
                HIGH_SCORE,
                MID_SCORE,
            ),
            volatility: MID_SCORE,
        }
    }
}

#[derive(Debug, Default)]
struct Factors {
    bullish: Vec<String>,
    bearish: Vec<String>,
    warnings: Vec<String>,
}

impl Factors {
    fn push(&mut self, bias: Bias, text: String) {
        match bias {
            Bias::Bullish => self.bullish.push(text),
            Bias::Bearish => self.bearish.push(text),
        }
    }
}
