use scanner_core::{AnalysisConfig, MarketSnapshot};
use scanner_indicators::TechnicalIndicatorSet;
use serde::{Deserialize, Serialize};

use crate::{Direction, SetupType};

/// Confirmations needed before a setup counts as confirmed.
pub const REQUIRED_CONFIRMATIONS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Confirms,
    Conflicts,
    Neutral,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceAssessment {
    pub rsi: Verdict,
    pub macd: Verdict,
    pub volume: Verdict,
    pub confluence_count: usize,
    pub has_confluence: bool,
    pub confirming_signals: Vec<String>,
    pub conflicting_signals: Vec<String>,
}

impl ConfluenceAssessment {
    pub fn unavailable() -> Self {
        Self {
            rsi: Verdict::Unavailable,
            macd: Verdict::Unavailable,
            volume: Verdict::Unavailable,
            confluence_count: 0,
            has_confluence: false,
            confirming_signals: Vec::new(),
            conflicting_signals: Vec::new(),
        }
    }

    pub fn conflict_count(&self) -> usize {
        self.conflicting_signals.len()
    }

    fn record(&mut self, verdict: Verdict, text: String) {
        match verdict {
            Verdict::Confirms => {
                self.confluence_count += 1;
                self.confirming_signals.push(text);
            }
            Verdict::Conflicts => self.conflicting_signals.push(text),
            Verdict::Neutral | Verdict::Unavailable => {}
        }
    }
}

/// Cross-checks a price-action setup against RSI, MACD and volume.
#[derive(Debug, Clone)]
pub struct ConfluenceScorer {
    config: AnalysisConfig,
}

impl ConfluenceScorer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(
        &self,
        setup_type: Option<SetupType>,
        indicators: &TechnicalIndicatorSet,
        market: &MarketSnapshot,
    ) -> ConfluenceAssessment {
        let mut result = ConfluenceAssessment::unavailable();
        let Some(direction) = setup_type.map(|s| s.direction()) else {
            return result;
        };

        if let Some((verdict, text)) = self.rsi_verdict(direction, indicators.rsi_14) {
            result.rsi = verdict;
            if let Some(text) = text {
                result.record(verdict, text);
            }
        }

        if let Some(macd) = indicators.macd {
            let bullish = macd.is_bullish();
            let (verdict, text) = match (direction, bullish) {
                (Direction::Long, true) => (Verdict::Confirms, "MACD bullish - confirms long"),
                (Direction::Long, false) => (Verdict::Conflicts, "MACD bearish - conflicts with long"),
                (Direction::Short, false) => (Verdict::Confirms, "MACD bearish - confirms short"),
                (Direction::Short, true) => (Verdict::Conflicts, "MACD bullish - conflicts with short"),
            };
            result.macd = verdict;
            result.record(verdict, text.to_string());
        }

        // 24h volume stands in for the setup candle's volume
        if indicators.volume_sma_20.is_some() && market.volume_24h > 0.0 {
            let (verdict, text) = if market.volume_24h > self.config.min_volume_24h {
                (Verdict::Confirms, "Adequate volume for trade execution")
            } else {
                (Verdict::Conflicts, "Low volume - may have slippage")
            };
            result.volume = verdict;
            result.record(verdict, text.to_string());
        }

        result.has_confluence = result.confluence_count >= REQUIRED_CONFIRMATIONS;
        result
    }

    /// Neutral readings carry no explanation.
    fn rsi_verdict(
        &self,
        direction: Direction,
        rsi: Option<f64>,
    ) -> Option<(Verdict, Option<String>)> {
        let rsi = rsi?;
        let cfg = &self.config;

        let verdict = match direction {
            Direction::Long if rsi < cfg.rsi_long_confirm_below => (
                Verdict::Confirms,
                Some(format!("RSI oversold ({rsi:.1}) - good for long")),
            ),
            Direction::Long if rsi > cfg.rsi_long_conflict_above => (
                Verdict::Conflicts,
                Some(format!("RSI overbought ({rsi:.1}) - caution for long")),
            ),
            Direction::Short if rsi > cfg.rsi_short_confirm_above => (
                Verdict::Confirms,
                Some(format!("RSI overbought ({rsi:.1}) - good for short")),
            ),
            Direction::Short if rsi < cfg.rsi_short_conflict_below => (
                Verdict::Conflicts,
                Some(format!("RSI oversold ({rsi:.1}) - caution for short")),
            ),
            _ => (Verdict::Neutral, None),
        };

        Some(verdict)
    }
}
