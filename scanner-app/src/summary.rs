use scanner_core::MarketSnapshot;
use scanner_setup::{SetupQuality, TradingSetup, TradingSignal};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

const MOVERS: usize = 3;
const BEST_SETUPS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedValue {
    pub symbol: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupDigest {
    pub symbol: String,
    pub score: f64,
    pub signal: TradingSignal,
    pub quality: SetupQuality,
}

/// Market-wide view of one refresh cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSummary {
    pub total_markets: usize,
    pub total_volume_24h: f64,
    pub top_gainers: Vec<RankedValue>,
    pub top_losers: Vec<RankedValue>,
    /// Hourly funding rates in percent.
    pub highest_funding: Vec<RankedValue>,
    pub lowest_funding: Vec<RankedValue>,
    pub best_setups: Vec<SetupDigest>,
}

impl MarketSummary {
    /// `setups` must already be ranked best first.
    pub fn build(markets: &[MarketSnapshot], setups: &[TradingSetup]) -> Self {
        let change = |m: &MarketSnapshot| m.price_change_percent_24h;
        let funding = |m: &MarketSnapshot| m.funding_rate * 100.0;

        Self {
            total_markets: markets.len(),
            total_volume_24h: markets.iter().map(|m| m.volume_24h).sum(),
            top_gainers: ranked(markets, change, true),
            top_losers: ranked(markets, change, false),
            highest_funding: ranked(markets, funding, true),
            lowest_funding: ranked(markets, funding, false),
            best_setups: setups
                .iter()
                .take(BEST_SETUPS)
                .map(|s| SetupDigest {
                    symbol: s.symbol.clone(),
                    score: s.overall_score,
                    signal: s.signal,
                    quality: s.quality,
                })
                .collect(),
        }
    }
}

fn ranked(
    markets: &[MarketSnapshot],
    value: impl Fn(&MarketSnapshot) -> f64,
    descending: bool,
) -> Vec<RankedValue> {
    let mut values: Vec<RankedValue> = markets
        .iter()
        .map(|m| RankedValue {
            symbol: m.symbol.clone(),
            value: value(m),
        })
        .filter(|r| r.value.is_finite())
        .collect();

    values.sort_by(|a, b| {
        let order = a.value.partial_cmp(&b.value).unwrap_or(Ordering::Equal);
        let order = if descending { order.reverse() } else { order };
        order.then_with(|| a.symbol.cmp(&b.symbol))
    });
    values.truncate(MOVERS);
    values
}
