use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ScannerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl Timeframe {
    pub const ALL: [Timeframe; 4] = [
        Timeframe::OneHour,
        Timeframe::FourHours,
        Timeframe::TwelveHours,
        Timeframe::OneDay,
    ];

    pub fn hours(&self) -> u32 {
        match self {
            Timeframe::OneHour => 1,
            Timeframe::FourHours => 4,
            Timeframe::TwelveHours => 12,
            Timeframe::OneDay => 24,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::OneHour => "1h",
            Timeframe::FourHours => "4h",
            Timeframe::TwelveHours => "12h",
            Timeframe::OneDay => "1d",
        }
    }

    /// Start of the bucket containing `ts`. Buckets are aligned to multiples
    /// of the timeframe within the UTC day, so the daily bucket is midnight.
    pub fn period_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let step = self.hours();
        let hour = (ts.hour() / step) * step;
        let midnight = ts.date_naive().and_time(NaiveTime::MIN);
        (midnight + Duration::hours(i64::from(hour))).and_utc()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = ScannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1h" => Ok(Timeframe::OneHour),
            "4h" => Ok(Timeframe::FourHours),
            "12h" => Ok(Timeframe::TwelveHours),
            "1d" | "24h" => Ok(Timeframe::OneDay),
            other => Err(ScannerError::Configuration(format!(
                "unknown timeframe: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
    Unknown,
}

impl TradeSide {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "buy" | "bid" | "b" => TradeSide::Buy,
            "sell" | "ask" | "s" => TradeSide::Sell,
            _ => TradeSide::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: u64,
    pub instrument_id: String,
    pub price: f64,
    pub base_qty: f64,
    /// Quote-currency notional. Summed exactly into candle volume.
    pub quote_qty: Decimal,
    pub side: TradeSide,
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    pub fn has_valid_price(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }

    /// Ordering key used to pick open/close. Ties on timestamp are broken by
    /// trade id so the result does not depend on arrival order.
    fn sequence(&self) -> (DateTime<Utc>, u64) {
        (self.timestamp, self.trade_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub instrument_id: String,
    pub timeframe: Timeframe,
    pub period_start: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Decimal,
    pub trade_count: u64,
    pub first_trade_at: DateTime<Utc>,
    pub first_trade_id: u64,
    pub last_trade_at: DateTime<Utc>,
    pub last_trade_id: u64,
}

impl Candle {
    /// Opens a bucket from its first observed trade.
    pub fn from_trade(trade: &Trade, timeframe: Timeframe) -> Self {
        Self {
            instrument_id: trade.instrument_id.clone(),
            timeframe,
            period_start: timeframe.period_start(trade.timestamp),
            open: trade.price,
            high: trade.price,
            low: trade.price,
            close: trade.price,
            volume: trade.quote_qty.abs(),
            trade_count: 1,
            first_trade_at: trade.timestamp,
            first_trade_id: trade.trade_id,
            last_trade_at: trade.timestamp,
            last_trade_id: trade.trade_id,
        }
    }

    pub fn apply_trade(&mut self, trade: &Trade) {
        if trade.sequence() < (self.first_trade_at, self.first_trade_id) {
            self.first_trade_at = trade.timestamp;
            self.first_trade_id = trade.trade_id;
            self.open = trade.price;
        }
        if trade.sequence() > (self.last_trade_at, self.last_trade_id) {
            self.last_trade_at = trade.timestamp;
            self.last_trade_id = trade.trade_id;
            self.close = trade.price;
        }
        self.high = self.high.max(trade.price);
        self.low = self.low.min(trade.price);
        self.volume += trade.quote_qty.abs();
        self.trade_count += 1;
    }

    /// Folds a partial candle for the same bucket into this one. The partial
    /// must be built from trades this candle has not seen yet.
    pub fn merge(&mut self, other: &Candle) {
        if (other.first_trade_at, other.first_trade_id) < (self.first_trade_at, self.first_trade_id)
        {
            self.first_trade_at = other.first_trade_at;
            self.first_trade_id = other.first_trade_id;
            self.open = other.open;
        }
        if (other.last_trade_at, other.last_trade_id) > (self.last_trade_at, self.last_trade_id) {
            self.last_trade_at = other.last_trade_at;
            self.last_trade_id = other.last_trade_id;
            self.close = other.close;
        }
        self.high = self.high.max(other.high);
        self.low = self.low.min(other.low);
        self.volume += other.volume;
        self.trade_count += other.trade_count;
    }

    pub fn is_consistent(&self) -> bool {
        self.low <= self.open.min(self.close)
            && self.open.max(self.close) <= self.high
            && self.volume >= Decimal::ZERO
    }
}

/// Chronologically ordered candles for one instrument and timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvSeries {
    pub instrument_id: String,
    pub timeframe: Timeframe,
    candles: Vec<Candle>,
}

impl OhlcvSeries {
    pub fn new(instrument_id: impl Into<String>, timeframe: Timeframe, mut candles: Vec<Candle>) -> Self {
        candles.sort_by_key(|c| c.period_start);
        Self {
            instrument_id: instrument_id.into(),
            timeframe,
            candles,
        }
    }

    pub fn empty(instrument_id: impl Into<String>, timeframe: Timeframe) -> Self {
        Self::new(instrument_id, timeframe, Vec::new())
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.low).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.candles
            .iter()
            .map(|c| c.volume.to_f64().unwrap_or(0.0))
            .collect()
    }
}

/// Point-in-time market view supplied by the snapshot provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub last_price: f64,
    #[serde(default)]
    pub mark_price: Option<f64>,
    #[serde(default)]
    pub index_price: Option<f64>,
    pub volume_24h: f64,
    /// Hourly funding rate as a fraction (0.0001 = 0.01%).
    pub funding_rate: f64,
    #[serde(default)]
    pub open_interest: Option<f64>,
    #[serde(default)]
    pub price_change_percent_24h: f64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn trade(id: u64, minute_offset: i64, price: f64, quote: i64) -> Trade {
        Trade {
            trade_id: id,
            instrument_id: "BTC-PERP".to_string(),
            price,
            base_qty: quote as f64 / price,
            quote_qty: Decimal::from(quote),
            side: TradeSide::Buy,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 5, 13, 0, 0).unwrap()
                + Duration::minutes(minute_offset),
        }
    }

    #[test]
    fn test_period_start_alignment() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 5, 13, 47, 12).unwrap();

        assert_eq!(
            Timeframe::OneHour.period_start(ts),
            Utc.with_ymd_and_hms(2024, 3, 5, 13, 0, 0).unwrap()
        );
        assert_eq!(
            Timeframe::FourHours.period_start(ts),
            Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap()
        );
        assert_eq!(
            Timeframe::TwelveHours.period_start(ts),
            Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap()
        );
        assert_eq!(
            Timeframe::OneDay.period_start(ts),
            Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_timeframe_parse_and_display() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.as_str().parse::<Timeframe>().unwrap(), tf);
        }
        assert!("5m".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_late_trades_revise_open_and_close() {
        let mut candle = Candle::from_trade(&trade(10, 30, 100.0, 50), Timeframe::OneHour);

        candle.apply_trade(&trade(11, 45, 104.0, 10));
        candle.apply_trade(&trade(9, 5, 98.0, -20));

        assert_eq!(candle.open, 98.0);
        assert_eq!(candle.close, 104.0);
        assert_eq!(candle.high, 104.0);
        assert_eq!(candle.low, 98.0);
        assert_eq!(candle.volume, Decimal::from(80));
        assert_eq!(candle.trade_count, 3);
        assert!(candle.is_consistent());
    }

    #[test]
    fn test_same_timestamp_tie_broken_by_trade_id() {
        let a = trade(2, 10, 101.0, 1);
        let b = trade(1, 10, 99.0, 1);

        let mut forward = Candle::from_trade(&a, Timeframe::OneHour);
        forward.apply_trade(&b);
        let mut backward = Candle::from_trade(&b, Timeframe::OneHour);
        backward.apply_trade(&a);

        assert_eq!(forward, backward);
        assert_eq!(forward.open, 99.0);
        assert_eq!(forward.close, 101.0);
    }

    #[test]
    fn test_merged_partials_sum_volume_exactly() {
        let mut tenth = trade(1, 0, 100.0, 0);
        tenth.quote_qty = Decimal::new(1, 1);
        let mut fifth = trade(2, 1, 100.0, 0);
        fifth.quote_qty = Decimal::new(2, 1);
        let mut rest = trade(3, 2, 100.0, 0);
        rest.quote_qty = Decimal::new(3, 1);

        let mut forward = Candle::from_trade(&tenth, Timeframe::OneHour);
        forward.merge(&Candle::from_trade(&fifth, Timeframe::OneHour));
        forward.merge(&Candle::from_trade(&rest, Timeframe::OneHour));

        let mut backward = Candle::from_trade(&rest, Timeframe::OneHour);
        backward.merge(&Candle::from_trade(&fifth, Timeframe::OneHour));
        backward.merge(&Candle::from_trade(&tenth, Timeframe::OneHour));

        assert_eq!(forward, backward);
        assert_eq!(forward.volume, Decimal::new(6, 1));
    }

    #[test]
    fn test_series_sorted_on_construction() {
        let late = Candle::from_trade(&trade(1, 120, 100.0, 1), Timeframe::OneHour);
        let early = Candle::from_trade(&trade(2, 0, 90.0, 1), Timeframe::OneHour);

        let series = OhlcvSeries::new("BTC-PERP", Timeframe::OneHour, vec![late, early]);

        assert_eq!(series.closes(), vec![90.0, 100.0]);
    }
}
