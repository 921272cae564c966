//! Normalisation of raw exchange trade records into [`Trade`]s.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::model::{Trade, TradeSide};
use crate::Result;

/// Above this a numeric timestamp is taken to be in milliseconds.
const MILLIS_THRESHOLD: f64 = 1e10;

/// A numeric field that exchanges send either as a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Numeric::Number(n) => *n,
            Numeric::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Numeric::Number(n) => Decimal::from_f64(*n),
            Numeric::Text(s) => {
                let trimmed = s.trim();
                trimmed
                    .parse::<Decimal>()
                    .or_else(|_| Decimal::from_scientific(trimmed))
                    .ok()
            }
        }
    }
}

/// Raw trade record as delivered by the feed. Every field is optional because
/// feeds are allowed to send partial or malformed records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTrade {
    #[serde(default)]
    pub trade_id: Option<u64>,
    #[serde(default, alias = "ticker_id")]
    pub instrument_id: Option<String>,
    #[serde(default)]
    pub price: Option<Numeric>,
    #[serde(default, alias = "base_filled")]
    pub base_qty: Option<Numeric>,
    #[serde(default, alias = "quote_filled")]
    pub quote_qty: Option<Numeric>,
    #[serde(default, alias = "trade_type")]
    pub side: Option<String>,
    #[serde(default)]
    pub timestamp: Option<RawTimestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Epoch(f64),
    Text(String),
}

impl RawTimestamp {
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            RawTimestamp::Epoch(value) => epoch_to_datetime(*value),
            RawTimestamp::Text(text) => {
                let trimmed = text.trim();
                if let Ok(value) = trimmed.parse::<f64>() {
                    return epoch_to_datetime(value);
                }
                DateTime::parse_from_rfc3339(trimmed)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            }
        }
    }
}

fn epoch_to_datetime(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    let millis = if value > MILLIS_THRESHOLD {
        value
    } else {
        value * 1000.0
    };
    Utc.timestamp_millis_opt(millis.round() as i64).single()
}

impl RawTrade {
    /// Converts to a typed trade. Records with no id, no usable timestamp or
    /// no parseable price yield `None`. Non-positive prices are kept so the
    /// aggregator can reject them with its own accounting.
    pub fn normalize(&self, instrument_id: &str) -> Option<Trade> {
        let trade_id = self.trade_id?;
        let timestamp = self.timestamp.as_ref()?.to_datetime()?;
        let price = self.price.as_ref()?.as_f64()?;
        let base = self.base_qty.as_ref().and_then(Numeric::as_decimal);
        let base_qty = base.and_then(|b| b.to_f64()).unwrap_or(0.0);
        let quote_qty = match self.quote_qty.as_ref().and_then(Numeric::as_decimal) {
            Some(quote) => quote,
            None => {
                let price = Decimal::from_f64(price)?;
                base.map(|b| b * price).unwrap_or(Decimal::ZERO)
            }
        };

        Some(Trade {
            trade_id,
            instrument_id: self
                .instrument_id
                .clone()
                .unwrap_or_else(|| instrument_id.to_string()),
            price,
            base_qty,
            quote_qty,
            side: self
                .side
                .as_deref()
                .map(TradeSide::parse)
                .unwrap_or(TradeSide::Unknown),
            timestamp,
        })
    }
}

/// Normalises a batch for one instrument, skipping records that cannot be
/// interpreted. Records tagged with another instrument are dropped.
pub fn normalize_batch(instrument_id: &str, raw: Vec<RawTrade>) -> Vec<Trade> {
    let mut trades = Vec::with_capacity(raw.len());

    for record in raw {
        if let Some(other) = record.instrument_id.as_deref() {
            if other != instrument_id {
                warn!(
                    "Skipping trade {:?} for {}: tagged with instrument {}",
                    record.trade_id, instrument_id, other
                );
                continue;
            }
        }

        match record.normalize(instrument_id) {
            Some(trade) => trades.push(trade),
            None => warn!(
                "Skipping malformed trade {:?} for {}",
                record.trade_id, instrument_id
            ),
        }
    }

    trades
}

/// Parses a JSON array of raw trades one record at a time, so a record with
/// a mistyped field is dropped instead of failing the whole batch. Only a
/// payload that is not an array is an error.
pub fn parse_raw_batch(json: &str) -> Result<Vec<RawTrade>> {
    let values: Vec<Value> = serde_json::from_str(json)?;
    let mut records = Vec::with_capacity(values.len());

    for (index, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<RawTrade>(value) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping unreadable trade record {}: {}", index, e),
        }
    }

    Ok(records)
}
