//! Indicator request identity and series data
//!
//! An `IndicatorRequest` is the unit of work for the whole pipeline: the
//! fetcher refreshes it, the cache keys on it and the evaluation engine
//! resolves condition data through it. Its fingerprint is the canonical
//! identity string shared by all three.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Market data sampling interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1min")]
    OneMin,
    #[serde(rename = "5min")]
    FiveMin,
    #[serde(rename = "15min")]
    FifteenMin,
    #[serde(rename = "30min")]
    ThirtyMin,
    #[serde(rename = "60min")]
    SixtyMin,
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "weekly")]
    Weekly,
    #[serde(rename = "monthly")]
    Monthly,
}

impl Interval {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1min" => Some(Interval::OneMin),
            "5min" => Some(Interval::FiveMin),
            "15min" => Some(Interval::FifteenMin),
            "30min" => Some(Interval::ThirtyMin),
            "60min" => Some(Interval::SixtyMin),
            "daily" => Some(Interval::Daily),
            "weekly" => Some(Interval::Weekly),
            "monthly" => Some(Interval::Monthly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMin => "1min",
            Interval::FiveMin => "5min",
            Interval::FifteenMin => "15min",
            Interval::ThirtyMin => "30min",
            Interval::SixtyMin => "60min",
            Interval::Daily => "daily",
            Interval::Weekly => "weekly",
            Interval::Monthly => "monthly",
        }
    }

    /// Cache lifetime for series at this interval. Shorter intervals go
    /// stale faster; each TTL covers a few refresh periods plus slack for
    /// provider publishing lag (a day's extra hour for daily data, a few
    /// days for weekly and monthly).
    pub fn ttl_seconds(&self) -> u64 {
        match self {
            Interval::OneMin => 180,
            Interval::FiveMin => 600,
            Interval::FifteenMin => 1_800,
            Interval::ThirtyMin => 3_600,
            Interval::SixtyMin => 7_200,
            Interval::Daily => 90_000,
            Interval::Weekly => 615_600,
            Interval::Monthly => 2_786_400,
        }
    }

    /// How often a scheduled refresh task re-fetches this request. Intraday
    /// series refresh once per interval; daily and coarser refresh hourly
    /// since providers restate recent points during the session.
    pub fn refresh_period(&self) -> Duration {
        let seconds = match self {
            Interval::OneMin => 60,
            Interval::FiveMin => 300,
            Interval::FifteenMin => 900,
            Interval::ThirtyMin => 1_800,
            Interval::SixtyMin => 3_600,
            Interval::Daily | Interval::Weekly | Interval::Monthly => 3_600,
        };
        Duration::from_secs(seconds)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully resolved request for one indicator series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRequest {
    pub indicator_type: String,
    pub symbol: String,
    pub interval: Interval,
    pub parameters: BTreeMap<String, Value>,
    pub data_source: String,
}

impl IndicatorRequest {
    /// Canonical identity of this request: cache key, stream field and
    /// scheduling dedup key. Case-insensitive on type, symbol and source;
    /// parameter maps serialize with sorted keys at every nesting level so
    /// insertion order never splits the identity.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.indicator_type.to_uppercase(),
            self.symbol.to_uppercase(),
            self.interval.as_str(),
            canonical_json(&self.parameters),
            self.data_source.to_lowercase()
        )
    }
}

fn canonical_json(parameters: &BTreeMap<String, Value>) -> String {
    let sorted: BTreeMap<&String, Value> = parameters
        .iter()
        .map(|(key, value)| (key, canonicalize(value)))
        .collect();
    serde_json::to_string(&sorted).unwrap_or_default()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> = map
                .iter()
                .map(|(key, value)| (key, canonicalize(value)))
                .collect();
            serde_json::to_value(sorted).unwrap_or(Value::Null)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// One timestamped indicator value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}
