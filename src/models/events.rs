//! Wire payloads for the two event streams
//!
//! Stream entries are flat string field maps. Non-scalar fields (the
//! parameter map) travel as a JSON string and are reconstructed by the
//! consumer. A payload that fails to reconstruct is malformed: the consumer
//! logs it, acknowledges it and drops it.

use crate::models::indicator::Interval;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Published by the fetcher after every successful cache write
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorUpdateEvent {
    pub fingerprint: String,
    pub indicator_type: String,
    pub symbol: String,
    pub interval: Interval,
    pub parameters: BTreeMap<String, Value>,
    pub last_refreshed: Option<String>,
    pub fetch_time: DateTime<Utc>,
}

impl IndicatorUpdateEvent {
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("fingerprint".to_string(), self.fingerprint.clone()),
            ("indicator_type".to_string(), self.indicator_type.clone()),
            ("symbol".to_string(), self.symbol.clone()),
            ("interval".to_string(), self.interval.as_str().to_string()),
            (
                "parameters".to_string(),
                serde_json::to_string(&self.parameters).unwrap_or_else(|_| "{}".to_string()),
            ),
            ("fetch_time".to_string(), self.fetch_time.to_rfc3339()),
        ];
        if let Some(ref last_refreshed) = self.last_refreshed {
            fields.push(("last_refreshed".to_string(), last_refreshed.clone()));
        }
        fields
    }

    pub fn from_fields(
        fields: &HashMap<String, String>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let fingerprint = require(fields, "fingerprint")?;
        let indicator_type = require(fields, "indicator_type")?;
        let symbol = require(fields, "symbol")?;
        let interval_raw = require(fields, "interval")?;
        let interval = Interval::parse(&interval_raw).ok_or_else(|| {
            malformed(format!("unknown interval '{}'", interval_raw))
        })?;
        let parameters_raw = require(fields, "parameters")?;
        let parameters: BTreeMap<String, Value> =
            serde_json::from_str(&parameters_raw).map_err(|e| {
                malformed(format!("unparseable parameters field: {}", e))
            })?;
        let fetch_time_raw = require(fields, "fetch_time")?;
        let fetch_time = DateTime::parse_from_rfc3339(&fetch_time_raw)
            .map_err(|e| malformed(format!("unparseable fetch_time: {}", e)))?
            .with_timezone(&Utc);

        Ok(Self {
            fingerprint,
            indicator_type,
            symbol,
            interval,
            parameters,
            last_refreshed: fields.get("last_refreshed").cloned(),
            fetch_time,
        })
    }
}

/// Published by the evaluation engine once per satisfied action
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequiredEvent {
    pub action_id: i64,
    pub action_type: String,
    pub parameters: BTreeMap<String, Value>,
    pub strategy_id: i64,
    pub triggering_indicator: String,
}

impl ActionRequiredEvent {
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("action_id".to_string(), self.action_id.to_string()),
            ("action_type".to_string(), self.action_type.clone()),
            (
                "parameters".to_string(),
                serde_json::to_string(&self.parameters).unwrap_or_else(|_| "{}".to_string()),
            ),
            ("strategy_id".to_string(), self.strategy_id.to_string()),
            (
                "triggering_indicator".to_string(),
                self.triggering_indicator.clone(),
            ),
        ]
    }

    pub fn from_fields(
        fields: &HashMap<String, String>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let action_id = require(fields, "action_id")?
            .parse()
            .map_err(|e| malformed(format!("unparseable action_id: {}", e)))?;
        let action_type = require(fields, "action_type")?;
        let parameters_raw = require(fields, "parameters")?;
        let parameters: BTreeMap<String, Value> =
            serde_json::from_str(&parameters_raw).map_err(|e| {
                malformed(format!("unparseable parameters field: {}", e))
            })?;
        let strategy_id = require(fields, "strategy_id")?
            .parse()
            .map_err(|e| malformed(format!("unparseable strategy_id: {}", e)))?;
        let triggering_indicator = require(fields, "triggering_indicator")?;

        Ok(Self {
            action_id,
            action_type,
            parameters,
            strategy_id,
            triggering_indicator,
        })
    }
}

fn require(
    fields: &HashMap<String, String>,
    key: &str,
) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    fields
        .get(key)
        .cloned()
        .ok_or_else(|| malformed(format!("missing field '{}'", key)))
}

fn malformed(msg: String) -> Box<dyn std::error::Error + Send + Sync> {
    Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, msg))
}
