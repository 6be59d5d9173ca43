//! Alpha Vantage market data provider implementation
//!
//! The API returns a JSON object with a "Meta Data" block and one
//! time-indexed data block (e.g. "Technical Analysis: SMA"). Rate limiting
//! is signalled in the body ("Note"/"Information"), not via status codes,
//! so the body is validated before use.

use crate::config;
use crate::models::indicator::{IndicatorRequest, SeriesPoint};
use crate::services::market_data::{IndicatorResponse, MarketDataProvider};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const HTTP_TIMEOUT_SECS: u64 = 30;
const RATE_LIMIT_MARKERS: [&str; 2] = ["Note", "Information"];
const ERROR_MARKER: &str = "Error Message";

pub struct AlphaVantageProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AlphaVantageProvider {
    pub fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Self::with_base_url(
            &config::get_market_data_base_url(),
            &config::get_market_data_api_key(),
        )
    }

    pub fn with_base_url(
        base_url: &str,
        api_key: &str,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Failed to build HTTP client: {}",
                    e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;
        Ok(Self {
            http,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn build_query(&self, request: &IndicatorRequest) -> Vec<(String, String)> {
        let mut query = vec![
            ("function".to_string(), request.indicator_type.to_uppercase()),
            ("symbol".to_string(), request.symbol.clone()),
            ("interval".to_string(), request.interval.as_str().to_string()),
            ("apikey".to_string(), self.api_key.clone()),
        ];
        for (key, value) in &request.parameters {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            query.push((key.clone(), text));
        }
        query
    }

    fn parse_body(
        body: &Value,
        indicator_type: &str,
    ) -> Result<IndicatorResponse, Box<dyn std::error::Error + Send + Sync>> {
        let object = body.as_object().ok_or_else(|| soft("Response is not a JSON object"))?;

        if let Some(message) = object.get(ERROR_MARKER).and_then(Value::as_str) {
            return Err(soft(&format!("Provider error: {}", message)));
        }
        for marker in RATE_LIMIT_MARKERS {
            if let Some(note) = object.get(marker).and_then(Value::as_str) {
                return Err(soft(&format!("Provider rate limited: {}", note)));
            }
        }

        let metadata_key = object
            .keys()
            .find(|k| k.starts_with("Meta Data"))
            .cloned()
            .ok_or_else(|| soft("Response missing metadata block"))?;
        let metadata_block = object
            .get(&metadata_key)
            .and_then(Value::as_object)
            .ok_or_else(|| soft("Metadata block is not an object"))?;

        let mut metadata = HashMap::new();
        let mut last_refreshed = None;
        for (key, value) in metadata_block {
            if let Some(text) = value.as_str() {
                if key.contains("Last Refreshed") {
                    last_refreshed = Some(text.to_string());
                }
                metadata.insert(key.clone(), text.to_string());
            }
        }

        let data_key = object
            .keys()
            .find(|k| *k != &metadata_key)
            .cloned()
            .ok_or_else(|| soft("Response missing data block"))?;
        let data_block = object
            .get(&data_key)
            .and_then(Value::as_object)
            .ok_or_else(|| soft("Data block is not an object"))?;

        let mut series = Vec::new();
        for (stamp, values) in data_block {
            let timestamp = match parse_timestamp(stamp) {
                Some(t) => t,
                None => {
                    debug!(timestamp = %stamp, "Skipping point with unparseable timestamp");
                    continue;
                }
            };
            let value = match extract_value(values, indicator_type) {
                Some(v) => v,
                None => {
                    debug!(timestamp = %stamp, "Skipping point with no numeric value");
                    continue;
                }
            };
            series.push(SeriesPoint { timestamp, value });
        }

        if series.is_empty() {
            return Err(soft("Data block contained no usable points"));
        }
        series.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        Ok(IndicatorResponse {
            metadata,
            last_refreshed,
            series,
        })
    }
}

#[async_trait]
impl MarketDataProvider for AlphaVantageProvider {
    async fn fetch_indicator(
        &self,
        request: &IndicatorRequest,
    ) -> Result<IndicatorResponse, Box<dyn std::error::Error + Send + Sync>> {
        let query = self.build_query(request);
        debug!(
            indicator = %request.indicator_type,
            symbol = %request.symbol,
            interval = %request.interval,
            "Fetching {} {} {} from provider",
            request.indicator_type,
            request.symbol,
            request.interval
        );

        let response = self
            .http
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .map_err(|e| soft(&format!("Provider request failed: {}", e)))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| soft(&format!("Provider response was not JSON: {}", e)))?;

        Self::parse_body(&body, &request.indicator_type)
    }
}

/// Pick the series value out of one data point object: the field matching
/// the indicator name when present (e.g. "SMA"), otherwise the first field
/// that parses as a number.
fn extract_value(values: &Value, indicator_type: &str) -> Option<f64> {
    let object = values.as_object()?;
    let wanted = indicator_type.to_uppercase();

    for (key, value) in object {
        if key.to_uppercase().ends_with(&wanted) {
            if let Some(v) = as_f64(value) {
                return Some(v);
            }
        }
    }
    object.values().find_map(as_f64)
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Timestamps arrive as "2024-01-15 16:00:00" for intraday series or
/// "2024-01-15" for daily and coarser ones.
fn parse_timestamp(stamp: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S") {
        return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(stamp, "%Y-%m-%d") {
        let dt = date.and_hms_opt(0, 0, 0)?;
        return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
    }
    None
}

fn soft(msg: &str) -> Box<dyn std::error::Error + Send + Sync> {
    Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, msg.to_string()))
}
