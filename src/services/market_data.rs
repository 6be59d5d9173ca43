//! Market data provider interface

use crate::models::indicator::{IndicatorRequest, SeriesPoint};
use async_trait::async_trait;
use std::collections::HashMap;

/// A validated provider response: metadata block plus time-indexed series
#[derive(Debug, Clone)]
pub struct IndicatorResponse {
    pub metadata: HashMap<String, String>,
    pub last_refreshed: Option<String>,
    /// Points sorted descending by timestamp
    pub series: Vec<SeriesPoint>,
}

/// Upstream source of indicator series. Any error (network, rate limit,
/// unexpected response shape) is a soft failure: the caller logs it and
/// aborts the fetch cycle without caching or publishing.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch_indicator(
        &self,
        request: &IndicatorRequest,
    ) -> Result<IndicatorResponse, Box<dyn std::error::Error + Send + Sync>>;
}
