//! Freshness-aware indicator fetcher and event publisher
//!
//! One refresh cycle: consult the cache, fetch upstream when stale, write
//! the cache, publish an indicator-update event. Cache write and event
//! publish are not transactional with respect to each other; a failed
//! publish is logged and the cache write stands.

use crate::cache::{CacheEntry, IndicatorCache};
use crate::events::{EventPublisher, INDICATOR_UPDATES_STREAM};
use crate::metrics::Metrics;
use crate::models::events::IndicatorUpdateEvent;
use crate::models::indicator::IndicatorRequest;
use crate::services::market_data::MarketDataProvider;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Seam for the discovery scheduler's recurring tasks, so scheduling can
/// be tested without a live provider
#[async_trait]
pub trait IndicatorRefresher: Send + Sync {
    /// Refresh one indicator. `Ok(None)` means the cycle was aborted on a
    /// soft provider failure; the next scheduled tick retries.
    async fn refresh(
        &self,
        request: &IndicatorRequest,
        force: bool,
    ) -> Result<Option<CacheEntry>, Box<dyn std::error::Error + Send + Sync>>;
}

pub struct IndicatorFetcher {
    cache: Arc<dyn IndicatorCache>,
    provider: Arc<dyn MarketDataProvider>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Option<Arc<Metrics>>,
}

impl IndicatorFetcher {
    pub fn new(
        cache: Arc<dyn IndicatorCache>,
        provider: Arc<dyn MarketDataProvider>,
        publisher: Arc<dyn EventPublisher>,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            cache,
            provider,
            publisher,
            metrics,
        }
    }
}

#[async_trait]
impl IndicatorRefresher for IndicatorFetcher {
    async fn refresh(
        &self,
        request: &IndicatorRequest,
        force: bool,
    ) -> Result<Option<CacheEntry>, Box<dyn std::error::Error + Send + Sync>> {
        let fingerprint = request.fingerprint();

        if !force {
            if let Some(entry) = self.cache.get(&fingerprint).await? {
                debug!(fingerprint = %fingerprint, "Entry still fresh, skipping fetch");
                if let Some(ref metrics) = self.metrics {
                    metrics.cache_hits_total.inc();
                }
                return Ok(Some(entry));
            }
        }

        let response = match self.provider.fetch_indicator(request).await {
            Ok(response) => response,
            Err(e) => {
                // Transient provider failure: no cache write, no event,
                // the next scheduled tick retries
                warn!(
                    fingerprint = %fingerprint,
                    error = %e,
                    "Aborting fetch cycle for {}",
                    fingerprint
                );
                if let Some(ref metrics) = self.metrics {
                    metrics.fetch_failures_total.inc();
                }
                return Ok(None);
            }
        };

        let fetch_time = Utc::now();
        let entry = CacheEntry {
            fingerprint: fingerprint.clone(),
            series: response.series,
            metadata: response.metadata,
            fetched_at: fetch_time,
            ttl_seconds: request.interval.ttl_seconds(),
        };
        self.cache.put(&entry).await?;
        if let Some(ref metrics) = self.metrics {
            metrics.indicator_fetches_total.inc();
        }

        let event = IndicatorUpdateEvent {
            fingerprint: fingerprint.clone(),
            indicator_type: request.indicator_type.clone(),
            symbol: request.symbol.clone(),
            interval: request.interval,
            parameters: request.parameters.clone(),
            last_refreshed: response.last_refreshed,
            fetch_time,
        };
        match self
            .publisher
            .publish(INDICATOR_UPDATES_STREAM, &event.to_fields())
            .await
        {
            Ok(id) => {
                info!(
                    fingerprint = %fingerprint,
                    event_id = %id,
                    points = entry.series.len(),
                    "Refreshed {} and published update {}",
                    fingerprint,
                    id
                );
                if let Some(ref metrics) = self.metrics {
                    metrics.events_published_total.inc();
                }
            }
            Err(e) => {
                // Cache write is not rolled back on publish failure
                warn!(
                    fingerprint = %fingerprint,
                    error = %e,
                    "Cached {} but failed to publish update event",
                    fingerprint
                );
            }
        }

        Ok(Some(entry))
    }
}
