//! Tradewatch Worker
//!
//! Runs the discovery scheduler and the per-indicator refresh tasks.
//! Writes the freshness cache and publishes indicator-update events.

use dotenvy::dotenv;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tradewatch::cache::{IndicatorCache, RedisCache};
use tradewatch::config;
use tradewatch::core::fetcher::{IndicatorFetcher, IndicatorRefresher};
use tradewatch::core::scheduler::DiscoveryScheduler;
use tradewatch::db::{PostgresStrategyStore, StrategyStore};
use tradewatch::events::{EventLog, EventPublisher};
use tradewatch::logging;
use tradewatch::metrics::Metrics;
use tradewatch::services::alphavantage::AlphaVantageProvider;
use tradewatch::services::market_data::MarketDataProvider;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    logging::init_logging();

    let env = config::get_environment();
    let discovery_interval = config::get_discovery_interval_seconds();
    info!("Starting Tradewatch Worker");
    info!(environment = %env, "Environment");
    info!(
        interval = discovery_interval,
        "Discovery scan: every {} seconds", discovery_interval
    );

    let metrics = Arc::new(Metrics::new()?);

    info!("Connecting to strategy store...");
    let store: Arc<dyn StrategyStore> = match PostgresStrategyStore::new().await {
        Ok(store) => {
            info!("Strategy store connected");
            metrics.database_connected.set(1.0);
            Arc::new(store)
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to strategy store");
            return Err(format!("Strategy store connection required for worker: {}", e).into());
        }
    };

    info!("Connecting to Redis cache...");
    let cache: Arc<dyn IndicatorCache> = match RedisCache::new().await {
        Ok(cache) => {
            info!("Redis cache connected");
            metrics.cache_connected.set(1.0);
            Arc::new(cache)
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to Redis cache");
            return Err(format!("Redis connection required for worker: {}", e).into());
        }
    };

    // Event log connection failure at startup is fatal by design
    info!("Connecting to event log...");
    let log = EventLog::connect().await?;
    let publisher: Arc<dyn EventPublisher> = Arc::new(log);

    let provider: Arc<dyn MarketDataProvider> = Arc::new(AlphaVantageProvider::new()?);

    let fetcher: Arc<dyn IndicatorRefresher> = Arc::new(IndicatorFetcher::new(
        cache,
        provider,
        publisher,
        Some(metrics.clone()),
    ));

    info!("Starting discovery scheduler...");
    let scheduler = DiscoveryScheduler::new(
        store,
        fetcher,
        discovery_interval,
        &config::get_data_source(),
        Some(metrics),
    )
    .map_err(|e| format!("Failed to create scheduler: {}", e))?;
    scheduler
        .start()
        .await
        .map_err(|e| format!("Failed to start scheduler: {}", e))?;

    info!("Worker started, waiting for shutdown signal...");
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutting down worker...");
            scheduler.stop().await;
            info!("Worker stopped");
        }
    }

    Ok(())
}
