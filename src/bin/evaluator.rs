//! Tradewatch Evaluator
//!
//! Consumer-group reader of indicator-update events. Evaluates affected
//! strategies and publishes action-required events. Multiple instances
//! may run in the same group; each message goes to exactly one of them.

use dotenvy::dotenv;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tradewatch::cache::{IndicatorCache, RedisCache};
use tradewatch::config;
use tradewatch::db::{PostgresStrategyStore, StrategyStore};
use tradewatch::engine::EvaluationEngine;
use tradewatch::events::{EventLog, EventPublisher};
use tradewatch::logging;
use tradewatch::metrics::Metrics;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    logging::init_logging();

    let env = config::get_environment();
    let group = config::get_evaluator_group();
    let consumer = config::get_consumer_name();
    info!("Starting Tradewatch Evaluator");
    info!(environment = %env, "Environment");
    info!(group = %group, consumer = %consumer, "Consumer identity: {}/{}", group, consumer);

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
            return Err(format!("Strategy store connection required for evaluator: {}", e).into());
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
            return Err(format!("Redis connection required for evaluator: {}", e).into());
        }
    };

    // Event log connection failure at startup is fatal by design
    info!("Connecting to event log...");
    let log = EventLog::connect().await?;
    let publisher: Arc<dyn EventPublisher> = Arc::new(log.clone());

    let engine = EvaluationEngine::new(
        store,
        cache,
        publisher,
        &config::get_data_source(),
        Some(metrics),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut consumer_handle =
        tokio::spawn(async move { engine.run(&log, &group, &consumer, shutdown_rx).await });

    info!("Evaluator started, waiting for shutdown signal...");
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutting down evaluator...");
            // The loop finishes its in-flight batch before exiting
            let _ = shutdown_tx.send(true);
            let _ = consumer_handle.await;
            info!("Evaluator stopped");
            Ok(())
        }
        // A dead consumer means this binary has nothing left to do
        result = &mut consumer_handle => {
            let reason = match result {
                Ok(Err(e)) => format!("Evaluation consumer exited with error: {}", e),
                Ok(Ok(())) => "Evaluation consumer exited unexpectedly".to_string(),
                Err(e) => format!("Evaluation consumer task failed: {}", e),
            };
            error!("{}", reason);
            Err(reason.into())
        }
    }
}
