//! Tradewatch Dispatcher
//!
//! Consumer-group reader of action-required events. Hands each event to
//! the action executor collaborator at least once and acknowledges after
//! attempted delivery.

use dotenvy::dotenv;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tradewatch::config;
use tradewatch::dispatch::{ActionDispatcher, ActionExecutor, LoggingActionExecutor};
use tradewatch::events::EventLog;
use tradewatch::logging;
use tradewatch::metrics::Metrics;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    logging::init_logging();

    let env = config::get_environment();
    let group = config::get_dispatcher_group();
    let consumer = config::get_consumer_name();
    info!("Starting Tradewatch Dispatcher");
    info!(environment = %env, "Environment");
    info!(group = %group, consumer = %consumer, "Consumer identity: {}/{}", group, consumer);

    let metrics = Arc::new(Metrics::new()?);

    // Event log connection failure at startup is fatal by design
    info!("Connecting to event log...");
    let log = EventLog::connect().await?;

    let executor: Arc<dyn ActionExecutor> = Arc::new(LoggingActionExecutor);
    let dispatcher = ActionDispatcher::new(executor, Some(metrics));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut consumer_handle =
        tokio::spawn(async move { dispatcher.run(&log, &group, &consumer, shutdown_rx).await });

    info!("Dispatcher started, waiting for shutdown signal...");
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutting down dispatcher...");
            // The loop finishes its in-flight batch before exiting
            let _ = shutdown_tx.send(true);
            let _ = consumer_handle.await;
            info!("Dispatcher stopped");
            Ok(())
        }
        // A dead consumer means this binary has nothing left to do
        result = &mut consumer_handle => {
            let reason = match result {
                Ok(Err(e)) => format!("Dispatch consumer exited with error: {}", e),
                Ok(Ok(())) => "Dispatch consumer exited unexpectedly".to_string(),
                Err(e) => format!("Dispatch consumer task failed: {}", e),
            };
            error!("{}", reason);
            Err(reason.into())
        }
    }
}
