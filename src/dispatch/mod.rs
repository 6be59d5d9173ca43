//! Action dispatcher: hands action-required events to the executor
//!
//! Contract: deliver each event to the executor at least once and
//! acknowledge after attempted delivery. Execution outcome handling
//! belongs to the executor collaborator.

use crate::events::{EventLog, ACTION_REQUIRED_STREAM};
use crate::metrics::Metrics;
use crate::models::events::ActionRequiredEvent;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// External collaborator that carries out a triggered action
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(
        &self,
        event: &ActionRequiredEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Default executor stub: logs the action it would carry out
pub struct LoggingActionExecutor;

#[async_trait]
impl ActionExecutor for LoggingActionExecutor {
    async fn execute(
        &self,
        event: &ActionRequiredEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(
            action_id = event.action_id,
            action_type = %event.action_type,
            strategy_id = event.strategy_id,
            triggering_indicator = %event.triggering_indicator,
            "Executing action {} ({}) for strategy {}",
            event.action_id,
            event.action_type,
            event.strategy_id
        );
        Ok(())
    }
}

pub struct ActionDispatcher {
    executor: Arc<dyn ActionExecutor>,
    metrics: Option<Arc<Metrics>>,
}

impl ActionDispatcher {
    pub fn new(executor: Arc<dyn ActionExecutor>, metrics: Option<Arc<Metrics>>) -> Self {
        Self { executor, metrics }
    }

    /// Consumer loop over the action-required stream. Completes the
    /// in-flight batch (including acks) before honoring shutdown.
    pub async fn run(
        &self,
        log: &EventLog,
        group: &str,
        consumer: &str,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        log.ensure_group(ACTION_REQUIRED_STREAM, group).await?;
        info!(
            group = %group,
            consumer = %consumer,
            "ActionDispatcher: consuming {} as {}/{}",
            ACTION_REQUIRED_STREAM,
            group,
            consumer
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let messages = match log.read_group(ACTION_REQUIRED_STREAM, group, consumer).await {
                Ok(messages) => messages,
                Err(e) => {
                    error!(error = %e, "ActionDispatcher: group read failed, retrying");
                    tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
                    continue;
                }
            };

            for message in messages {
                match ActionRequiredEvent::from_fields(&message.fields) {
                    Ok(event) => {
                        if let Err(e) = self.executor.execute(&event).await {
                            // Delivery was attempted; retrying here would
                            // loop forever, so the executor must key on
                            // action_id for idempotency
                            error!(
                                action_id = event.action_id,
                                error = %e,
                                "ActionDispatcher: executor failed for action {}, acknowledging anyway",
                                event.action_id
                            );
                        } else if let Some(ref metrics) = self.metrics {
                            metrics.actions_dispatched_total.inc();
                        }
                    }
                    Err(e) => {
                        warn!(
                            message_id = %message.id,
                            error = %e,
                            "ActionDispatcher: dropping malformed action event {}",
                            message.id
                        );
                    }
                }

                if let Err(e) = log.ack(ACTION_REQUIRED_STREAM, group, &message.id).await {
                    error!(message_id = %message.id, error = %e, "ActionDispatcher: ack failed");
                }
            }
        }

        info!("ActionDispatcher: consumer stopped");
        Ok(())
    }
}
