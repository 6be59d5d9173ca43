//! Evaluation engine: matches indicator updates to the strategies that
//! depend on them and publishes action-required events when every
//! condition of a strategy holds
//!
//! Conditions attached to a strategy's blocks are collapsed into one flat,
//! deduplicated set and evaluated under AND semantics with short-circuit;
//! nested group/if-else tree evaluation is out of scope. Delivery is
//! at-least-once: processing errors are logged and the message is
//! acknowledged anyway, so the downstream executor must treat the action
//! id as an idempotency key.

pub mod operators;

use crate::cache::IndicatorCache;
use crate::db::{StrategyRules, StrategyStore};
use crate::events::{EventLog, EventPublisher, ACTION_REQUIRED_STREAM, INDICATOR_UPDATES_STREAM};
use crate::metrics::Metrics;
use crate::models::events::{ActionRequiredEvent, IndicatorUpdateEvent};
use crate::models::strategy::Condition;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub struct EvaluationEngine {
    store: Arc<dyn StrategyStore>,
    cache: Arc<dyn IndicatorCache>,
    publisher: Arc<dyn EventPublisher>,
    data_source: String,
    metrics: Option<Arc<Metrics>>,
}

impl EvaluationEngine {
    pub fn new(
        store: Arc<dyn StrategyStore>,
        cache: Arc<dyn IndicatorCache>,
        publisher: Arc<dyn EventPublisher>,
        data_source: &str,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            store,
            cache,
            publisher,
            data_source: data_source.to_string(),
            metrics,
        }
    }

    /// Consumer loop over the indicator-updates stream. Completes the
    /// in-flight batch (including acks) before honoring shutdown.
    pub async fn run(
        &self,
        log: &EventLog,
        group: &str,
        consumer: &str,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        log.ensure_group(INDICATOR_UPDATES_STREAM, group).await?;
        info!(
            group = %group,
            consumer = %consumer,
            "EvaluationEngine: consuming {} as {}/{}",
            INDICATOR_UPDATES_STREAM,
            group,
            consumer
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let messages = match log
                .read_group(INDICATOR_UPDATES_STREAM, group, consumer)
                .await
            {
                Ok(messages) => messages,
                Err(e) => {
                    error!(error = %e, "EvaluationEngine: group read failed, retrying");
                    tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
                    continue;
                }
            };

            for message in messages {
                match IndicatorUpdateEvent::from_fields(&message.fields) {
                    Ok(event) => {
                        let start = Instant::now();
                        if let Err(e) = self.handle_update(&event).await {
                            // At-least-once trade-off: ack below regardless,
                            // to avoid an unbounded redelivery loop
                            error!(
                                fingerprint = %event.fingerprint,
                                error = %e,
                                "EvaluationEngine: processing failed for {}, acknowledging anyway",
                                event.fingerprint
                            );
                        }
                        if let Some(ref metrics) = self.metrics {
                            metrics
                                .evaluation_duration_seconds
                                .observe(start.elapsed().as_secs_f64());
                        }
                    }
                    Err(e) => {
                        warn!(
                            message_id = %message.id,
                            error = %e,
                            "EvaluationEngine: dropping malformed indicator update {}",
                            message.id
                        );
                    }
                }

                if let Err(e) = log.ack(INDICATOR_UPDATES_STREAM, group, &message.id).await {
                    error!(message_id = %message.id, error = %e, "EvaluationEngine: ack failed");
                }
            }
        }

        info!("EvaluationEngine: consumer stopped");
        Ok(())
    }

    /// Evaluate every strategy affected by one indicator update. Returns
    /// the number of action-required events published.
    pub async fn handle_update(
        &self,
        event: &IndicatorUpdateEvent,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        let matches = self
            .store
            .conditions_matching(&event.indicator_type, &event.symbol, event.interval.as_str())
            .await?;

        // Parameter equality is structural, not fuzzy
        let strategy_ids: BTreeSet<i64> = matches
            .iter()
            .filter(|m| m.condition.parameters == event.parameters)
            .map(|m| m.strategy_id)
            .collect();

        if strategy_ids.is_empty() {
            debug!(
                fingerprint = %event.fingerprint,
                "No active strategy depends on {}",
                event.fingerprint
            );
            return Ok(0);
        }

        let mut published = 0;
        for strategy_id in strategy_ids {
            // The matching query saw an active strategy; it may have been
            // deactivated since, so re-check before evaluating its rules
            match self.store.get_strategy(strategy_id).await? {
                Some(strategy) if strategy.active => {}
                _ => {
                    debug!(
                        strategy_id,
                        "Strategy {} no longer active, skipping", strategy_id
                    );
                    continue;
                }
            }

            let rules = self.store.strategy_rules(strategy_id).await?;
            if rules.conditions.is_empty() {
                debug!(strategy_id, "Strategy {} has no conditions, skipping", strategy_id);
                continue;
            }

            if !self.all_conditions_hold(&rules).await? {
                debug!(
                    strategy_id,
                    fingerprint = %event.fingerprint,
                    "Strategy {} not satisfied this cycle",
                    strategy_id
                );
                continue;
            }

            published += self.fire_actions(strategy_id, &rules, event).await;
        }

        Ok(published)
    }

    /// AND over the strategy's flat condition set, short-circuiting at the
    /// first false or unresolvable condition.
    async fn all_conditions_hold(
        &self,
        rules: &StrategyRules,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        for condition in &rules.conditions {
            if !self.evaluate_condition(condition).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn evaluate_condition(
        &self,
        condition: &Condition,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let request = match condition.request(&self.data_source) {
            Some(request) => request,
            None => {
                warn!(
                    condition_id = condition.id,
                    "Condition {} has no resolvable symbol/interval, evaluating false",
                    condition.id
                );
                return Ok(false);
            }
        };

        let entry = match self.cache.get(&request.fingerprint()).await? {
            Some(entry) => entry,
            // Missing dependency data: false, not an error
            None => return Ok(false),
        };
        let current = match entry.latest() {
            Some(point) => point.value,
            None => return Ok(false),
        };
        let previous = entry.previous().map(|point| point.value);

        let target = match self.resolve_target(condition).await? {
            Some(target) => target,
            None => return Ok(false),
        };

        Ok(operators::compare(condition.operator, current, previous, target))
    }

    /// Comparison target: the fixed value, or the latest cached value of
    /// the referenced condition's own indicator. Exactly one level of
    /// indirection; the reference is resolved through the cache, never by
    /// recursing into evaluation.
    async fn resolve_target(
        &self,
        condition: &Condition,
    ) -> Result<Option<f64>, Box<dyn std::error::Error + Send + Sync>> {
        if let Some(value) = condition.target_value {
            return Ok(Some(value));
        }

        let target_id = match condition.target_condition_id {
            Some(id) => id,
            None => {
                warn!(
                    condition_id = condition.id,
                    "Condition {} has neither target value nor target condition",
                    condition.id
                );
                return Ok(None);
            }
        };

        let target_condition = match self.store.get_condition(target_id).await? {
            Some(target_condition) => target_condition,
            None => {
                warn!(
                    condition_id = condition.id,
                    target_id,
                    "Target condition {} of condition {} not found",
                    target_id,
                    condition.id
                );
                return Ok(None);
            }
        };

        let request = match target_condition.request(&self.data_source) {
            Some(request) => request,
            None => return Ok(None),
        };
        let entry = match self.cache.get(&request.fingerprint()).await? {
            Some(entry) => entry,
            None => return Ok(None),
        };
        Ok(entry.latest().map(|point| point.value))
    }

    /// Publish one action-required event per action of a satisfied
    /// strategy. Returns the number of events published.
    async fn fire_actions(
        &self,
        strategy_id: i64,
        rules: &StrategyRules,
        event: &IndicatorUpdateEvent,
    ) -> usize {
        if let Some(ref metrics) = self.metrics {
            metrics.strategies_triggered_total.inc();
        }

        if rules.actions.is_empty() {
            info!(
                strategy_id,
                fingerprint = %event.fingerprint,
                "Strategy {} satisfied but has no actions",
                strategy_id
            );
            return 0;
        }

        let mut published = 0;
        for action in &rules.actions {
            let action_event = ActionRequiredEvent {
                action_id: action.id,
                action_type: action.action_type.clone(),
                parameters: action.parameters.clone(),
                strategy_id,
                triggering_indicator: event.fingerprint.clone(),
            };
            match self
                .publisher
                .publish(ACTION_REQUIRED_STREAM, &action_event.to_fields())
                .await
            {
                Ok(id) => {
                    info!(
                        strategy_id,
                        action_id = action.id,
                        event_id = %id,
                        "Strategy {} satisfied, action {} required",
                        strategy_id,
                        action.id
                    );
                    if let Some(ref metrics) = self.metrics {
                        metrics.events_published_total.inc();
                    }
                    published += 1;
                }
                Err(e) => {
                    error!(
                        strategy_id,
                        action_id = action.id,
                        error = %e,
                        "Failed to publish action-required event for action {}",
                        action.id
                    );
                }
            }
        }
        published
    }
}
