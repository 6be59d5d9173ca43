//! Unit tests for the evaluation engine, with in-memory collaborators

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tradewatch::cache::{CacheEntry, IndicatorCache};
use tradewatch::db::{ConditionMatch, StrategyRules, StrategyStore};
use tradewatch::engine::EvaluationEngine;
use tradewatch::events::{EventPublisher, ACTION_REQUIRED_STREAM};
use tradewatch::models::events::IndicatorUpdateEvent;
use tradewatch::models::indicator::{Interval, SeriesPoint};
use tradewatch::models::strategy::{Action, Condition, Operator, Strategy};

const DATA_SOURCE: &str = "alphavantage";

struct FakeStore {
    matches: Vec<ConditionMatch>,
    rules: HashMap<i64, StrategyRules>,
    conditions_by_id: HashMap<i64, Condition>,
    strategies: HashMap<i64, Strategy>,
}

#[async_trait]
impl StrategyStore for FakeStore {
    async fn active_conditions(
        &self,
    ) -> Result<Vec<Condition>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Vec::new())
    }

    async fn conditions_matching(
        &self,
        indicator_type: &str,
        symbol: &str,
        interval: &str,
    ) -> Result<Vec<ConditionMatch>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self
            .matches
            .iter()
            .filter(|m| {
                m.condition.indicator_type == indicator_type
                    && m.condition.symbol.as_deref() == Some(symbol)
                    && m.condition.interval.map(|i| i.as_str()) == Some(interval)
            })
            .cloned()
            .collect())
    }

    async fn strategy_rules(
        &self,
        strategy_id: i64,
    ) -> Result<StrategyRules, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.rules.get(&strategy_id).cloned().unwrap_or_default())
    }

    async fn get_condition(
        &self,
        id: i64,
    ) -> Result<Option<Condition>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.conditions_by_id.get(&id).cloned())
    }

    async fn get_strategy(
        &self,
        id: i64,
    ) -> Result<Option<Strategy>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.strategies.get(&id).cloned())
    }
}

struct FakeCache {
    entries: HashMap<String, CacheEntry>,
}

#[async_trait]
impl IndicatorCache for FakeCache {
    async fn get(
        &self,
        fingerprint: &str,
    ) -> Result<Option<CacheEntry>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.entries.get(fingerprint).cloned())
    }

    async fn put(
        &self,
        _entry: &CacheEntry,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

#[derive(Default)]
struct RecordingPublisher {
    published: Mutex<Vec<(String, HashMap<String, String>)>>,
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(
        &self,
        stream: &str,
        fields: &[(String, String)],
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let mut published = self.published.lock().await;
        published.push((stream.to_string(), fields.iter().cloned().collect()));
        Ok(format!("0-{}", published.len()))
    }
}

fn active_strategies(ids: &[i64]) -> HashMap<i64, Strategy> {
    ids.iter()
        .map(|&id| {
            (
                id,
                Strategy {
                    id,
                    name: format!("strategy-{}", id),
                    active: true,
                    root_block_id: None,
                },
            )
        })
        .collect()
}

fn condition(id: i64, indicator_type: &str, operator: Operator, target: f64) -> Condition {
    Condition {
        id,
        indicator_type: indicator_type.to_string(),
        symbol: Some("AAPL".to_string()),
        interval: Some(Interval::Daily),
        parameters: BTreeMap::new(),
        operator,
        target_value: Some(target),
        target_condition_id: None,
    }
}

fn action(id: i64) -> Action {
    Action {
        id,
        action_type: "BUY".to_string(),
        parameters: BTreeMap::new(),
        order_index: 0,
    }
}

/// Cache entry whose series holds `values` sorted newest first
fn entry_for(cond: &Condition, values: &[f64]) -> (String, CacheEntry) {
    let fingerprint = cond.request(DATA_SOURCE).expect("resolvable").fingerprint();
    let now = Utc::now();
    let series: Vec<SeriesPoint> = values
        .iter()
        .enumerate()
        .map(|(i, &value)| SeriesPoint {
            timestamp: now - Duration::days(i as i64),
            value,
        })
        .collect();
    let entry = CacheEntry {
        fingerprint: fingerprint.clone(),
        series,
        metadata: HashMap::new(),
        fetched_at: now,
        ttl_seconds: 90_000,
    };
    (fingerprint, entry)
}

fn event_for(cond: &Condition) -> IndicatorUpdateEvent {
    let request = cond.request(DATA_SOURCE).expect("resolvable");
    IndicatorUpdateEvent {
        fingerprint: request.fingerprint(),
        indicator_type: request.indicator_type.clone(),
        symbol: request.symbol.clone(),
        interval: request.interval,
        parameters: request.parameters.clone(),
        last_refreshed: None,
        fetch_time: Utc::now(),
    }
}

fn engine(
    store: FakeStore,
    cache: FakeCache,
    publisher: Arc<RecordingPublisher>,
) -> EvaluationEngine {
    EvaluationEngine::new(
        Arc::new(store),
        Arc::new(cache),
        publisher,
        DATA_SOURCE,
        None,
    )
}

#[tokio::test]
async fn satisfied_strategy_fires_one_event_per_action() {
    let cond = condition(1, "SMA", Operator::GreaterThan, 150.0);
    let (fingerprint, entry) = entry_for(&cond, &[155.0, 149.0]);

    let store = FakeStore {
        matches: vec![ConditionMatch {
            strategy_id: 7,
            condition: cond.clone(),
        }],
        rules: HashMap::from([(
            7,
            StrategyRules {
                conditions: vec![cond.clone()],
                actions: vec![action(42), action(43)],
            },
        )]),
        conditions_by_id: HashMap::new(),
        strategies: active_strategies(&[7]),
    };
    let cache = FakeCache {
        entries: HashMap::from([(fingerprint.clone(), entry)]),
    };
    let publisher = Arc::new(RecordingPublisher::default());

    let published = engine(store, cache, publisher.clone())
        .handle_update(&event_for(&cond))
        .await
        .expect("evaluation should succeed");

    assert_eq!(published, 2);
    let events = publisher.published.lock().await;
    assert_eq!(events.len(), 2);
    for (stream, fields) in events.iter() {
        assert_eq!(stream, ACTION_REQUIRED_STREAM);
        assert_eq!(fields.get("strategy_id").map(String::as_str), Some("7"));
        assert_eq!(
            fields.get("triggering_indicator").map(String::as_str),
            Some(fingerprint.as_str())
        );
    }
    let action_ids: Vec<&str> = events
        .iter()
        .filter_map(|(_, f)| f.get("action_id").map(String::as_str))
        .collect();
    assert_eq!(action_ids, vec!["42", "43"]);
}

#[tokio::test]
async fn one_false_condition_blocks_the_strategy() {
    let passing = condition(1, "SMA", Operator::GreaterThan, 150.0);
    let failing = condition(2, "RSI", Operator::LessThan, 30.0);
    let (fp1, entry1) = entry_for(&passing, &[155.0]);
    let (fp2, entry2) = entry_for(&failing, &[65.0]);

    let store = FakeStore {
        matches: vec![ConditionMatch {
            strategy_id: 7,
            condition: passing.clone(),
        }],
        rules: HashMap::from([(
            7,
            StrategyRules {
                conditions: vec![passing.clone(), failing],
                actions: vec![action(42)],
            },
        )]),
        conditions_by_id: HashMap::new(),
        strategies: active_strategies(&[7]),
    };
    let cache = FakeCache {
        entries: HashMap::from([(fp1, entry1), (fp2, entry2)]),
    };
    let publisher = Arc::new(RecordingPublisher::default());

    let published = engine(store, cache, publisher.clone())
        .handle_update(&event_for(&passing))
        .await
        .expect("evaluation should succeed");

    assert_eq!(published, 0);
    assert!(publisher.published.lock().await.is_empty());
}

#[tokio::test]
async fn missing_cache_entry_means_no_trigger() {
    let cond = condition(1, "SMA", Operator::GreaterThan, 150.0);

    let store = FakeStore {
        matches: vec![ConditionMatch {
            strategy_id: 7,
            condition: cond.clone(),
        }],
        rules: HashMap::from([(
            7,
            StrategyRules {
                conditions: vec![cond.clone()],
                actions: vec![action(42)],
            },
        )]),
        conditions_by_id: HashMap::new(),
        strategies: active_strategies(&[7]),
    };
    let cache = FakeCache {
        entries: HashMap::new(),
    };
    let publisher = Arc::new(RecordingPublisher::default());

    let published = engine(store, cache, publisher.clone())
        .handle_update(&event_for(&cond))
        .await
        .expect("missing data is not an error");

    assert_eq!(published, 0);
}

#[tokio::test]
async fn parameter_equality_is_structural() {
    let mut cond = condition(1, "SMA", Operator::GreaterThan, 150.0);
    cond.parameters.insert("time_period".to_string(), json!(20));
    let (fingerprint, entry) = entry_for(&cond, &[155.0]);

    let store = FakeStore {
        matches: vec![ConditionMatch {
            strategy_id: 7,
            condition: cond.clone(),
        }],
        rules: HashMap::from([(
            7,
            StrategyRules {
                conditions: vec![cond.clone()],
                actions: vec![action(42)],
            },
        )]),
        conditions_by_id: HashMap::new(),
        strategies: active_strategies(&[7]),
    };
    let cache = FakeCache {
        entries: HashMap::from([(fingerprint, entry)]),
    };
    let publisher = Arc::new(RecordingPublisher::default());

    // Same indicator/symbol/interval but different parameters
    let mut event = event_for(&cond);
    event.parameters = BTreeMap::from([("time_period".to_string(), json!(50))]);

    let published = engine(store, cache, publisher.clone())
        .handle_update(&event)
        .await
        .expect("evaluation should succeed");

    assert_eq!(published, 0);
}

#[tokio::test]
async fn condition_compares_against_another_indicator() {
    let mut fast = condition(1, "SMA", Operator::GreaterThan, 0.0);
    fast.target_value = None;
    fast.target_condition_id = Some(2);
    let slow = condition(2, "EMA", Operator::GreaterThan, 0.0);

    let (fp_fast, entry_fast) = entry_for(&fast, &[155.0]);
    let (fp_slow, entry_slow) = entry_for(&slow, &[150.0]);

    let store = FakeStore {
        matches: vec![ConditionMatch {
            strategy_id: 7,
            condition: fast.clone(),
        }],
        rules: HashMap::from([(
            7,
            StrategyRules {
                conditions: vec![fast.clone()],
                actions: vec![action(42)],
            },
        )]),
        conditions_by_id: HashMap::from([(2, slow)]),
        strategies: active_strategies(&[7]),
    };
    let cache = FakeCache {
        entries: HashMap::from([(fp_fast, entry_fast), (fp_slow, entry_slow)]),
    };
    let publisher = Arc::new(RecordingPublisher::default());

    let published = engine(store, cache, publisher.clone())
        .handle_update(&event_for(&fast))
        .await
        .expect("evaluation should succeed");

    assert_eq!(published, 1);
}

#[tokio::test]
async fn uncached_target_condition_means_false() {
    let mut fast = condition(1, "SMA", Operator::GreaterThan, 0.0);
    fast.target_value = None;
    fast.target_condition_id = Some(2);
    let slow = condition(2, "EMA", Operator::GreaterThan, 0.0);
    let (fp_fast, entry_fast) = entry_for(&fast, &[155.0]);

    let store = FakeStore {
        matches: vec![ConditionMatch {
            strategy_id: 7,
            condition: fast.clone(),
        }],
        rules: HashMap::from([(
            7,
            StrategyRules {
                conditions: vec![fast.clone()],
                actions: vec![action(42)],
            },
        )]),
        conditions_by_id: HashMap::from([(2, slow)]),
        strategies: active_strategies(&[7]),
    };
    let cache = FakeCache {
        entries: HashMap::from([(fp_fast, entry_fast)]),
    };
    let publisher = Arc::new(RecordingPublisher::default());

    let published = engine(store, cache, publisher.clone())
        .handle_update(&event_for(&fast))
        .await
        .expect("missing target data is not an error");

    assert_eq!(published, 0);
}

#[tokio::test]
async fn crossover_fires_only_on_the_transition_tick() {
    let cond = condition(1, "SMA", Operator::CrossesAbove, 10.0);
    let store_for = |c: &Condition| FakeStore {
        matches: vec![ConditionMatch {
            strategy_id: 7,
            condition: c.clone(),
        }],
        rules: HashMap::from([(
            7,
            StrategyRules {
                conditions: vec![c.clone()],
                actions: vec![action(42)],
            },
        )]),
        conditions_by_id: HashMap::new(),
        strategies: active_strategies(&[7]),
    };

    // previous=9 -> current=11 crosses above 10
    let (fp, entry) = entry_for(&cond, &[11.0, 9.0]);
    let publisher = Arc::new(RecordingPublisher::default());
    let published = engine(
        store_for(&cond),
        FakeCache {
            entries: HashMap::from([(fp, entry)]),
        },
        publisher.clone(),
    )
    .handle_update(&event_for(&cond))
    .await
    .expect("evaluation should succeed");
    assert_eq!(published, 1);

    // previous=10.5 was already above: no crossover
    let (fp, entry) = entry_for(&cond, &[11.0, 10.5]);
    let publisher = Arc::new(RecordingPublisher::default());
    let published = engine(
        store_for(&cond),
        FakeCache {
            entries: HashMap::from([(fp, entry)]),
        },
        publisher.clone(),
    )
    .handle_update(&event_for(&cond))
    .await
    .expect("evaluation should succeed");
    assert_eq!(published, 0);
}

#[tokio::test]
async fn strategy_without_conditions_is_skipped() {
    let cond = condition(1, "SMA", Operator::GreaterThan, 150.0);
    let (fp, entry) = entry_for(&cond, &[155.0]);

    let store = FakeStore {
        matches: vec![ConditionMatch {
            strategy_id: 7,
            condition: cond.clone(),
        }],
        rules: HashMap::from([(7, StrategyRules::default())]),
        conditions_by_id: HashMap::new(),
        strategies: active_strategies(&[7]),
    };
    let cache = FakeCache {
        entries: HashMap::from([(fp, entry)]),
    };
    let publisher = Arc::new(RecordingPublisher::default());

    let published = engine(store, cache, publisher.clone())
        .handle_update(&event_for(&cond))
        .await
        .expect("evaluation should succeed");

    assert_eq!(published, 0);
}

#[tokio::test]
async fn satisfied_strategy_without_actions_publishes_nothing() {
    let cond = condition(1, "SMA", Operator::GreaterThan, 150.0);
    let (fp, entry) = entry_for(&cond, &[155.0]);

    let store = FakeStore {
        matches: vec![ConditionMatch {
            strategy_id: 7,
            condition: cond.clone(),
        }],
        rules: HashMap::from([(
            7,
            StrategyRules {
                conditions: vec![cond.clone()],
                actions: Vec::new(),
            },
        )]),
        conditions_by_id: HashMap::new(),
        strategies: active_strategies(&[7]),
    };
    let cache = FakeCache {
        entries: HashMap::from([(fp, entry)]),
    };
    let publisher = Arc::new(RecordingPublisher::default());

    let published = engine(store, cache, publisher.clone())
        .handle_update(&event_for(&cond))
        .await
        .expect("evaluation should succeed");

    assert_eq!(published, 0);
    assert!(publisher.published.lock().await.is_empty());
}

#[tokio::test]
async fn deactivated_strategy_is_skipped() {
    // Matching saw the strategy while active; it was deactivated before
    // its rules were evaluated
    let cond = condition(1, "SMA", Operator::GreaterThan, 150.0);
    let (fp, entry) = entry_for(&cond, &[155.0]);

    let mut strategies = active_strategies(&[7]);
    if let Some(strategy) = strategies.get_mut(&7) {
        strategy.active = false;
    }
    let store = FakeStore {
        matches: vec![ConditionMatch {
            strategy_id: 7,
            condition: cond.clone(),
        }],
        rules: HashMap::from([(
            7,
            StrategyRules {
                conditions: vec![cond.clone()],
                actions: vec![action(42)],
            },
        )]),
        conditions_by_id: HashMap::new(),
        strategies,
    };
    let cache = FakeCache {
        entries: HashMap::from([(fp, entry)]),
    };
    let publisher = Arc::new(RecordingPublisher::default());

    let published = engine(store, cache, publisher.clone())
        .handle_update(&event_for(&cond))
        .await
        .expect("evaluation should succeed");

    assert_eq!(published, 0);
    assert!(publisher.published.lock().await.is_empty());
}

#[tokio::test]
async fn redelivered_update_triggers_again() {
    // Delivery is at-least-once and the engine does not deduplicate;
    // the executor must key on action_id
    let cond = condition(1, "SMA", Operator::GreaterThan, 150.0);
    let (fp, entry) = entry_for(&cond, &[155.0]);

    let store = FakeStore {
        matches: vec![ConditionMatch {
            strategy_id: 7,
            condition: cond.clone(),
        }],
        rules: HashMap::from([(
            7,
            StrategyRules {
                conditions: vec![cond.clone()],
                actions: vec![action(42)],
            },
        )]),
        conditions_by_id: HashMap::new(),
        strategies: active_strategies(&[7]),
    };
    let cache = FakeCache {
        entries: HashMap::from([(fp, entry)]),
    };
    let publisher = Arc::new(RecordingPublisher::default());
    let engine = engine(store, cache, publisher.clone());

    let event = event_for(&cond);
    engine.handle_update(&event).await.expect("first delivery");
    engine.handle_update(&event).await.expect("redelivery");

    assert_eq!(publisher.published.lock().await.len(), 2);
}
