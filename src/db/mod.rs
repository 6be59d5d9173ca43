//! Read-only access to the external relational strategy store

mod postgres;

pub use postgres::PostgresStrategyStore;

use crate::models::strategy::{Action, Condition, Strategy};
use async_trait::async_trait;

/// A condition together with the active strategy it belongs to
#[derive(Debug, Clone)]
pub struct ConditionMatch {
    pub strategy_id: i64,
    pub condition: Condition,
}

/// The deduplicated flat sets of rules reachable from a strategy's blocks
#[derive(Debug, Clone, Default)]
pub struct StrategyRules {
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
}

/// Queries the core needs against strategy/condition/action definitions.
/// The core never mutates this store.
#[async_trait]
pub trait StrategyStore: Send + Sync {
    /// Conditions reachable from at least one block of an active strategy,
    /// deduplicated by condition id. Drives indicator discovery.
    async fn active_conditions(
        &self,
    ) -> Result<Vec<Condition>, Box<dyn std::error::Error + Send + Sync>>;

    /// Conditions of active strategies matching an indicator update's
    /// {type, symbol, interval}. Parameter equality is checked by the
    /// caller, structurally.
    async fn conditions_matching(
        &self,
        indicator_type: &str,
        symbol: &str,
        interval: &str,
    ) -> Result<Vec<ConditionMatch>, Box<dyn std::error::Error + Send + Sync>>;

    /// Flat, deduplicated condition and action sets reachable from any
    /// block of the given strategy.
    async fn strategy_rules(
        &self,
        strategy_id: i64,
    ) -> Result<StrategyRules, Box<dyn std::error::Error + Send + Sync>>;

    /// Single condition lookup, used to resolve condition-vs-condition
    /// comparison targets.
    async fn get_condition(
        &self,
        id: i64,
    ) -> Result<Option<Condition>, Box<dyn std::error::Error + Send + Sync>>;

    /// Single strategy lookup, used to re-check the active flag right
    /// before a strategy's rules are evaluated.
    async fn get_strategy(
        &self,
        id: i64,
    ) -> Result<Option<Strategy>, Box<dyn std::error::Error + Send + Sync>>;
}
