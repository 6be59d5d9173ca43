//! Strategy, block, condition and action data models
//!
//! These mirror the rows of the external relational store. The core only
//! reads them; creation and editing happen through a separate CRUD surface.

use crate::models::indicator::{IndicatorRequest, Interval};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A user-defined strategy: a tree of blocks rooted at `root_block_id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: i64,
    pub name: String,
    pub active: bool,
    pub root_block_id: Option<i64>,
}

/// Block node type within a strategy tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockType {
    Root,
    Weight,
    Asset,
    Group,
    ConditionIf,
    Filter,
    Action,
}

impl BlockType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ROOT" => Some(BlockType::Root),
            "WEIGHT" => Some(BlockType::Weight),
            "ASSET" => Some(BlockType::Asset),
            "GROUP" => Some(BlockType::Group),
            "CONDITION_IF" => Some(BlockType::ConditionIf),
            "FILTER" => Some(BlockType::Filter),
            "ACTION" => Some(BlockType::Action),
            _ => None,
        }
    }
}

/// One node of a strategy's block tree. Conditions and actions are shared
/// references, possibly reused across blocks and strategies, never owned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: i64,
    pub strategy_id: i64,
    pub block_type: BlockType,
    pub parent_id: Option<i64>,
    pub order_index: i32,
    pub condition_id: Option<i64>,
    pub action_id: Option<i64>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

/// Comparison operator applied to an indicator value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    CrossesAbove,
    CrossesBelow,
}

impl Operator {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "EQUALS" => Some(Operator::Equals),
            "NOT_EQUALS" => Some(Operator::NotEquals),
            "GREATER_THAN" => Some(Operator::GreaterThan),
            "GREATER_THAN_OR_EQUAL" => Some(Operator::GreaterThanOrEqual),
            "LESS_THAN" => Some(Operator::LessThan),
            "LESS_THAN_OR_EQUAL" => Some(Operator::LessThanOrEqual),
            "CROSSES_ABOVE" => Some(Operator::CrossesAbove),
            "CROSSES_BELOW" => Some(Operator::CrossesBelow),
            _ => None,
        }
    }
}

/// A single comparison rule over one indicator.
///
/// Invariant (enforced at write time by the CRUD collaborator):
/// exactly one of `target_value` and `target_condition_id` is set.
/// A set `target_condition_id` makes this an indicator-vs-indicator
/// comparison, resolved through the cache with one level of indirection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub id: i64,
    pub indicator_type: String,
    pub symbol: Option<String>,
    pub interval: Option<Interval>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    pub operator: Operator,
    pub target_value: Option<f64>,
    pub target_condition_id: Option<i64>,
}

impl Condition {
    /// Build the indicator request this condition depends on. Returns
    /// `None` when symbol or interval is unresolved; such conditions are
    /// excluded from scheduling and evaluate false.
    pub fn request(&self, data_source: &str) -> Option<IndicatorRequest> {
        let symbol = self.symbol.clone()?;
        let interval = self.interval?;
        Some(IndicatorRequest {
            indicator_type: self.indicator_type.clone(),
            symbol,
            interval,
            parameters: self.parameters.clone(),
            data_source: data_source.to_string(),
        })
    }
}

/// An action fired when its strategy's conditions are all satisfied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: i64,
    pub action_type: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    pub order_index: i32,
}
