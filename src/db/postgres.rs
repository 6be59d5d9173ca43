//! PostgreSQL implementation of the strategy store queries

use crate::config;
use crate::db::{ConditionMatch, StrategyRules, StrategyStore};
use crate::models::indicator::Interval;
use crate::models::strategy::{Action, Condition, Operator, Strategy};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_postgres::{Client, NoTls, Row};

const CONDITION_COLUMNS: &str = "c.id, c.indicator_type, c.symbol, c.interval, \
     c.params_json, c.operator, c.target_value, c.target_condition_id";

pub struct PostgresStrategyStore {
    client: Arc<RwLock<Option<Client>>>,
}

impl PostgresStrategyStore {
    pub async fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Self::with_url(&config::get_database_url()).await
    }

    pub async fn with_url(url: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let (client, connection) = tokio_postgres::connect(url, NoTls).await.map_err(|e| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("Failed to connect to strategy store: {}", e),
            )) as Box<dyn std::error::Error + Send + Sync>
        })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "Strategy store connection error");
            }
        });

        Ok(Self {
            client: Arc::new(RwLock::new(Some(client))),
        })
    }

    fn row_to_condition(row: &Row) -> Result<Condition, Box<dyn std::error::Error + Send + Sync>> {
        let id: i64 = row.get("id");
        let indicator_type: String = row.get("indicator_type");
        let symbol: Option<String> = row.get("symbol");
        let interval_raw: Option<String> = row.get("interval");
        let interval = interval_raw.as_deref().and_then(Interval::parse);
        let params_json: Option<String> = row.get("params_json");
        let parameters: BTreeMap<String, Value> = match params_json {
            Some(json) => serde_json::from_str(&json).map_err(|e| {
                Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Malformed parameters for condition {}: {}", id, e),
                )) as Box<dyn std::error::Error + Send + Sync>
            })?,
            None => BTreeMap::new(),
        };
        let operator_raw: String = row.get("operator");
        let operator = Operator::parse(&operator_raw).ok_or_else(|| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Unknown operator '{}' on condition {}", operator_raw, id),
            )) as Box<dyn std::error::Error + Send + Sync>
        })?;

        Ok(Condition {
            id,
            indicator_type,
            symbol,
            interval,
            parameters,
            operator,
            target_value: row.get("target_value"),
            target_condition_id: row.get("target_condition_id"),
        })
    }

    fn row_to_action(row: &Row) -> Result<Action, Box<dyn std::error::Error + Send + Sync>> {
        let id: i64 = row.get("id");
        let params_json: Option<String> = row.get("params_json");
        let parameters: BTreeMap<String, Value> = match params_json {
            Some(json) => serde_json::from_str(&json).map_err(|e| {
                Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Malformed parameters for action {}: {}", id, e),
                )) as Box<dyn std::error::Error + Send + Sync>
            })?,
            None => BTreeMap::new(),
        };

        Ok(Action {
            id,
            action_type: row.get("action_type"),
            parameters,
            order_index: row.get("order_index"),
        })
    }
}

#[async_trait]
impl StrategyStore for PostgresStrategyStore {
    async fn active_conditions(
        &self,
    ) -> Result<Vec<Condition>, Box<dyn std::error::Error + Send + Sync>> {
        let client = self.client.read().await;
        if let Some(ref c) = *client {
            let query = format!(
                "SELECT DISTINCT {}
                 FROM conditions c
                 JOIN blocks b ON b.condition_id = c.id
                 JOIN strategies s ON s.id = b.strategy_id
                 WHERE s.active = TRUE",
                CONDITION_COLUMNS
            );
            let rows = c.query(&query, &[]).await.map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Failed to query active conditions: {}",
                    e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;

            rows.iter().map(Self::row_to_condition).collect()
        } else {
            Ok(Vec::new())
        }
    }

    async fn conditions_matching(
        &self,
        indicator_type: &str,
        symbol: &str,
        interval: &str,
    ) -> Result<Vec<ConditionMatch>, Box<dyn std::error::Error + Send + Sync>> {
        let client = self.client.read().await;
        if let Some(ref c) = *client {
            let query = format!(
                "SELECT DISTINCT s.id AS strategy_id, {}
                 FROM conditions c
                 JOIN blocks b ON b.condition_id = c.id
                 JOIN strategies s ON s.id = b.strategy_id
                 WHERE s.active = TRUE
                   AND c.indicator_type = $1
                   AND c.symbol = $2
                   AND c.interval = $3",
                CONDITION_COLUMNS
            );
            let rows = c
                .query(&query, &[&indicator_type, &symbol, &interval])
                .await
                .map_err(|e| {
                    Box::new(std::io::Error::other(format!(
                        "Failed to query matching conditions: {}",
                        e
                    ))) as Box<dyn std::error::Error + Send + Sync>
                })?;

            let mut matches = Vec::new();
            for row in &rows {
                matches.push(ConditionMatch {
                    strategy_id: row.get("strategy_id"),
                    condition: Self::row_to_condition(row)?,
                });
            }
            Ok(matches)
        } else {
            Ok(Vec::new())
        }
    }

    async fn strategy_rules(
        &self,
        strategy_id: i64,
    ) -> Result<StrategyRules, Box<dyn std::error::Error + Send + Sync>> {
        let client = self.client.read().await;
        if let Some(ref c) = *client {
            let condition_query = format!(
                "SELECT DISTINCT {}
                 FROM conditions c
                 JOIN blocks b ON b.condition_id = c.id
                 WHERE b.strategy_id = $1",
                CONDITION_COLUMNS
            );
            let condition_rows =
                c.query(&condition_query, &[&strategy_id]).await.map_err(|e| {
                    Box::new(std::io::Error::other(format!(
                        "Failed to query strategy conditions: {}",
                        e
                    ))) as Box<dyn std::error::Error + Send + Sync>
                })?;

            let action_rows = c
                .query(
                    "SELECT DISTINCT a.id, a.action_type, a.params_json, a.order_index
                     FROM actions a
                     JOIN blocks b ON b.action_id = a.id
                     WHERE b.strategy_id = $1
                     ORDER BY a.order_index, a.id",
                    &[&strategy_id],
                )
                .await
                .map_err(|e| {
                    Box::new(std::io::Error::other(format!(
                        "Failed to query strategy actions: {}",
                        e
                    ))) as Box<dyn std::error::Error + Send + Sync>
                })?;

            let conditions = condition_rows
                .iter()
                .map(Self::row_to_condition)
                .collect::<Result<Vec<_>, _>>()?;
            let actions = action_rows
                .iter()
                .map(Self::row_to_action)
                .collect::<Result<Vec<_>, _>>()?;

            Ok(StrategyRules {
                conditions,
                actions,
            })
        } else {
            Ok(StrategyRules::default())
        }
    }

    async fn get_condition(
        &self,
        id: i64,
    ) -> Result<Option<Condition>, Box<dyn std::error::Error + Send + Sync>> {
        let client = self.client.read().await;
        if let Some(ref c) = *client {
            let query = format!(
                "SELECT {} FROM conditions c WHERE c.id = $1",
                CONDITION_COLUMNS
            );
            let rows = c.query(&query, &[&id]).await.map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Failed to query condition {}: {}",
                    id, e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;

            match rows.first() {
                Some(row) => Ok(Some(Self::row_to_condition(row)?)),
                None => Ok(None),
            }
        } else {
            Ok(None)
        }
    }

    async fn get_strategy(
        &self,
        id: i64,
    ) -> Result<Option<Strategy>, Box<dyn std::error::Error + Send + Sync>> {
        let client = self.client.read().await;
        if let Some(ref c) = *client {
            let rows = c
                .query(
                    "SELECT id, name, active, root_block_id FROM strategies WHERE id = $1",
                    &[&id],
                )
                .await
                .map_err(|e| {
                    Box::new(std::io::Error::other(format!(
                        "Failed to query strategy {}: {}",
                        id, e
                    ))) as Box<dyn std::error::Error + Send + Sync>
                })?;

            Ok(rows.first().map(|row| Strategy {
                id: row.get("id"),
                name: row.get("name"),
                active: row.get("active"),
                root_block_id: row.get("root_block_id"),
            }))
        } else {
            Ok(None)
        }
    }
}
