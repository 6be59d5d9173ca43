//! Event log client over Redis streams
//!
//! Two append-only streams decouple the pipeline stages:
//! `indicator-updates` (fetcher → evaluation engine) and `action-required`
//! (evaluation engine → dispatcher). Consumer groups give per-message
//! acknowledgment and redelivery of unacknowledged messages; each message
//! is delivered to exactly one consumer instance per group.

use crate::config;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::{debug, info};

pub const INDICATOR_UPDATES_STREAM: &str = "indicator-updates";
pub const ACTION_REQUIRED_STREAM: &str = "action-required";

/// Bounded wait of one blocking group read
pub const READ_BLOCK_MS: u64 = 5_000;
const READ_COUNT: usize = 16;

/// One delivered stream entry, pending acknowledgment
#[derive(Debug, Clone)]
pub struct LogMessage {
    pub id: String,
    pub fields: HashMap<String, String>,
}

/// Producer-side seam so the fetcher and the engine can be tested with a
/// recording publisher instead of a live connection
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Append one entry; returns the assigned entry id
    async fn publish(
        &self,
        stream: &str,
        fields: &[(String, String)],
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;
}

/// Shared event log client. Constructed once per process and injected;
/// failure to connect at startup is fatal.
#[derive(Clone)]
pub struct EventLog {
    conn: ConnectionManager,
}

impl EventLog {
    pub async fn connect() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Self::connect_url(&config::get_redis_url()).await
    }

    pub async fn connect_url(
        url: &str,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let client = redis::Client::open(url).map_err(|e| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid Redis URL: {}", e),
            )) as Box<dyn std::error::Error + Send + Sync>
        })?;
        let conn = client.get_connection_manager().await.map_err(|e| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("Failed to connect to event log: {}", e),
            )) as Box<dyn std::error::Error + Send + Sync>
        })?;
        info!("Event log connected");
        Ok(Self { conn })
    }

    /// Create a consumer group if absent. "Group already exists" is
    /// swallowed; any other error is fatal to the consumer's startup.
    pub async fn ensure_group(
        &self,
        stream: &str,
        group: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.conn.clone();
        let result: Result<String, redis::RedisError> =
            conn.xgroup_create_mkstream(stream, group, "$").await;
        match result {
            Ok(_) => {
                info!(stream = %stream, group = %group, "Created consumer group {} on {}", group, stream);
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!(stream = %stream, group = %group, "Consumer group {} already exists on {}", group, stream);
                Ok(())
            }
            Err(e) => Err(Box::new(std::io::Error::other(format!(
                "Failed to create consumer group {} on {}: {}",
                group, stream, e
            )))),
        }
    }

    /// Blocking group read with a bounded wait. Returns an empty vec when
    /// the wait elapsed with nothing to deliver.
    pub async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
    ) -> Result<Vec<LogMessage>, Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.conn.clone();
        let options = StreamReadOptions::default()
            .group(group, consumer)
            .block(READ_BLOCK_MS as usize)
            .count(READ_COUNT);

        let reply: StreamReadReply = conn
            .xread_options(&[stream], &[">"], &options)
            .await
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Group read on {} failed: {}",
                    stream, e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;

        let mut messages = Vec::new();
        for key in reply.keys {
            for entry in key.ids {
                let mut fields = HashMap::new();
                for (name, value) in &entry.map {
                    if let Ok(text) = redis::from_redis_value::<String>(value) {
                        fields.insert(name.clone(), text);
                    }
                }
                messages.push(LogMessage {
                    id: entry.id.clone(),
                    fields,
                });
            }
        }
        Ok(messages)
    }

    /// Acknowledge one delivered message
    pub async fn ack(
        &self,
        stream: &str,
        group: &str,
        id: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.xack(stream, group, &[id]).await.map_err(|e| {
            Box::new(std::io::Error::other(format!(
                "Ack of {} on {} failed: {}",
                id, stream, e
            ))) as Box<dyn std::error::Error + Send + Sync>
        })?;
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for EventLog {
    async fn publish(
        &self,
        stream: &str,
        fields: &[(String, String)],
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.conn.clone();
        let id: String = conn.xadd(stream, "*", fields).await.map_err(|e| {
            Box::new(std::io::Error::other(format!(
                "Publish to {} failed: {}",
                stream, e
            ))) as Box<dyn std::error::Error + Send + Sync>
        })?;
        debug!(stream = %stream, id = %id, "Published event {} to {}", id, stream);
        Ok(id)
    }
}
