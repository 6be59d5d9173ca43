//! Freshness cache for fetched indicator series
//!
//! Keyed by indicator fingerprint, backed by Redis with TTL-based expiry.
//! Entries expire passively; there is no eviction sweep. A stored value
//! that no longer parses is treated as absent (logged, not rethrown).

use crate::config;
use crate::models::indicator::SeriesPoint;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

const KEY_PREFIX: &str = "indicator:";

/// One cached indicator series with its provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    /// Time-indexed points, sorted descending by timestamp
    pub series: Vec<SeriesPoint>,
    pub metadata: HashMap<String, String>,
    pub fetched_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl CacheEntry {
    /// Most recent point of the series
    pub fn latest(&self) -> Option<&SeriesPoint> {
        self.series.first()
    }

    /// Point immediately preceding the most recent one
    pub fn previous(&self) -> Option<&SeriesPoint> {
        self.series.get(1)
    }
}

/// Key/value store of indicator series, read by freshness checks and by
/// the evaluation engine
#[async_trait]
pub trait IndicatorCache: Send + Sync {
    async fn get(
        &self,
        fingerprint: &str,
    ) -> Result<Option<CacheEntry>, Box<dyn std::error::Error + Send + Sync>>;

    async fn put(
        &self,
        entry: &CacheEntry,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Redis-backed freshness cache. `SET .. EX ttl` on write, plain `GET`
/// on read; expiry is handled entirely by Redis.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Self::with_url(&config::get_redis_url()).await
    }

    pub async fn with_url(url: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let client = redis::Client::open(url).map_err(|e| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid Redis URL: {}", e),
            )) as Box<dyn std::error::Error + Send + Sync>
        })?;
        let conn = client.get_connection_manager().await.map_err(|e| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("Failed to connect to Redis: {}", e),
            )) as Box<dyn std::error::Error + Send + Sync>
        })?;
        Ok(Self { conn })
    }

    fn key(fingerprint: &str) -> String {
        format!("{}{}", KEY_PREFIX, fingerprint)
    }
}

#[async_trait]
impl IndicatorCache for RedisCache {
    async fn get(
        &self,
        fingerprint: &str,
    ) -> Result<Option<CacheEntry>, Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(Self::key(fingerprint)).await.map_err(|e| {
            Box::new(std::io::Error::other(format!("Cache read failed: {}", e)))
                as Box<dyn std::error::Error + Send + Sync>
        })?;

        match raw {
            Some(json) => match serde_json::from_str::<CacheEntry>(&json) {
                Ok(entry) => {
                    debug!(fingerprint = %fingerprint, "Cache hit");
                    Ok(Some(entry))
                }
                Err(e) => {
                    // Malformed stored value is treated as absent
                    warn!(
                        fingerprint = %fingerprint,
                        error = %e,
                        "Discarding malformed cache entry for {}",
                        fingerprint
                    );
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        entry: &CacheEntry,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let json = serde_json::to_string(entry).map_err(|e| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Failed to serialize cache entry: {}", e),
            )) as Box<dyn std::error::Error + Send + Sync>
        })?;

        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(Self::key(&entry.fingerprint), json, entry.ttl_seconds)
            .await
            .map_err(|e| {
                Box::new(std::io::Error::other(format!("Cache write failed: {}", e)))
                    as Box<dyn std::error::Error + Send + Sync>
            })?;

        debug!(
            fingerprint = %entry.fingerprint,
            ttl = entry.ttl_seconds,
            points = entry.series.len(),
            "Cached {} points for {} (ttl {}s)",
            entry.series.len(),
            entry.fingerprint,
            entry.ttl_seconds
        );
        Ok(())
    }
}
