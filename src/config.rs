//! Environment-based configuration accessors

use std::env;

pub fn get_environment() -> String {
    env::var("ENVIRONMENT").unwrap_or_else(|_| "sandbox".to_string())
}

pub fn get_redis_url() -> String {
    env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

pub fn get_database_url() -> String {
    env::var("DATABASE_URL")
        .unwrap_or_else(|_| "host=localhost user=tradewatch dbname=tradewatch".to_string())
}

pub fn get_market_data_base_url() -> String {
    env::var("MARKET_DATA_BASE_URL")
        .unwrap_or_else(|_| "https://www.alphavantage.co/query".to_string())
}

pub fn get_market_data_api_key() -> String {
    env::var("MARKET_DATA_API_KEY").unwrap_or_else(|_| "demo".to_string())
}

pub fn get_data_source() -> String {
    env::var("DATA_SOURCE").unwrap_or_else(|_| "alphavantage".to_string())
}

/// Wall-clock period of the discovery scan, in seconds
pub fn get_discovery_interval_seconds() -> u64 {
    env::var("DISCOVERY_INTERVAL_SECONDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(60)
}

pub fn get_evaluator_group() -> String {
    env::var("EVALUATOR_GROUP").unwrap_or_else(|_| "evaluators".to_string())
}

pub fn get_dispatcher_group() -> String {
    env::var("DISPATCHER_GROUP").unwrap_or_else(|_| "dispatchers".to_string())
}

/// Name of this consumer instance within its group. Defaults to a
/// pid-derived name so parallel instances stay distinct.
pub fn get_consumer_name() -> String {
    env::var("CONSUMER_NAME").unwrap_or_else(|_| format!("consumer-{}", std::process::id()))
}
