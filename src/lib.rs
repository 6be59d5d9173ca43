//! Tradewatch: continuous evaluation of trading strategies against
//! near-real-time indicator data
//!
//! Pipeline: discovery scheduler → fetcher/publisher → freshness cache +
//! indicator-updates stream → evaluation engine → action-required stream →
//! action dispatcher. Each stage runs as its own binary and scales
//! independently; the event log decouples them with at-least-once,
//! consumer-group delivery.

pub mod cache;
pub mod config;
pub mod core;
pub mod db;
pub mod dispatch;
pub mod engine;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
