//! Prometheus metrics for the pipeline stages

use prometheus::{Gauge, Histogram, HistogramOpts, IntCounter, Opts, Registry};

pub struct Metrics {
    pub registry: Registry,

    pub indicator_fetches_total: IntCounter,
    pub cache_hits_total: IntCounter,
    pub fetch_failures_total: IntCounter,
    pub events_published_total: IntCounter,
    pub strategies_triggered_total: IntCounter,
    pub actions_dispatched_total: IntCounter,
    pub evaluation_duration_seconds: Histogram,

    pub cache_connected: Gauge,
    pub database_connected: Gauge,
    pub scheduled_indicators: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let registry = Registry::new();

        let indicator_fetches_total = IntCounter::with_opts(Opts::new(
            "indicator_fetches_total",
            "Upstream indicator fetches performed",
        ))?;
        let cache_hits_total = IntCounter::with_opts(Opts::new(
            "cache_hits_total",
            "Refresh ticks served from the freshness cache",
        ))?;
        let fetch_failures_total = IntCounter::with_opts(Opts::new(
            "fetch_failures_total",
            "Fetch cycles aborted on provider failure",
        ))?;
        let events_published_total = IntCounter::with_opts(Opts::new(
            "events_published_total",
            "Events appended to the event log",
        ))?;
        let strategies_triggered_total = IntCounter::with_opts(Opts::new(
            "strategies_triggered_total",
            "Strategies whose conditions all evaluated true",
        ))?;
        let actions_dispatched_total = IntCounter::with_opts(Opts::new(
            "actions_dispatched_total",
            "Action events handed to the executor",
        ))?;
        let evaluation_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "evaluation_duration_seconds",
            "Time spent evaluating one indicator update",
        ))?;

        let cache_connected =
            Gauge::with_opts(Opts::new("cache_connected", "Redis cache connectivity"))?;
        let database_connected = Gauge::with_opts(Opts::new(
            "database_connected",
            "Strategy store connectivity",
        ))?;
        let scheduled_indicators = Gauge::with_opts(Opts::new(
            "scheduled_indicators",
            "Recurring refresh tasks currently scheduled",
        ))?;

        registry.register(Box::new(indicator_fetches_total.clone()))?;
        registry.register(Box::new(cache_hits_total.clone()))?;
        registry.register(Box::new(fetch_failures_total.clone()))?;
        registry.register(Box::new(events_published_total.clone()))?;
        registry.register(Box::new(strategies_triggered_total.clone()))?;
        registry.register(Box::new(actions_dispatched_total.clone()))?;
        registry.register(Box::new(evaluation_duration_seconds.clone()))?;
        registry.register(Box::new(cache_connected.clone()))?;
        registry.register(Box::new(database_connected.clone()))?;
        registry.register(Box::new(scheduled_indicators.clone()))?;

        Ok(Self {
            registry,
            indicator_fetches_total,
            cache_hits_total,
            fetch_failures_total,
            events_published_total,
            strategies_triggered_total,
            actions_dispatched_total,
            evaluation_duration_seconds,
            cache_connected,
            database_connected,
            scheduled_indicators,
        })
    }
}
