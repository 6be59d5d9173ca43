//! Cron-based discovery scheduler for recurring indicator refresh tasks
//!
//! Each discovery tick scans the conditions of active strategies, dedups
//! them by fingerprint and diffs the result against the running task map:
//! new fingerprints get a recurring refresh task, vanished ones get theirs
//! cancelled. The task map is the only shared mutable state here and is
//! held behind a mutex so a discovery tick never races a cancellation.

use crate::core::fetcher::IndicatorRefresher;
use crate::db::StrategyStore;
use crate::metrics::Metrics;
use crate::models::indicator::IndicatorRequest;
use cron::Schedule;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

struct ScheduledTask {
    handle: tokio::task::JoinHandle<()>,
}

pub struct DiscoveryScheduler {
    store: Arc<dyn StrategyStore>,
    refresher: Arc<dyn IndicatorRefresher>,
    schedule: Schedule,
    data_source: String,
    tasks: Arc<Mutex<HashMap<String, ScheduledTask>>>,
    handle: Arc<RwLock<Option<tokio::task::JoinHandle<()>>>>,
    metrics: Option<Arc<Metrics>>,
}

impl DiscoveryScheduler {
    /// Create a scheduler that scans for active conditions every
    /// `interval_seconds`. The interval must map onto the cron grid:
    /// a whole number of minutes, or a divisor of one minute. Zero and
    /// misaligned values are rejected.
    pub fn new(
        store: Arc<dyn StrategyStore>,
        refresher: Arc<dyn IndicatorRefresher>,
        interval_seconds: u64,
        data_source: &str,
        metrics: Option<Arc<Metrics>>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        if interval_seconds == 0 {
            return Err("Discovery disabled: interval_seconds is 0".into());
        }

        // Cron format: second minute hour day month weekday
        let cron_expr = if interval_seconds >= 60 {
            if interval_seconds % 60 != 0 {
                return Err(format!(
                    "Discovery interval {}s is not a whole number of minutes",
                    interval_seconds
                )
                .into());
            }
            format!("0 */{} * * * *", interval_seconds / 60)
        } else {
            if 60 % interval_seconds != 0 {
                return Err(format!(
                    "Discovery interval {}s does not divide evenly into one minute",
                    interval_seconds
                )
                .into());
            }
            format!("*/{} * * * * *", interval_seconds)
        };

        let schedule = Schedule::from_str(&cron_expr).map_err(|e| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid cron expression '{}': {}", cron_expr, e),
            )) as Box<dyn std::error::Error + Send + Sync>
        })?;

        info!(
            interval = interval_seconds,
            cron = %cron_expr,
            "DiscoveryScheduler: created with interval {}s (cron: {})",
            interval_seconds,
            cron_expr
        );

        Ok(Self {
            store,
            refresher,
            schedule,
            data_source: data_source.to_string(),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            handle: Arc::new(RwLock::new(None)),
            metrics,
        })
    }

    /// Run one discovery tick: scan, dedup by fingerprint, diff against
    /// the running task map.
    pub async fn discover_once(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let conditions = self.store.active_conditions().await?;

        let mut discovered: HashMap<String, IndicatorRequest> = HashMap::new();
        for condition in &conditions {
            match condition.request(&self.data_source) {
                Some(request) => {
                    discovered.insert(request.fingerprint(), request);
                }
                None => {
                    // Not fatal, just unschedulable until the row is fixed
                    warn!(
                        condition_id = condition.id,
                        indicator = %condition.indicator_type,
                        "Skipping condition {} without resolvable symbol/interval",
                        condition.id
                    );
                }
            }
        }

        let mut tasks = self.tasks.lock().await;

        let removed: Vec<String> = tasks
            .keys()
            .filter(|fp| !discovered.contains_key(*fp))
            .cloned()
            .collect();
        for fingerprint in removed {
            if let Some(task) = tasks.remove(&fingerprint) {
                task.handle.abort();
                info!(fingerprint = %fingerprint, "Cancelled refresh task for {}", fingerprint);
            }
        }

        for (fingerprint, request) in discovered {
            if tasks.contains_key(&fingerprint) {
                continue;
            }
            let handle = Self::spawn_refresh_task(self.refresher.clone(), request);
            tasks.insert(fingerprint.clone(), ScheduledTask { handle });
            info!(fingerprint = %fingerprint, "Scheduled refresh task for {}", fingerprint);
        }

        if let Some(ref metrics) = self.metrics {
            metrics.scheduled_indicators.set(tasks.len() as f64);
        }
        debug!(
            scheduled = tasks.len(),
            "Discovery tick complete, {} refresh tasks scheduled",
            tasks.len()
        );
        Ok(())
    }

    fn spawn_refresh_task(
        refresher: Arc<dyn IndicatorRefresher>,
        request: IndicatorRequest,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(request.interval.refresh_period());
            loop {
                ticker.tick().await;
                if let Err(e) = refresher.refresh(&request, false).await {
                    warn!(
                        fingerprint = %request.fingerprint(),
                        error = %e,
                        "Refresh tick failed for {}",
                        request.fingerprint()
                    );
                }
            }
        })
    }

    /// Start the recurring discovery loop
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let scheduler = self.clone_for_task();
        let schedule = self.schedule.clone();
        let handle_arc = self.handle.clone();

        let handle = tokio::spawn(async move {
            info!("DiscoveryScheduler: started");

            // Initial scan before the first cron tick so new deployments
            // pick up the active set immediately
            if let Err(e) = scheduler.discover_once().await {
                error!(error = %e, "DiscoveryScheduler: initial discovery failed");
            }

            loop {
                let mut upcoming = schedule.upcoming(chrono::Utc);
                if let Some(next_tick) = upcoming.next() {
                    let now = chrono::Utc::now();
                    if next_tick > now {
                        let duration = (next_tick - now).to_std().unwrap_or_default();
                        tokio::time::sleep(duration).await;
                    }
                } else {
                    tokio::time::sleep(tokio::time::Duration::from_secs(60)).await;
                    continue;
                }

                if let Err(e) = scheduler.discover_once().await {
                    error!(error = %e, "DiscoveryScheduler: discovery tick failed");
                }
            }
        });

        {
            let mut h = handle_arc.write().await;
            *h = Some(handle);
        }

        info!("DiscoveryScheduler: started successfully");
        Ok(())
    }

    fn clone_for_task(&self) -> DiscoveryScheduler {
        DiscoveryScheduler {
            store: self.store.clone(),
            refresher: self.refresher.clone(),
            schedule: self.schedule.clone(),
            data_source: self.data_source.clone(),
            tasks: self.tasks.clone(),
            handle: self.handle.clone(),
            metrics: self.metrics.clone(),
        }
    }

    /// Stop the discovery loop and cancel all outstanding refresh tasks
    pub async fn stop(&self) {
        {
            let mut handle = self.handle.write().await;
            if let Some(h) = handle.take() {
                h.abort();
            }
        }
        let mut tasks = self.tasks.lock().await;
        for (fingerprint, task) in tasks.drain() {
            task.handle.abort();
            debug!(fingerprint = %fingerprint, "Cancelled refresh task for {}", fingerprint);
        }
        info!("DiscoveryScheduler: stopped");
    }

    /// Fingerprints with a live refresh task, sorted
    pub async fn scheduled_fingerprints(&self) -> Vec<String> {
        let tasks = self.tasks.lock().await;
        let mut fingerprints: Vec<String> = tasks.keys().cloned().collect();
        fingerprints.sort();
        fingerprints
    }

    /// Check if the discovery loop is running
    pub async fn is_running(&self) -> bool {
        let handle = self.handle.read().await;
        handle.is_some()
    }
}
