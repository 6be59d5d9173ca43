//! Discovery scheduling and indicator refresh

pub mod fetcher;
pub mod scheduler;

pub use fetcher::{IndicatorFetcher, IndicatorRefresher};
pub use scheduler::DiscoveryScheduler;
