//! External collaborator clients

pub mod alphavantage;
pub mod market_data;

pub use alphavantage::AlphaVantageProvider;
pub use market_data::{IndicatorResponse, MarketDataProvider};
