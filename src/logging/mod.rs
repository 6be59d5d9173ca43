//! Tracing initialization
//!
//! Production emits structured JSON for log aggregation; every other
//! environment gets the human-readable ANSI formatter.

use crate::config;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if production() {
        tracing_subscriber::registry()
            .with(filter)
            .with(base_layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(base_layer().with_ansi(true))
            .init();
    }
}

fn production() -> bool {
    matches!(config::get_environment().as_str(), "production" | "prod")
}

// Call sites are spread across three binaries, so file and line stay on
fn base_layer<S>() -> fmt::Layer<S> {
    fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
}
