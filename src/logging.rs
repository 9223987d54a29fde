//! Tracing setup
//!
//! The crate only emits `tracing` events; installing a subscriber is up to
//! the application. These helpers install the usual one: an env-driven
//! filter and JSON output.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "entgraph=info";

fn filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into())
}

/// Install the global subscriber; fails if one is already installed.
pub fn try_init() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(filter())
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()?;
    Ok(())
}

/// Install the global subscriber, ignoring an already installed one.
pub fn init() {
    if try_init().is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Human-readable output for tests, captured by the test harness.
pub fn init_for_tests() {
    let _ = tracing_subscriber::registry()
        .with(filter())
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
