//! Observability infrastructure: tracing and metrics descriptions.
//!
//! The library only emits `tracing` events and `metrics` records. Exporters
//! (OTLP, Prometheus) belong to the host and are installed there.

use crate::config::TrackerConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod metrics;

/// Initialize logging and describe the tracker metrics.
///
/// `default_level` applies when `RUST_LOG` is unset (e.g. `"info"` or
/// `"tracker_core=debug"`). Returns an error if a global subscriber is
/// already installed.
pub fn init(default_level: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true).with_level(true))
        .try_init()?;

    metrics::register_core_metrics();

    tracing::info!("Observability initialized (level: {})", default_level);
    Ok(())
}

/// [`init`] with the configured `log_level` as the default filter.
pub fn init_from_config(
    config: &TrackerConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init(&config.log_level)
}
