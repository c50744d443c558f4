//! Tracing and metrics bootstrap, grounded on the teacher's own
//! `init_tracing`/`init_metrics` in shape: an `EnvFilter` that falls back to
//! a config-derived level, and a Prometheus exporter bound to a plain HTTP
//! listener.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

pub fn init_tracing(logging: &LoggingConfig, debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { logging.level.as_str() };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(env_filter);
    match logging.format.as_str() {
        "json" => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        "compact" => registry.with(tracing_subscriber::fmt::layer().compact()).init(),
        _ => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
    Ok(())
}

pub fn init_metrics(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("installing Prometheus metrics exporter")?;
    tracing::info!(port, "metrics endpoint started");
    Ok(())
}
