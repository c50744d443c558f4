//! TOML-loaded daemon configuration. Maps onto `argus_watcher::WatcherConfig`
//! and `argus_audit::AuditConfig`; does not attempt the environment-variable
//! merging or remote-config-provider layering those crates leave as external
//! collaborators.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use argus_audit::{AuditConfig, AuditLevel};
use argus_ring::Strategy;
use argus_watcher::WatcherConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DaemonConfig {
    /// Files registered with the watcher at startup.
    #[serde(default)]
    pub watch: Vec<PathBuf>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Zero derives `poll_interval_ms / 2`, matching `WatcherConfig`'s own default.
    #[serde(default)]
    pub cache_ttl_ms: u64,
    #[serde(default = "default_max_watched_files")]
    pub max_watched_files: usize,
    #[serde(default = "default_strategy")]
    pub optimization_strategy: String,
    /// Zero uses the strategy's default capacity.
    #[serde(default)]
    pub boreas_lite_capacity: usize,
    #[serde(default)]
    pub audit: DaemonAuditConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DaemonAuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub output_file: Option<PathBuf>,
    #[serde(default = "default_min_level")]
    pub min_level: String,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// One of `pretty`, `compact`, `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_true() -> bool {
    true
}
fn default_poll_interval_ms() -> u64 {
    5_000
}
fn default_max_watched_files() -> usize {
    100
}
fn default_strategy() -> String {
    "auto".to_string()
}
fn default_min_level() -> String {
    "info".to_string()
}
fn default_buffer_size() -> usize {
    100
}
fn default_flush_interval_ms() -> u64 {
    30_000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}
fn default_metrics_port() -> u16 {
    9090
}

impl Default for DaemonAuditConfig {
    fn default() -> Self {
        DaemonAuditConfig {
            enabled: default_true(),
            output_file: None,
            min_level: default_min_level(),
            buffer_size: default_buffer_size(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            watch: Vec::new(),
            poll_interval_ms: default_poll_interval_ms(),
            cache_ttl_ms: 0,
            max_watched_files: default_max_watched_files(),
            optimization_strategy: default_strategy(),
            boreas_lite_capacity: 0,
            audit: DaemonAuditConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl DaemonConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: DaemonConfig =
            toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    fn parse_strategy(&self) -> Result<Strategy> {
        match self.optimization_strategy.to_ascii_lowercase().as_str() {
            "auto" => Ok(Strategy::Auto),
            "single_event" => Ok(Strategy::SingleEvent),
            "small_batch" => Ok(Strategy::SmallBatch),
            "large_batch" => Ok(Strategy::LargeBatch),
            other => bail!(
                "unknown optimization_strategy {other:?}; expected one of auto, single_event, small_batch, large_batch"
            ),
        }
    }

    fn audit_level(&self) -> AuditLevel {
        match self.audit.min_level.to_ascii_lowercase().as_str() {
            "info" => AuditLevel::Info,
            "warn" | "warning" => AuditLevel::Warn,
            "critical" => AuditLevel::Critical,
            "security" => AuditLevel::Security,
            other => {
                tracing::warn!(level = other, "unrecognized audit min_level, defaulting to info");
                AuditLevel::Info
            }
        }
    }

    /// Build the `argus_watcher::WatcherConfig` this daemon config describes.
    /// Validates via `WatcherConfig::normalize` at construction time
    /// (`Watcher::new` calls it again, harmlessly, since normalization is
    /// idempotent).
    pub fn to_watcher_config(&self) -> Result<WatcherConfig> {
        let strategy = self.parse_strategy()?;
        let audit = AuditConfig {
            enabled: self.audit.enabled,
            output_file: self.audit.output_file.clone(),
            min_level: self.audit_level(),
            buffer_size: self.audit.buffer_size,
            flush_interval: Duration::from_millis(self.audit.flush_interval_ms),
            ..AuditConfig::default()
        };

        Ok(WatcherConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            cache_ttl: Duration::from_millis(self.cache_ttl_ms),
            max_watched_files: self.max_watched_files,
            audit,
            error_handler: None,
            optimization_strategy: strategy,
            boreas_lite_capacity: self.boreas_lite_capacity,
        })
    }
}
