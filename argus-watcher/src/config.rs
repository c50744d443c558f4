use std::sync::Arc;
use std::time::Duration;

use argus_audit::AuditConfig;
use argus_core::{ArgusError, ArgusResult};
use argus_ring::{default_capacity_for, Strategy};

/// Called for non-fatal stat errors encountered by the polling task.
pub type ErrorHandler = Arc<dyn Fn(&ArgusError, &str) + Send + Sync>;

/// Configuration accepted by [`crate::Watcher::new`]. Construct via
/// [`WatcherConfig::default`] and override fields, then call
/// [`WatcherConfig::normalize`] (done automatically by `Watcher::new`) to
/// apply defaults and validate the Universal Invariants.
#[derive(Clone)]
pub struct WatcherConfig {
    pub poll_interval: Duration,
    /// Zero means "derive from `poll_interval`" (see Open Question in
    /// design notes); normalization replaces it with `poll_interval / 2`.
    pub cache_ttl: Duration,
    pub max_watched_files: usize,
    pub audit: AuditConfig,
    pub error_handler: Option<ErrorHandler>,
    pub optimization_strategy: Strategy,
    /// Zero means "use the strategy's default capacity"; normalization
    /// rounds whatever is left up to the next power of two.
    pub boreas_lite_capacity: usize,
}

impl std::fmt::Debug for WatcherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherConfig")
            .field("poll_interval", &self.poll_interval)
            .field("cache_ttl", &self.cache_ttl)
            .field("max_watched_files", &self.max_watched_files)
            .field("optimization_strategy", &self.optimization_strategy)
            .field("boreas_lite_capacity", &self.boreas_lite_capacity)
            .field("has_error_handler", &self.error_handler.is_some())
            .finish()
    }
}

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

impl Default for WatcherConfig {
    fn default() -> Self {
        WatcherConfig {
            poll_interval: Duration::from_secs(5),
            cache_ttl: Duration::ZERO,
            max_watched_files: 100,
            audit: AuditConfig::default(),
            error_handler: None,
            optimization_strategy: Strategy::Auto,
            boreas_lite_capacity: 0,
        }
    }
}

impl WatcherConfig {
    /// Apply defaults (`cache_ttl = 0` -> `poll_interval / 2`, capacity `0`
    /// -> the strategy's default, rounded to a power of two) and validate
    /// the Universal Invariants. Returns `InvalidConfig` if a value is out
    /// of range after defaulting.
    pub fn normalize(mut self) -> ArgusResult<Self> {
        if self.poll_interval < MIN_POLL_INTERVAL {
            return Err(ArgusError::invalid_config(format!(
                "poll_interval must be at least {MIN_POLL_INTERVAL:?}, got {:?}",
                self.poll_interval
            )));
        }

        if self.cache_ttl.is_zero() {
            self.cache_ttl = self.poll_interval / 2;
        } else if self.cache_ttl > self.poll_interval {
            return Err(ArgusError::invalid_config(format!(
                "cache_ttl ({:?}) must not exceed poll_interval ({:?})",
                self.cache_ttl, self.poll_interval
            )));
        }

        if self.max_watched_files == 0 {
            return Err(ArgusError::invalid_config(
                "max_watched_files must be at least 1",
            ));
        }

        self.boreas_lite_capacity = if self.boreas_lite_capacity == 0 {
            default_capacity_for(self.optimization_strategy)
        } else {
            self.boreas_lite_capacity
        }
        .max(1)
        .next_power_of_two();

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_normalizes_without_error() {
        let config = WatcherConfig::default().normalize().unwrap();
        assert_eq!(config.cache_ttl, Duration::from_secs(2) + Duration::from_millis(500));
        assert_eq!(config.boreas_lite_capacity, 128);
    }

    #[test]
    fn poll_interval_below_minimum_is_rejected() {
        let config = WatcherConfig {
            poll_interval: Duration::from_millis(1),
            ..WatcherConfig::default()
        };
        assert!(config.normalize().is_err());
    }

    #[test]
    fn cache_ttl_exceeding_poll_interval_is_rejected() {
        let config = WatcherConfig {
            poll_interval: Duration::from_secs(1),
            cache_ttl: Duration::from_secs(2),
            ..WatcherConfig::default()
        };
        assert!(config.normalize().is_err());
    }

    #[test]
    fn boreas_capacity_rounds_up_to_power_of_two() {
        let config = WatcherConfig {
            boreas_lite_capacity: 100,
            ..WatcherConfig::default()
        }
        .normalize()
        .unwrap();
        assert_eq!(config.boreas_lite_capacity, 128);
    }

    #[test]
    fn max_watched_files_of_zero_is_rejected() {
        let config = WatcherConfig {
            max_watched_files: 0,
            ..WatcherConfig::default()
        };
        assert!(config.normalize().is_err());
    }
}
