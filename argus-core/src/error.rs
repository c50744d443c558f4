use thiserror::Error;

/// Semantic error kinds produced by the Argus core.
///
/// These map directly onto spec section 7: each variant is a distinct
/// *kind*, not a wrapped OS error — callers match on the variant, not on
/// its message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgusError {
    /// A nil callback, unsafe path, out-of-range configuration value, or
    /// `max_watched_files` exceeded.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// A stat syscall failed for a reason other than "does not exist".
    #[error("failed to stat {path}: {reason}")]
    FileNotFound { path: String, reason: String },

    /// The operation requires a running watcher, but it is stopped.
    #[error("watcher is stopped")]
    WatcherStopped,

    /// `start()` was called on an already-running watcher.
    #[error("watcher is already running")]
    WatcherBusy,

    /// Reserved for collaborators (e.g. remote-configuration providers);
    /// never produced by this core.
    #[error("configuration not found")]
    ConfigNotFound,

    /// `graceful_shutdown` exceeded its budget.
    #[error("graceful shutdown timed out after {elapsed_ms} ms (budget {budget_ms} ms)")]
    Timeout { elapsed_ms: u64, budget_ms: u64 },
}

impl ArgusError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        ArgusError::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub fn file_not_found(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ArgusError::FileNotFound {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(elapsed_ms: u64, budget_ms: u64) -> Self {
        ArgusError::Timeout {
            elapsed_ms,
            budget_ms,
        }
    }

    /// Short machine-stable label, used as the `reason`/`event` field of
    /// audit entries so downstream tooling can group on it.
    pub fn kind_label(&self) -> &'static str {
        match self {
            ArgusError::InvalidConfig { .. } => "invalid_config",
            ArgusError::FileNotFound { .. } => "file_not_found",
            ArgusError::WatcherStopped => "watcher_stopped",
            ArgusError::WatcherBusy => "watcher_busy",
            ArgusError::ConfigNotFound => "config_not_found",
            ArgusError::Timeout { .. } => "timeout",
        }
    }
}

pub type ArgusResult<T> = Result<T, ArgusError>;
