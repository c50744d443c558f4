use std::path::PathBuf;
use std::time::Duration;

use crate::entry::AuditLevel;

/// Configuration for an [`crate::AuditSink`]. Mirrors the `audit.*` surface
/// of the Watcher's own configuration one-to-one.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub enabled: bool,
    pub output_file: Option<PathBuf>,
    pub min_level: AuditLevel,
    pub buffer_size: usize,
    /// Zero disables the periodic flush task; entries still flush once
    /// the buffer reaches `buffer_size`.
    pub flush_interval: Duration,
    /// Unused by this crate; parsed and preserved for collaborators that
    /// read the same configuration surface.
    pub include_stack: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        AuditConfig {
            enabled: true,
            output_file: None,
            min_level: AuditLevel::Info,
            buffer_size: 100,
            flush_interval: Duration::from_secs(30),
            include_stack: false,
        }
    }
}
