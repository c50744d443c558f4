//! Argus Audit - buffered, tamper-evident append-only JSONL audit sink.
//!
//! Every entry's checksum covers its own canonical bytes plus the previous
//! entry's checksum, so a single mutated byte anywhere in the log is
//! detectable by a linear scan ([`verify_chain`]).

mod config;
mod entry;
mod sink;
mod verify;

pub use config::AuditConfig;
pub use entry::{AuditEntry, AuditLevel};
pub use sink::AuditSink;
pub use verify::{verify_chain, ChainVerification};

use std::sync::Arc;
use std::time::Duration;

/// Spawn the periodic flush task for `sink`, if its configured
/// `flush_interval` is non-zero. Returns `None` when the interval is zero
/// (per spec, this means flush-on-buffer-full only) or the sink is
/// disabled. The caller (the Watcher) owns the returned handle and aborts
/// it on shutdown.
pub fn spawn_periodic_flush(
    sink: Arc<AuditSink>,
    flush_interval: Duration,
) -> Option<tokio::task::JoinHandle<()>> {
    if !sink.is_enabled() || flush_interval.is_zero() {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sink.flush();
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn periodic_flush_task_is_none_when_interval_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(AuditSink::new(AuditConfig {
            enabled: true,
            output_file: Some(dir.path().join("audit.jsonl")),
            ..AuditConfig::default()
        }));
        assert!(spawn_periodic_flush(sink, Duration::ZERO).is_none());
    }

    #[tokio::test]
    async fn periodic_flush_task_eventually_writes_buffered_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = Arc::new(AuditSink::new(AuditConfig {
            enabled: true,
            output_file: Some(path.clone()),
            buffer_size: 1_000, // large enough that only the ticker flushes
            ..AuditConfig::default()
        }));
        sink.log_file_watch("watch_start", "/tmp/s1.json");

        let handle = spawn_periodic_flush(Arc::clone(&sink), Duration::from_millis(20)).unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        handle.abort();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[test]
    fn log_security_event_preserves_caller_supplied_context() {
        let dir = tempfile::tempdir().unwrap();
        let sink = AuditSink::new(AuditConfig {
            enabled: true,
            output_file: Some(dir.path().join("audit.jsonl")),
            buffer_size: 1,
            ..AuditConfig::default()
        });
        let mut context = BTreeMap::new();
        context.insert(
            "path".to_string(),
            serde_json::Value::String("../../etc/passwd".to_string()),
        );
        sink.log_security_event("path_traversal_attempt", "rejected", context);

        let contents = std::fs::read_to_string(dir.path().join("audit.jsonl")).unwrap();
        assert!(contents.contains("path_traversal_attempt"));
        assert!(contents.contains("../../etc/passwd"));
    }
}
