//! Argus Watcher - registration, polling orchestration, and dispatch.
//!
//! Wires the Stat Cache and Path Guard (`argus-core`), the Event Ring
//! (`argus-ring`), and the Audit Sink (`argus-audit`) into the single
//! `Watcher` object applications construct.

mod config;
mod poll;
mod watcher;

pub use config::{ErrorHandler, WatcherConfig};
pub use watcher::{CacheStats, Callback, Watcher};

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn config_with(dir: &tempfile::TempDir, poll_ms: u64) -> WatcherConfig {
        WatcherConfig {
            poll_interval: Duration::from_millis(poll_ms),
            audit: argus_audit::AuditConfig {
                enabled: true,
                output_file: Some(dir.path().join("audit.jsonl")),
                buffer_size: 1,
                flush_interval: Duration::ZERO,
                ..argus_audit::AuditConfig::default()
            },
            ..WatcherConfig::default()
        }
    }

    // S1 - modify detection (single file).
    #[tokio::test]
    async fn modify_is_detected_for_a_single_watched_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s1.json");
        std::fs::write(&path, r#"{"v":1}"#).unwrap();

        let watcher = Watcher::new(config_with(&dir, 30)).unwrap();
        let events = Arc::new(std::sync::Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);
        watcher
            .watch(path.to_str().unwrap(), move |event| {
                events_clone.lock().unwrap().push(event);
            })
            .await
            .unwrap();
        watcher.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.write_all(br#"{"v":2}"#).unwrap();
        drop(file);

        tokio::time::sleep(Duration::from_millis(120)).await;
        watcher.stop().await.unwrap();

        let collected = events.lock().unwrap();
        assert_eq!(collected.len(), 1);
        assert!(collected[0].is_modify);
        assert!(!collected[0].is_create);
        assert!(!collected[0].is_delete);
    }

    // S2 - delete then recreate.
    #[tokio::test]
    async fn delete_then_recreate_produces_two_ordered_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s2.json");
        std::fs::write(&path, "hello").unwrap();

        let watcher = Watcher::new(config_with(&dir, 30)).unwrap();
        let events = Arc::new(std::sync::Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);
        watcher
            .watch(path.to_str().unwrap(), move |event| {
                events_clone.lock().unwrap().push(event);
            })
            .await
            .unwrap();
        watcher.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        std::fs::remove_file(&path).unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        std::fs::write(&path, "back").unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        watcher.stop().await.unwrap();

        let collected = events.lock().unwrap();
        assert_eq!(collected.len(), 2);
        assert!(collected[0].is_delete);
        assert!(collected[1].is_create);
    }

    // S3 - path-traversal rejection.
    #[tokio::test]
    async fn traversal_path_is_rejected_without_invoking_callback() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = Watcher::new(config_with(&dir, 1000)).unwrap();
        let called = Arc::new(AtomicUsize::new(0));
        let called_clone = Arc::clone(&called);

        let result = watcher
            .watch("../../../etc/passwd", move |_| {
                called_clone.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert!(result.is_err());
        assert_eq!(called.load(Ordering::SeqCst), 0);

        let contents = std::fs::read_to_string(dir.path().join("audit.jsonl")).unwrap();
        assert!(contents.contains("path_traversal_attempt"));
    }

    // S4 - capacity enforcement.
    #[tokio::test]
    async fn registering_past_max_watched_files_fails_and_audits() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_with(&dir, 1000);
        config.max_watched_files = 5;
        let watcher = Watcher::new(config).unwrap();

        for i in 0..5 {
            let path = dir.path().join(format!("f{i}.json"));
            std::fs::write(&path, "x").unwrap();
            watcher.watch(path.to_str().unwrap(), |_| {}).await.unwrap();
        }
        assert_eq!(watcher.watched_files(), 5);

        let sixth = dir.path().join("f5.json");
        std::fs::write(&sixth, "x").unwrap();
        let result = watcher.watch(sixth.to_str().unwrap(), |_| {}).await;
        assert!(result.is_err());
        assert_eq!(watcher.watched_files(), 5);

        let contents = std::fs::read_to_string(dir.path().join("audit.jsonl")).unwrap();
        assert!(contents.contains("max_watched_files_exceeded"));
    }

    #[tokio::test]
    async fn start_twice_returns_busy_then_stop_without_start_returns_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = Watcher::new(config_with(&dir, 1000)).unwrap();
        assert!(watcher.start().await.is_ok());
        assert!(matches!(
            watcher.start().await,
            Err(argus_core::ArgusError::WatcherBusy)
        ));
        watcher.stop().await.unwrap();
        assert!(matches!(
            watcher.stop().await,
            Err(argus_core::ArgusError::WatcherStopped)
        ));
    }

    // `stopped` is terminal: once a watcher has been stopped, watch/unwatch/
    // start must all fail rather than silently resuming (spec section 4.5).
    #[tokio::test]
    async fn stopped_watcher_rejects_watch_unwatch_and_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terminal.json");
        std::fs::write(&path, "x").unwrap();

        let watcher = Watcher::new(config_with(&dir, 1000)).unwrap();
        watcher.watch(path.to_str().unwrap(), |_| {}).await.unwrap();
        watcher.start().await.unwrap();
        watcher.stop().await.unwrap();

        assert!(matches!(
            watcher.start().await,
            Err(argus_core::ArgusError::WatcherStopped)
        ));
        assert!(matches!(
            watcher.watch(path.to_str().unwrap(), |_| {}).await,
            Err(argus_core::ArgusError::WatcherStopped)
        ));
        assert!(matches!(
            watcher.unwatch(path.to_str().unwrap()).await,
            Err(argus_core::ArgusError::WatcherStopped)
        ));
    }

    #[tokio::test]
    async fn graceful_shutdown_rejects_non_positive_timeouts() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = Watcher::new(config_with(&dir, 1000)).unwrap();
        watcher.start().await.unwrap();
        let result = watcher.graceful_shutdown(Duration::ZERO).await;
        assert!(result.is_err());
        watcher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn unwatch_is_idempotent_and_clears_stat_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.json");
        std::fs::write(&path, "x").unwrap();
        let watcher = Watcher::new(config_with(&dir, 1000)).unwrap();
        watcher.watch(path.to_str().unwrap(), |_| {}).await.unwrap();
        assert_eq!(watcher.watched_files(), 1);

        watcher.unwatch(path.to_str().unwrap()).await.unwrap();
        assert_eq!(watcher.watched_files(), 0);
        assert_eq!(watcher.get_cache_stats().entries, 0);

        // Idempotent: unwatching an absent path is not an error.
        watcher.unwatch(path.to_str().unwrap()).await.unwrap();
    }
}
