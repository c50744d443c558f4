use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use argus_audit::{AuditLevel, AuditSink};
use argus_core::{
    now_ns, validate_path, ArgusError, ArgusResult, ChangeEvent, FileChangeEvent, FileStat,
    StatCache, WatchedFile,
};
use argus_ring::EventRing;
use dashmap::DashMap;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::WatcherConfig;
use crate::poll::{self, PollContext};

/// A registered path's entry in the watched-files mapping: the core
/// `WatchedFile` record (spec section 3's "owned exclusively by the
/// Watcher's watched-files mapping" entity) plus the dispatch-layer
/// callback, which is not part of the core data model.
pub(crate) struct WatchEntry {
    pub file: WatchedFile,
    pub callback: Callback,
}

pub type Callback = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Snapshot returned by [`Watcher::get_cache_stats`].
pub use argus_core::CacheStats;

/// Orchestrates registration, polling, dispatch and audit for a set of
/// watched files. States: `new -> running <-> stopped`; `stopped` is
/// terminal for a given instance (spec section 4.5). `running` alone
/// cannot distinguish `new` from `stopped` (both read `false`), so a
/// separate, monotonic `stopped` flag marks the terminal transition once
/// `stop`/`graceful_shutdown` commits to it.
pub struct Watcher {
    config: WatcherConfig,
    files: Arc<DashMap<String, WatchEntry>>,
    stat_cache: Arc<StatCache>,
    ring: Arc<EventRing>,
    audit: Arc<AuditSink>,
    running: Arc<AtomicBool>,
    stopped: AtomicBool,
    insert_lock: Mutex<()>,
    stop_signal: Arc<Notify>,
    consumer_task: Mutex<Option<JoinHandle<()>>>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    audit_flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl Watcher {
    pub fn new(config: WatcherConfig) -> ArgusResult<Self> {
        let config = config.normalize()?;
        let ring = Arc::new(EventRing::new(
            config.boreas_lite_capacity,
            config.optimization_strategy,
        ));
        let audit = Arc::new(AuditSink::new(config.audit.clone()));

        Ok(Watcher {
            config,
            files: Arc::new(DashMap::new()),
            stat_cache: Arc::new(StatCache::new()),
            ring,
            audit,
            running: Arc::new(AtomicBool::new(false)),
            stopped: AtomicBool::new(false),
            insert_lock: Mutex::new(()),
            stop_signal: Arc::new(Notify::new()),
            consumer_task: Mutex::new(None),
            poll_task: Mutex::new(None),
            audit_flush_task: Mutex::new(None),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn watched_files(&self) -> usize {
        self.files.len()
    }

    pub fn clear_cache(&self) {
        self.stat_cache.clear();
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        self.stat_cache.stats()
    }

    fn absolute_path_string(path: &str) -> ArgusResult<String> {
        let candidate = Path::new(path);
        let absolute: PathBuf = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| ArgusError::invalid_config(format!("cannot resolve cwd: {e}")))?
                .join(candidate)
        };
        Ok(absolute.to_string_lossy().into_owned())
    }

    /// Register `path` for watching. Runs the Path Guard on the raw form,
    /// the absolute form, and (if the path currently resolves) the
    /// symlink target, emitting a SECURITY audit entry and returning
    /// `InvalidConfig` on any rejection.
    pub async fn watch<F>(&self, path: &str, callback: F) -> ArgusResult<()>
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        if self.stopped.load(Ordering::Acquire) {
            return Err(ArgusError::WatcherStopped);
        }

        self.reject_if_unsafe(path)?;

        let absolute = Self::absolute_path_string(path)?;
        self.reject_if_unsafe(&absolute)?;

        if let Ok(resolved) = std::fs::canonicalize(&absolute) {
            let resolved_str = resolved.to_string_lossy().into_owned();
            if resolved_str != absolute {
                self.reject_if_unsafe(&resolved_str)?;
                if argus_core::target_prefix_is_protected(&resolved_str) {
                    self.audit_rejection(&resolved_str, "target prefix is a protected system path");
                    return Err(ArgusError::invalid_config(
                        "symlink target resolves into a protected system path",
                    ));
                }
            }
        }

        let _guard = self.insert_lock.lock().await;

        if self.files.len() >= self.config.max_watched_files {
            let mut context = BTreeMap::new();
            context.insert(
                "max_files".to_string(),
                serde_json::Value::from(self.config.max_watched_files),
            );
            context.insert(
                "current_files".to_string(),
                serde_json::Value::from(self.files.len()),
            );
            self.audit
                .log_security_event("max_watched_files_exceeded", "registration capacity exceeded", context);
            return Err(ArgusError::invalid_config(format!(
                "max_watched_files ({}) exceeded",
                self.config.max_watched_files
            )));
        }

        let initial_stat = self
            .stat_cache
            .refresh(&absolute)
            .unwrap_or_else(|_| FileStat::missing(now_ns()));

        self.files.insert(
            absolute.clone(),
            WatchEntry {
                file: WatchedFile::new(absolute.clone(), initial_stat),
                callback: Arc::new(callback),
            },
        );
        drop(_guard);

        self.ring.adapt_strategy(self.files.len());
        self.audit.log_file_watch("watch_start", &absolute);
        debug!(path = %absolute, watched = self.files.len(), "registered watched file");
        Ok(())
    }

    fn reject_if_unsafe(&self, path: &str) -> ArgusResult<()> {
        if let Err(rejection) = validate_path(path) {
            let mut context = BTreeMap::new();
            context.insert("path".to_string(), serde_json::Value::String(path.to_string()));
            self.audit
                .log_security_event(rejection.event_label(), rejection.to_string(), context);
            return Err(ArgusError::invalid_config(rejection.to_string()));
        }
        Ok(())
    }

    fn audit_rejection(&self, path: &str, reason: &str) {
        let mut context = BTreeMap::new();
        context.insert("path".to_string(), serde_json::Value::String(path.to_string()));
        self.audit
            .log_security_event("protected_path_access", reason, context);
    }

    /// Remove `path` (absolutized the same way `watch` does). No error if
    /// the path isn't currently registered.
    pub async fn unwatch(&self, path: &str) -> ArgusResult<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(ArgusError::WatcherStopped);
        }

        let absolute = Self::absolute_path_string(path)?;
        let _guard = self.insert_lock.lock().await;
        self.files.remove(&absolute);
        drop(_guard);
        self.stat_cache.remove(&absolute);
        self.ring.adapt_strategy(self.files.len());
        debug!(path = %absolute, watched = self.files.len(), "unwatched file");
        Ok(())
    }

    pub async fn start(&self) -> ArgusResult<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(ArgusError::WatcherStopped);
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ArgusError::WatcherBusy);
        }

        self.ring.start();

        let ring = Arc::clone(&self.ring);
        let files = Arc::clone(&self.files);
        let audit = Arc::clone(&self.audit);
        let consumer = tokio::task::spawn_blocking(move || {
            ring.run_consumer(|slot| dispatch(slot, &files, &audit));
        });
        *self.consumer_task.lock().await = Some(consumer);

        let poll_ctx = Arc::new(PollContext {
            files: Arc::clone(&self.files),
            stat_cache: Arc::clone(&self.stat_cache),
            ring: Arc::clone(&self.ring),
            error_handler: self.config.error_handler.clone(),
        });
        let running = Arc::clone(&self.running);
        let stop_signal = Arc::clone(&self.stop_signal);
        let poll_interval = self.config.poll_interval;
        let poll = tokio::spawn(async move {
            poll::run(poll_interval, poll_ctx, running, stop_signal).await;
        });
        *self.poll_task.lock().await = Some(poll);

        if let Some(handle) =
            argus_audit::spawn_periodic_flush(Arc::clone(&self.audit), self.config.audit.flush_interval)
        {
            *self.audit_flush_task.lock().await = Some(handle);
        }

        info!(
            watched = self.files.len(),
            poll_interval = ?self.config.poll_interval,
            "watcher started"
        );
        Ok(())
    }

    /// Stop the watcher: cancels the polling task, drains and stops the
    /// event ring's consumer, and closes the audit sink. Safe to call
    /// once; a second call returns `WatcherStopped`.
    pub async fn stop(&self) -> ArgusResult<()> {
        if self
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ArgusError::WatcherStopped);
        }
        self.stopped.store(true, Ordering::Release);
        self.teardown().await;
        Ok(())
    }

    /// Alias for [`Watcher::stop`].
    pub async fn close(&self) -> ArgusResult<()> {
        self.stop().await
    }

    async fn teardown(&self) {
        self.ring.stop();
        self.stop_signal.notify_waiters();

        if let Some(handle) = self.consumer_task.lock().await.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.poll_task.lock().await.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.audit_flush_task.lock().await.take() {
            handle.abort();
        }
        self.audit.close();
        info!("watcher stopped");
    }

    /// Like [`Watcher::stop`], but bounds teardown by `timeout`. If the
    /// deadline passes before teardown completes, returns a `Timeout`
    /// error — teardown itself keeps running in the background so the
    /// watcher still reaches a consistent stopped state eventually.
    pub async fn graceful_shutdown(&self, timeout: Duration) -> ArgusResult<()> {
        if timeout.is_zero() {
            return Err(ArgusError::invalid_config(
                "graceful_shutdown timeout must be positive",
            ));
        }
        if !self.is_running() {
            return Err(ArgusError::WatcherStopped);
        }
        if self
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ArgusError::WatcherStopped);
        }
        self.stopped.store(true, Ordering::Release);

        self.ring.stop();
        self.stop_signal.notify_waiters();

        let consumer_task = self.consumer_task.lock().await.take();
        let poll_task = self.poll_task.lock().await.take();
        let audit_flush_task = self.audit_flush_task.lock().await.take();
        let audit = Arc::clone(&self.audit);

        let teardown = tokio::spawn(async move {
            if let Some(h) = consumer_task {
                let _ = h.await;
            }
            if let Some(h) = poll_task {
                let _ = h.await;
            }
            if let Some(h) = audit_flush_task {
                h.abort();
            }
            audit.close();
        });

        match tokio::time::timeout(timeout, teardown).await {
            Ok(_) => Ok(()),
            Err(_) => {
                warn!(?timeout, "graceful shutdown timed out; teardown continues in background");
                Err(ArgusError::timeout(
                    timeout.as_millis() as u64,
                    timeout.as_millis() as u64,
                ))
            }
        }
    }
}

/// The event-ring consumer's processor function: reconstructs the public
/// `ChangeEvent`, invokes the registered callback behind a panic barrier,
/// and emits the INFO/SECURITY audit entries spec section 4.5 describes.
fn dispatch(slot: &FileChangeEvent, files: &DashMap<String, WatchEntry>, audit: &AuditSink) {
    let event = ChangeEvent::from(slot);

    let callback = match files.get(&event.path) {
        Some(entry) => Arc::clone(&entry.callback),
        None => return,
    };

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        (callback)(event.clone());
    }));

    if outcome.is_err() {
        warn!(path = %event.path, "callback panicked; continuing");
        let mut context = BTreeMap::new();
        context.insert("path".to_string(), serde_json::Value::String(event.path.clone()));
        audit.log(
            AuditLevel::Security,
            "callback_panic",
            "argus",
            Some(event.path.clone()),
            None,
            None,
            context,
        );
    }

    audit.log_file_watch("file_changed", &event.path);
}
