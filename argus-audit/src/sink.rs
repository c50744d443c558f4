//! The buffered, hash-chained append-only audit sink.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::config::AuditConfig;
use crate::entry::{AuditEntry, AuditLevel};

type ErrorHandler = Box<dyn Fn(&str) + Send + Sync>;

struct Enabled {
    file: Mutex<File>,
    buffer: Mutex<Vec<AuditEntry>>,
    last_checksum: Mutex<String>,
}

/// The audit sink. Constructing one never fails: if the target file or its
/// directory can't be created, the sink silently becomes disabled and logs
/// a warning — per spec, "the Watcher tolerates this and continues without
/// audit".
pub struct AuditSink {
    inner: Option<Enabled>,
    config: AuditConfig,
    error_handler: Mutex<Option<ErrorHandler>>,
}

fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

impl AuditSink {
    pub fn new(config: AuditConfig) -> Self {
        if !config.enabled {
            return AuditSink {
                inner: None,
                config,
                error_handler: Mutex::new(None),
            };
        }

        let inner = match &config.output_file {
            Some(path) => match Self::open(path) {
                Ok(file) => Some(Enabled {
                    file: Mutex::new(file),
                    buffer: Mutex::new(Vec::with_capacity(config.buffer_size)),
                    last_checksum: Mutex::new(String::new()),
                }),
                Err(err) => {
                    warn!(error = %err, path = %path.display(), "failed to open audit output file; audit disabled");
                    None
                }
            },
            None => {
                warn!("audit enabled but no output_file configured; audit disabled");
                None
            }
        };

        AuditSink {
            inner,
            config,
            error_handler: Mutex::new(None),
        }
    }

    fn open(path: &std::path::Path) -> std::io::Result<File> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        OpenOptions::new().create(true).append(true).open(path)
    }

    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.error_handler.lock().unwrap() = Some(Box::new(handler));
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Core logging contract: filtered by `min_level`, checksummed against
    /// the chain, buffered, and flushed once the buffer is full.
    pub fn log(
        &self,
        level: AuditLevel,
        event: impl Into<String>,
        component: impl Into<String>,
        file_path: Option<String>,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
        context: BTreeMap<String, serde_json::Value>,
    ) {
        let Some(inner) = &self.inner else {
            return;
        };
        if level < self.config.min_level {
            return;
        }

        let mut entry = AuditEntry {
            timestamp_ns: now_ns(),
            level,
            event: event.into(),
            component: component.into(),
            file_path,
            old_value,
            new_value,
            context,
            process_id: std::process::id(),
            checksum: String::new(),
        };

        let should_flush = {
            let mut last_checksum = inner.last_checksum.lock().unwrap();
            entry.checksum = entry.compute_checksum(&last_checksum);
            *last_checksum = entry.checksum.clone();

            let mut buffer = inner.buffer.lock().unwrap();
            buffer.push(entry);
            buffer.len() >= self.config.buffer_size.max(1)
        };

        if should_flush {
            self.flush();
        }
    }

    /// Serialize every buffered entry as one JSON line, append to the
    /// file, and clear the buffer. I/O errors are reported through the
    /// configured error handler (or a stderr fallback) and never
    /// propagated to the caller.
    pub fn flush(&self) {
        let Some(inner) = &self.inner else {
            return;
        };

        let entries = {
            let mut buffer = inner.buffer.lock().unwrap();
            if buffer.is_empty() {
                return;
            }
            std::mem::take(&mut *buffer)
        };

        let result = (|| -> std::io::Result<()> {
            let mut file = inner.file.lock().unwrap();
            for entry in &entries {
                let line = serde_json::to_string(entry)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                writeln!(file, "{line}")?;
            }
            file.flush()
        })();

        if let Err(err) = result {
            self.report_error(&format!("audit flush failed: {err}"));
        }
    }

    pub fn close(&self) {
        self.flush();
    }

    fn report_error(&self, message: &str) {
        let handler = self.error_handler.lock().unwrap();
        match handler.as_ref() {
            Some(f) => f(message),
            None => eprintln!("argus audit: {message}"),
        }
    }

    pub fn log_file_watch(&self, event: impl Into<String>, path: impl Into<String>) {
        self.log(
            AuditLevel::Info,
            event,
            "argus",
            Some(path.into()),
            None,
            None,
            BTreeMap::new(),
        );
    }

    pub fn log_config_change(
        &self,
        path: impl Into<String>,
        old_value: serde_json::Value,
        new_value: serde_json::Value,
    ) {
        self.log(
            AuditLevel::Info,
            "config_change",
            "argus",
            Some(path.into()),
            Some(old_value),
            Some(new_value),
            BTreeMap::new(),
        );
    }

    pub fn log_security_event(
        &self,
        event: impl Into<String>,
        message: impl Into<String>,
        mut context: BTreeMap<String, serde_json::Value>,
    ) {
        context
            .entry("message".to_string())
            .or_insert_with(|| serde_json::Value::String(message.into()));
        self.log(
            AuditLevel::Security,
            event,
            "argus",
            None,
            None,
            None,
            context,
        );
    }
}
