//! Lock-free Stat Cache: an atomic pointer to an immutable snapshot,
//! updated copy-on-write. Readers never block and never take a lock —
//! the slow path is the stat syscall itself, not map construction, so a
//! full-map clone on every insert is an acceptable trade (spec section 4.2).

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::event::{now_ns, FileStat};

/// Snapshot statistics, returned by [`StatCache::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub oldest_age_ns: i64,
    pub newest_age_ns: i64,
}

/// The logical mapping `absolute path -> FileStat`, behind a copy-on-write
/// atomic snapshot.
pub struct StatCache {
    snapshot: ArcSwap<HashMap<String, FileStat>>,
}

impl StatCache {
    pub fn new() -> Self {
        StatCache {
            snapshot: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Return the cached stat for `path` if present and not expired;
    /// otherwise perform a stat syscall, install the result, and return it.
    /// A missing file is a valid, cached result (`exists = false`), not an
    /// error — only I/O errors other than "not found" propagate.
    pub fn get(&self, path: &str, cache_ttl_ns: i64) -> io::Result<FileStat> {
        let now = now_ns();
        if let Some(stat) = self.snapshot.load().get(path) {
            if !stat.is_expired(now, cache_ttl_ns) {
                return Ok(*stat);
            }
        }

        let fresh = Self::stat_path(path, now)?;
        self.install(path, fresh);
        Ok(fresh)
    }

    /// Unconditionally re-stat `path`, bypassing any cached entry, and
    /// install the result. Used by the Watcher's poll loop, which always
    /// wants a fresh read rather than a TTL-bounded one.
    pub fn refresh(&self, path: &str) -> io::Result<FileStat> {
        let now = now_ns();
        let fresh = Self::stat_path(path, now)?;
        self.install(path, fresh);
        Ok(fresh)
    }

    pub fn remove(&self, path: &str) {
        self.snapshot.rcu(|current| {
            if !current.contains_key(path) {
                return Arc::clone(current);
            }
            let mut next = (**current).clone();
            next.remove(path);
            Arc::new(next)
        });
    }

    /// Atomically replace the snapshot with an empty mapping.
    pub fn clear(&self) {
        self.snapshot.store(Arc::new(HashMap::new()));
    }

    pub fn stats(&self) -> CacheStats {
        let now = now_ns();
        let snapshot = self.snapshot.load();
        if snapshot.is_empty() {
            return CacheStats::default();
        }
        let (mut oldest, mut newest) = (i64::MAX, i64::MIN);
        for stat in snapshot.values() {
            oldest = oldest.min(stat.cached_at_ns);
            newest = newest.max(stat.cached_at_ns);
        }
        CacheStats {
            entries: snapshot.len(),
            oldest_age_ns: now - oldest,
            newest_age_ns: now - newest,
        }
    }

    fn install(&self, path: &str, stat: FileStat) {
        self.snapshot.rcu(|current| {
            let mut next = (**current).clone();
            next.insert(path.to_string(), stat);
            Arc::new(next)
        });
    }

    fn stat_path(path: &str, now_ns: i64) -> io::Result<FileStat> {
        match std::fs::metadata(path) {
            Ok(meta) => {
                let mod_time_ns = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_nanos() as i64)
                    .unwrap_or(0);
                Ok(FileStat {
                    mod_time_ns,
                    size: meta.len() as i64,
                    exists: true,
                    cached_at_ns: now_ns,
                })
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(FileStat::missing(now_ns)),
            Err(err) => Err(err),
        }
    }
}

impl Default for StatCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_cached_as_not_exists() {
        let cache = StatCache::new();
        let stat = cache.get("/nonexistent/path/for/argus/tests", 1_000_000).unwrap();
        assert!(!stat.exists);
    }

    #[test]
    fn existing_file_is_cached() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "hello").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cache = StatCache::new();
        let stat = cache.get(&path, 1_000_000_000).unwrap();
        assert!(stat.exists);
        assert!(stat.size > 0);

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn remove_drops_the_entry() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cache = StatCache::new();
        cache.get(&path, 1_000_000_000).unwrap();
        assert_eq!(cache.stats().entries, 1);

        cache.remove(&path);
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn clear_empties_the_snapshot() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cache = StatCache::new();
        cache.get(&path, 1_000_000_000).unwrap();
        cache.clear();
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn expired_entries_are_refreshed() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cache = StatCache::new();
        let first = cache.get(&path, 0).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = cache.get(&path, 0).unwrap();
        // With a zero TTL every lookup re-stats; cached_at_ns should advance.
        assert!(second.cached_at_ns >= first.cached_at_ns);
    }
}
