use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Inline path buffer width of [`FileChangeEvent`]. Spec treats this as a
/// canonical part of the event's wire-level layout, not an implementation
/// detail — paths longer than `PATH_BUF_LEN - 1` are silently truncated.
pub const PATH_BUF_LEN: usize = 110;
/// Maximum number of valid bytes `FileChangeEvent::path_len` may hold; byte
/// `PATH_BUF_LEN - 1` is reserved as a null margin.
pub const MAX_INLINE_PATH: usize = PATH_BUF_LEN - 1;

const FLAG_CREATE: u8 = 0b001;
const FLAG_DELETE: u8 = 0b010;
const FLAG_MODIFY: u8 = 0b100;

/// A cheap-to-copy snapshot of a file's metadata as seen by the Stat Cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    pub mod_time_ns: i64,
    pub size: i64,
    pub exists: bool,
    pub cached_at_ns: i64,
}

impl FileStat {
    /// A stat for a path that does not exist, cached at `now_ns`.
    pub fn missing(now_ns: i64) -> Self {
        FileStat {
            mod_time_ns: 0,
            size: 0,
            exists: false,
            cached_at_ns: now_ns,
        }
    }

    /// Whether this cached entry is too old to trust, given `cache_ttl_ns`.
    pub fn is_expired(&self, now_ns: i64, cache_ttl_ns: i64) -> bool {
        now_ns - self.cached_at_ns > cache_ttl_ns
    }
}

/// Current wall-clock time in nanoseconds since the Unix epoch.
///
/// `SystemTime` is not strictly monotonic, but for cache-expiry purposes
/// (comparing against a just-recorded `cached_at_ns`) it is adequate and
/// matches the teacher's own use of `SystemTime::now()` for timestamping.
pub fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

/// An entry in the Watcher's watched-files mapping.
#[derive(Debug, Clone)]
pub struct WatchedFile {
    pub path: String,
    pub last_stat: FileStat,
}

impl WatchedFile {
    pub fn new(path: String, initial_stat: FileStat) -> Self {
        WatchedFile {
            path,
            last_stat: initial_stat,
        }
    }
}

/// The event ring's fixed-size slot type: 8 + 8 + 110 + 1 + 1 = 128 bytes.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct FileChangeEvent {
    pub mod_time_ns: i64,
    pub size: i64,
    pub path: [u8; PATH_BUF_LEN],
    pub path_len: u8,
    pub flags: u8,
}

const _SIZE_CHECK: () = assert!(std::mem::size_of::<FileChangeEvent>() == 128);

impl Default for FileChangeEvent {
    fn default() -> Self {
        FileChangeEvent {
            mod_time_ns: 0,
            size: 0,
            path: [0u8; PATH_BUF_LEN],
            path_len: 0,
            flags: 0,
        }
    }
}

impl std::fmt::Debug for FileChangeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileChangeEvent")
            .field("mod_time_ns", &self.mod_time_ns)
            .field("size", &self.size)
            .field("path", &self.path_str())
            .field("flags", &self.flags)
            .finish()
    }
}

impl FileChangeEvent {
    /// Build a slot in place, truncating `path` to [`MAX_INLINE_PATH`] bytes
    /// if necessary. Truncation is silent, per spec.
    pub fn new(
        path: &str,
        mod_time_ns: i64,
        size: i64,
        is_create: bool,
        is_delete: bool,
        is_modify: bool,
    ) -> Self {
        let mut buf = [0u8; PATH_BUF_LEN];
        let bytes = path.as_bytes();
        let len = bytes.len().min(MAX_INLINE_PATH);
        buf[..len].copy_from_slice(&bytes[..len]);

        let mut flags = 0u8;
        if is_create {
            flags |= FLAG_CREATE;
        }
        if is_delete {
            flags |= FLAG_DELETE;
        }
        if is_modify {
            flags |= FLAG_MODIFY;
        }

        FileChangeEvent {
            mod_time_ns,
            size,
            path: buf,
            path_len: len as u8,
            flags,
        }
    }

    pub fn is_create(&self) -> bool {
        self.flags & FLAG_CREATE != 0
    }

    pub fn is_delete(&self) -> bool {
        self.flags & FLAG_DELETE != 0
    }

    pub fn is_modify(&self) -> bool {
        self.flags & FLAG_MODIFY != 0
    }

    /// The path bytes as a `&str`. Invalid UTF-8 (impossible for paths we
    /// construct ourselves, but the buffer can in principle hold anything)
    /// is replaced lossily by the caller via `ChangeEvent::from`.
    pub fn path_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.path[..self.path_len as usize])
    }
}

/// The public-facing record handed to user callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: String,
    pub mod_time: i64,
    pub size: i64,
    pub is_create: bool,
    pub is_delete: bool,
    pub is_modify: bool,
}

impl From<&FileChangeEvent> for ChangeEvent {
    fn from(slot: &FileChangeEvent) -> Self {
        ChangeEvent {
            path: slot.path_str().into_owned(),
            mod_time: slot.mod_time_ns,
            size: slot.size,
            is_create: slot.is_create(),
            is_delete: slot.is_delete(),
            is_modify: slot.is_modify(),
        }
    }
}

impl From<&ChangeEvent> for FileChangeEvent {
    fn from(event: &ChangeEvent) -> Self {
        FileChangeEvent::new(
            &event.path,
            event.mod_time,
            event.size,
            event.is_create,
            event.is_delete,
            event.is_modify,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_fields() {
        let event = ChangeEvent {
            path: "/tmp/s1.json".to_string(),
            mod_time: 42,
            size: 7,
            is_create: false,
            is_delete: false,
            is_modify: true,
        };
        let slot = FileChangeEvent::from(&event);
        let back = ChangeEvent::from(&slot);
        assert_eq!(event, back);
    }

    #[test]
    fn path_longer_than_buffer_is_truncated_silently() {
        let long_path = format!("/tmp/{}", "a".repeat(200));
        let slot = FileChangeEvent::new(&long_path, 0, 0, true, false, false);
        assert_eq!(slot.path_len as usize, MAX_INLINE_PATH);
        assert_eq!(slot.path_str().len(), MAX_INLINE_PATH);
        assert_eq!(slot.path_str(), &long_path[..MAX_INLINE_PATH]);
    }

    #[test]
    fn short_path_length_matches_input() {
        let slot = FileChangeEvent::new("/tmp/x", 0, 0, false, true, false);
        assert_eq!(slot.path_len as usize, "/tmp/x".len());
        assert!(slot.is_delete());
        assert!(!slot.is_create());
        assert!(!slot.is_modify());
    }

    #[test]
    fn fixed_layout_is_128_bytes() {
        assert_eq!(std::mem::size_of::<FileChangeEvent>(), 128);
    }

    #[test]
    fn missing_stat_expiry() {
        let stat = FileStat::missing(1_000);
        assert!(!stat.exists);
        assert!(stat.is_expired(2_000, 500));
        assert!(!stat.is_expired(1_200, 500));
    }
}
