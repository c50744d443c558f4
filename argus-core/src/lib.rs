//! Argus Core - data model, Path Guard, and Stat Cache
//!
//! The foundation of the Argus file watcher: the wire-level event layout,
//! the watched-file record, the security gate applied before any
//! file-system call, and the lock-free stat cache the poller reads through.

mod error;
mod event;
mod path_guard;
mod stat_cache;

pub use error::{ArgusError, ArgusResult};
pub use event::{
    now_ns, ChangeEvent, FileChangeEvent, FileStat, WatchedFile, MAX_INLINE_PATH, PATH_BUF_LEN,
};
pub use path_guard::{validate as validate_path, target_prefix_is_protected, PathRejection};
pub use stat_cache::{CacheStats, StatCache};
