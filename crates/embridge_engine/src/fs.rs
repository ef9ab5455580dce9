//! Virtual filesystem exposed by the engine.

use crate::error::EngineResult;
use bytes::Bytes;
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};

/// Metadata returned by [`VirtualFs::stat`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Whether the path is a directory.
    pub is_dir: bool,
    /// Unix-style permission and type bits.
    pub mode: u32,
    /// Modification time, milliseconds since the epoch.
    pub mtime_ms: u64,
}

/// The engine's in-process filesystem.
///
/// Paths are absolute, `/`-separated strings. `sync_fs` moves data between
/// mounted persistent directories and their backing store and is the only
/// asynchronous operation.
pub trait VirtualFs {
    /// Reads a whole file.
    fn read_file(&mut self, path: &str) -> EngineResult<Bytes>;

    /// Creates or replaces a file.
    fn write_file(&mut self, path: &str, data: &[u8]) -> EngineResult<()>;

    /// Creates a directory.
    fn mkdir(&mut self, path: &str) -> EngineResult<()>;

    /// Removes a file.
    fn unlink(&mut self, path: &str) -> EngineResult<()>;

    /// Renames a file or directory.
    fn rename(&mut self, old_path: &str, new_path: &str) -> EngineResult<()>;

    /// Removes an empty directory.
    fn rmdir(&mut self, path: &str) -> EngineResult<()>;

    /// Returns metadata for a path.
    fn stat(&mut self, path: &str) -> EngineResult<FileStat>;

    /// Lists a directory, including `.` and `..`.
    fn read_dir(&mut self, path: &str) -> EngineResult<Vec<String>>;

    /// Unmounts a mounted directory.
    fn unmount(&mut self, path: &str) -> EngineResult<()>;

    /// Mounts a directory backed by persistent storage.
    fn mount_persistent(&mut self, path: &str) -> EngineResult<()>;

    /// Synchronizes mounted directories with persistent storage.
    ///
    /// With `populate` the backing store is loaded into memory; without it
    /// memory is flushed to the backing store.
    fn sync_fs(&mut self, populate: bool) -> LocalBoxFuture<'_, EngineResult<()>>;
}
