//! Filesystem facade.

use crate::dispatcher::Dispatcher;
use crate::error::{BridgeError, BridgeResult};
use crate::reply;
use bytes::Bytes;
use embridge_engine::FileStat;
use embridge_worker::{Request, Transfer};

/// The engine's in-process filesystem, reached through the worker.
///
/// Paths are absolute and `/`-separated. Nothing is cached locally.
#[derive(Debug, Clone)]
pub struct FileSystem {
    dispatcher: Dispatcher,
}

impl FileSystem {
    pub(crate) fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Reads a whole file.
    pub async fn read_file(&self, path: &str) -> BridgeResult<Bytes> {
        let request = Request::FsReadFile {
            path: path.to_string(),
        };
        match self.dispatcher.transfer(request).await? {
            Transfer::Buffer(data) => Ok(data),
            Transfer::Fail { error } => Err(BridgeError::Engine(error)),
        }
    }

    /// Creates or replaces a file.
    pub async fn write_file(&self, path: &str, data: impl Into<Bytes>) -> BridgeResult<()> {
        self.unit(Request::FsWriteFile {
            path: path.to_string(),
            data: data.into(),
        })
        .await
    }

    /// Creates a directory.
    pub async fn mkdir(&self, path: &str) -> BridgeResult<()> {
        self.unit(Request::FsMkdir {
            path: path.to_string(),
        })
        .await
    }

    /// Removes a file.
    pub async fn unlink(&self, path: &str) -> BridgeResult<()> {
        self.unit(Request::FsUnlink {
            path: path.to_string(),
        })
        .await
    }

    /// Renames a file or directory.
    pub async fn rename(&self, old_path: &str, new_path: &str) -> BridgeResult<()> {
        self.unit(Request::FsRename {
            old_path: old_path.to_string(),
            new_path: new_path.to_string(),
        })
        .await
    }

    /// Removes an empty directory.
    pub async fn rmdir(&self, path: &str) -> BridgeResult<()> {
        self.unit(Request::FsRmdir {
            path: path.to_string(),
        })
        .await
    }

    /// Path metadata.
    pub async fn stat(&self, path: &str) -> BridgeResult<FileStat> {
        let request = Request::FsStat {
            path: path.to_string(),
        };
        reply::stat(self.dispatcher.request(request).await?)
    }

    /// Directory entries, including `.` and `..`.
    pub async fn read_dir(&self, path: &str) -> BridgeResult<Vec<String>> {
        let request = Request::FsReadDir {
            path: path.to_string(),
        };
        reply::entries(self.dispatcher.request(request).await?)
    }

    /// Unmounts a mounted directory.
    pub async fn unmount(&self, path: &str) -> BridgeResult<()> {
        self.unit(Request::FsUnmount {
            path: path.to_string(),
        })
        .await
    }

    /// Mounts a directory backed by persistent storage.
    pub async fn mount_persistent(&self, path: &str) -> BridgeResult<()> {
        self.unit(Request::FsMountPersistent {
            path: path.to_string(),
        })
        .await
    }

    /// Synchronizes persistent mounts: loads them from storage when
    /// `populate` is set, flushes them to storage otherwise.
    pub async fn sync_fs(&self, populate: bool) -> BridgeResult<()> {
        self.unit(Request::FsSyncfs { populate }).await
    }

    async fn unit(&self, request: Request) -> BridgeResult<()> {
        reply::unit(self.dispatcher.request(request).await?)
    }
}
