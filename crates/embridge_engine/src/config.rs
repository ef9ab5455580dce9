//! Database construction parameters.

use serde::{Deserialize, Serialize};

/// Path that asks the engine for a purely in-memory database.
pub const IN_MEMORY_PATH: &str = ":memory:";

/// Configuration passed to [`crate::Engine::open_database`].
///
/// Zero values for sizes and thread counts mean "let the engine decide".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database path, or [`IN_MEMORY_PATH`].
    pub path: String,

    /// Buffer pool size in bytes (0 = engine default).
    pub buffer_pool_size: u64,

    /// Maximum number of threads the database may use (0 = engine default).
    pub max_num_threads: u64,

    /// Whether on-disk data is compressed.
    pub enable_compression: bool,

    /// Whether the database is opened read-only.
    pub read_only: bool,

    /// Whether the engine checkpoints automatically.
    pub auto_checkpoint: bool,

    /// WAL size in bytes that triggers an automatic checkpoint
    /// (`None` = engine default).
    pub checkpoint_threshold: Option<u64>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: IN_MEMORY_PATH.to_string(),
            buffer_pool_size: 0,
            max_num_threads: 0,
            enable_compression: true,
            read_only: false,
            auto_checkpoint: true,
            checkpoint_threshold: None,
        }
    }
}

impl DatabaseConfig {
    /// Creates a configuration for the database at `path`.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Creates a configuration for an in-memory database.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Returns true if the path names an in-memory database.
    pub fn is_in_memory(&self) -> bool {
        self.path.is_empty() || self.path == IN_MEMORY_PATH
    }

    /// Sets the buffer pool size.
    #[must_use]
    pub fn buffer_pool_size(mut self, bytes: u64) -> Self {
        self.buffer_pool_size = bytes;
        self
    }

    /// Sets the maximum number of threads.
    #[must_use]
    pub fn max_num_threads(mut self, threads: u64) -> Self {
        self.max_num_threads = threads;
        self
    }

    /// Sets whether compression is enabled.
    #[must_use]
    pub fn enable_compression(mut self, value: bool) -> Self {
        self.enable_compression = value;
        self
    }

    /// Sets whether the database is read-only.
    #[must_use]
    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    /// Sets whether automatic checkpointing is enabled.
    #[must_use]
    pub fn auto_checkpoint(mut self, value: bool) -> Self {
        self.auto_checkpoint = value;
        self
    }

    /// Sets the checkpoint threshold.
    #[must_use]
    pub fn checkpoint_threshold(mut self, bytes: u64) -> Self {
        self.checkpoint_threshold = Some(bytes);
        self
    }
}
