//! Error types for the worker thread.

use std::io;
use thiserror::Error;

/// Result type for worker thread operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors raised while talking to the worker thread itself.
///
/// Engine failures are not errors at this level; they travel inside
/// [`crate::Envelope::Failure`].
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The OS refused to start the worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),

    /// The worker thread is gone (terminated, or never started its loop).
    #[error("worker terminated")]
    Disconnected,
}
