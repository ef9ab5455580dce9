//! Error types for the client side of the bridge.

use embridge_worker::{ObjectKind, WorkerError};
use thiserror::Error;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors returned by proxies, the dispatcher and the filesystem facade.
///
/// Remote messages are carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The worker refused to construct a database or connection.
    #[error("{0}")]
    Construction(String),

    /// A handle was not registered in the worker.
    #[error("{0}")]
    NotFound(String),

    /// The engine reported an error.
    #[error("{0}")]
    Engine(String),

    /// The proxy has been closed.
    #[error("{kind} is closed")]
    Closed {
        /// Kind of the closed proxy.
        kind: ObjectKind,
    },

    /// An argument was rejected before anything was sent.
    #[error("{0}")]
    InvalidArgument(String),

    /// A parameter could not be converted to an engine value.
    #[error("{0}")]
    InvalidParameter(String),

    /// The worker could not be started or the engine could not be loaded.
    #[error("{0}")]
    Initialization(String),

    /// The worker went away while a request was outstanding.
    #[error("{0}")]
    Transport(String),

    /// The worker answered with a reply of the wrong shape.
    #[error("unexpected reply: {0}")]
    Protocol(String),

    /// The worker path can only be set before the worker starts.
    #[error("worker path cannot be changed after the worker has started")]
    AlreadyStarted,
}

impl BridgeError {
    /// Shorthand for [`BridgeError::Closed`].
    pub fn closed(kind: ObjectKind) -> Self {
        BridgeError::Closed { kind }
    }
}

impl From<WorkerError> for BridgeError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::Spawn(_) => BridgeError::Initialization(err.to_string()),
            WorkerError::Disconnected => BridgeError::Transport(err.to_string()),
        }
    }
}
