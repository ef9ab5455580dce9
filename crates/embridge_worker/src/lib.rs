//! # embridge worker
//!
//! Everything that lives on the worker side of the bridge.
//!
//! This crate provides:
//! - [`Handle`]: opaque tokens naming engine objects
//! - [`HandleRegistry`]: the handle → engine object map
//! - The wire protocol: [`Request`], [`Envelope`], [`Transfer`], [`Response`]
//! - [`WorkerEndpoint`]: one operation per engine capability
//! - [`WorkerHandle`]: the dedicated worker thread and its inbox
//!
//! ## Key Invariants
//!
//! - The registry is only touched from the worker thread, one message at a time
//! - A handle names at most one live object
//! - Every request gets exactly one reply; engine failures never escape as panics

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod endpoint;
mod error;
mod handle;
mod marshal;
mod protocol;
mod registry;
mod runtime;

pub use endpoint::WorkerEndpoint;
pub use error::{WorkerError, WorkerResult};
pub use handle::{Handle, ObjectKind};
pub use marshal::{params_from_json, value_from_json};
pub use protocol::{CursorFlags, Envelope, FailureKind, Payload, Request, Response, Transfer};
pub use registry::{EngineObject, HandleRegistry, NotFound};
pub use runtime::{WorkerHandle, WorkerOptions};
