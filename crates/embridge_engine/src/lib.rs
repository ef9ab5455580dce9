//! # embridge engine boundary
//!
//! Traits and plain data types describing the embedded database engine that
//! the embridge worker drives.
//!
//! The engine itself is an external collaborator. Everything in this crate is
//! the contract it must satisfy:
//! - [`EngineFactory`] loads an [`Engine`] inside the worker thread
//! - [`Engine`] opens databases and exposes a [`VirtualFs`]
//! - [`EngineDatabase`], [`EngineConnection`], [`EnginePreparedStatement`]
//!   and [`EngineQueryResult`] are the stateful objects the worker registers
//!   under handles
//!
//! ## Threading
//!
//! Engine objects are created, used and closed on one thread only. None of
//! the object traits require `Send`; only the factory crosses threads.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod fs;
mod value;

pub use config::{DatabaseConfig, IN_MEMORY_PATH};
pub use engine::{
    Engine, EngineConnection, EngineDatabase, EngineFactory, EnginePreparedStatement,
    EngineQueryResult, QuerySummary,
};
pub use error::{EngineError, EngineResult};
pub use fs::{FileStat, VirtualFs};
pub use value::{Record, Row, Value};
