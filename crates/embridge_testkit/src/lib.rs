//! # embridge testkit
//!
//! Test utilities for embridge.
//!
//! This crate provides:
//! - [`MemoryEngine`]: a small in-memory graph engine implementing the
//!   engine boundary, so the bridge can be exercised end to end
//! - [`MemoryFs`] and [`PersistentStore`]: a virtual filesystem whose
//!   persistent mounts survive engine restarts
//! - Instrumented factories ([`CountingFactory`], [`FailingFactory`]) and
//!   [`init_tracing`]
//!
//! ## Query dialect
//!
//! ```text
//! CREATE NODE TABLE person(id INT64, name STRING, PRIMARY KEY(id));
//! CREATE (:person {id: 1, name: 'Alice'});
//! MATCH (p:person) WHERE p.id >= $min RETURN p.name ORDER BY p.id LIMIT 10;
//! MATCH (p:person) RETURN COUNT(*);
//! RETURN 1, 'a', [1, 2];
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod engine;
pub mod fixtures;
mod fs;
mod lexer;
mod parser;

pub use engine::{MemoryEngine, MemoryEngineFactory, DEFAULT_MAX_NUM_THREADS, STORAGE_VERSION};
pub use fixtures::{init_tracing, CountingFactory, FailingFactory};
pub use fs::{MemoryFs, PersistentStore};
