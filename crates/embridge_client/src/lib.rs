//! # embridge client
//!
//! Async proxies for an embedded database engine that runs on one dedicated
//! worker thread.
//!
//! The engine is single-threaded and synchronous. This crate lets any number
//! of async callers share it: every proxy method is a request to the worker,
//! keyed by an opaque handle, answered in arrival order.
//!
//! This crate provides:
//! - [`Dispatcher`]: starts the worker on first use and owns it
//! - [`Database`], [`Connection`], [`PreparedStatement`], [`QueryResult`]:
//!   proxies for the engine objects registered in the worker
//! - [`FileSystem`]: the engine's virtual filesystem
//! - [`BridgeError`]: every failure, with remote messages kept verbatim
//!
//! ## Lifecycle
//!
//! `Database` and `Connection` proxies are created immediately and opened on
//! first use; concurrent first uses share one open attempt. Proxies must be
//! closed explicitly. Closing a database also closes everything derived from
//! it inside the worker.
//!
//! ```no_run
//! use embridge_client::{Connection, Database, Dispatcher};
//! # async fn demo(factory: std::sync::Arc<dyn embridge_engine::EngineFactory>) -> embridge_client::BridgeResult<()> {
//! let dispatcher = Dispatcher::new(factory);
//! let db = Database::in_memory(&dispatcher);
//! let conn = Connection::new(&db);
//!
//! let result = conn.query("RETURN 1").await?;
//! while result.has_next() {
//!     println!("{:?}", result.get_next().await?);
//! }
//!
//! result.close().await?;
//! conn.close().await?;
//! db.close().await?;
//! dispatcher.close().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connection;
mod database;
mod dispatcher;
mod error;
mod fs;
mod prepared_statement;
mod query_result;
mod remote;
mod reply;
mod single_flight;

pub use config::{DispatcherConfig, WORKER_PATH_ENV};
pub use connection::Connection;
pub use database::Database;
pub use dispatcher::Dispatcher;
pub use error::{BridgeError, BridgeResult};
pub use fs::FileSystem;
pub use prepared_statement::PreparedStatement;
pub use query_result::QueryResult;

pub use embridge_engine::{DatabaseConfig, FileStat, QuerySummary, Record, Row, Value};
pub use embridge_worker::ObjectKind;
