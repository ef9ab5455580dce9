//! Engine object traits.

use crate::config::DatabaseConfig;
use crate::error::EngineResult;
use crate::fs::VirtualFs;
use crate::value::{Record, Row, Value};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Loads an engine instance.
///
/// The factory is handed to the worker thread and `load` runs there while
/// the worker processes its `Init` request, so the returned engine never
/// leaves that thread.
pub trait EngineFactory: Send + Sync + 'static {
    /// Loads the engine.
    ///
    /// `worker_path` is the module locator configured on the dispatcher, if
    /// any. Factories that do not load external modules may ignore it.
    fn load(&self, worker_path: Option<&Path>) -> EngineResult<Box<dyn Engine>>;
}

/// A loaded engine instance.
pub trait Engine {
    /// Engine version string.
    fn version(&self) -> String;

    /// Storage format version.
    fn storage_version(&self) -> u64;

    /// Opens (or creates) a database.
    fn open_database(&self, config: &DatabaseConfig) -> EngineResult<Box<dyn EngineDatabase>>;

    /// The engine's virtual filesystem, if it has one.
    fn filesystem(&mut self) -> Option<&mut dyn VirtualFs>;
}

/// An open database.
pub trait EngineDatabase {
    /// Opens a connection to this database.
    ///
    /// `num_threads` overrides the per-query thread limit when given.
    fn connect(&self, num_threads: Option<u64>) -> EngineResult<Box<dyn EngineConnection>>;

    /// Releases the database.
    fn close(&mut self);
}

/// A connection to a database.
///
/// Methods take `&self`; implementations keep mutable connection state
/// behind interior mutability, like the native handles they wrap.
pub trait EngineConnection {
    /// Sets the maximum number of threads used to execute a query.
    fn set_max_num_thread_for_exec(&self, num_threads: u64) -> EngineResult<()>;

    /// Sets the query timeout in milliseconds (0 disables it).
    fn set_query_timeout(&self, timeout_ms: u64) -> EngineResult<()>;

    /// Returns the maximum number of threads used to execute a query.
    fn max_num_thread_for_exec(&self) -> EngineResult<u64>;

    /// Runs a statement (or `;`-separated statements).
    fn query(&self, statement: &str) -> EngineResult<Box<dyn EngineQueryResult>>;

    /// Prepares a statement for later execution.
    fn prepare(&self, statement: &str) -> EngineResult<Box<dyn EnginePreparedStatement>>;

    /// Executes a prepared statement with bound parameters.
    fn execute(
        &self,
        statement: &dyn EnginePreparedStatement,
        params: Vec<(String, Value)>,
    ) -> EngineResult<Box<dyn EngineQueryResult>>;

    /// Releases the connection.
    fn close(&mut self);
}

/// A prepared statement.
pub trait EnginePreparedStatement {
    /// Whether preparation succeeded.
    fn is_success(&self) -> bool;

    /// Preparation error text (empty on success).
    fn error_message(&self) -> String;

    /// Downcasting hook so a connection can recover its own statement type.
    fn as_any(&self) -> &dyn std::any::Any;

    /// Releases the statement.
    fn close(&mut self);
}

/// Compilation and execution timings of a query, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySummary {
    /// Time spent compiling the query.
    pub compiling_time_ms: f64,
    /// Time spent executing the query.
    pub execution_time_ms: f64,
}

/// A result cursor.
pub trait EngineQueryResult {
    /// Whether the query succeeded.
    fn is_success(&self) -> bool;

    /// Error text (empty on success).
    fn error_message(&self) -> String;

    /// Whether another tuple is available.
    fn has_next(&self) -> bool;

    /// Whether a following statement produced another result.
    fn has_next_query_result(&self) -> bool;

    /// Returns the next tuple, or `None` when exhausted.
    fn get_next(&mut self) -> EngineResult<Option<Row>>;

    /// Returns all remaining tuples.
    fn get_all_rows(&mut self) -> EngineResult<Vec<Row>>;

    /// Returns all remaining tuples keyed by column name.
    fn get_all_objects(&mut self) -> EngineResult<Vec<Record>> {
        let columns = self.column_names();
        Ok(self
            .get_all_rows()?
            .into_iter()
            .map(|row| Record::from_row(&columns, row))
            .collect())
    }

    /// Total number of tuples.
    fn num_tuples(&self) -> u64;

    /// Number of columns.
    fn num_columns(&self) -> u64;

    /// Column names.
    fn column_names(&self) -> Vec<String>;

    /// Column type names.
    fn column_types(&self) -> Vec<String>;

    /// Rewinds the cursor to the first tuple.
    fn reset_iterator(&mut self) -> EngineResult<()>;

    /// Timing summary.
    fn query_summary(&self) -> QuerySummary;

    /// Detaches the result of the next statement, if any.
    fn next_query_result(&mut self) -> EngineResult<Option<Box<dyn EngineQueryResult>>>;

    /// Renders the whole result as text.
    fn render(&self) -> String;

    /// Releases the result.
    fn close(&mut self);
}
