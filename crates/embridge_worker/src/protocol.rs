//! Messages exchanged between proxies and the worker.

use crate::handle::{Handle, ObjectKind};
use bytes::Bytes;
use embridge_engine::{DatabaseConfig, FileStat, QuerySummary, Record, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// An operation request sent to the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Request {
    /// Loads the engine.
    Init,
    /// Engine version string.
    GetVersion,
    /// Storage format version.
    GetStorageVersion,

    /// Opens a database.
    DatabaseConstruct {
        /// Construction parameters.
        config: DatabaseConfig,
    },
    /// Closes a database and everything derived from it.
    DatabaseClose {
        /// Database handle.
        id: Handle,
    },

    /// Opens a connection.
    ConnectionConstruct {
        /// Database handle.
        database: Handle,
        /// Per-query thread limit override.
        num_threads: Option<u64>,
    },
    /// Closes a connection.
    ConnectionClose {
        /// Connection handle.
        id: Handle,
    },
    /// Sets the per-query thread limit.
    ConnectionSetMaxNumThreadForExec {
        /// Connection handle.
        id: Handle,
        /// New limit.
        num_threads: u64,
    },
    /// Sets the query timeout.
    ConnectionSetQueryTimeout {
        /// Connection handle.
        id: Handle,
        /// Timeout in milliseconds.
        timeout_ms: u64,
    },
    /// Reads the per-query thread limit.
    ConnectionGetMaxNumThreadForExec {
        /// Connection handle.
        id: Handle,
    },
    /// Runs a statement.
    ConnectionQuery {
        /// Connection handle.
        id: Handle,
        /// Statement text.
        statement: String,
    },
    /// Prepares a statement.
    ConnectionPrepare {
        /// Connection handle.
        id: Handle,
        /// Statement text.
        statement: String,
    },
    /// Executes a prepared statement.
    ConnectionExecute {
        /// Connection handle.
        id: Handle,
        /// Prepared statement handle.
        statement: Handle,
        /// Parameter map, marshaled inside the worker.
        params: Map<String, JsonValue>,
    },

    /// Closes a prepared statement.
    PreparedStatementClose {
        /// Statement handle.
        id: Handle,
    },
    /// Whether preparation succeeded.
    PreparedStatementIsSuccess {
        /// Statement handle.
        id: Handle,
    },
    /// Preparation error text.
    PreparedStatementGetErrorMessage {
        /// Statement handle.
        id: Handle,
    },

    /// Closes a query result.
    QueryResultClose {
        /// Result handle.
        id: Handle,
    },
    /// Whether the query succeeded.
    QueryResultIsSuccess {
        /// Result handle.
        id: Handle,
    },
    /// Query error text.
    QueryResultGetErrorMessage {
        /// Result handle.
        id: Handle,
    },
    /// Rewinds the cursor.
    QueryResultResetIterator {
        /// Result handle.
        id: Handle,
    },
    /// Whether another tuple is available.
    QueryResultHasNext {
        /// Result handle.
        id: Handle,
    },
    /// Whether another statement result follows.
    QueryResultHasNextQueryResult {
        /// Result handle.
        id: Handle,
    },
    /// All cached cursor flags in one round trip.
    QueryResultSyncValues {
        /// Result handle.
        id: Handle,
    },
    /// Number of columns.
    QueryResultGetNumColumns {
        /// Result handle.
        id: Handle,
    },
    /// Number of tuples.
    QueryResultGetNumTuples {
        /// Result handle.
        id: Handle,
    },
    /// Column names.
    QueryResultGetColumnNames {
        /// Result handle.
        id: Handle,
    },
    /// Column type names.
    QueryResultGetColumnTypes {
        /// Result handle.
        id: Handle,
    },
    /// Text rendering.
    QueryResultToString {
        /// Result handle.
        id: Handle,
    },
    /// Timing summary.
    QueryResultGetQuerySummary {
        /// Result handle.
        id: Handle,
    },
    /// Detaches the next statement's result.
    QueryResultGetNextQueryResult {
        /// Result handle.
        id: Handle,
    },
    /// Next tuple.
    QueryResultGetNext {
        /// Result handle.
        id: Handle,
    },
    /// All remaining tuples.
    QueryResultGetAllRows {
        /// Result handle.
        id: Handle,
    },
    /// All remaining tuples keyed by column.
    QueryResultGetAllObjects {
        /// Result handle.
        id: Handle,
    },

    /// Reads a file (answered with a [`Transfer`]).
    FsReadFile {
        /// File path.
        path: String,
    },
    /// Writes a file.
    FsWriteFile {
        /// File path.
        path: String,
        /// File contents.
        data: Bytes,
    },
    /// Creates a directory.
    FsMkdir {
        /// Directory path.
        path: String,
    },
    /// Removes a file.
    FsUnlink {
        /// File path.
        path: String,
    },
    /// Renames a path.
    FsRename {
        /// Current path.
        old_path: String,
        /// New path.
        new_path: String,
    },
    /// Removes an empty directory.
    FsRmdir {
        /// Directory path.
        path: String,
    },
    /// Path metadata.
    FsStat {
        /// Path.
        path: String,
    },
    /// Directory listing.
    FsReadDir {
        /// Directory path.
        path: String,
    },
    /// Unmounts a directory.
    FsUnmount {
        /// Mount point.
        path: String,
    },
    /// Mounts a persistent directory.
    FsMountPersistent {
        /// Mount point.
        path: String,
    },
    /// Synchronizes persistent mounts with their backing store.
    FsSyncfs {
        /// Load from the store (true) or flush to it (false).
        populate: bool,
    },
}

impl Request {
    /// Operation name, for logs.
    pub fn op_name(&self) -> &'static str {
        match self {
            Request::Init => "init",
            Request::GetVersion => "getVersion",
            Request::GetStorageVersion => "getStorageVersion",
            Request::DatabaseConstruct { .. } => "databaseConstruct",
            Request::DatabaseClose { .. } => "databaseClose",
            Request::ConnectionConstruct { .. } => "connectionConstruct",
            Request::ConnectionClose { .. } => "connectionClose",
            Request::ConnectionSetMaxNumThreadForExec { .. } => "connectionSetMaxNumThreadForExec",
            Request::ConnectionSetQueryTimeout { .. } => "connectionSetQueryTimeout",
            Request::ConnectionGetMaxNumThreadForExec { .. } => "connectionGetMaxNumThreadForExec",
            Request::ConnectionQuery { .. } => "connectionQuery",
            Request::ConnectionPrepare { .. } => "connectionPrepare",
            Request::ConnectionExecute { .. } => "connectionExecute",
            Request::PreparedStatementClose { .. } => "preparedStatementClose",
            Request::PreparedStatementIsSuccess { .. } => "preparedStatementIsSuccess",
            Request::PreparedStatementGetErrorMessage { .. } => "preparedStatementGetErrorMessage",
            Request::QueryResultClose { .. } => "queryResultClose",
            Request::QueryResultIsSuccess { .. } => "queryResultIsSuccess",
            Request::QueryResultGetErrorMessage { .. } => "queryResultGetErrorMessage",
            Request::QueryResultResetIterator { .. } => "queryResultResetIterator",
            Request::QueryResultHasNext { .. } => "queryResultHasNext",
            Request::QueryResultHasNextQueryResult { .. } => "queryResultHasNextQueryResult",
            Request::QueryResultSyncValues { .. } => "queryResultSyncValues",
            Request::QueryResultGetNumColumns { .. } => "queryResultGetNumColumns",
            Request::QueryResultGetNumTuples { .. } => "queryResultGetNumTuples",
            Request::QueryResultGetColumnNames { .. } => "queryResultGetColumnNames",
            Request::QueryResultGetColumnTypes { .. } => "queryResultGetColumnTypes",
            Request::QueryResultToString { .. } => "queryResultToString",
            Request::QueryResultGetQuerySummary { .. } => "queryResultGetQuerySummary",
            Request::QueryResultGetNextQueryResult { .. } => "queryResultGetNextQueryResult",
            Request::QueryResultGetNext { .. } => "queryResultGetNext",
            Request::QueryResultGetAllRows { .. } => "queryResultGetAllRows",
            Request::QueryResultGetAllObjects { .. } => "queryResultGetAllObjects",
            Request::FsReadFile { .. } => "fsReadFile",
            Request::FsWriteFile { .. } => "fsWriteFile",
            Request::FsMkdir { .. } => "fsMkdir",
            Request::FsUnlink { .. } => "fsUnlink",
            Request::FsRename { .. } => "fsRename",
            Request::FsRmdir { .. } => "fsRmdir",
            Request::FsStat { .. } => "fsStat",
            Request::FsReadDir { .. } => "fsReadDir",
            Request::FsUnmount { .. } => "fsUnmount",
            Request::FsMountPersistent { .. } => "fsMountPersistent",
            Request::FsSyncfs { .. } => "fsSyncfs",
        }
    }

    /// The primary handle the request addresses, if any.
    pub fn target(&self) -> Option<Handle> {
        match self {
            Request::DatabaseClose { id }
            | Request::ConnectionClose { id }
            | Request::ConnectionSetMaxNumThreadForExec { id, .. }
            | Request::ConnectionSetQueryTimeout { id, .. }
            | Request::ConnectionGetMaxNumThreadForExec { id }
            | Request::ConnectionQuery { id, .. }
            | Request::ConnectionPrepare { id, .. }
            | Request::ConnectionExecute { id, .. }
            | Request::PreparedStatementClose { id }
            | Request::PreparedStatementIsSuccess { id }
            | Request::PreparedStatementGetErrorMessage { id }
            | Request::QueryResultClose { id }
            | Request::QueryResultIsSuccess { id }
            | Request::QueryResultGetErrorMessage { id }
            | Request::QueryResultResetIterator { id }
            | Request::QueryResultHasNext { id }
            | Request::QueryResultHasNextQueryResult { id }
            | Request::QueryResultSyncValues { id }
            | Request::QueryResultGetNumColumns { id }
            | Request::QueryResultGetNumTuples { id }
            | Request::QueryResultGetColumnNames { id }
            | Request::QueryResultGetColumnTypes { id }
            | Request::QueryResultToString { id }
            | Request::QueryResultGetQuerySummary { id }
            | Request::QueryResultGetNextQueryResult { id }
            | Request::QueryResultGetNext { id }
            | Request::QueryResultGetAllRows { id }
            | Request::QueryResultGetAllObjects { id } => Some(*id),
            Request::ConnectionConstruct { database, .. } => Some(*database),
            _ => None,
        }
    }
}

/// Cursor flags cached by query result proxies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorFlags {
    /// Another tuple is available.
    pub has_next: bool,
    /// Another statement result follows.
    pub has_next_query_result: bool,
    /// The query succeeded.
    pub is_success: bool,
}

/// A successful operation's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// A flag.
    Bool(bool),
    /// A count or numeric setting.
    Count(u64),
    /// A string.
    Text(String),
    /// A list of strings (column names, column types).
    Texts(Vec<String>),
    /// One tuple, or `None` when the cursor is exhausted.
    Row(Option<Row>),
    /// Many tuples.
    Rows(Vec<Row>),
    /// Many tuples keyed by column.
    Records(Vec<Record>),
    /// Query timings.
    Summary(QuerySummary),
    /// Cursor flags.
    Flags(CursorFlags),
    /// Path metadata.
    Stat(FileStat),
    /// Directory entries.
    Entries(Vec<String>),
}

/// Why an operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// A referenced handle is not registered.
    NotFound,
    /// The engine raised an error.
    Engine,
    /// A parameter could not be marshaled.
    InvalidParameter,
    /// The engine has not been loaded yet.
    Uninitialized,
}

/// The uniform reply of every operation except file reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Envelope {
    /// The operation succeeded.
    Success {
        /// Handle of a newly constructed object.
        id: Option<Handle>,
        /// Returned value.
        result: Option<Payload>,
    },
    /// The operation failed.
    Failure {
        /// Failure category.
        kind: FailureKind,
        /// Diagnostic text.
        error: String,
    },
}

impl Envelope {
    /// Success without a value.
    pub fn done() -> Self {
        Envelope::Success {
            id: None,
            result: None,
        }
    }

    /// Success carrying a new handle.
    pub fn created(id: Handle) -> Self {
        Envelope::Success {
            id: Some(id),
            result: None,
        }
    }

    /// Success carrying a value.
    pub fn value(result: Payload) -> Self {
        Envelope::Success {
            id: None,
            result: Some(result),
        }
    }

    /// Failure.
    pub fn failure(kind: FailureKind, error: impl Into<String>) -> Self {
        Envelope::Failure {
            kind,
            error: error.into(),
        }
    }

    /// "<Kind> not found" failure.
    pub fn not_found(kind: ObjectKind) -> Self {
        Self::failure(FailureKind::NotFound, format!("{kind} not found"))
    }

    /// Returns true for [`Envelope::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Envelope::Success { .. })
    }
}

/// Reply to a file read.
///
/// Unlike [`Envelope`], the success case is the bare buffer: the payload
/// takes the place a status flag would occupy, so failure is marked by the
/// separate `Fail` variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transfer {
    /// File contents, shared without copying.
    Buffer(Bytes),
    /// The read failed.
    Fail {
        /// Diagnostic text.
        error: String,
    },
}

/// Any reply from the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    /// Control-path reply.
    Envelope(Envelope),
    /// Binary data reply.
    Transfer(Transfer),
}

impl From<Envelope> for Response {
    fn from(envelope: Envelope) -> Self {
        Response::Envelope(envelope)
    }
}

impl From<Transfer> for Response {
    fn from(transfer: Transfer) -> Self {
        Response::Transfer(transfer)
    }
}
