//! The worker endpoint: one operation per engine capability.

use crate::handle::{Handle, ObjectKind};
use crate::marshal::params_from_json;
use crate::protocol::{CursorFlags, Envelope, FailureKind, Payload, Request, Response, Transfer};
use crate::registry::{EngineObject, HandleRegistry, NotFound};
use bytes::Bytes;
use embridge_engine::{Engine, EngineError, EngineFactory, VirtualFs};
use futures::FutureExt;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

/// Message returned for any request that arrives before `Init`.
const UNINITIALIZED: &str = "Engine is not initialized";

/// A failed operation, before it is wrapped into an [`Envelope`].
#[derive(Debug)]
struct Failure {
    kind: FailureKind,
    message: String,
}

impl Failure {
    fn engine(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Engine,
            message: message.into(),
        }
    }

    fn uninitialized() -> Self {
        Self {
            kind: FailureKind::Uninitialized,
            message: UNINITIALIZED.to_string(),
        }
    }

    fn into_envelope(self) -> Envelope {
        Envelope::failure(self.kind, self.message)
    }
}

impl From<NotFound> for Failure {
    fn from(err: NotFound) -> Self {
        Self {
            kind: FailureKind::NotFound,
            message: err.to_string(),
        }
    }
}

impl From<EngineError> for Failure {
    fn from(err: EngineError) -> Self {
        Self::engine(err.message)
    }
}

type OpResult = Result<Envelope, Failure>;

/// Owns the engine and the handle registry, and answers [`Request`]s.
///
/// The endpoint is not `Send`: it lives on the worker thread for its whole
/// life and is driven one request at a time.
pub struct WorkerEndpoint {
    factory: Arc<dyn EngineFactory>,
    worker_path: Option<PathBuf>,
    engine: Option<Box<dyn Engine>>,
    registry: HandleRegistry,
}

impl WorkerEndpoint {
    /// Creates an endpoint. The engine is loaded by the first `Init`.
    pub fn new(factory: Arc<dyn EngineFactory>, worker_path: Option<PathBuf>) -> Self {
        Self {
            factory,
            worker_path,
            engine: None,
            registry: HandleRegistry::new(),
        }
    }

    /// Whether `Init` has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.engine.is_some()
    }

    /// The handle registry.
    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    /// Answers one request.
    ///
    /// File reads are answered with a [`Transfer`]; everything else with an
    /// [`Envelope`]. Never panics on engine failure.
    pub async fn handle(&mut self, request: Request) -> Response {
        match request {
            Request::FsReadFile { path } => self.read_file(&path).into(),
            Request::FsSyncfs { populate } => self.sync_fs(populate).await.into(),
            other => self.dispatch(other).into(),
        }
    }

    fn dispatch(&mut self, request: Request) -> Envelope {
        let op = request.op_name();
        match guarded(|| self.apply(request)) {
            Ok(envelope) => envelope,
            Err(failure) => {
                tracing::debug!(op, kind = ?failure.kind, error = %failure.message, "operation failed");
                failure.into_envelope()
            }
        }
    }

    fn read_file(&mut self, path: &str) -> Transfer {
        match guarded(|| Ok::<Bytes, Failure>(self.filesystem()?.read_file(path)?)) {
            Ok(data) => Transfer::Buffer(data),
            Err(failure) => Transfer::Fail {
                error: failure.message,
            },
        }
    }

    async fn sync_fs(&mut self, populate: bool) -> Envelope {
        let fs = match self.filesystem() {
            Ok(fs) => fs,
            Err(failure) => return failure.into_envelope(),
        };
        match AssertUnwindSafe(fs.sync_fs(populate)).catch_unwind().await {
            Ok(Ok(())) => Envelope::done(),
            Ok(Err(err)) => Failure::from(err).into_envelope(),
            Err(payload) => Failure::engine(panic_message(payload)).into_envelope(),
        }
    }

    fn filesystem(&mut self) -> Result<&mut dyn VirtualFs, Failure> {
        let engine = self
            .engine
            .as_deref_mut()
            .ok_or_else(Failure::uninitialized)?;
        engine
            .filesystem()
            .ok_or_else(|| Failure::engine("Filesystem is not available"))
    }

    fn init(&mut self) -> OpResult {
        if self.engine.is_none() {
            let engine = self.factory.load(self.worker_path.as_deref())?;
            tracing::info!(version = %engine.version(), "engine loaded");
            self.engine = Some(engine);
        }
        Ok(Envelope::done())
    }

    fn apply(&mut self, request: Request) -> OpResult {
        if let Request::Init = request {
            return self.init();
        }
        let op = request.op_name();
        let registry = &mut self.registry;
        let engine = self
            .engine
            .as_deref_mut()
            .ok_or_else(Failure::uninitialized)?;

        match request {
            Request::Init => Ok(Envelope::done()),
            Request::GetVersion => Ok(Envelope::value(Payload::Text(engine.version()))),
            Request::GetStorageVersion => {
                Ok(Envelope::value(Payload::Count(engine.storage_version())))
            }

            Request::DatabaseConstruct { config } => {
                let db = engine.open_database(&config)?;
                Ok(created(registry, EngineObject::Database(db), None))
            }
            Request::DatabaseClose { id } => Ok(close(registry, id, ObjectKind::Database)),

            Request::ConnectionConstruct {
                database,
                num_threads,
            } => {
                let conn = registry.database(database)?.connect(num_threads)?;
                Ok(created(registry, EngineObject::Connection(conn), Some(database)))
            }
            Request::ConnectionClose { id } => Ok(close(registry, id, ObjectKind::Connection)),
            Request::ConnectionSetMaxNumThreadForExec { id, num_threads } => {
                registry
                    .connection(id)?
                    .set_max_num_thread_for_exec(num_threads)?;
                Ok(Envelope::done())
            }
            Request::ConnectionSetQueryTimeout { id, timeout_ms } => {
                registry.connection(id)?.set_query_timeout(timeout_ms)?;
                Ok(Envelope::done())
            }
            Request::ConnectionGetMaxNumThreadForExec { id } => {
                let n = registry.connection(id)?.max_num_thread_for_exec()?;
                Ok(Envelope::value(Payload::Count(n)))
            }
            Request::ConnectionQuery { id, statement } => {
                let result = registry.connection(id)?.query(&statement)?;
                Ok(created(registry, EngineObject::QueryResult(result), Some(id)))
            }
            Request::ConnectionPrepare { id, statement } => {
                let prepared = registry.connection(id)?.prepare(&statement)?;
                Ok(created(
                    registry,
                    EngineObject::PreparedStatement(prepared),
                    Some(id),
                ))
            }
            Request::ConnectionExecute {
                id,
                statement,
                params,
            } => {
                let conn = registry.connection(id)?;
                let prepared = registry.prepared_statement(statement)?;
                let params = params_from_json(params).map_err(|message| Failure {
                    kind: FailureKind::InvalidParameter,
                    message,
                })?;
                let result = conn.execute(prepared, params)?;
                Ok(created(registry, EngineObject::QueryResult(result), Some(id)))
            }

            Request::PreparedStatementClose { id } => {
                Ok(close(registry, id, ObjectKind::PreparedStatement))
            }
            Request::PreparedStatementIsSuccess { id } => Ok(Envelope::value(Payload::Bool(
                registry.prepared_statement(id)?.is_success(),
            ))),
            Request::PreparedStatementGetErrorMessage { id } => Ok(Envelope::value(
                Payload::Text(registry.prepared_statement(id)?.error_message()),
            )),

            Request::QueryResultClose { id } => Ok(close(registry, id, ObjectKind::QueryResult)),
            Request::QueryResultIsSuccess { id } => Ok(Envelope::value(Payload::Bool(
                registry.query_result(id)?.is_success(),
            ))),
            Request::QueryResultGetErrorMessage { id } => Ok(Envelope::value(Payload::Text(
                registry.query_result(id)?.error_message(),
            ))),
            Request::QueryResultResetIterator { id } => {
                registry.query_result_mut(id)?.reset_iterator()?;
                Ok(Envelope::done())
            }
            Request::QueryResultHasNext { id } => Ok(Envelope::value(Payload::Bool(
                registry.query_result(id)?.has_next(),
            ))),
            Request::QueryResultHasNextQueryResult { id } => Ok(Envelope::value(Payload::Bool(
                registry.query_result(id)?.has_next_query_result(),
            ))),
            Request::QueryResultSyncValues { id } => {
                let result = registry.query_result(id)?;
                Ok(Envelope::value(Payload::Flags(CursorFlags {
                    has_next: result.has_next(),
                    has_next_query_result: result.has_next_query_result(),
                    is_success: result.is_success(),
                })))
            }
            Request::QueryResultGetNumColumns { id } => Ok(Envelope::value(Payload::Count(
                registry.query_result(id)?.num_columns(),
            ))),
            Request::QueryResultGetNumTuples { id } => Ok(Envelope::value(Payload::Count(
                registry.query_result(id)?.num_tuples(),
            ))),
            Request::QueryResultGetColumnNames { id } => Ok(Envelope::value(Payload::Texts(
                registry.query_result(id)?.column_names(),
            ))),
            Request::QueryResultGetColumnTypes { id } => Ok(Envelope::value(Payload::Texts(
                registry.query_result(id)?.column_types(),
            ))),
            Request::QueryResultToString { id } => Ok(Envelope::value(Payload::Text(
                registry.query_result(id)?.render(),
            ))),
            Request::QueryResultGetQuerySummary { id } => Ok(Envelope::value(Payload::Summary(
                registry.query_result(id)?.query_summary(),
            ))),
            Request::QueryResultGetNextQueryResult { id } => {
                let parent = registry.parent_of(id);
                let next = registry.query_result_mut(id)?.next_query_result()?;
                match next {
                    Some(next) => Ok(created(registry, EngineObject::QueryResult(next), parent)),
                    None => Ok(Envelope::done()),
                }
            }
            Request::QueryResultGetNext { id } => Ok(Envelope::value(Payload::Row(
                registry.query_result_mut(id)?.get_next()?,
            ))),
            Request::QueryResultGetAllRows { id } => Ok(Envelope::value(Payload::Rows(
                registry.query_result_mut(id)?.get_all_rows()?,
            ))),
            Request::QueryResultGetAllObjects { id } => Ok(Envelope::value(Payload::Records(
                registry.query_result_mut(id)?.get_all_objects()?,
            ))),

            Request::FsWriteFile { path, data } => {
                fs(engine)?.write_file(&path, &data)?;
                Ok(Envelope::done())
            }
            Request::FsMkdir { path } => {
                fs(engine)?.mkdir(&path)?;
                Ok(Envelope::done())
            }
            Request::FsUnlink { path } => {
                fs(engine)?.unlink(&path)?;
                Ok(Envelope::done())
            }
            Request::FsRename { old_path, new_path } => {
                fs(engine)?.rename(&old_path, &new_path)?;
                Ok(Envelope::done())
            }
            Request::FsRmdir { path } => {
                fs(engine)?.rmdir(&path)?;
                Ok(Envelope::done())
            }
            Request::FsStat { path } => Ok(Envelope::value(Payload::Stat(
                fs(engine)?.stat(&path)?,
            ))),
            Request::FsReadDir { path } => Ok(Envelope::value(Payload::Entries(
                fs(engine)?.read_dir(&path)?,
            ))),
            Request::FsUnmount { path } => {
                fs(engine)?.unmount(&path)?;
                Ok(Envelope::done())
            }
            Request::FsMountPersistent { path } => {
                fs(engine)?.mount_persistent(&path)?;
                Ok(Envelope::done())
            }
            Request::FsReadFile { .. } | Request::FsSyncfs { .. } => Err(Failure::engine(
                format!("{op} has no synchronous form"),
            )),
        }
    }
}

impl std::fmt::Debug for WorkerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerEndpoint")
            .field("worker_path", &self.worker_path)
            .field("initialized", &self.is_initialized())
            .field("registry", &self.registry)
            .finish()
    }
}

fn fs(engine: &mut dyn Engine) -> Result<&mut dyn VirtualFs, Failure> {
    engine
        .filesystem()
        .ok_or_else(|| Failure::engine("Filesystem is not available"))
}

fn created(registry: &mut HandleRegistry, object: EngineObject, parent: Option<Handle>) -> Envelope {
    Envelope::created(registry.insert(object, parent))
}

fn close(registry: &mut HandleRegistry, id: Handle, kind: ObjectKind) -> Envelope {
    let closed = registry.close(id, kind);
    if closed > 1 {
        tracing::debug!(handle = %id, %kind, closed, "closed dependent objects");
    }
    Envelope::done()
}

/// Runs `op`, turning a panic into an engine failure.
fn guarded<T>(op: impl FnOnce() -> Result<T, Failure>) -> Result<T, Failure> {
    panic::catch_unwind(AssertUnwindSafe(op))
        .unwrap_or_else(|payload| Err(Failure::engine(panic_message(payload))))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "engine panicked".to_string()
    }
}
