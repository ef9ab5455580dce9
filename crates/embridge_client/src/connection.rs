//! Connection proxy.

use crate::database::Database;
use crate::dispatcher::Dispatcher;
use crate::error::{BridgeError, BridgeResult};
use crate::prepared_statement::PreparedStatement;
use crate::query_result::QueryResult;
use crate::remote::RemoteObject;
use crate::reply;
use embridge_worker::{Handle, ObjectKind, Request};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

const PARAMS_NOT_A_MAP: &str = "Parameters must be a map of parameter names to values";

/// A connection to a [`Database`].
///
/// Opened on first use, after the database itself. Statements on one
/// connection run one at a time in the worker; use several connections to
/// issue queries concurrently.
///
/// ```no_run
/// # async fn demo(dispatcher: &embridge_client::Dispatcher) -> embridge_client::BridgeResult<()> {
/// use embridge_client::{Connection, Database};
///
/// let db = Database::in_memory(dispatcher);
/// let conn = Connection::new(&db);
/// conn.query("CREATE NODE TABLE person(id INT64, PRIMARY KEY(id))").await?;
///
/// let insert = conn.prepare("CREATE (:person {id: $id})").await?;
/// conn.execute(&insert, serde_json::json!({ "id": 1 })).await?;
///
/// let result = conn.query("MATCH (p:person) RETURN p.id").await?;
/// for record in result.get_all_objects().await? {
///     println!("{}", record.to_json());
/// }
/// db.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

#[derive(Debug)]
struct ConnectionInner {
    database: Database,
    num_threads: Option<u64>,
    remote: RemoteObject,
}

impl Connection {
    /// Creates a proxy for a connection to `database`.
    pub fn new(database: &Database) -> Self {
        Self::build(database, None)
    }

    /// Like [`Connection::new`], overriding the per-query thread limit.
    pub fn with_num_threads(database: &Database, num_threads: u64) -> Self {
        Self::build(database, Some(num_threads))
    }

    fn build(database: &Database, num_threads: Option<u64>) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                database: database.clone(),
                num_threads,
                remote: RemoteObject::lazy(ObjectKind::Connection, database.dispatcher().clone()),
            }),
        }
    }

    /// The database this connection belongs to.
    pub fn database(&self) -> &Database {
        &self.inner.database
    }

    /// Opens the connection now instead of on first use.
    pub async fn init(&self) -> BridgeResult<()> {
        self.handle().await.map(|_| ())
    }

    /// Whether the proxy has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.remote.is_closed()
    }

    /// Sets the maximum number of threads used to execute one query.
    pub async fn set_max_num_thread_for_exec(&self, num_threads: u64) -> BridgeResult<()> {
        let id = self.handle().await?;
        reply::unit(
            self.inner
                .remote
                .request(Request::ConnectionSetMaxNumThreadForExec { id, num_threads })
                .await?,
        )
    }

    /// Sets the query timeout in milliseconds (0 disables it).
    pub async fn set_query_timeout(&self, timeout_ms: u64) -> BridgeResult<()> {
        let id = self.handle().await?;
        reply::unit(
            self.inner
                .remote
                .request(Request::ConnectionSetQueryTimeout { id, timeout_ms })
                .await?,
        )
    }

    /// Maximum number of threads used to execute one query.
    pub async fn max_num_thread_for_exec(&self) -> BridgeResult<u64> {
        let id = self.handle().await?;
        reply::count(
            self.inner
                .remote
                .request(Request::ConnectionGetMaxNumThreadForExec { id })
                .await?,
        )
    }

    /// Runs `statement` (or several, `;`-separated).
    ///
    /// A query the engine rejects fails with [`BridgeError::Engine`].
    pub async fn query(&self, statement: &str) -> BridgeResult<QueryResult> {
        let id = self.handle().await?;
        let handle = reply::created(
            self.inner
                .remote
                .request(Request::ConnectionQuery {
                    id,
                    statement: statement.to_string(),
                })
                .await?,
        )?;
        QueryResult::attach_checked(self.dispatcher(), handle).await
    }

    /// Prepares `statement` for [`Connection::execute`].
    pub async fn prepare(&self, statement: &str) -> BridgeResult<PreparedStatement> {
        let id = self.handle().await?;
        let handle = reply::created(
            self.inner
                .remote
                .request(Request::ConnectionPrepare {
                    id,
                    statement: statement.to_string(),
                })
                .await?,
        )?;
        PreparedStatement::attach_checked(self.dispatcher(), handle).await
    }

    /// Executes a prepared statement.
    ///
    /// `params` must serialize to a map of parameter names to values, or to
    /// nothing (`()`, `None`) when the statement takes no parameters.
    pub async fn execute<P: Serialize>(
        &self,
        statement: &PreparedStatement,
        params: P,
    ) -> BridgeResult<QueryResult> {
        let params = params_map(params)?;
        let prepared = statement.handle()?;
        let id = self.handle().await?;
        let handle = reply::created(
            self.inner
                .remote
                .request(Request::ConnectionExecute {
                    id,
                    statement: prepared,
                    params,
                })
                .await?,
        )?;
        QueryResult::attach_checked(self.dispatcher(), handle).await
    }

    /// Closes the connection and everything prepared or queried on it.
    /// Idempotent.
    pub async fn close(&self) -> BridgeResult<()> {
        self.inner
            .remote
            .close(|id| Request::ConnectionClose { id })
            .await
    }

    fn dispatcher(&self) -> &Dispatcher {
        self.inner.remote.dispatcher()
    }

    async fn handle(&self) -> BridgeResult<Handle> {
        let database = self.inner.database.clone();
        let dispatcher = self.dispatcher().clone();
        let num_threads = self.inner.num_threads;
        self.inner
            .remote
            .get_or_init(move || async move {
                let database = database.handle().await?;
                reply::constructed(
                    dispatcher
                        .request(Request::ConnectionConstruct {
                            database,
                            num_threads,
                        })
                        .await?,
                )
            })
            .await
    }
}

fn params_map<P: Serialize>(params: P) -> BridgeResult<Map<String, JsonValue>> {
    match serde_json::to_value(params) {
        Ok(JsonValue::Object(map)) => Ok(map),
        Ok(JsonValue::Null) => Ok(Map::new()),
        _ => Err(BridgeError::InvalidArgument(PARAMS_NOT_A_MAP.to_string())),
    }
}
