//! Database proxy.

use crate::dispatcher::Dispatcher;
use crate::error::BridgeResult;
use crate::remote::RemoteObject;
use crate::reply;
use embridge_engine::DatabaseConfig;
use embridge_worker::{Handle, ObjectKind, Request};
use std::sync::Arc;

/// A database opened inside the worker.
///
/// The database is opened on first use, not by [`Database::new`]. Clones
/// refer to the same remote database.
#[derive(Debug, Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

#[derive(Debug)]
struct DatabaseInner {
    config: DatabaseConfig,
    remote: RemoteObject,
}

impl Database {
    /// Creates a proxy for the database described by `config`.
    pub fn new(dispatcher: &Dispatcher, config: DatabaseConfig) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                config,
                remote: RemoteObject::lazy(ObjectKind::Database, dispatcher.clone()),
            }),
        }
    }

    /// Creates a proxy for a fresh in-memory database.
    pub fn in_memory(dispatcher: &Dispatcher) -> Self {
        Self::new(dispatcher, DatabaseConfig::in_memory())
    }

    /// Construction parameters.
    pub fn config(&self) -> &DatabaseConfig {
        &self.inner.config
    }

    /// Opens the database now instead of on first use.
    pub async fn init(&self) -> BridgeResult<()> {
        self.handle().await.map(|_| ())
    }

    /// Whether the proxy has been closed (explicitly or by a failed open).
    pub fn is_closed(&self) -> bool {
        self.inner.remote.is_closed()
    }

    /// Closes the database together with every connection, statement and
    /// result derived from it. Idempotent.
    pub async fn close(&self) -> BridgeResult<()> {
        self.inner
            .remote
            .close(|id| Request::DatabaseClose { id })
            .await
    }

    pub(crate) fn dispatcher(&self) -> &Dispatcher {
        self.inner.remote.dispatcher()
    }

    pub(crate) async fn handle(&self) -> BridgeResult<Handle> {
        let dispatcher = self.dispatcher().clone();
        let config = self.inner.config.clone();
        self.inner
            .remote
            .get_or_init(move || async move {
                reply::constructed(
                    dispatcher
                        .request(Request::DatabaseConstruct { config })
                        .await?,
                )
            })
            .await
    }
}
