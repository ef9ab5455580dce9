//! Query result proxy.

use crate::dispatcher::Dispatcher;
use crate::error::{BridgeError, BridgeResult};
use crate::remote::RemoteObject;
use crate::reply;
use embridge_engine::{QuerySummary, Record, Row};
use embridge_worker::{CursorFlags, Handle, ObjectKind, Request};
use parking_lot::Mutex;
use std::sync::Arc;

/// A result cursor held by the worker.
///
/// `is_success`, `has_next` and `has_next_query_result` are cached locally
/// and refreshed after every call that moves the cursor.
#[derive(Debug, Clone)]
pub struct QueryResult {
    inner: Arc<QueryResultInner>,
}

#[derive(Debug)]
struct QueryResultInner {
    remote: RemoteObject,
    flags: Mutex<CursorFlags>,
}

impl QueryResult {
    /// Wraps a freshly minted handle and syncs the cached flags.
    pub(crate) async fn attach(dispatcher: &Dispatcher, handle: Handle) -> BridgeResult<Self> {
        let result = Self::ready(dispatcher, handle);
        result.sync_or_release().await?;
        Ok(result)
    }

    fn ready(dispatcher: &Dispatcher, handle: Handle) -> Self {
        Self {
            inner: Arc::new(QueryResultInner {
                remote: RemoteObject::ready(ObjectKind::QueryResult, dispatcher.clone(), handle),
                flags: Mutex::new(CursorFlags::default()),
            }),
        }
    }

    /// Syncs the cached flags, releasing the cursor if that fails.
    async fn sync_or_release(&self) -> BridgeResult<()> {
        let Err(err) = self.sync_values().await else {
            return Ok(());
        };
        if let Err(release) = self.close().await {
            tracing::debug!(error = %release, "could not release an unsynced query result");
        }
        Err(err)
    }

    async fn sync_values(&self) -> BridgeResult<()> {
        let id = self.inner.remote.handle()?;
        let flags = reply::flags(
            self.inner
                .remote
                .request(Request::QueryResultSyncValues { id })
                .await?,
        )?;
        *self.inner.flags.lock() = flags;
        Ok(())
    }

    /// Whether the query succeeded.
    pub fn is_success(&self) -> bool {
        self.inner.flags.lock().is_success
    }

    /// Whether another tuple is available.
    pub fn has_next(&self) -> bool {
        self.inner.flags.lock().has_next
    }

    /// Whether another statement's result follows this one.
    pub fn has_next_query_result(&self) -> bool {
        self.inner.flags.lock().has_next_query_result
    }

    /// Error text of a failed query (empty on success).
    pub async fn error_message(&self) -> BridgeResult<String> {
        let id = self.inner.remote.handle()?;
        reply::text(
            self.inner
                .remote
                .request(Request::QueryResultGetErrorMessage { id })
                .await?,
        )
    }

    /// Rewinds the cursor to the first tuple.
    pub async fn reset_iterator(&self) -> BridgeResult<()> {
        let id = self.inner.remote.handle()?;
        reply::unit(
            self.inner
                .remote
                .request(Request::QueryResultResetIterator { id })
                .await?,
        )?;
        self.sync_values().await
    }

    /// Number of columns.
    pub async fn num_columns(&self) -> BridgeResult<u64> {
        let id = self.inner.remote.handle()?;
        reply::count(
            self.inner
                .remote
                .request(Request::QueryResultGetNumColumns { id })
                .await?,
        )
    }

    /// Number of tuples.
    pub async fn num_tuples(&self) -> BridgeResult<u64> {
        let id = self.inner.remote.handle()?;
        reply::count(
            self.inner
                .remote
                .request(Request::QueryResultGetNumTuples { id })
                .await?,
        )
    }

    /// Column names.
    pub async fn column_names(&self) -> BridgeResult<Vec<String>> {
        let id = self.inner.remote.handle()?;
        reply::texts(
            self.inner
                .remote
                .request(Request::QueryResultGetColumnNames { id })
                .await?,
        )
    }

    /// Column type names.
    pub async fn column_types(&self) -> BridgeResult<Vec<String>> {
        let id = self.inner.remote.handle()?;
        reply::texts(
            self.inner
                .remote
                .request(Request::QueryResultGetColumnTypes { id })
                .await?,
        )
    }

    /// The engine's text rendering of the whole result.
    pub async fn render(&self) -> BridgeResult<String> {
        let id = self.inner.remote.handle()?;
        reply::text(
            self.inner
                .remote
                .request(Request::QueryResultToString { id })
                .await?,
        )
    }

    /// Compilation and execution timings.
    pub async fn query_summary(&self) -> BridgeResult<QuerySummary> {
        let id = self.inner.remote.handle()?;
        reply::summary(
            self.inner
                .remote
                .request(Request::QueryResultGetQuerySummary { id })
                .await?,
        )
    }

    /// The result of the next statement of a multi-statement query.
    ///
    /// `None` once the chain is exhausted. A failed statement is returned
    /// as [`crate::BridgeError::Engine`].
    pub async fn next_query_result(&self) -> BridgeResult<Option<QueryResult>> {
        let id = self.inner.remote.handle()?;
        let reply = self
            .inner
            .remote
            .request(Request::QueryResultGetNextQueryResult { id })
            .await?;
        self.sync_values().await?;
        match reply::optional_handle(reply)? {
            Some(handle) => Ok(Some(
                QueryResult::attach_checked(self.inner.remote.dispatcher(), handle).await?,
            )),
            None => Ok(None),
        }
    }

    /// Next tuple, or `None` when the cursor is exhausted.
    pub async fn get_next(&self) -> BridgeResult<Option<Row>> {
        let id = self.inner.remote.handle()?;
        let row = reply::row(
            self.inner
                .remote
                .request(Request::QueryResultGetNext { id })
                .await?,
        )?;
        self.sync_values().await?;
        Ok(row)
    }

    /// All remaining tuples.
    pub async fn get_all_rows(&self) -> BridgeResult<Vec<Row>> {
        let id = self.inner.remote.handle()?;
        let rows = reply::rows(
            self.inner
                .remote
                .request(Request::QueryResultGetAllRows { id })
                .await?,
        )?;
        self.sync_values().await?;
        Ok(rows)
    }

    /// All remaining tuples keyed by column name.
    pub async fn get_all_objects(&self) -> BridgeResult<Vec<Record>> {
        let id = self.inner.remote.handle()?;
        let records = reply::records(
            self.inner
                .remote
                .request(Request::QueryResultGetAllObjects { id })
                .await?,
        )?;
        self.sync_values().await?;
        Ok(records)
    }

    /// Releases the cursor. Idempotent.
    pub async fn close(&self) -> BridgeResult<()> {
        self.inner
            .remote
            .close(|id| Request::QueryResultClose { id })
            .await
    }

    /// Whether the proxy has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.remote.is_closed()
    }

    /// Attaches `handle` and turns a failed result into an error, releasing
    /// the remote cursor.
    pub(crate) async fn attach_checked(dispatcher: &Dispatcher, handle: Handle) -> BridgeResult<Self> {
        let result = Self::attach(dispatcher, handle).await?;
        if result.is_success() {
            return Ok(result);
        }
        let message = result.error_message().await;
        result.close().await?;
        Err(BridgeError::Engine(message?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embridge_testkit::MemoryEngineFactory;

    #[tokio::test]
    async fn failed_sync_releases_the_cursor() {
        let dispatcher = Dispatcher::new(Arc::new(MemoryEngineFactory::new()));
        let result = QueryResult::ready(&dispatcher, Handle::generate());

        assert_eq!(
            result.sync_or_release().await,
            Err(BridgeError::NotFound("Query result not found".into()))
        );
        assert!(result.is_closed());
        assert_eq!(result.close().await, Ok(()));
        dispatcher.close().await;
    }
}
