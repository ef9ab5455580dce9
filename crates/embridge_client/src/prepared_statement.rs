//! Prepared statement proxy.

use crate::dispatcher::Dispatcher;
use crate::error::{BridgeError, BridgeResult};
use crate::remote::RemoteObject;
use crate::reply;
use embridge_worker::{Handle, ObjectKind, Request};
use parking_lot::Mutex;
use std::sync::Arc;

/// A statement prepared by a [`crate::Connection`], ready for
/// [`crate::Connection::execute`].
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    inner: Arc<PreparedStatementInner>,
}

#[derive(Debug)]
struct PreparedStatementInner {
    remote: RemoteObject,
    status: Mutex<(bool, String)>,
}

impl PreparedStatement {
    async fn attach(dispatcher: &Dispatcher, handle: Handle) -> BridgeResult<Self> {
        let statement = Self {
            inner: Arc::new(PreparedStatementInner {
                remote: RemoteObject::ready(
                    ObjectKind::PreparedStatement,
                    dispatcher.clone(),
                    handle,
                ),
                status: Mutex::new((false, String::new())),
            }),
        };
        match statement.fetch_status(handle).await {
            Ok(status) => {
                *statement.inner.status.lock() = status;
                Ok(statement)
            }
            Err(err) => {
                if let Err(release) = statement.close().await {
                    tracing::debug!(error = %release, "could not release a prepared statement");
                }
                Err(err)
            }
        }
    }

    async fn fetch_status(&self, id: Handle) -> BridgeResult<(bool, String)> {
        let remote = &self.inner.remote;
        let success = reply::boolean(
            remote
                .request(Request::PreparedStatementIsSuccess { id })
                .await?,
        )?;
        let message = reply::text(
            remote
                .request(Request::PreparedStatementGetErrorMessage { id })
                .await?,
        )?;
        Ok((success, message))
    }

    /// Attaches `handle`, turning a failed preparation into
    /// [`BridgeError::Engine`] and releasing the remote statement.
    pub(crate) async fn attach_checked(dispatcher: &Dispatcher, handle: Handle) -> BridgeResult<Self> {
        let statement = Self::attach(dispatcher, handle).await?;
        if statement.is_success() {
            return Ok(statement);
        }
        let message = statement.error_message();
        statement.close().await?;
        Err(BridgeError::Engine(message))
    }

    /// Whether preparation succeeded.
    pub fn is_success(&self) -> bool {
        self.inner.status.lock().0
    }

    /// Preparation error text (empty on success).
    pub fn error_message(&self) -> String {
        self.inner.status.lock().1.clone()
    }

    /// Releases the statement. Idempotent.
    pub async fn close(&self) -> BridgeResult<()> {
        self.inner
            .remote
            .close(|id| Request::PreparedStatementClose { id })
            .await
    }

    /// Whether the proxy has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.remote.is_closed()
    }

    pub(crate) fn handle(&self) -> BridgeResult<Handle> {
        self.inner.remote.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embridge_testkit::MemoryEngineFactory;

    #[tokio::test]
    async fn unknown_statement_is_not_attached() {
        let dispatcher = Dispatcher::new(Arc::new(MemoryEngineFactory::new()));
        let err = PreparedStatement::attach(&dispatcher, Handle::generate())
            .await
            .unwrap_err();
        assert_eq!(err, BridgeError::NotFound("Prepared statement not found".into()));
        dispatcher.close().await;
    }
}
