//! The dedicated worker thread.

use crate::endpoint::WorkerEndpoint;
use crate::error::{WorkerError, WorkerResult};
use crate::protocol::{Request, Response};
use embridge_engine::EngineFactory;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot};

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// Options for spawning a worker thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Thread name prefix; the worker id is appended.
    pub thread_name: String,
    /// Stack size of the worker thread, or the platform default.
    pub stack_size: Option<usize>,
    /// Module locator passed to [`EngineFactory::load`].
    pub worker_path: Option<PathBuf>,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            thread_name: "embridge-worker".to_string(),
            stack_size: None,
            worker_path: None,
        }
    }
}

impl WorkerOptions {
    /// Sets the thread name prefix.
    #[must_use]
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Sets the thread stack size.
    #[must_use]
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Sets the module locator.
    #[must_use]
    pub fn worker_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.worker_path = Some(path.into());
        self
    }
}

enum Message {
    Call {
        request: Request,
        reply: oneshot::Sender<Response>,
    },
    Terminate,
}

/// A running worker thread.
///
/// Requests are queued on an unbounded inbox and answered strictly in
/// arrival order. Dropping the handle asks the thread to stop without
/// waiting for it.
pub struct WorkerHandle {
    id: u64,
    inbox: mpsc::UnboundedSender<Message>,
    exited: Mutex<Option<oneshot::Receiver<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerHandle {
    /// Spawns a worker thread that will load its engine from `factory` on
    /// the first `Init` request.
    pub fn spawn(factory: Arc<dyn EngineFactory>, options: WorkerOptions) -> WorkerResult<Self> {
        let id = NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed);
        let (inbox, mut messages) = mpsc::unbounded_channel::<Message>();
        let (exit_tx, exited) = oneshot::channel();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let mut builder = thread::Builder::new().name(format!("{}-{id}", options.thread_name));
        if let Some(size) = options.stack_size {
            builder = builder.stack_size(size);
        }
        let worker_path = options.worker_path;

        let thread = builder.spawn(move || {
            tracing::info!(worker = id, "worker started");
            runtime.block_on(async move {
                let mut endpoint = WorkerEndpoint::new(factory, worker_path);
                while let Some(message) = messages.recv().await {
                    match message {
                        Message::Call { request, reply } => {
                            let op = request.op_name();
                            tracing::debug!(worker = id, op, handle = ?request.target(), "request");
                            let response = endpoint.handle(request).await;
                            if reply.send(response).is_err() {
                                tracing::debug!(worker = id, op, "caller went away before reply");
                            }
                        }
                        Message::Terminate => break,
                    }
                }
                let live = endpoint.registry().len();
                if live > 0 {
                    tracing::warn!(worker = id, live, "worker stopped with unclosed handles");
                }
            });
            tracing::info!(worker = id, "worker stopped");
            let _ = exit_tx.send(());
        })?;

        Ok(Self {
            id,
            inbox,
            exited: Mutex::new(Some(exited)),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Process-unique worker id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the worker loop is still accepting requests.
    pub fn is_alive(&self) -> bool {
        !self.inbox.is_closed()
    }

    /// Sends a request and waits for its reply.
    pub async fn call(&self, request: Request) -> WorkerResult<Response> {
        let (reply, response) = oneshot::channel();
        self.inbox
            .send(Message::Call { request, reply })
            .map_err(|_| WorkerError::Disconnected)?;
        response.await.map_err(|_| WorkerError::Disconnected)
    }

    /// Stops the worker after the requests already queued, and waits for the
    /// thread to exit. Calling it again is a no-op.
    pub async fn terminate(&self) {
        let _ = self.inbox.send(Message::Terminate);
        let exited = self.exited.lock().take();
        if let Some(exited) = exited {
            let _ = exited.await;
        }
        let thread = self.thread.lock().take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                tracing::warn!(worker = self.id, "worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let _ = self.inbox.send(Message::Terminate);
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Envelope, FailureKind, Payload};
    use embridge_testkit::MemoryEngineFactory;

    fn spawn() -> WorkerHandle {
        WorkerHandle::spawn(
            Arc::new(MemoryEngineFactory::new()),
            WorkerOptions::default().thread_name("test-worker"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn answers_requests_in_order() {
        let worker = spawn();
        assert_eq!(
            worker.call(Request::GetVersion).await.unwrap(),
            Response::Envelope(Envelope::failure(
                FailureKind::Uninitialized,
                "Engine is not initialized"
            ))
        );
        assert_eq!(
            worker.call(Request::Init).await.unwrap(),
            Response::Envelope(Envelope::done())
        );
        match worker.call(Request::GetVersion).await.unwrap() {
            Response::Envelope(Envelope::Success {
                result: Some(Payload::Text(version)),
                ..
            }) => assert!(!version.is_empty()),
            other => panic!("unexpected reply {other:?}"),
        }
        worker.terminate().await;
    }

    #[tokio::test]
    async fn terminate_is_idempotent() {
        let worker = spawn();
        assert!(worker.is_alive());
        worker.terminate().await;
        worker.terminate().await;
        assert!(!worker.is_alive());
        assert!(matches!(
            worker.call(Request::Init).await,
            Err(WorkerError::Disconnected)
        ));
    }

    #[test]
    fn options_builder() {
        let options = WorkerOptions::default()
            .thread_name("engine")
            .stack_size(4 << 20)
            .worker_path("/opt/engine.so");
        assert_eq!(options.thread_name, "engine");
        assert_eq!(options.stack_size, Some(4 << 20));
        assert_eq!(options.worker_path, Some(PathBuf::from("/opt/engine.so")));
    }
}
