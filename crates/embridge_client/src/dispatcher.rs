//! The dispatcher: owner of the worker thread.

use crate::config::DispatcherConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::fs::FileSystem;
use crate::reply;
use crate::single_flight::SingleFlight;
use embridge_engine::EngineFactory;
use embridge_worker::{Envelope, Request, Response, Transfer, WorkerHandle};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

/// Owns at most one worker thread and starts it on first use.
///
/// Clones share the same worker. Independent dispatchers run independent
/// workers and engines.
///
/// ```no_run
/// # async fn demo(factory: std::sync::Arc<dyn embridge_engine::EngineFactory>) -> embridge_client::BridgeResult<()> {
/// use embridge_client::Dispatcher;
///
/// let dispatcher = Dispatcher::new(factory);
/// println!("engine {}", dispatcher.version().await?);
/// dispatcher.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    factory: Arc<dyn EngineFactory>,
    config: Mutex<DispatcherConfig>,
    worker: Mutex<Option<Arc<WorkerHandle>>>,
    starting: SingleFlight<Arc<WorkerHandle>>,
}

impl Dispatcher {
    /// Creates a dispatcher with the default configuration.
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self::with_config(factory, DispatcherConfig::default())
    }

    /// Creates a dispatcher with `config`.
    pub fn with_config(factory: Arc<dyn EngineFactory>, config: DispatcherConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                factory,
                config: Mutex::new(config),
                worker: Mutex::new(None),
                starting: SingleFlight::new(),
            }),
        }
    }

    /// Creates a dispatcher configured from the environment.
    pub fn from_env(factory: Arc<dyn EngineFactory>) -> Self {
        Self::with_config(factory, DispatcherConfig::from_env())
    }

    /// Current configuration.
    pub fn config(&self) -> DispatcherConfig {
        self.inner.config.lock().clone()
    }

    /// Sets the engine module locator used by the next worker start.
    ///
    /// Fails with [`BridgeError::AlreadyStarted`] while a worker is running
    /// or starting.
    pub fn set_worker_path(&self, path: impl Into<PathBuf>) -> BridgeResult<()> {
        if self.is_running() || self.inner.starting.is_in_flight() {
            return Err(BridgeError::AlreadyStarted);
        }
        self.inner.config.lock().worker_path = Some(path.into());
        Ok(())
    }

    /// Returns the running worker, starting and initializing one if needed.
    ///
    /// Concurrent callers share a single start attempt and observe the same
    /// worker or the same error. A failed attempt is not cached.
    pub async fn worker(&self) -> BridgeResult<Arc<WorkerHandle>> {
        if let Some(worker) = self.running_worker() {
            return Ok(worker);
        }
        let inner = Arc::clone(&self.inner);
        self.inner.starting.run(move || start(inner)).await
    }

    /// Starts the worker and loads the engine.
    pub async fn init(&self) -> BridgeResult<()> {
        self.worker().await.map(|_| ())
    }

    /// Engine version.
    pub async fn version(&self) -> BridgeResult<String> {
        reply::text(self.request(Request::GetVersion).await?)
    }

    /// Engine storage format version.
    pub async fn storage_version(&self) -> BridgeResult<u64> {
        reply::count(self.request(Request::GetStorageVersion).await?)
    }

    /// The engine's filesystem.
    pub fn filesystem(&self) -> FileSystem {
        FileSystem::new(self.clone())
    }

    /// Whether a worker is running.
    pub fn is_running(&self) -> bool {
        self.inner.worker.lock().is_some()
    }

    /// Stops the worker and waits for its thread to exit.
    ///
    /// A start in progress is allowed to settle first. Does nothing when no
    /// worker is running. The next use starts a fresh worker.
    pub async fn close(&self) {
        self.inner.starting.wait_idle().await;
        let worker = self.inner.worker.lock().take();
        if let Some(worker) = worker {
            worker.terminate().await;
            tracing::info!(worker = worker.id(), "dispatcher closed worker");
        }
    }

    pub(crate) fn running_worker(&self) -> Option<Arc<WorkerHandle>> {
        self.inner.worker.lock().clone()
    }

    /// Sends `request`, starting the worker if needed.
    pub(crate) async fn request(&self, request: Request) -> BridgeResult<Envelope> {
        let worker = self.worker().await?;
        envelope(worker.call(request).await?)
    }

    /// Sends `request` only if a worker is running.
    pub(crate) async fn request_if_running(
        &self,
        request: Request,
    ) -> BridgeResult<Option<Envelope>> {
        match self.running_worker() {
            Some(worker) => Ok(Some(envelope(worker.call(request).await?)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn transfer(&self, request: Request) -> BridgeResult<Transfer> {
        let worker = self.worker().await?;
        match worker.call(request).await? {
            Response::Transfer(transfer) => Ok(transfer),
            Response::Envelope(Envelope::Failure { kind, error }) => {
                Err(reply::failure(kind, error))
            }
            Response::Envelope(other) => Err(BridgeError::Protocol(format!(
                "expected a transfer, got {other:?}"
            ))),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &*self.inner.config.lock())
            .field("running", &self.is_running())
            .finish()
    }
}

fn envelope(response: Response) -> BridgeResult<Envelope> {
    match response {
        Response::Envelope(envelope) => Ok(envelope),
        Response::Transfer(_) => Err(BridgeError::Protocol(
            "expected an envelope, got a transfer".into(),
        )),
    }
}

async fn start(inner: Arc<Inner>) -> BridgeResult<Arc<WorkerHandle>> {
    let options = inner.config.lock().worker_options();
    let worker = WorkerHandle::spawn(Arc::clone(&inner.factory), options)?;
    tracing::debug!(worker = worker.id(), "worker spawned, loading engine");

    let loaded = match worker.call(Request::Init).await {
        Ok(Response::Envelope(Envelope::Success { .. })) => Ok(()),
        Ok(Response::Envelope(Envelope::Failure { error, .. })) => {
            Err(BridgeError::Initialization(error))
        }
        Ok(Response::Transfer(_)) => Err(BridgeError::Protocol(
            "expected an envelope, got a transfer".into(),
        )),
        Err(err) => Err(BridgeError::Initialization(err.to_string())),
    };
    if let Err(err) = loaded {
        tracing::warn!(worker = worker.id(), error = %err, "engine initialization failed");
        worker.terminate().await;
        return Err(err);
    }

    let worker = Arc::new(worker);
    *inner.worker.lock() = Some(Arc::clone(&worker));
    tracing::info!(worker = worker.id(), "engine ready");
    Ok(worker)
}
