//! State shared by every proxy: the remote handle and its lifecycle.

use crate::dispatcher::Dispatcher;
use crate::error::{BridgeError, BridgeResult};
use crate::reply;
use crate::single_flight::SingleFlight;
use embridge_worker::{Envelope, Handle, ObjectKind, Request};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;

#[derive(Debug, Default)]
struct State {
    handle: Option<Handle>,
    closed: bool,
}

/// A handle to an engine object living in the worker.
///
/// Uninitialized until a handle is assigned, then ready, then closed for
/// good. A construction failure also closes it.
pub(crate) struct RemoteObject {
    kind: ObjectKind,
    dispatcher: Dispatcher,
    state: Arc<Mutex<State>>,
    init: SingleFlight<Handle>,
}

impl RemoteObject {
    /// An object that will be constructed on first use.
    pub(crate) fn lazy(kind: ObjectKind, dispatcher: Dispatcher) -> Self {
        Self {
            kind,
            dispatcher,
            state: Arc::new(Mutex::new(State::default())),
            init: SingleFlight::new(),
        }
    }

    /// An object the worker has already constructed.
    pub(crate) fn ready(kind: ObjectKind, dispatcher: Dispatcher, handle: Handle) -> Self {
        let remote = Self::lazy(kind, dispatcher);
        remote.state.lock().handle = Some(handle);
        remote
    }

    pub(crate) fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// The handle of a constructed, open object.
    pub(crate) fn handle(&self) -> BridgeResult<Handle> {
        let state = self.state.lock();
        match state.handle {
            Some(handle) if !state.closed => Ok(handle),
            _ => Err(BridgeError::closed(self.kind)),
        }
    }

    /// Returns the handle, running `construct` first if there is none yet.
    ///
    /// Concurrent first calls share one construction. Failure closes the
    /// object and is reported as [`BridgeError::Construction`] when the
    /// worker refused, or as-is otherwise.
    pub(crate) async fn get_or_init<F, Fut>(&self, construct: F) -> BridgeResult<Handle>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BridgeResult<Handle>> + Send + 'static,
    {
        {
            let state = self.state.lock();
            if state.closed {
                return Err(BridgeError::closed(self.kind));
            }
            if let Some(handle) = state.handle {
                return Ok(handle);
            }
        }
        self.construct_once(construct).await
    }

    /// Joins or starts the construction without the lock-free fast path.
    ///
    /// The state is read again under the flight lock: an attempt that
    /// settled or a close that landed after the caller's first look wins
    /// over a second construction.
    pub(crate) async fn construct_once<F, Fut>(&self, construct: F) -> BridgeResult<Handle>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BridgeResult<Handle>> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let kind = self.kind;
        self.init
            .run(move || {
                let pending = {
                    let current = state.lock();
                    if current.closed {
                        Err(Err(BridgeError::closed(kind)))
                    } else if let Some(handle) = current.handle {
                        Err(Ok(handle))
                    } else {
                        Ok(())
                    }
                };
                let constructing = pending.map(|()| construct());
                async move {
                    let constructing = match constructing {
                        Ok(constructing) => constructing,
                        Err(settled) => return settled,
                    };
                    match constructing.await {
                        Ok(handle) => {
                            state.lock().handle = Some(handle);
                            tracing::trace!(%kind, %handle, "constructed");
                            Ok(handle)
                        }
                        Err(err) => {
                            state.lock().closed = true;
                            tracing::warn!(%kind, error = %err, "construction failed");
                            Err(err)
                        }
                    }
                }
            })
            .await
    }

    /// Sends a request addressed to this object.
    pub(crate) async fn request(&self, request: Request) -> BridgeResult<Envelope> {
        self.dispatcher.request(request).await
    }

    /// Closes the object. Idempotent.
    ///
    /// Marks it closed, lets a construction in flight settle, then releases
    /// the remote object if there is one and a worker is still running.
    pub(crate) async fn close(&self, release: impl FnOnce(Handle) -> Request) -> BridgeResult<()> {
        self.state.lock().closed = true;
        self.init.wait_idle().await;
        let handle = self.state.lock().handle.take();
        let Some(handle) = handle else {
            return Ok(());
        };
        match self.dispatcher.request_if_running(release(handle)).await? {
            Some(reply) => reply::unit(reply),
            None => {
                tracing::debug!(kind = %self.kind, %handle, "no worker running, closed locally");
                Ok(())
            }
        }
    }
}

impl Drop for RemoteObject {
    fn drop(&mut self) {
        let state = self.state.lock();
        if let (Some(handle), false) = (state.handle, state.closed) {
            tracing::warn!(kind = %self.kind, %handle, "proxy dropped without close; the engine object stays registered");
        }
    }
}

impl std::fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RemoteObject")
            .field("kind", &self.kind)
            .field("handle", &state.handle)
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embridge_testkit::MemoryEngineFactory;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(MemoryEngineFactory::new()))
    }

    #[tokio::test]
    async fn settled_state_is_rechecked_under_the_flight_lock() {
        let dispatcher = dispatcher();
        let calls = Arc::new(AtomicUsize::new(0));
        let construct = |calls: Arc<AtomicUsize>| {
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, BridgeError>(Handle::generate()) }
            }
        };

        let existing = Handle::generate();
        let ready = RemoteObject::ready(ObjectKind::Connection, dispatcher.clone(), existing);
        assert_eq!(
            ready.construct_once(construct(Arc::clone(&calls))).await,
            Ok(existing)
        );

        let closed = RemoteObject::lazy(ObjectKind::Database, dispatcher.clone());
        closed.state.lock().closed = true;
        assert_eq!(
            closed.construct_once(construct(Arc::clone(&calls))).await,
            Err(BridgeError::closed(ObjectKind::Database))
        );

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!ready.init.is_in_flight());
        ready.close(|handle| Request::ConnectionClose { id: handle }).await.unwrap();
        assert!(!dispatcher.is_running());
    }

    #[tokio::test]
    async fn construction_runs_once_when_state_is_empty() {
        let dispatcher = dispatcher();
        let remote = RemoteObject::lazy(ObjectKind::Database, dispatcher);
        let handle = Handle::generate();

        assert_eq!(remote.construct_once(move || async move { Ok(handle) }).await, Ok(handle));
        assert_eq!(remote.get_or_init(|| async { Ok(Handle::generate()) }).await, Ok(handle));
        assert_eq!(remote.handle(), Ok(handle));
        remote.close(|handle| Request::DatabaseClose { id: handle }).await.unwrap();
        assert!(remote.is_closed());
    }
}
