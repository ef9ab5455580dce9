//! At most one initialization attempt in flight.

use crate::error::BridgeResult;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::future::Future;

type Flight<T> = Shared<BoxFuture<'static, BridgeResult<T>>>;

/// Shares one in-progress attempt among all concurrent callers.
///
/// The attempt is forgotten once it settles, whatever its outcome, so the
/// next [`SingleFlight::run`] starts afresh. Caching a successful value is
/// the caller's business.
pub(crate) struct SingleFlight<T> {
    current: Mutex<Option<Flight<T>>>,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    /// Joins the attempt in flight, or starts one with `start`.
    ///
    /// `start` runs under a lock and should only build the future.
    pub(crate) async fn run<F, Fut>(&self, start: F) -> BridgeResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BridgeResult<T>> + Send + 'static,
    {
        let flight = {
            let mut current = self.current.lock();
            match current.as_ref() {
                Some(flight) => flight.clone(),
                None => {
                    let flight = start().boxed().shared();
                    *current = Some(flight.clone());
                    flight
                }
            }
        };
        let outcome = flight.clone().await;
        self.settle(&flight);
        outcome
    }

    /// Whether an attempt is in progress.
    pub(crate) fn is_in_flight(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Waits for the attempt in flight, if any, ignoring its outcome.
    pub(crate) async fn wait_idle(&self) {
        let flight = self.current.lock().clone();
        if let Some(flight) = flight {
            let _ = flight.clone().await;
            self.settle(&flight);
        }
    }

    fn settle(&self, flight: &Flight<T>) {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|c| c.ptr_eq(flight)) {
            *current = None;
        }
    }
}

impl<T> std::fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.current.lock().is_some())
            .finish()
    }
}
