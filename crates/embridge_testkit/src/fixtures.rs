//! Test fixtures: instrumented engine factories and logging setup.

use crate::engine::MemoryEngineFactory;
use embridge_engine::{Engine, EngineFactory, EngineResult};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber honoring `RUST_LOG`, writing through the
/// test harness. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Wraps a factory and records every load.
#[derive(Debug)]
pub struct CountingFactory<F = MemoryEngineFactory> {
    inner: F,
    loads: AtomicUsize,
    paths: Mutex<Vec<Option<PathBuf>>>,
    delay: Option<Duration>,
}

impl CountingFactory {
    /// Counts loads of a fresh [`MemoryEngineFactory`].
    pub fn new() -> Self {
        Self::wrap(MemoryEngineFactory::new())
    }
}

impl Default for CountingFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: EngineFactory> CountingFactory<F> {
    /// Counts loads of `inner`.
    pub fn wrap(inner: F) -> Self {
        Self {
            inner,
            loads: AtomicUsize::new(0),
            paths: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleeps for `delay` inside every load, widening the window in which
    /// concurrent callers race for initialization.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of loads so far.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Module locators passed to each load, in order.
    pub fn worker_paths(&self) -> Vec<Option<PathBuf>> {
        self.paths.lock().clone()
    }
}

impl<F: EngineFactory> EngineFactory for CountingFactory<F> {
    fn load(&self, worker_path: Option<&Path>) -> EngineResult<Box<dyn Engine>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.paths.lock().push(worker_path.map(Path::to_path_buf));
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.inner.load(worker_path)
    }
}

/// Fails the first `failures` loads, then delegates.
#[derive(Debug)]
pub struct FailingFactory<F = MemoryEngineFactory> {
    inner: F,
    remaining: AtomicUsize,
    attempts: AtomicUsize,
    message: String,
}

impl FailingFactory {
    /// Fails `failures` times before loading a [`MemoryEngineFactory`] engine.
    pub fn new(failures: usize) -> Self {
        Self::wrap(failures, MemoryEngineFactory::new())
    }
}

impl<F: EngineFactory> FailingFactory<F> {
    /// Fails `failures` times before delegating to `inner`.
    pub fn wrap(failures: usize, inner: F) -> Self {
        Self {
            inner,
            remaining: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
            message: "Failed to load engine module".to_string(),
        }
    }

    /// Sets the failure message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Number of load attempts so far, failed or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl<F: EngineFactory> EngineFactory for FailingFactory<F> {
    fn load(&self, worker_path: Option<&Path>) -> EngineResult<Box<dyn Engine>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(self.message.clone().into());
        }
        self.inner.load(worker_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counting_records_paths() {
        let factory = CountingFactory::new();
        factory.load(None).unwrap();
        factory.load(Some(Path::new("/opt/engine"))).unwrap();
        assert_eq!(factory.loads(), 2);
        assert_eq!(
            factory.worker_paths(),
            vec![None, Some(PathBuf::from("/opt/engine"))]
        );
    }

    #[test]
    fn failing_then_succeeding() {
        let factory = FailingFactory::new(2).with_message("no module");
        assert_eq!(factory.load(None).err().unwrap().message(), "no module");
        assert!(factory.load(None).is_err());
        assert!(factory.load(None).is_ok());
        assert_eq!(factory.attempts(), 3);
    }
}
