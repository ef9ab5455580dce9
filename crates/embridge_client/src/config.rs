//! Dispatcher configuration.

use embridge_worker::WorkerOptions;
use std::path::PathBuf;

/// Environment variable read by [`DispatcherConfig::from_env`].
pub const WORKER_PATH_ENV: &str = "EMBRIDGE_WORKER_PATH";

/// Configuration for a [`crate::Dispatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Engine module locator handed to the engine factory.
    pub worker_path: Option<PathBuf>,

    /// Worker thread name prefix.
    pub thread_name: String,

    /// Worker thread stack size (platform default when unset).
    pub stack_size: Option<usize>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_path: None,
            thread_name: "embridge-worker".to_string(),
            stack_size: None,
        }
    }
}

impl DispatcherConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration, with the worker path taken from
    /// `EMBRIDGE_WORKER_PATH` when it is set and non-empty.
    #[must_use]
    pub fn from_env() -> Self {
        let config = Self::default();
        match std::env::var_os(WORKER_PATH_ENV) {
            Some(path) if !path.is_empty() => config.with_worker_path(path),
            _ => config,
        }
    }

    /// Sets the engine module locator.
    #[must_use]
    pub fn with_worker_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.worker_path = Some(path.into());
        self
    }

    /// Sets the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Sets the worker thread stack size.
    #[must_use]
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    pub(crate) fn worker_options(&self) -> WorkerOptions {
        let mut options = WorkerOptions::default().thread_name(self.thread_name.clone());
        if let Some(size) = self.stack_size {
            options = options.stack_size(size);
        }
        if let Some(path) = &self.worker_path {
            options = options.worker_path(path.clone());
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = DispatcherConfig::default();
        assert_eq!(config.worker_path, None);
        assert_eq!(config.thread_name, "embridge-worker");
        assert_eq!(config.stack_size, None);
    }

    #[test]
    fn builder_pattern() {
        let config = DispatcherConfig::new()
            .with_worker_path("/opt/engine")
            .with_thread_name("graph")
            .with_stack_size(8 << 20);

        let options = config.worker_options();
        assert_eq!(options.thread_name, "graph");
        assert_eq!(options.stack_size, Some(8 << 20));
        assert_eq!(options.worker_path, Some(PathBuf::from("/opt/engine")));
    }
}
