//! Error type raised by engine calls.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// A failure reported by the engine.
///
/// The message is the engine's own diagnostic text. The bridge relays it to
/// callers verbatim, so implementations should put everything a user needs
/// into it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct EngineError {
    /// Diagnostic text.
    pub message: String,
}

impl EngineError {
    /// Creates an engine error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the diagnostic text.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for EngineError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for EngineError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_verbatim() {
        let err = EngineError::new("Binder exception: Table dog does not exist.");
        assert_eq!(err.to_string(), "Binder exception: Table dog does not exist.");
        assert_eq!(err.message(), err.to_string());
    }

    #[test]
    fn conversions() {
        let a: EngineError = "boom".into();
        let b: EngineError = String::from("boom").into();
        assert_eq!(a, b);
    }
}
