//! Opaque handles.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// An opaque token naming one engine object inside one worker.
///
/// Handles are random v4 UUIDs. They carry no meaning outside the
/// [`crate::HandleRegistry`] that minted them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Handle(Uuid);

impl Handle {
    /// Draws a fresh random handle.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kinds of engine object a handle can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// A database.
    Database,
    /// A connection.
    Connection,
    /// A prepared statement.
    PreparedStatement,
    /// A query result cursor.
    QueryResult,
}

impl ObjectKind {
    /// Human-readable name used in diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Database => "Database",
            ObjectKind::Connection => "Connection",
            ObjectKind::PreparedStatement => "Prepared statement",
            ObjectKind::QueryResult => "Query result",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
