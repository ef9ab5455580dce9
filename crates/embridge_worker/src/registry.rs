//! The handle registry.

use crate::handle::{Handle, ObjectKind};
use embridge_engine::{EngineConnection, EngineDatabase, EnginePreparedStatement, EngineQueryResult};
use std::collections::HashMap;
use std::fmt;

/// A live engine object owned by the registry.
pub enum EngineObject {
    /// A database.
    Database(Box<dyn EngineDatabase>),
    /// A connection.
    Connection(Box<dyn EngineConnection>),
    /// A prepared statement.
    PreparedStatement(Box<dyn EnginePreparedStatement>),
    /// A query result cursor.
    QueryResult(Box<dyn EngineQueryResult>),
}

impl EngineObject {
    /// The kind of this object.
    pub fn kind(&self) -> ObjectKind {
        match self {
            EngineObject::Database(_) => ObjectKind::Database,
            EngineObject::Connection(_) => ObjectKind::Connection,
            EngineObject::PreparedStatement(_) => ObjectKind::PreparedStatement,
            EngineObject::QueryResult(_) => ObjectKind::QueryResult,
        }
    }

    fn close(&mut self) {
        match self {
            EngineObject::Database(db) => db.close(),
            EngineObject::Connection(conn) => conn.close(),
            EngineObject::PreparedStatement(stmt) => stmt.close(),
            EngineObject::QueryResult(result) => result.close(),
        }
    }
}

impl fmt::Debug for EngineObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EngineObject({})", self.kind())
    }
}

/// A handle lookup that found nothing of the requested kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotFound(pub ObjectKind);

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} not found", self.0)
    }
}

impl std::error::Error for NotFound {}

struct Entry {
    object: EngineObject,
    parent: Option<Handle>,
}

/// Maps handles to the engine objects they name.
///
/// Every entry remembers the handle it was derived from (a connection's
/// database, a result's connection). Closing an entry closes everything
/// derived from it first, so no surviving handle can reach an engine object
/// whose owner was released.
#[derive(Default)]
pub struct HandleRegistry {
    entries: HashMap<Handle, Entry>,
}

impl HandleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an object and returns its freshly minted handle.
    pub fn insert(&mut self, object: EngineObject, parent: Option<Handle>) -> Handle {
        let mut handle = Handle::generate();
        while self.entries.contains_key(&handle) {
            handle = Handle::generate();
        }
        tracing::trace!(%handle, kind = %object.kind(), "registered engine object");
        self.entries.insert(handle, Entry { object, parent });
        handle
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if `handle` names a live object.
    pub fn contains(&self, handle: Handle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// The kind of the object named by `handle`.
    pub fn kind_of(&self, handle: Handle) -> Option<ObjectKind> {
        self.entries.get(&handle).map(|e| e.object.kind())
    }

    /// The handle `handle` was derived from.
    pub fn parent_of(&self, handle: Handle) -> Option<Handle> {
        self.entries.get(&handle).and_then(|e| e.parent)
    }

    /// Looks up a database.
    pub fn database(&self, handle: Handle) -> Result<&dyn EngineDatabase, NotFound> {
        match self.entries.get(&handle).map(|e| &e.object) {
            Some(EngineObject::Database(db)) => Ok(db.as_ref()),
            _ => Err(NotFound(ObjectKind::Database)),
        }
    }

    /// Looks up a connection.
    pub fn connection(&self, handle: Handle) -> Result<&dyn EngineConnection, NotFound> {
        match self.entries.get(&handle).map(|e| &e.object) {
            Some(EngineObject::Connection(conn)) => Ok(conn.as_ref()),
            _ => Err(NotFound(ObjectKind::Connection)),
        }
    }

    /// Looks up a prepared statement.
    pub fn prepared_statement(
        &self,
        handle: Handle,
    ) -> Result<&dyn EnginePreparedStatement, NotFound> {
        match self.entries.get(&handle).map(|e| &e.object) {
            Some(EngineObject::PreparedStatement(stmt)) => Ok(stmt.as_ref()),
            _ => Err(NotFound(ObjectKind::PreparedStatement)),
        }
    }

    /// Looks up a query result.
    pub fn query_result(&self, handle: Handle) -> Result<&dyn EngineQueryResult, NotFound> {
        match self.entries.get(&handle).map(|e| &e.object) {
            Some(EngineObject::QueryResult(result)) => Ok(result.as_ref()),
            _ => Err(NotFound(ObjectKind::QueryResult)),
        }
    }

    /// Looks up a query result for mutation.
    pub fn query_result_mut(
        &mut self,
        handle: Handle,
    ) -> Result<&mut dyn EngineQueryResult, NotFound> {
        match self.entries.get_mut(&handle).map(|e| &mut e.object) {
            Some(EngineObject::QueryResult(result)) => Ok(result.as_mut()),
            _ => Err(NotFound(ObjectKind::QueryResult)),
        }
    }

    /// Closes the object named by `handle` if it is of kind `kind`, along
    /// with everything derived from it.
    ///
    /// Returns how many objects were closed. Absent handles (already
    /// closed, never minted, or of another kind) are a no-op.
    pub fn close(&mut self, handle: Handle, kind: ObjectKind) -> usize {
        if self.kind_of(handle) != Some(kind) {
            return 0;
        }
        let doomed = self.subtree(handle);
        let mut closed = 0;
        for h in doomed {
            if let Some(mut entry) = self.entries.remove(&h) {
                entry.object.close();
                tracing::trace!(handle = %h, kind = %entry.object.kind(), "closed engine object");
                closed += 1;
            }
        }
        closed
    }

    /// `root` and all entries derived from it, most-derived first.
    fn subtree(&self, root: Handle) -> Vec<Handle> {
        let mut order = vec![root];
        let mut next = 0;
        while next < order.len() {
            let current = order[next];
            order.extend(
                self.entries
                    .iter()
                    .filter(|(_, e)| e.parent == Some(current))
                    .map(|(h, _)| *h),
            );
            next += 1;
        }
        order.reverse();
        order
    }
}

impl fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embridge_engine::{EngineResult, Value};
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type CloseLog = Rc<RefCell<Vec<&'static str>>>;

    struct StubDatabase(CloseLog);

    impl EngineDatabase for StubDatabase {
        fn connect(&self, _num_threads: Option<u64>) -> EngineResult<Box<dyn EngineConnection>> {
            Ok(Box::new(StubConnection(Rc::clone(&self.0))))
        }

        fn close(&mut self) {
            self.0.borrow_mut().push("database");
        }
    }

    struct StubConnection(CloseLog);

    impl EngineConnection for StubConnection {
        fn set_max_num_thread_for_exec(&self, _num_threads: u64) -> EngineResult<()> {
            Ok(())
        }

        fn set_query_timeout(&self, _timeout_ms: u64) -> EngineResult<()> {
            Ok(())
        }

        fn max_num_thread_for_exec(&self) -> EngineResult<u64> {
            Ok(1)
        }

        fn query(&self, _statement: &str) -> EngineResult<Box<dyn EngineQueryResult>> {
            Err("unsupported".into())
        }

        fn prepare(&self, _statement: &str) -> EngineResult<Box<dyn EnginePreparedStatement>> {
            Ok(Box::new(StubStatement(Rc::clone(&self.0))))
        }

        fn execute(
            &self,
            _statement: &dyn EnginePreparedStatement,
            _params: Vec<(String, Value)>,
        ) -> EngineResult<Box<dyn EngineQueryResult>> {
            Err("unsupported".into())
        }

        fn close(&mut self) {
            self.0.borrow_mut().push("connection");
        }
    }

    struct StubStatement(CloseLog);

    impl EnginePreparedStatement for StubStatement {
        fn is_success(&self) -> bool {
            true
        }

        fn error_message(&self) -> String {
            String::new()
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn close(&mut self) {
            self.0.borrow_mut().push("statement");
        }
    }

    fn log() -> CloseLog {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn insert_and_lookup() {
        let mut registry = HandleRegistry::new();
        let db = registry.insert(EngineObject::Database(Box::new(StubDatabase(log()))), None);

        assert!(registry.contains(db));
        assert!(registry.database(db).is_ok());
        assert_eq!(registry.kind_of(db), Some(ObjectKind::Database));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn wrong_kind_is_not_found() {
        let mut registry = HandleRegistry::new();
        let db = registry.insert(EngineObject::Database(Box::new(StubDatabase(log()))), None);

        let err = registry.connection(db).err().unwrap();
        assert_eq!(err, NotFound(ObjectKind::Connection));
        assert_eq!(err.to_string(), "Connection not found");
        assert_eq!(registry.close(db, ObjectKind::Connection), 0);
        assert!(registry.contains(db));
    }

    #[test]
    fn close_is_idempotent() {
        let closes = log();
        let mut registry = HandleRegistry::new();
        let db = registry.insert(
            EngineObject::Database(Box::new(StubDatabase(Rc::clone(&closes)))),
            None,
        );

        assert_eq!(registry.close(db, ObjectKind::Database), 1);
        assert_eq!(registry.close(db, ObjectKind::Database), 0);
        assert!(registry.is_empty());
        assert_eq!(*closes.borrow(), vec!["database"]);
    }

    #[test]
    fn close_cascades_to_dependents_first() {
        let closes = log();
        let mut registry = HandleRegistry::new();
        let db = registry.insert(
            EngineObject::Database(Box::new(StubDatabase(Rc::clone(&closes)))),
            None,
        );
        let conn = registry.database(db).unwrap().connect(None).unwrap();
        let conn = registry.insert(EngineObject::Connection(conn), Some(db));
        let stmt = registry.connection(conn).unwrap().prepare("RETURN 1").unwrap();
        let stmt = registry.insert(EngineObject::PreparedStatement(stmt), Some(conn));

        assert_eq!(registry.parent_of(stmt), Some(conn));
        assert_eq!(registry.close(db, ObjectKind::Database), 3);
        assert!(registry.is_empty());
        assert_eq!(*closes.borrow(), vec!["statement", "connection", "database"]);
        assert!(registry.prepared_statement(stmt).is_err());
    }

    #[test]
    fn closing_a_child_leaves_the_parent() {
        let mut registry = HandleRegistry::new();
        let db = registry.insert(EngineObject::Database(Box::new(StubDatabase(log()))), None);
        let conn = registry.database(db).unwrap().connect(None).unwrap();
        let conn = registry.insert(EngineObject::Connection(conn), Some(db));

        assert_eq!(registry.close(conn, ObjectKind::Connection), 1);
        assert!(registry.contains(db));
    }

    proptest! {
        #[test]
        fn handles_are_distinct(closes in proptest::collection::vec(any::<bool>(), 1..300)) {
            let mut registry = HandleRegistry::new();
            let mut minted = std::collections::HashSet::new();
            let mut live = 0usize;
            for close_it in closes {
                let handle =
                    registry.insert(EngineObject::Database(Box::new(StubDatabase(log()))), None);
                prop_assert!(minted.insert(handle));
                live += 1;
                if close_it {
                    prop_assert_eq!(registry.close(handle, ObjectKind::Database), 1);
                    live -= 1;
                }
            }
            prop_assert_eq!(registry.len(), live);
        }
    }
}
