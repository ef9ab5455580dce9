//! An in-memory engine implementing the embridge engine boundary.

use crate::catalog::{Catalog, Output, Params};
use crate::fs::{MemoryFs, PersistentStore};
use crate::parser::{parse, Statement};
use embridge_engine::{
    DatabaseConfig, Engine, EngineConnection, EngineDatabase, EngineError, EngineFactory,
    EnginePreparedStatement, EngineQueryResult, EngineResult, QuerySummary, Row, Value, VirtualFs,
};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Storage format version reported by [`MemoryEngine`].
pub const STORAGE_VERSION: u64 = 1;

/// Thread limit used when a database does not configure one.
pub const DEFAULT_MAX_NUM_THREADS: u64 = 4;

/// Databases and connections opened across every engine of one factory.
#[derive(Debug, Clone, Default)]
struct OpenCounts {
    databases: Arc<AtomicUsize>,
    connections: Arc<AtomicUsize>,
}

/// Loads [`MemoryEngine`]s that share one [`PersistentStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryEngineFactory {
    store: PersistentStore,
    opened: OpenCounts,
}

impl MemoryEngineFactory {
    /// Creates a factory with a fresh store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a factory whose engines persist into `store`.
    pub fn with_store(store: PersistentStore) -> Self {
        Self {
            store,
            opened: OpenCounts::default(),
        }
    }

    /// The store shared by every engine this factory loads.
    pub fn store(&self) -> &PersistentStore {
        &self.store
    }

    /// Databases successfully opened by engines this factory loaded.
    pub fn databases_opened(&self) -> usize {
        self.opened.databases.load(Ordering::SeqCst)
    }

    /// Connections successfully opened by engines this factory loaded.
    pub fn connections_opened(&self) -> usize {
        self.opened.connections.load(Ordering::SeqCst)
    }
}

impl EngineFactory for MemoryEngineFactory {
    fn load(&self, worker_path: Option<&Path>) -> EngineResult<Box<dyn Engine>> {
        tracing::debug!(worker_path = ?worker_path, "loading in-memory engine");
        let mut engine = MemoryEngine::new(self.store.clone());
        engine.opened = self.opened.clone();
        Ok(Box::new(engine))
    }
}

/// A small single-threaded graph engine.
///
/// On-disk databases are simulated: opening the same path twice within one
/// engine shares the same tables.
pub struct MemoryEngine {
    fs: MemoryFs,
    databases: RefCell<HashMap<String, Rc<RefCell<Catalog>>>>,
    opened: OpenCounts,
}

impl MemoryEngine {
    /// Creates an engine whose filesystem persists into `store`.
    pub fn new(store: PersistentStore) -> Self {
        Self {
            fs: MemoryFs::new(store),
            databases: RefCell::new(HashMap::new()),
            opened: OpenCounts::default(),
        }
    }
}

impl Engine for MemoryEngine {
    fn version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    fn storage_version(&self) -> u64 {
        STORAGE_VERSION
    }

    fn open_database(&self, config: &DatabaseConfig) -> EngineResult<Box<dyn EngineDatabase>> {
        let catalog = if config.is_in_memory() {
            if config.read_only {
                return Err("Cannot open an in-memory database under READ ONLY mode.".into());
            }
            Rc::new(RefCell::new(Catalog::default()))
        } else {
            let mut databases = self.databases.borrow_mut();
            match databases.get(&config.path) {
                Some(existing) => Rc::clone(existing),
                None if config.read_only => {
                    return Err("Cannot create an empty database under READ ONLY mode.".into());
                }
                None => {
                    let catalog = Rc::new(RefCell::new(Catalog::default()));
                    databases.insert(config.path.clone(), Rc::clone(&catalog));
                    catalog
                }
            }
        };
        let max_num_threads = match config.max_num_threads {
            0 => DEFAULT_MAX_NUM_THREADS,
            n => n,
        };
        self.opened.databases.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryDatabase {
            catalog,
            read_only: config.read_only,
            max_num_threads,
            connections: Arc::clone(&self.opened.connections),
        }))
    }

    fn filesystem(&mut self) -> Option<&mut dyn VirtualFs> {
        Some(&mut self.fs)
    }
}

struct MemoryDatabase {
    catalog: Rc<RefCell<Catalog>>,
    read_only: bool,
    max_num_threads: u64,
    connections: Arc<AtomicUsize>,
}

impl EngineDatabase for MemoryDatabase {
    fn connect(&self, num_threads: Option<u64>) -> EngineResult<Box<dyn EngineConnection>> {
        let threads = match num_threads {
            Some(0) => return Err(zero_threads()),
            Some(n) => n,
            None => self.max_num_threads,
        };
        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            catalog: Rc::clone(&self.catalog),
            read_only: self.read_only,
            max_num_threads: Cell::new(threads),
            timeout_ms: Cell::new(0),
        }))
    }

    fn close(&mut self) {}
}

fn zero_threads() -> EngineError {
    EngineError::new("Number of threads must be greater than 0.")
}

struct MemoryConnection {
    catalog: Rc<RefCell<Catalog>>,
    read_only: bool,
    max_num_threads: Cell<u64>,
    timeout_ms: Cell<u64>,
}

impl MemoryConnection {
    fn run(&self, statements: &[Statement], params: &Params, compile_ms: f64) -> MemoryQueryResult {
        let mut results = Vec::with_capacity(statements.len());
        for statement in statements {
            let result = self.run_one(statement, params, compile_ms);
            let failed = result.error.is_some();
            results.push(result);
            if failed {
                break;
            }
        }
        chain(results)
    }

    fn run_one(&self, statement: &Statement, params: &Params, compile_ms: f64) -> MemoryQueryResult {
        if statement.is_write() && self.read_only {
            return MemoryQueryResult::failed(
                "Connection exception: Cannot execute write operations in a read-only database!",
            );
        }
        let started = Instant::now();
        let mut catalog = self.catalog.borrow_mut();
        let outcome = catalog
            .bind(statement)
            .and_then(|()| catalog.execute(statement, params));
        let execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        let timeout = self.timeout_ms.get();
        if timeout > 0 && execution_time_ms > timeout as f64 {
            return MemoryQueryResult::failed("Interrupted.");
        }
        match outcome {
            Ok(output) => MemoryQueryResult::succeeded(
                output,
                QuerySummary {
                    compiling_time_ms: compile_ms,
                    execution_time_ms,
                },
            ),
            Err(message) => MemoryQueryResult::failed(message),
        }
    }
}

impl EngineConnection for MemoryConnection {
    fn set_max_num_thread_for_exec(&self, num_threads: u64) -> EngineResult<()> {
        if num_threads == 0 {
            return Err(zero_threads());
        }
        self.max_num_threads.set(num_threads);
        Ok(())
    }

    fn set_query_timeout(&self, timeout_ms: u64) -> EngineResult<()> {
        self.timeout_ms.set(timeout_ms);
        Ok(())
    }

    fn max_num_thread_for_exec(&self) -> EngineResult<u64> {
        Ok(self.max_num_threads.get())
    }

    fn query(&self, statement: &str) -> EngineResult<Box<dyn EngineQueryResult>> {
        let started = Instant::now();
        let result = match parse(statement) {
            Ok(statements) => {
                let compile_ms = started.elapsed().as_secs_f64() * 1000.0;
                self.run(&statements, &Params::new(), compile_ms)
            }
            Err(message) => MemoryQueryResult::failed(message),
        };
        Ok(Box::new(result))
    }

    fn prepare(&self, statement: &str) -> EngineResult<Box<dyn EnginePreparedStatement>> {
        let started = Instant::now();
        let prepared = match parse(statement) {
            Ok(statements) => {
                // only the first statement can be bound up front; later ones
                // may depend on tables the earlier ones create
                let bound = statements.first().map(|s| self.catalog.borrow().bind(s));
                match bound {
                    Some(Err(message)) => MemoryPreparedStatement::failed(message),
                    _ => MemoryPreparedStatement {
                        statements,
                        error: None,
                        compile_ms: started.elapsed().as_secs_f64() * 1000.0,
                    },
                }
            }
            Err(message) => MemoryPreparedStatement::failed(message),
        };
        Ok(Box::new(prepared))
    }

    fn execute(
        &self,
        statement: &dyn EnginePreparedStatement,
        params: Vec<(String, Value)>,
    ) -> EngineResult<Box<dyn EngineQueryResult>> {
        let prepared = statement
            .as_any()
            .downcast_ref::<MemoryPreparedStatement>()
            .ok_or_else(|| EngineError::new("Prepared statement was not created by this engine."))?;
        if let Some(error) = &prepared.error {
            return Ok(Box::new(MemoryQueryResult::failed(error.clone())));
        }
        let expected: Vec<_> = prepared.statements.iter().flat_map(|s| s.params()).collect();
        let mut bound = Params::new();
        for (name, value) in params {
            if !expected.contains(&name) {
                return Ok(Box::new(MemoryQueryResult::failed(format!(
                    "Parameter {name} not found."
                ))));
            }
            bound.insert(name, value);
        }
        Ok(Box::new(self.run(&prepared.statements, &bound, prepared.compile_ms)))
    }

    fn close(&mut self) {}
}

struct MemoryPreparedStatement {
    statements: Vec<Statement>,
    error: Option<String>,
    compile_ms: f64,
}

impl MemoryPreparedStatement {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            statements: Vec::new(),
            error: Some(message.into()),
            compile_ms: 0.0,
        }
    }
}

impl EnginePreparedStatement for MemoryPreparedStatement {
    fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn error_message(&self) -> String {
        self.error.clone().unwrap_or_default()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn close(&mut self) {}
}

struct MemoryQueryResult {
    error: Option<String>,
    columns: Vec<String>,
    types: Vec<String>,
    rows: Vec<Row>,
    cursor: usize,
    summary: QuerySummary,
    next: Option<Box<MemoryQueryResult>>,
}

impl MemoryQueryResult {
    fn succeeded(output: Output, summary: QuerySummary) -> Self {
        Self {
            error: None,
            columns: output.columns,
            types: output.types,
            rows: output.rows,
            cursor: 0,
            summary,
            next: None,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            columns: Vec::new(),
            types: Vec::new(),
            rows: Vec::new(),
            cursor: 0,
            summary: QuerySummary::default(),
            next: None,
        }
    }
}

/// Links per-statement results so each one leads to the next.
fn chain(results: Vec<MemoryQueryResult>) -> MemoryQueryResult {
    let mut next: Option<Box<MemoryQueryResult>> = None;
    for mut result in results.into_iter().rev() {
        result.next = next;
        next = Some(Box::new(result));
    }
    next.map(|head| *head)
        .unwrap_or_else(|| MemoryQueryResult::failed("Parser exception: Query is empty."))
}

impl EngineQueryResult for MemoryQueryResult {
    fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn error_message(&self) -> String {
        self.error.clone().unwrap_or_default()
    }

    fn has_next(&self) -> bool {
        self.cursor < self.rows.len()
    }

    fn has_next_query_result(&self) -> bool {
        self.next.is_some()
    }

    fn get_next(&mut self) -> EngineResult<Option<Row>> {
        let row = self.rows.get(self.cursor).cloned();
        if row.is_some() {
            self.cursor += 1;
        }
        Ok(row)
    }

    fn get_all_rows(&mut self) -> EngineResult<Vec<Row>> {
        let rows = self.rows[self.cursor..].to_vec();
        self.cursor = self.rows.len();
        Ok(rows)
    }

    fn num_tuples(&self) -> u64 {
        self.rows.len() as u64
    }

    fn num_columns(&self) -> u64 {
        self.columns.len() as u64
    }

    fn column_names(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn column_types(&self) -> Vec<String> {
        self.types.clone()
    }

    fn reset_iterator(&mut self) -> EngineResult<()> {
        self.cursor = 0;
        Ok(())
    }

    fn query_summary(&self) -> QuerySummary {
        self.summary
    }

    fn next_query_result(&mut self) -> EngineResult<Option<Box<dyn EngineQueryResult>>> {
        Ok(self
            .next
            .take()
            .map(|next| next as Box<dyn EngineQueryResult>))
    }

    fn render(&self) -> String {
        if let Some(error) = &self.error {
            return error.clone();
        }
        let mut out = self.columns.join("|");
        out.push('\n');
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(Value::to_string).collect();
            out.push_str(&cells.join("|"));
            out.push('\n');
        }
        out
    }

    fn close(&mut self) {
        self.next = None;
    }
}
