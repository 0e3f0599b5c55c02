//! In-memory warehouse and destination fakes for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::schema::{ExistingColumn, Field, Schema};
use crate::core::traits::{
    Destination, LoadTransaction, RowStream, TypeMapper, TypeMapping, Warehouse,
};
use crate::core::value::{Row, SqlValue, WarehouseValue};
use crate::error::{LoadError, Result};
use crate::typemap::StarRocksTypeMapper;

/// `n` rows of `(id INTEGER, name STRING)`, ids starting at 1.
pub(crate) fn rows(n: usize) -> Vec<Row> {
    (1..=n)
        .map(|i| {
            vec![
                WarehouseValue::from(i as i64),
                WarehouseValue::from(format!("row-{i}")),
            ]
        })
        .collect()
}

/// A row stream replaying a fixed list of rows.
pub(crate) struct ScriptedStream {
    schema: Schema,
    pending_schema: Option<Schema>,
    rows: VecDeque<Row>,
    pulled: usize,
    fail_at: Option<(usize, String)>,
    cancel_at: Option<(usize, CancellationToken)>,
}

impl ScriptedStream {
    pub(crate) fn new(schema: Schema, rows: Vec<Row>) -> Self {
        Self {
            schema,
            pending_schema: None,
            rows: rows.into(),
            pulled: 0,
            fail_at: None,
            cancel_at: None,
        }
    }

    /// Report an empty schema until the first pull.
    pub(crate) fn deferred_schema(mut self) -> Self {
        self.pending_schema = Some(std::mem::take(&mut self.schema));
        self
    }

    /// Fail the pull with zero-based index `index`.
    pub(crate) fn failing_at(mut self, index: usize, message: &str) -> Self {
        self.fail_at = Some((index, message.to_string()));
        self
    }

    /// Fire `token` right after `count` rows have been handed out.
    pub(crate) fn cancel_after(mut self, count: usize, token: CancellationToken) -> Self {
        self.cancel_at = Some((count, token));
        self
    }
}

#[async_trait]
impl RowStream for ScriptedStream {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        if let Some(schema) = self.pending_schema.take() {
            self.schema = schema;
        }
        if let Some((index, message)) = &self.fail_at {
            if *index == self.pulled {
                return Err(LoadError::QueryExecution(message.clone()));
            }
        }
        let row = self.rows.pop_front();
        if row.is_some() {
            self.pulled += 1;
        }
        if let Some((count, token)) = &self.cancel_at {
            if *count == self.pulled {
                token.cancel();
            }
        }
        Ok(row)
    }
}

/// A warehouse that serves a single scripted stream.
pub(crate) struct MockWarehouse {
    stream: Mutex<Option<ScriptedStream>>,
    failure: Option<String>,
    submitted: Mutex<Vec<String>>,
    statements: Mutex<Vec<(String, String)>>,
}

impl MockWarehouse {
    pub(crate) fn new(stream: ScriptedStream) -> Self {
        Self {
            stream: Mutex::new(Some(stream)),
            failure: None,
            submitted: Mutex::new(Vec::new()),
            statements: Mutex::new(Vec::new()),
        }
    }

    /// A warehouse with no scripted result; statements still succeed.
    pub(crate) fn empty() -> Self {
        Self {
            stream: Mutex::new(None),
            failure: None,
            submitted: Mutex::new(Vec::new()),
            statements: Mutex::new(Vec::new()),
        }
    }

    /// A warehouse rejecting every submission with `message`.
    pub(crate) fn failing(message: &str) -> Self {
        Self {
            stream: Mutex::new(None),
            failure: Some(message.to_string()),
            submitted: Mutex::new(Vec::new()),
            statements: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }

    /// Statements passed to `run_statement`, with their location.
    pub(crate) fn statements(&self) -> Vec<(String, String)> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl Warehouse for MockWarehouse {
    async fn run(&self, query: &str, _location: &str) -> Result<Box<dyn RowStream>> {
        self.submitted.lock().unwrap().push(query.to_string());
        if let Some(message) = &self.failure {
            return Err(LoadError::QueryExecution(message.clone()));
        }
        let stream = self
            .stream
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| LoadError::QueryExecution("no scripted result left".into()))?;
        Ok(Box::new(stream))
    }

    async fn run_statement(&self, sql: &str, location: &str) -> Result<String> {
        self.statements
            .lock()
            .unwrap()
            .push((sql.to_string(), location.to_string()));
        if let Some(message) = &self.failure {
            return Err(LoadError::QueryExecution(message.clone()));
        }
        Ok("job-1".to_string())
    }
}

#[derive(Default)]
struct DestinationState {
    executed: Vec<String>,
    tables: HashMap<(String, String), Vec<ExistingColumn>>,
    attempted: Vec<String>,
    committed: Vec<(String, Vec<SqlValue>)>,
    commits: usize,
    rollbacks: usize,
}

/// A recording destination with per-transaction staging.
///
/// Inserts only become visible through [`MockDestination::committed`] once
/// their transaction commits.
#[derive(Clone, Default)]
pub(crate) struct MockDestination {
    state: Arc<Mutex<DestinationState>>,
    default_database: Option<String>,
    fail_insert: Option<usize>,
    stall_insert: Option<(usize, CancellationToken)>,
    fail_ddl: Option<String>,
}

impl MockDestination {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_default_database(mut self, database: &str) -> Self {
        self.default_database = Some(database.to_string());
        self
    }

    pub(crate) fn with_table(self, database: &str, table: &str, columns: &[(&str, &str)]) -> Self {
        let columns = columns
            .iter()
            .map(|(name, data_type)| ExistingColumn::new(*name, *data_type))
            .collect();
        self.state
            .lock()
            .unwrap()
            .tables
            .insert((database.to_string(), table.to_string()), columns);
        self
    }

    /// Fail the `n`th insert (1-based) across all transactions.
    pub(crate) fn failing_insert(mut self, n: usize) -> Self {
        self.fail_insert = Some(n);
        self
    }

    /// Keep the `n`th insert (1-based) in flight forever, firing `cancel`
    /// once it has reached the server.
    pub(crate) fn stalling_insert(mut self, n: usize, cancel: CancellationToken) -> Self {
        self.stall_insert = Some((n, cancel));
        self
    }

    /// Fail every DDL statement.
    pub(crate) fn failing_ddl(mut self, message: &str) -> Self {
        self.fail_ddl = Some(message.to_string());
        self
    }

    /// DDL statements, in execution order.
    pub(crate) fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    /// Every insert attempted, committed or not.
    pub(crate) fn attempted(&self) -> Vec<String> {
        self.state.lock().unwrap().attempted.clone()
    }

    pub(crate) fn committed(&self) -> Vec<(String, Vec<SqlValue>)> {
        self.state.lock().unwrap().committed.clone()
    }

    /// Rows visible after commit.
    pub(crate) fn visible_rows(&self) -> usize {
        self.committed()
            .iter()
            .map(|(sql, _)| placeholder_groups(sql))
            .sum()
    }

    pub(crate) fn commits(&self) -> usize {
        self.state.lock().unwrap().commits
    }

    pub(crate) fn rollbacks(&self) -> usize {
        self.state.lock().unwrap().rollbacks
    }
}

fn placeholder_groups(sql: &str) -> usize {
    sql.matches("(?").count()
}

#[async_trait]
impl Destination for MockDestination {
    fn default_database(&self) -> Option<&str> {
        self.default_database.as_deref()
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        self.state.lock().unwrap().executed.push(sql.to_string());
        if let Some(message) = &self.fail_ddl {
            return Err(LoadError::Database(message.clone()));
        }
        Ok(())
    }

    async fn table_exists(&self, database: &str, table: &str) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .tables
            .contains_key(&(database.to_string(), table.to_string())))
    }

    async fn existing_columns(&self, database: &str, table: &str) -> Result<Vec<ExistingColumn>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .tables
            .get(&(database.to_string(), table.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn begin(&self) -> Result<Box<dyn LoadTransaction>> {
        Ok(Box::new(MockTransaction {
            state: Arc::clone(&self.state),
            fail_insert: self.fail_insert,
            stall_insert: self.stall_insert.clone(),
            staged: Vec::new(),
        }))
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {}
}

struct MockTransaction {
    state: Arc<Mutex<DestinationState>>,
    fail_insert: Option<usize>,
    stall_insert: Option<(usize, CancellationToken)>,
    staged: Vec<(String, Vec<SqlValue>)>,
}

#[async_trait]
impl LoadTransaction for MockTransaction {
    async fn exec(&mut self, sql: &str, params: Vec<SqlValue>) -> Result<u64> {
        let attempt = {
            let mut state = self.state.lock().unwrap();
            state.attempted.push(sql.to_string());
            state.attempted.len()
        };
        if self.fail_insert == Some(attempt) {
            return Err(LoadError::Database(format!("insert {attempt} rejected")));
        }
        let rows = placeholder_groups(sql) as u64;
        self.staged.push((sql.to_string(), params));
        if let Some((n, cancel)) = &self.stall_insert {
            if *n == attempt {
                cancel.cancel();
                std::future::pending::<()>().await;
            }
        }
        Ok(rows)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.committed.extend(self.staged);
        state.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.state.lock().unwrap().rollbacks += 1;
        Ok(())
    }
}

/// Counts calls into the StarRocks mapper.
#[derive(Default)]
pub(crate) struct CountingTypeMapper {
    inner: StarRocksTypeMapper,
    calls: AtomicUsize,
}

impl CountingTypeMapper {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TypeMapper for CountingTypeMapper {
    fn map_field(&self, field: &Field) -> Result<TypeMapping> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.map_field(field)
    }
}
