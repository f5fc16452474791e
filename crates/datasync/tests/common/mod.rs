//! In-memory data sources for exercising the registry and the sync executor
//! without a database server.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use datasync::{
    DataSource, DataSourceCatalog, DataSourceFactory, DbConnectionParams, PoolRegistry, Result,
    Row, RowCursor, SqlValue, SyncConnection, SyncError, TableName,
};
use tokio_util::sync::CancellationToken;

/// What a connection did, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Begin,
    Delete(String),
    Select(String),
    Insert { table: String, rows: usize },
    Commit,
    Rollback,
}

#[derive(Debug, Clone, Default)]
pub struct MemTable {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

#[derive(Default)]
struct DbState {
    tables: HashMap<String, MemTable>,
    events: Vec<Event>,
    insert_calls: usize,
    fail_insert_call: Option<usize>,
    fetched: usize,
    cancel_after: Option<(usize, CancellationToken)>,
}

/// One logical database: named tables plus an event log.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<DbState>,
    unavailable: AtomicBool,
    closed: AtomicBool,
}

impl MemoryDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, DbState> {
        self.state.lock().unwrap()
    }

    pub fn create_table(&self, name: &str, columns: &[&str], rows: Vec<Row>) {
        self.lock().tables.insert(
            name.to_string(),
            MemTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
            },
        );
    }

    pub fn rows(&self, name: &str) -> Vec<Row> {
        self.lock()
            .tables
            .get(name)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    /// Row counts of every insert call, in order.
    pub fn insert_sizes(&self) -> Vec<usize> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Insert { rows, .. } => Some(*rows),
                _ => None,
            })
            .collect()
    }

    /// Rows handed out by cursors so far.
    pub fn fetched(&self) -> usize {
        self.lock().fetched
    }

    /// Make the `n`th insert call (1-based) fail.
    pub fn fail_insert_call(&self, n: usize) {
        self.lock().fail_insert_call = Some(n);
    }

    /// Cancel `token` once `n` rows have been fetched.
    pub fn cancel_after_rows(&self, n: usize, token: CancellationToken) {
        self.lock().cancel_after = Some((n, token));
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A set of named in-memory databases acting as both the parameter
/// catalog and the pool factory.
#[derive(Default)]
pub struct MemoryCluster {
    databases: HashMap<String, Arc<MemoryDatabase>>,
    created: AtomicUsize,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(mut self, name: &str, db: Arc<MemoryDatabase>) -> Self {
        self.databases.insert(name.to_string(), db);
        self
    }

    /// Number of data sources built so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn into_registry(self) -> (Arc<MemoryCluster>, Arc<PoolRegistry>) {
        let cluster = Arc::new(self);
        let registry = PoolRegistry::new(cluster.clone(), cluster.clone());
        (cluster, Arc::new(registry))
    }
}

impl DataSourceCatalog for MemoryCluster {
    fn params(&self, name: &str) -> Option<DbConnectionParams> {
        self.databases
            .contains_key(name)
            .then(|| DbConnectionParams::new("memory", format!("mem://{}", name), "test", ""))
    }
}

impl DataSourceFactory for MemoryCluster {
    fn create(&self, name: &str, _params: &DbConnectionParams) -> Result<Arc<dyn DataSource>> {
        let db = self
            .databases
            .get(name)
            .ok_or_else(|| SyncError::Config(format!("no memory database '{}'", name)))?;
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryDataSource {
            name: name.to_string(),
            db: Arc::clone(db),
        }))
    }
}

pub struct MemoryDataSource {
    name: String,
    db: Arc<MemoryDatabase>,
}

#[async_trait]
impl DataSource for MemoryDataSource {
    fn db_type(&self) -> &str {
        "memory"
    }

    async fn acquire(&self) -> Result<Box<dyn SyncConnection>> {
        if self.db.is_closed() {
            return Err(SyncError::connection("pool is closed", self.name.clone()));
        }
        if self.db.unavailable.load(Ordering::SeqCst) {
            return Err(SyncError::connection("connection refused", self.name.clone()));
        }
        Ok(Box::new(MemoryConnection {
            db: Arc::clone(&self.db),
            snapshot: None,
        }))
    }

    async fn close(&self) {
        self.db.closed.store(true, Ordering::SeqCst);
    }
}

pub struct MemoryConnection {
    db: Arc<MemoryDatabase>,
    snapshot: Option<HashMap<String, MemTable>>,
}

fn missing_table(table: &TableName) -> SyncError {
    SyncError::statement(table.to_string(), "relation does not exist")
}

#[async_trait]
impl SyncConnection for MemoryConnection {
    fn db_type(&self) -> &str {
        "memory"
    }

    async fn begin(&mut self) -> Result<()> {
        let mut state = self.db.lock();
        self.snapshot = Some(state.tables.clone());
        state.events.push(Event::Begin);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.snapshot = None;
        self.db.lock().events.push(Event::Commit);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let mut state = self.db.lock();
        if let Some(tables) = self.snapshot.take() {
            state.tables = tables;
        }
        state.events.push(Event::Rollback);
        Ok(())
    }

    async fn delete_all(&mut self, table: &TableName) -> Result<u64> {
        let mut state = self.db.lock();
        state.events.push(Event::Delete(table.to_string()));
        let t = state
            .tables
            .get_mut(&table.to_string())
            .ok_or_else(|| missing_table(table))?;
        let removed = t.rows.len() as u64;
        t.rows.clear();
        Ok(removed)
    }

    async fn select_all<'c>(&'c mut self, table: &TableName) -> Result<Box<dyn RowCursor + 'c>> {
        let mut state = self.db.lock();
        state.events.push(Event::Select(table.to_string()));
        let t = state
            .tables
            .get(&table.to_string())
            .cloned()
            .ok_or_else(|| missing_table(table))?;
        Ok(Box::new(MemoryCursor {
            db: Arc::clone(&self.db),
            columns: t.columns,
            rows: t.rows.into_iter(),
        }))
    }

    async fn insert_batch(
        &mut self,
        table: &TableName,
        columns: &[String],
        rows: &[Row],
    ) -> Result<u64> {
        let mut state = self.db.lock();
        state.insert_calls += 1;
        if state.fail_insert_call == Some(state.insert_calls) {
            return Err(SyncError::statement(table.to_string(), "injected insert failure"));
        }
        state.events.push(Event::Insert {
            table: table.to_string(),
            rows: rows.len(),
        });

        let t = state
            .tables
            .get_mut(&table.to_string())
            .ok_or_else(|| missing_table(table))?;
        let positions = t
            .columns
            .iter()
            .map(|target_col| columns.iter().position(|c| c == target_col))
            .collect::<Vec<_>>();
        if let Some(unknown) = columns.iter().find(|c| !t.columns.contains(c)) {
            return Err(SyncError::statement(
                table.to_string(),
                format!("column \"{}\" does not exist", unknown),
            ));
        }

        for row in rows {
            let stored = positions
                .iter()
                .map(|pos| match pos {
                    Some(idx) => row[*idx].clone(),
                    None => SqlValue::Null(datasync::SqlNullType::String),
                })
                .collect();
            t.rows.push(stored);
        }
        Ok(rows.len() as u64)
    }

    async fn ping(&mut self) -> Result<()> {
        Ok(())
    }
}

struct MemoryCursor {
    db: Arc<MemoryDatabase>,
    columns: Vec<String>,
    rows: std::vec::IntoIter<Row>,
}

#[async_trait]
impl RowCursor for MemoryCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        let Some(row) = self.rows.next() else {
            return Ok(None);
        };
        let mut state = self.db.lock();
        state.fetched += 1;
        if let Some((n, token)) = &state.cancel_after {
            if state.fetched >= *n {
                token.cancel();
            }
        }
        Ok(Some(row))
    }
}

/// `(id, name)` rows.
pub fn id_name_rows(rows: &[(i32, &str)]) -> Vec<Row> {
    rows.iter()
        .map(|(id, name)| vec![SqlValue::I32(*id), SqlValue::Text(name.to_string())])
        .collect()
}

/// `n` generated `(id, name)` rows numbered from 1.
pub fn numbered_rows(n: usize) -> Vec<Row> {
    (1..=n as i32)
        .map(|i| vec![SqlValue::I32(i), SqlValue::Text(format!("row-{}", i))])
        .collect()
}
