//! Connection pool registry keyed by logical database name.
//!
//! A pool is created the first time a name is referenced and shared by every
//! later caller. Destroying a name closes its pool for good: the entry stays
//! behind as `Closed` so later lookups fail with [`SyncError::PoolClosed`]
//! instead of silently building a fresh pool.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core::{DataSource, DataSourceCatalog, DataSourceFactory, SyncConnection};
use crate::drivers::DriverPoolFactory;
use crate::error::{Result, SyncError};

/// Lifecycle state of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Active,
    Closed,
}

enum PoolEntry {
    Active(Arc<dyn DataSource>),
    Closed,
}

/// Lazily built, shared pools for every configured logical database.
pub struct PoolRegistry {
    catalog: Arc<dyn DataSourceCatalog>,
    factory: Arc<dyn DataSourceFactory>,
    entries: Mutex<HashMap<String, PoolEntry>>,
}

impl PoolRegistry {
    /// Create a registry that builds pools with `factory`.
    pub fn new(catalog: Arc<dyn DataSourceCatalog>, factory: Arc<dyn DataSourceFactory>) -> Self {
        Self {
            catalog,
            factory,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Create a registry backed by the built-in PostgreSQL, MySQL and SQL
    /// Server drivers.
    pub fn with_drivers(catalog: Arc<dyn DataSourceCatalog>) -> Self {
        Self::new(catalog, Arc::new(DriverPoolFactory))
    }

    /// Get the data source for `db_name`, creating it on first use.
    ///
    /// Lookup, construction and insertion run under one lock, so concurrent
    /// first use of a name builds exactly one pool.
    pub async fn create_data_source(&self, db_name: &str) -> Result<Arc<dyn DataSource>> {
        let mut entries = self.entries.lock().await;

        match entries.get(db_name) {
            Some(PoolEntry::Active(source)) => return Ok(Arc::clone(source)),
            Some(PoolEntry::Closed) => return Err(SyncError::PoolClosed(db_name.to_string())),
            None => {}
        }

        let params = self.catalog.params(db_name).ok_or_else(|| {
            SyncError::Config(format!(
                "no connection parameters configured for data source '{}'",
                db_name
            ))
        })?;

        let source = self.factory.create(db_name, &params)?;
        info!(
            "Created {} connection pool for '{}'",
            source.db_type(),
            db_name
        );
        entries.insert(db_name.to_string(), PoolEntry::Active(Arc::clone(&source)));
        Ok(source)
    }

    /// Check out a live connection for `db_name`.
    ///
    /// The connection goes back to its pool when dropped.
    pub async fn get_connection(&self, db_name: &str) -> Result<Box<dyn SyncConnection>> {
        let source = self.create_data_source(db_name).await?;
        source.acquire().await
    }

    /// Close the pool for `db_name`. No-op if it was never created or is
    /// already closed.
    pub async fn destroy_data_source(&self, db_name: &str) {
        let source = {
            let mut entries = self.entries.lock().await;
            let Some(entry) = entries.get_mut(db_name) else {
                return;
            };
            match std::mem::replace(entry, PoolEntry::Closed) {
                PoolEntry::Active(source) => source,
                PoolEntry::Closed => return,
            }
        };

        source.close().await;
        info!("Closed connection pool for '{}'", db_name);
    }

    /// Close every active pool.
    pub async fn destroy_all(&self) {
        let sources: Vec<(String, Arc<dyn DataSource>)> = {
            let mut entries = self.entries.lock().await;
            entries
                .iter_mut()
                .filter_map(|(name, entry)| {
                    match std::mem::replace(entry, PoolEntry::Closed) {
                        PoolEntry::Active(source) => Some((name.clone(), source)),
                        PoolEntry::Closed => None,
                    }
                })
                .collect()
        };

        for (name, source) in sources {
            source.close().await;
            debug!("Closed connection pool for '{}'", name);
        }
    }

    /// Lifecycle state of `db_name`, or `None` if it was never referenced.
    pub async fn state(&self, db_name: &str) -> Option<PoolState> {
        self.entries.lock().await.get(db_name).map(|entry| match entry {
            PoolEntry::Active(_) => PoolState::Active,
            PoolEntry::Closed => PoolState::Closed,
        })
    }

    /// Acquire a connection for `db_name` and round-trip `SELECT 1`.
    pub async fn health_check(&self, db_name: &str) -> Result<()> {
        let mut conn = self.get_connection(db_name).await?;
        conn.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConnectionParams;
    use crate::core::{Row, RowCursor, TableName};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct OneSource;

    impl DataSourceCatalog for OneSource {
        fn params(&self, name: &str) -> Option<DbConnectionParams> {
            (name == "app").then(|| DbConnectionParams::new("postgres", "mem://app", "u", "p"))
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        created: AtomicUsize,
        closed: Arc<AtomicUsize>,
    }

    impl DataSourceFactory for CountingFactory {
        fn create(&self, _name: &str, _params: &DbConnectionParams) -> Result<Arc<dyn DataSource>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(StubSource {
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    struct StubSource {
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DataSource for StubSource {
        fn db_type(&self) -> &str {
            "stub"
        }

        async fn acquire(&self) -> Result<Box<dyn SyncConnection>> {
            Ok(Box::new(StubConnection))
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct StubConnection;

    #[async_trait]
    impl SyncConnection for StubConnection {
        fn db_type(&self) -> &str {
            "stub"
        }
        async fn begin(&mut self) -> Result<()> {
            Ok(())
        }
        async fn commit(&mut self) -> Result<()> {
            Ok(())
        }
        async fn rollback(&mut self) -> Result<()> {
            Ok(())
        }
        async fn delete_all(&mut self, _table: &TableName) -> Result<u64> {
            Ok(0)
        }
        async fn select_all<'c>(&'c mut self, table: &TableName) -> Result<Box<dyn RowCursor + 'c>> {
            Err(SyncError::statement(table.to_string(), "not supported"))
        }
        async fn insert_batch(
            &mut self,
            _table: &TableName,
            _columns: &[String],
            rows: &[Row],
        ) -> Result<u64> {
            Ok(rows.len() as u64)
        }
        async fn ping(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn registry() -> (PoolRegistry, Arc<CountingFactory>) {
        let factory = Arc::new(CountingFactory::default());
        let registry = PoolRegistry::new(Arc::new(OneSource), factory.clone());
        (registry, factory)
    }

    #[tokio::test]
    async fn test_pool_created_once() {
        let (registry, factory) = registry();
        assert_eq!(registry.state("app").await, None);

        registry.create_data_source("app").await.unwrap();
        registry.get_connection("app").await.unwrap();
        registry.health_check("app").await.unwrap();

        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        assert_eq!(registry.state("app").await, Some(PoolState::Active));
    }

    #[tokio::test]
    async fn test_unknown_name_is_config_error() {
        let (registry, factory) = registry();
        let err = registry.get_connection("nope").await.err().unwrap();
        assert!(matches!(err, SyncError::Config(_)));
        assert!(err.to_string().contains("nope"));
        assert_eq!(factory.created.load(Ordering::SeqCst), 0);
        assert_eq!(registry.state("nope").await, None);
    }

    #[tokio::test]
    async fn test_destroy_closes_and_blocks_reuse() {
        let (registry, factory) = registry();
        registry.create_data_source("app").await.unwrap();

        registry.destroy_data_source("app").await;
        registry.destroy_data_source("app").await;
        assert_eq!(factory.closed.load(Ordering::SeqCst), 1);
        assert_eq!(registry.state("app").await, Some(PoolState::Closed));

        let err = registry.get_connection("app").await.err().unwrap();
        assert!(matches!(err, SyncError::PoolClosed(ref n) if n == "app"));
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_destroy_unknown_is_noop() {
        let (registry, factory) = registry();
        registry.destroy_data_source("app").await;
        assert_eq!(registry.state("app").await, None);
        assert_eq!(factory.closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_destroy_all() {
        let (registry, factory) = registry();
        registry.create_data_source("app").await.unwrap();
        registry.destroy_all().await;
        registry.destroy_all().await;
        assert_eq!(factory.closed.load(Ordering::SeqCst), 1);
        assert_eq!(registry.state("app").await, Some(PoolState::Closed));
    }
}
