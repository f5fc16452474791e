//! # datasync
//!
//! Point-to-point table copy between pooled SQL databases.
//!
//! A sync clears a target table, streams `SELECT *` from a source table and
//! batch-inserts the rows into the target inside one target transaction:
//!
//! - **Pool registry**: one lazily created pool per logical database name
//! - **Replace semantics**: delete and insert commit or roll back together
//! - **Batched inserts**: 500 rows per flush by default, multi-row `VALUES`
//! - **Row cap**: optional `max_rows` limit per request
//! - **Drivers**: PostgreSQL, MySQL/MariaDB and SQL Server
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use datasync::{Config, PoolRegistry, SyncExecutor, SyncRequest};
//!
//! #[tokio::main]
//! async fn main() -> datasync::Result<()> {
//!     let config = Config::load("datasync.yaml")?;
//!     let batch_size = config.sync.batch_size;
//!     let registry = Arc::new(PoolRegistry::with_drivers(Arc::new(config)));
//!     let executor = SyncExecutor::new(registry.clone()).with_batch_size(batch_size);
//!
//!     let request = SyncRequest::new("legacy", "public.users", "reporting", "users");
//!     let report = executor.data_sync(&request).await?;
//!     println!("Copied {} rows", report.rows_copied);
//!
//!     registry.destroy_all().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod registry;
pub mod sync;

// Re-exports for convenient access
pub use config::{Config, DbConnectionParams, PoolSettings, SyncSettings};
pub use crate::core::{
    DataSource, DataSourceCatalog, DataSourceFactory, Dialect, Row, RowCursor, SqlNullType,
    SqlValue, SyncConnection, TableName,
};
pub use drivers::{Driver, DriverPoolFactory};
pub use error::{ErrorKind, Result, SyncError};
pub use registry::{PoolRegistry, PoolState};
pub use sync::{JobOutcome, SyncExecutor, SyncJob, SyncReport, SyncRequest};
