//! Core abstractions for database-agnostic table sync.
//!
//! - [`value`]: SQL value representation passed from cursor to insert
//! - [`identifier`]: identifier validation and table names
//! - [`traits`]: data source, connection, cursor and dialect seams
//!
//! Driver modules (`drivers/postgres`, `drivers/mysql`, `drivers/mssql`)
//! implement these traits; tests substitute in-memory implementations.

pub mod identifier;
pub mod traits;
pub mod value;

pub use identifier::{validate_identifier, TableName};
pub use traits::{
    DataSource, DataSourceCatalog, DataSourceFactory, Dialect, RowCursor, SyncConnection,
};
pub use value::{Row, SqlNullType, SqlValue};
