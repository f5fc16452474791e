//! Core traits at the seams of the sync engine.
//!
//! - [`DataSource`]: a pooled data source for one logical database
//! - [`SyncConnection`]: one live connection checked out of a data source
//! - [`RowCursor`]: a forward-only cursor over a `SELECT *` result
//! - [`Dialect`]: SQL syntax strategy for different database engines
//! - [`DataSourceCatalog`]: lookup of connection parameters by logical name
//! - [`DataSourceFactory`]: builds a data source from connection parameters
//!
//! # Design Patterns
//!
//! - **Abstract Factory**: `DataSourceFactory` builds driver-specific data sources
//! - **Strategy**: `Dialect` provides interchangeable SQL syntax
//! - **Template Method**: `Dialect` statement builders are provided methods

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::DbConnectionParams;
use crate::error::Result;

use super::identifier::TableName;
use super::value::Row;

/// A pooled data source for one logical database name.
///
/// Creating a data source must not open a connection; connections are
/// established on the first [`acquire`](DataSource::acquire).
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Get the database type identifier (e.g., "postgres", "mysql", "mssql").
    fn db_type(&self) -> &str;

    /// Check out a live connection. It returns to the pool when dropped.
    async fn acquire(&self) -> Result<Box<dyn SyncConnection>>;

    /// Close the pool, releasing idle connections and background resources.
    async fn close(&self);
}

/// A live connection checked out of a [`DataSource`].
///
/// Transactions are driven with explicit statements on the held
/// connection, so a transaction spans every call between
/// [`begin`](SyncConnection::begin) and `commit`/`rollback`.
#[async_trait]
pub trait SyncConnection: Send {
    /// Get the database type identifier.
    fn db_type(&self) -> &str;

    /// Start a transaction.
    async fn begin(&mut self) -> Result<()>;

    /// Commit the open transaction.
    async fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction.
    async fn rollback(&mut self) -> Result<()>;

    /// `DELETE FROM <table>`, returning the number of rows removed.
    async fn delete_all(&mut self, table: &TableName) -> Result<u64>;

    /// `SELECT * FROM <table>` as a forward-only cursor.
    ///
    /// The cursor borrows the connection until it is dropped.
    async fn select_all<'c>(
        &'c mut self,
        table: &TableName,
    ) -> Result<Box<dyn RowCursor + 'c>>;

    /// Insert rows into `table`, listing `columns` in the given order.
    ///
    /// Every row must have exactly `columns.len()` values. Returns the
    /// number of rows written.
    async fn insert_batch(
        &mut self,
        table: &TableName,
        columns: &[String],
        rows: &[Row],
    ) -> Result<u64>;

    /// Round-trip a trivial query to prove the connection is alive.
    async fn ping(&mut self) -> Result<()>;
}

/// Forward-only cursor over a result set.
#[async_trait]
pub trait RowCursor: Send {
    /// Column names in result order, as reported by the result metadata.
    fn columns(&self) -> &[String];

    /// Fetch the next row, or `None` once the result is exhausted.
    async fn next_row(&mut self) -> Result<Option<Row>>;
}

/// SQL dialect strategy for database-specific syntax.
pub trait Dialect: Send + Sync {
    /// Quote an identifier (table name, column name).
    fn quote_ident(&self, name: &str) -> String;

    /// Get parameter placeholder for prepared statements (1-based).
    fn param_placeholder(&self, index: usize) -> String;

    /// Maximum number of bind parameters in one statement.
    fn max_params(&self) -> usize;

    /// Maximum number of row tuples in one `VALUES` list.
    fn max_rows_per_insert(&self) -> usize {
        usize::MAX
    }

    /// Quote every part of a possibly qualified table name.
    fn qualify(&self, table: &TableName) -> String {
        table
            .parts()
            .iter()
            .map(|p| self.quote_ident(p))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Build `DELETE FROM <table>`.
    fn build_delete_all(&self, table: &TableName) -> String {
        format!("DELETE FROM {}", self.qualify(table))
    }

    /// Build `SELECT * FROM <table>`.
    fn build_select_all(&self, table: &TableName) -> String {
        format!("SELECT * FROM {}", self.qualify(table))
    }

    /// Build a multi-row parameterized INSERT for `row_count` rows.
    ///
    /// Placeholders are numbered row-major starting at 1.
    fn build_insert(&self, table: &TableName, columns: &[String], row_count: usize) -> String {
        let cols = columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!("INSERT INTO {} ({}) VALUES ", self.qualify(table), cols);
        let mut param = 1;
        for row in 0..row_count {
            if row > 0 {
                sql.push_str(", ");
            }
            sql.push('(');
            for col in 0..columns.len() {
                if col > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&self.param_placeholder(param));
                param += 1;
            }
            sql.push(')');
        }
        sql
    }

    /// How many rows fit in one INSERT with `column_count` columns.
    fn rows_per_insert(&self, column_count: usize) -> usize {
        (self.max_params() / column_count.max(1))
            .min(self.max_rows_per_insert())
            .max(1)
    }
}

/// Supplies connection parameters by logical database name.
pub trait DataSourceCatalog: Send + Sync {
    /// Connection parameters for `name`, or `None` if it is not configured.
    fn params(&self, name: &str) -> Option<DbConnectionParams>;
}

/// Builds a data source for a logical name from its parameters.
///
/// Implementations must be lazy: no connection is opened here.
pub trait DataSourceFactory: Send + Sync {
    fn create(&self, name: &str, params: &DbConnectionParams) -> Result<Arc<dyn DataSource>>;
}
