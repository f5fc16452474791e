//! Database driver implementations.
//!
//! - [`postgres`]: PostgreSQL over deadpool-postgres
//! - [`mysql`]: MySQL/MariaDB over mysql_async
//! - [`mssql`]: Microsoft SQL Server over tiberius + bb8
//! - [`common`]: Shared utilities (TLS)
//!
//! Each driver provides a `Dialect`, a `DataSource` and its connection and
//! cursor types; connections build statements with their own dialect. [`DriverPoolFactory`] picks the driver for a configured
//! data source from its `driver` identifier.

pub mod common;
pub mod mssql;
pub mod mysql;
pub mod postgres;

use std::sync::Arc;

pub use common::{SslMode, TlsBuilder};
pub use mssql::{MssqlDataSource, MssqlDialect};
pub use mysql::{MysqlDataSource, MysqlDialect};
pub use postgres::{PgDataSource, PostgresDialect};

use crate::config::DbConnectionParams;
use crate::core::{DataSource, DataSourceFactory};
use crate::error::{Result, SyncError};

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Driver {
    Postgres,
    Mysql,
    Mssql,
}

impl Driver {
    /// Resolve a configured driver identifier (case-insensitive).
    pub fn from_identifier(id: &str) -> Result<Self> {
        match id.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Driver::Postgres),
            "mysql" | "mariadb" => Ok(Driver::Mysql),
            "mssql" | "sqlserver" | "sql_server" => Ok(Driver::Mssql),
            other => Err(SyncError::Config(format!(
                "Unknown database type: '{}'. Supported types: postgres, mysql, mssql",
                other
            ))),
        }
    }
}

/// Builds pooled data sources for the built-in drivers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverPoolFactory;

impl DataSourceFactory for DriverPoolFactory {
    fn create(&self, name: &str, params: &DbConnectionParams) -> Result<Arc<dyn DataSource>> {
        let source: Arc<dyn DataSource> = match Driver::from_identifier(&params.driver)? {
            Driver::Postgres => Arc::new(PgDataSource::new(name, params)?),
            Driver::Mysql => Arc::new(MysqlDataSource::new(name, params)?),
            Driver::Mssql => Arc::new(MssqlDataSource::new(name, params)?),
        };
        Ok(source)
    }
}
