//! MySQL/MariaDB data source backed by the mysql_async pool.

use std::time::Duration;

use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, OptsBuilder, Params, Pool, PoolConstraints, PoolOpts, Value};
use tracing::{debug, warn};

use super::cursor::MysqlRowCursor;
use super::dialect::MysqlDialect;
use crate::config::DbConnectionParams;
use crate::core::{DataSource, Dialect, Row, RowCursor, SqlValue, SyncConnection, TableName};
use crate::error::{Result, SyncError};

/// Pooled MySQL data source.
pub struct MysqlDataSource {
    name: String,
    pool: Pool,
    acquire_timeout: Duration,
}

impl MysqlDataSource {
    /// Build the pool. mysql_async connects lazily on the first `get_conn`.
    pub fn new(name: &str, params: &DbConnectionParams) -> Result<Self> {
        let url_opts = Opts::from_url(&params.url)
            .map_err(|e| SyncError::Config(format!("datasources.{}.url: {}", name, e)))?;

        let constraints = PoolConstraints::new(0, params.pool.max_size as usize).ok_or_else(|| {
            SyncError::Config(format!(
                "datasources.{}.pool.max_size must be at least 1",
                name
            ))
        })?;

        let mut builder = OptsBuilder::from_opts(url_opts)
            .user(Some(&params.username))
            .pool_opts(PoolOpts::default().with_constraints(constraints));
        if !params.password.is_empty() {
            builder = builder.pass(Some(&params.password));
        }

        let opts: Opts = builder.into();
        let pool = Pool::new(opts);

        debug!(
            "Created MySQL pool for '{}' (max_size={})",
            name, params.pool.max_size
        );

        Ok(Self {
            name: name.to_string(),
            pool,
            acquire_timeout: Duration::from_secs(params.pool.connect_timeout_secs),
        })
    }
}

#[async_trait]
impl DataSource for MysqlDataSource {
    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn acquire(&self) -> Result<Box<dyn SyncConnection>> {
        let context = format!("acquiring MySQL connection for '{}'", self.name);
        let conn = match tokio::time::timeout(self.acquire_timeout, self.pool.get_conn()).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(SyncError::connection(e, context)),
            Err(_) => {
                return Err(SyncError::connection(
                    format!("timed out after {:?}", self.acquire_timeout),
                    context,
                ))
            }
        };
        Ok(Box::new(MysqlConnection {
            conn,
            dialect: MysqlDialect::new(),
        }))
    }

    async fn close(&self) {
        if let Err(e) = self.pool.clone().disconnect().await {
            warn!("Error disconnecting MySQL pool '{}': {}", self.name, e);
        }
    }
}

/// A pooled MySQL connection.
pub struct MysqlConnection {
    conn: Conn,
    dialect: MysqlDialect,
}

impl MysqlConnection {
    async fn run_control(&mut self, sql: &str) -> Result<()> {
        self.conn
            .query_drop(sql)
            .await
            .map_err(|e| SyncError::statement("(transaction)", format!("{}: {}", sql, e)))
    }
}

#[async_trait]
impl SyncConnection for MysqlConnection {
    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn begin(&mut self) -> Result<()> {
        self.run_control("START TRANSACTION").await
    }

    async fn commit(&mut self) -> Result<()> {
        self.run_control("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.run_control("ROLLBACK").await
    }

    async fn delete_all(&mut self, table: &TableName) -> Result<u64> {
        let sql = self.dialect.build_delete_all(table);
        debug!("{}", sql);
        self.conn
            .query_drop(sql)
            .await
            .map_err(|e| SyncError::statement(table.to_string(), e))?;
        Ok(self.conn.affected_rows())
    }

    async fn select_all<'c>(&'c mut self, table: &TableName) -> Result<Box<dyn RowCursor + 'c>> {
        let sql = self.dialect.build_select_all(table);
        debug!("{}", sql);
        let result = self
            .conn
            .exec_iter(sql, ())
            .await
            .map_err(|e| SyncError::statement(table.to_string(), e))?;
        Ok(Box::new(MysqlRowCursor::new(table.to_string(), result)))
    }

    async fn insert_batch(
        &mut self,
        table: &TableName,
        columns: &[String],
        rows: &[Row],
    ) -> Result<u64> {
        let mut written = 0u64;
        for chunk in rows.chunks(self.dialect.rows_per_insert(columns.len())) {
            let sql = self.dialect.build_insert(table, columns, chunk.len());
            let params: Vec<Value> = chunk.iter().flatten().map(sql_value_to_mysql).collect();
            self.conn
                .exec_drop(sql, Params::Positional(params))
                .await
                .map_err(|e| SyncError::statement(table.to_string(), e))?;
            written += chunk.len() as u64;
        }
        Ok(written)
    }

    async fn ping(&mut self) -> Result<()> {
        self.conn
            .query_drop("SELECT 1")
            .await
            .map_err(|e| SyncError::connection(e, "MySQL ping"))
    }
}

/// Convert a value to a MySQL statement parameter.
fn sql_value_to_mysql(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null(_) => Value::NULL,
        SqlValue::Bool(b) => Value::from(*b),
        SqlValue::I16(i) => Value::from(*i),
        SqlValue::I32(i) => Value::from(*i),
        SqlValue::I64(i) => Value::from(*i),
        SqlValue::F32(f) => Value::from(*f),
        SqlValue::F64(f) => Value::from(*f),
        SqlValue::Text(s) => Value::from(s.as_str()),
        SqlValue::Bytes(b) => Value::from(b.as_slice()),
        SqlValue::Uuid(u) => Value::from(u.to_string()),
        SqlValue::Decimal(d) => Value::from(d.to_string()),
        SqlValue::DateTime(dt) => Value::from(*dt),
        // MySQL DATETIME has no offset; store the UTC instant
        SqlValue::DateTimeOffset(dto) => Value::from(dto.naive_utc()),
        SqlValue::Date(d) => Value::from(*d),
        SqlValue::Time(t) => Value::from(*t),
        SqlValue::Json(j) => Value::from(j.to_string()),
        SqlValue::Raw(s) => Value::from(s.as_str()),
    }
}
