//! PostgreSQL data source backed by deadpool-postgres.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{
    Manager, ManagerConfig, Object, Pool, PoolError, RecyclingMethod, Runtime,
};
use tokio_postgres::config::SslMode as PgSslMode;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Config as PgConfig, NoTls};
use tracing::{debug, warn};

use super::cursor::{ColumnDecode, PgRowCursor};
use super::dialect::PostgresDialect;
use super::describe_error;
use crate::config::DbConnectionParams;
use crate::core::{
    DataSource, Dialect, Row, RowCursor, SqlNullType, SqlValue, SyncConnection, TableName,
};
use crate::drivers::common::{SslMode, TlsBuilder};
use crate::error::{Result, SyncError};

/// Pooled PostgreSQL data source.
pub struct PgDataSource {
    name: String,
    pool: Pool,
}

impl PgDataSource {
    /// Build the pool. No connection is opened until the first acquire.
    pub fn new(name: &str, params: &DbConnectionParams) -> Result<Self> {
        let mut pg_config: PgConfig = params
            .url
            .parse()
            .map_err(|e| SyncError::Config(format!("datasources.{}.url: {}", name, e)))?;
        pg_config.user(&params.username);
        if !params.password.is_empty() {
            pg_config.password(&params.password);
        }

        let ssl_mode = match params.ssl_mode.as_deref() {
            Some(mode) => SslMode::parse(mode)?,
            None => SslMode::from_pg_url(pg_config.get_ssl_mode()),
        };
        pg_config.ssl_mode(if ssl_mode.requires_tls() {
            PgSslMode::Require
        } else {
            PgSslMode::Disable
        });

        let mut mgr_config = ManagerConfig::default();
        // Clean resets session state (CLOSE ALL ... DISCARD SEQUENCES) before reuse
        mgr_config.recycling_method = RecyclingMethod::Clean;

        let mgr = match TlsBuilder::new(ssl_mode).build()? {
            Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
            None => {
                warn!(
                    "PostgreSQL TLS is disabled for '{}'. Credentials will be transmitted in plaintext.",
                    name
                );
                Manager::from_config(pg_config, NoTls, mgr_config)
            }
        };

        let timeout = Duration::from_secs(params.pool.connect_timeout_secs);
        let pool = Pool::builder(mgr)
            .max_size(params.pool.max_size as usize)
            .wait_timeout(Some(timeout))
            .create_timeout(Some(timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| SyncError::connection(e, format!("creating PostgreSQL pool for '{}'", name)))?;

        debug!(
            "Created PostgreSQL pool for '{}' (max_size={})",
            name, params.pool.max_size
        );

        Ok(Self {
            name: name.to_string(),
            pool,
        })
    }
}

#[async_trait]
impl DataSource for PgDataSource {
    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn acquire(&self) -> Result<Box<dyn SyncConnection>> {
        let client = self.pool.get().await.map_err(|e| {
            let message = match &e {
                PoolError::Backend(pg) => describe_error(pg),
                other => other.to_string(),
            };
            SyncError::connection(
                message,
                format!("acquiring PostgreSQL connection for '{}'", self.name),
            )
        })?;
        Ok(Box::new(PgConnection {
            client,
            dialect: PostgresDialect::new(),
            column_types: HashMap::new(),
        }))
    }

    async fn close(&self) {
        self.pool.close();
    }
}

/// A pooled PostgreSQL connection.
pub struct PgConnection {
    client: Object,
    dialect: PostgresDialect,
    /// Qualified target column types, looked up once per table for raw values.
    column_types: HashMap<TableName, Vec<String>>,
}

impl PgConnection {
    async fn run_control(&mut self, sql: &str) -> Result<()> {
        self.client.batch_execute(sql).await.map_err(|e| {
            SyncError::statement("(transaction)", format!("{}: {}", sql, describe_error(&e)))
        })
    }

    /// Types of `columns` in `table`, as the server describes them.
    async fn target_column_types(
        &mut self,
        table: &TableName,
        columns: &[String],
    ) -> Result<Vec<String>> {
        if let Some(types) = self.column_types.get(table) {
            return Ok(types.clone());
        }

        let as_text = vec![false; columns.len()];
        let sql = self.dialect.build_select_columns(table, columns, &as_text);
        let stmt = self
            .client
            .prepare(&sql)
            .await
            .map_err(|e| SyncError::statement(table.to_string(), describe_error(&e)))?;
        let types: Vec<String> = stmt
            .columns()
            .iter()
            .map(|c| self.dialect.qualified_type(c.type_().schema(), c.type_().name()))
            .collect();

        self.column_types.insert(table.clone(), types.clone());
        Ok(types)
    }
}

#[async_trait]
impl SyncConnection for PgConnection {
    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn begin(&mut self) -> Result<()> {
        self.run_control("BEGIN").await
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
        self.client
            .execute(sql.as_str(), &[])
            .await
            .map_err(|e| SyncError::statement(table.to_string(), describe_error(&e)))
    }

    async fn select_all<'c>(&'c mut self, table: &TableName) -> Result<Box<dyn RowCursor + 'c>> {
        let sql = self.dialect.build_select_all(table);
        debug!("{}", sql);

        let mut stmt = self
            .client
            .prepare(&sql)
            .await
            .map_err(|e| SyncError::statement(table.to_string(), describe_error(&e)))?;
        let columns: Vec<String> = stmt
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let decoders: Vec<ColumnDecode> = stmt
            .columns()
            .iter()
            .map(|c| ColumnDecode::for_type(c.type_()))
            .collect();

        // columns the driver cannot decode are re-selected as text
        if decoders.iter().any(ColumnDecode::is_text) {
            let as_text: Vec<bool> = decoders.iter().map(ColumnDecode::is_text).collect();
            let sql = self.dialect.build_select_columns(table, &columns, &as_text);
            debug!("{}", sql);
            stmt = self
                .client
                .prepare(&sql)
                .await
                .map_err(|e| SyncError::statement(table.to_string(), describe_error(&e)))?;
        }

        let stream = self
            .client
            .query_raw(&stmt, std::iter::empty::<&(dyn ToSql + Sync)>())
            .await
            .map_err(|e| SyncError::statement(table.to_string(), describe_error(&e)))?;

        Ok(Box::new(PgRowCursor::new(
            table.to_string(),
            columns,
            decoders,
            stream,
        )))
    }

    async fn insert_batch(
        &mut self,
        table: &TableName,
        columns: &[String],
        rows: &[Row],
    ) -> Result<u64> {
        let has_raw = rows
            .iter()
            .flatten()
            .any(|v| v.null_type() == SqlNullType::Raw);
        let column_types = if has_raw {
            Some(self.target_column_types(table, columns).await?)
        } else {
            None
        };

        let mut written = 0u64;
        for chunk in rows.chunks(self.dialect.rows_per_insert(columns.len())) {
            let sql = self.dialect.build_typed_insert(
                table,
                columns,
                chunk,
                column_types.as_deref(),
            );
            let params: Vec<Box<dyn ToSql + Sync + Send>> =
                chunk.iter().flatten().map(to_pg_param).collect();
            let refs: Vec<&(dyn ToSql + Sync)> = params
                .iter()
                .map(|p| p.as_ref() as &(dyn ToSql + Sync))
                .collect();

            written += self
                .client
                .execute(sql.as_str(), &refs)
                .await
                .map_err(|e| SyncError::statement(table.to_string(), describe_error(&e)))?;
        }
        Ok(written)
    }

    async fn ping(&mut self) -> Result<()> {
        self.client
            .simple_query("SELECT 1")
            .await
            .map(|_| ())
            .map_err(|e| SyncError::connection(describe_error(&e), "PostgreSQL ping"))
    }
}

/// Box a value as a typed statement parameter.
fn to_pg_param(value: &SqlValue) -> Box<dyn ToSql + Sync + Send> {
    match value {
        SqlValue::Null(ty) => null_param(*ty),
        SqlValue::Bool(v) => Box::new(*v),
        SqlValue::I16(v) => Box::new(*v),
        SqlValue::I32(v) => Box::new(*v),
        SqlValue::I64(v) => Box::new(*v),
        SqlValue::F32(v) => Box::new(*v),
        SqlValue::F64(v) => Box::new(*v),
        SqlValue::Text(v) => Box::new(v.clone()),
        SqlValue::Bytes(v) => Box::new(v.clone()),
        SqlValue::Uuid(v) => Box::new(*v),
        SqlValue::Decimal(v) => Box::new(*v),
        SqlValue::DateTime(v) => Box::new(*v),
        SqlValue::DateTimeOffset(v) => Box::new(*v),
        SqlValue::Date(v) => Box::new(*v),
        SqlValue::Time(v) => Box::new(*v),
        SqlValue::Json(v) => Box::new(v.clone()),
        SqlValue::Raw(v) => Box::new(v.clone()),
    }
}

fn null_param(ty: SqlNullType) -> Box<dyn ToSql + Sync + Send> {
    match ty {
        SqlNullType::Bool => Box::new(None::<bool>),
        SqlNullType::I16 => Box::new(None::<i16>),
        SqlNullType::I32 => Box::new(None::<i32>),
        SqlNullType::I64 => Box::new(None::<i64>),
        SqlNullType::F32 => Box::new(None::<f32>),
        SqlNullType::F64 => Box::new(None::<f64>),
        SqlNullType::String => Box::new(None::<String>),
        SqlNullType::Bytes => Box::new(None::<Vec<u8>>),
        SqlNullType::Uuid => Box::new(None::<uuid::Uuid>),
        SqlNullType::Decimal => Box::new(None::<rust_decimal::Decimal>),
        SqlNullType::DateTime => Box::new(None::<chrono::NaiveDateTime>),
        SqlNullType::DateTimeOffset => {
            Box::new(None::<chrono::DateTime<chrono::FixedOffset>>)
        }
        SqlNullType::Date => Box::new(None::<chrono::NaiveDate>),
        SqlNullType::Time => Box::new(None::<chrono::NaiveTime>),
        SqlNullType::Json => Box::new(None::<serde_json::Value>),
        SqlNullType::Raw => Box::new(None::<String>),
    }
}
