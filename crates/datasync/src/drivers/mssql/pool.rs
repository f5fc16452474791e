//! SQL Server data source: bb8 pool over tiberius connections.

use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use rust_decimal::Decimal;
use tiberius::numeric::Numeric;
use tiberius::{AuthMethod, Client, Config, Query};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use super::cursor::MssqlRowCursor;
use super::dialect::MssqlDialect;
use crate::config::DbConnectionParams;
use crate::core::{
    DataSource, Dialect, Row, RowCursor, SqlNullType, SqlValue, SyncConnection, TableName,
};
use crate::error::{Result, SyncError};

/// Connection manager for bb8 pool with tiberius.
#[derive(Clone)]
pub struct TiberiusConnectionManager {
    config: Config,
}

impl TiberiusConnectionManager {
    /// Parse an ADO.NET or `jdbc:sqlserver://` connection string and apply
    /// SQL Server authentication.
    pub fn from_params(name: &str, params: &DbConnectionParams) -> Result<Self> {
        let url = params.url.trim();
        let parsed = if url.to_ascii_lowercase().starts_with("jdbc:sqlserver://") {
            Config::from_jdbc_string(url)
        } else {
            Config::from_ado_string(url)
        };
        let mut config =
            parsed.map_err(|e| SyncError::Config(format!("datasources.{}.url: {}", name, e)))?;
        config.authentication(AuthMethod::sql_server(&params.username, &params.password));
        Ok(Self { config })
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let tcp = TcpStream::connect(self.config.get_addr())
            .await
            .map_err(|e| tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            })?;
        tcp.set_nodelay(true).ok();
        Client::connect(self.config.clone(), tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Pooled SQL Server data source.
///
/// bb8 has no shutdown call, so closing drops this handle; idle connections
/// go with it and checked-out ones close when returned.
pub struct MssqlDataSource {
    name: String,
    pool: Mutex<Option<Pool<TiberiusConnectionManager>>>,
}

impl MssqlDataSource {
    /// Build the pool without opening a connection.
    pub fn new(name: &str, params: &DbConnectionParams) -> Result<Self> {
        let manager = TiberiusConnectionManager::from_params(name, params)?;
        let pool = Pool::builder()
            .max_size(params.pool.max_size)
            .connection_timeout(Duration::from_secs(params.pool.connect_timeout_secs))
            .build_unchecked(manager);

        debug!(
            "Created SQL Server pool for '{}' (max_size={})",
            name, params.pool.max_size
        );

        Ok(Self {
            name: name.to_string(),
            pool: Mutex::new(Some(pool)),
        })
    }
}

#[async_trait]
impl DataSource for MssqlDataSource {
    fn db_type(&self) -> &str {
        "mssql"
    }

    async fn acquire(&self) -> Result<Box<dyn SyncConnection>> {
        let pool = self
            .pool
            .lock()
            .await
            .clone()
            .ok_or_else(|| SyncError::PoolClosed(self.name.clone()))?;
        let conn = pool.get_owned().await.map_err(|e| {
            SyncError::connection(e, format!("acquiring SQL Server connection for '{}'", self.name))
        })?;
        Ok(Box::new(MssqlConnection {
            conn,
            dialect: MssqlDialect::new(),
        }))
    }

    async fn close(&self) {
        if let Some(pool) = self.pool.lock().await.take() {
            debug!(
                "Closing SQL Server pool '{}' ({} connections open)",
                self.name,
                pool.state().connections
            );
        }
    }
}

/// A pooled SQL Server connection.
pub struct MssqlConnection {
    conn: PooledConnection<'static, TiberiusConnectionManager>,
    dialect: MssqlDialect,
}

impl MssqlConnection {
    async fn run_control(&mut self, sql: &str) -> Result<()> {
        let stream = self
            .conn
            .simple_query(sql)
            .await
            .map_err(|e| SyncError::statement("(transaction)", format!("{}: {}", sql, e)))?;
        stream
            .into_results()
            .await
            .map_err(|e| SyncError::statement("(transaction)", format!("{}: {}", sql, e)))?;
        Ok(())
    }
}

#[async_trait]
impl SyncConnection for MssqlConnection {
    fn db_type(&self) -> &str {
        "mssql"
    }

    async fn begin(&mut self) -> Result<()> {
        self.run_control("BEGIN TRANSACTION").await
    }

    async fn commit(&mut self) -> Result<()> {
        self.run_control("COMMIT TRANSACTION").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.run_control("ROLLBACK TRANSACTION").await
    }

    async fn delete_all(&mut self, table: &TableName) -> Result<u64> {
        let sql = self.dialect.build_delete_all(table);
        debug!("{}", sql);
        let result = self
            .conn
            .execute(sql, &[])
            .await
            .map_err(|e| SyncError::statement(table.to_string(), e))?;
        Ok(result.total())
    }

    async fn select_all<'c>(&'c mut self, table: &TableName) -> Result<Box<dyn RowCursor + 'c>> {
        let sql = self.dialect.build_select_all(table);
        debug!("{}", sql);

        let mut stream = self
            .conn
            .simple_query(sql)
            .await
            .map_err(|e| SyncError::statement(table.to_string(), e))?;
        let columns: Vec<String> = stream
            .columns()
            .await
            .map_err(|e| SyncError::statement(table.to_string(), e))?
            .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        Ok(Box::new(MssqlRowCursor::new(
            table.to_string(),
            columns,
            stream.into_row_stream(),
        )))
    }

    async fn insert_batch(
        &mut self,
        table: &TableName,
        columns: &[String],
        rows: &[Row],
    ) -> Result<u64> {
        let mut written = 0u64;
        for chunk in rows.chunks(self.dialect.rows_per_insert(columns.len())) {
            let mut query = Query::new(self.dialect.build_insert(table, columns, chunk.len()));
            for value in chunk.iter().flatten() {
                bind_value(&mut query, value);
            }
            let result = query
                .execute(&mut *self.conn)
                .await
                .map_err(|e| SyncError::statement(table.to_string(), e))?;
            written += result.total();
        }
        Ok(written)
    }

    async fn ping(&mut self) -> Result<()> {
        self.conn
            .simple_query("SELECT 1")
            .await
            .map_err(|e| SyncError::connection(e, "SQL Server ping"))?
            .into_row()
            .await
            .map_err(|e| SyncError::connection(e, "SQL Server ping"))?;
        Ok(())
    }
}

/// Bind a value as the next `@Pn` parameter, with a typed NULL when absent.
fn bind_value(query: &mut Query<'_>, value: &SqlValue) {
    match value {
        SqlValue::Null(ty) => bind_null(query, *ty),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::I16(v) => query.bind(*v),
        SqlValue::I32(v) => query.bind(*v),
        SqlValue::I64(v) => query.bind(*v),
        SqlValue::F32(v) => query.bind(*v),
        SqlValue::F64(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.clone()),
        SqlValue::Bytes(v) => query.bind(v.clone()),
        SqlValue::Uuid(v) => query.bind(*v),
        SqlValue::Decimal(v) => query.bind(decimal_to_numeric(v)),
        SqlValue::DateTime(v) => query.bind(*v),
        SqlValue::DateTimeOffset(v) => query.bind(*v),
        SqlValue::Date(v) => query.bind(*v),
        SqlValue::Time(v) => query.bind(*v),
        SqlValue::Json(v) => query.bind(v.to_string()),
        SqlValue::Raw(v) => query.bind(v.clone()),
    }
}

/// tiberius carries decimals as an i128 mantissa with a scale.
fn decimal_to_numeric(d: &Decimal) -> Numeric {
    Numeric::new_with_scale(d.mantissa(), d.scale() as u8)
}

fn bind_null(query: &mut Query<'_>, ty: SqlNullType) {
    match ty {
        SqlNullType::Bool => query.bind(None::<bool>),
        SqlNullType::I16 => query.bind(None::<i16>),
        SqlNullType::I32 => query.bind(None::<i32>),
        SqlNullType::I64 => query.bind(None::<i64>),
        SqlNullType::F32 => query.bind(None::<f32>),
        SqlNullType::F64 => query.bind(None::<f64>),
        SqlNullType::String => query.bind(None::<String>),
        SqlNullType::Bytes => query.bind(None::<Vec<u8>>),
        SqlNullType::Uuid => query.bind(None::<uuid::Uuid>),
        SqlNullType::Decimal => query.bind(None::<Numeric>),
        SqlNullType::DateTime => query.bind(None::<chrono::NaiveDateTime>),
        SqlNullType::DateTimeOffset => {
            query.bind(None::<chrono::DateTime<chrono::FixedOffset>>)
        }
        SqlNullType::Date => query.bind(None::<chrono::NaiveDate>),
        SqlNullType::Time => query.bind(None::<chrono::NaiveTime>),
        SqlNullType::Json | SqlNullType::Raw => query.bind(None::<String>),
    }
}
