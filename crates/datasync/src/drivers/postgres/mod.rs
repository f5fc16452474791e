//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: SQL syntax strategy for PostgreSQL
//! - [`PgDataSource`]: deadpool-postgres backed data source
//! - [`PgRowCursor`]: streaming cursor over `query_raw`

mod cursor;
mod dialect;
mod pool;

pub use cursor::PgRowCursor;
pub use dialect::PostgresDialect;
pub use pool::{PgConnection, PgDataSource};

/// Render a driver error with the server's severity, SQLSTATE, message,
/// detail and hint. Client-side errors get their cause appended, since the
/// driver's own message is only a category such as "db error".
pub(crate) fn describe_error(e: &tokio_postgres::Error) -> String {
    if let Some(db) = e.as_db_error() {
        let mut msg = format!("{} {}: {}", db.severity(), db.code().code(), db.message());
        if let Some(detail) = db.detail() {
            msg.push_str(&format!("\n  Detail: {}", detail));
        }
        if let Some(hint) = db.hint() {
            msg.push_str(&format!("\n  Hint: {}", hint));
        }
        return msg;
    }

    let mut msg = e.to_string();
    let mut source = std::error::Error::source(e);
    while let Some(cause) = source {
        let text = cause.to_string();
        if !msg.contains(&text) {
            msg.push_str(": ");
            msg.push_str(&text);
        }
        source = cause.source();
    }
    msg
}
