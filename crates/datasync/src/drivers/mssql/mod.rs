//! SQL Server driver: tiberius over a bb8 pool.

mod cursor;
mod dialect;
mod pool;

pub use cursor::MssqlRowCursor;
pub use dialect::MssqlDialect;
pub use pool::{MssqlConnection, MssqlDataSource, TiberiusConnectionManager};
