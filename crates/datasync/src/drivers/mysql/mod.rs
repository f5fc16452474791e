//! MySQL/MariaDB driver built on mysql_async.

mod cursor;
mod dialect;
mod pool;

pub use cursor::MysqlRowCursor;
pub use dialect::MysqlDialect;
pub use pool::{MysqlConnection, MysqlDataSource};
