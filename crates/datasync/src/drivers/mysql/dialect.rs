//! MySQL/MariaDB SQL dialect (Strategy pattern).

use crate::core::Dialect;

/// MySQL's prepared statement placeholder limit.
const MYSQL_MAX_PLACEHOLDERS: usize = 65535;

/// MySQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn quote_ident(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn param_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn max_params(&self) -> usize {
        MYSQL_MAX_PLACEHOLDERS
    }
}
