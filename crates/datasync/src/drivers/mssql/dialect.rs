//! MSSQL SQL dialect (Strategy pattern).

use crate::core::Dialect;

/// SQL Server's 2100 parameter limit, minus the two arguments
/// sp_executesql adds for the statement text and parameter list.
const MSSQL_MAX_PARAMS: usize = 2098;

/// SQL Server rejects more than 1000 row value expressions per VALUES list.
const MSSQL_MAX_VALUES_ROWS: usize = 1000;

/// Microsoft SQL Server dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Create a new MSSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MssqlDialect {
    fn quote_ident(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("@P{}", index)
    }

    fn max_params(&self) -> usize {
        MSSQL_MAX_PARAMS
    }

    fn max_rows_per_insert(&self) -> usize {
        MSSQL_MAX_VALUES_ROWS
    }
}
