//! PostgreSQL SQL dialect (Strategy pattern).

use crate::core::{Dialect, SqlNullType, SqlValue, TableName};

/// PostgreSQL limits bind parameters to a 16-bit count.
const PG_MAX_PARAMS: usize = 65535;

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }

    /// Placeholder with an explicit cast taken from the bound value's type,
    /// e.g. `$3::int8`.
    ///
    /// The cast pins the parameter type so the value binds as read and the
    /// server applies its assignment cast to the column type. Raw values are
    /// sent as text and cast to `column_type`, the target column's type, when
    /// it is known.
    pub fn typed_placeholder(
        &self,
        index: usize,
        value: &SqlValue,
        column_type: Option<&str>,
    ) -> String {
        match (value.null_type(), column_type) {
            (SqlNullType::Raw, Some(target)) => format!("${}::text::{}", index, target),
            (ty, _) => format!("${}::{}", index, pg_cast(ty)),
        }
    }

    /// Multi-row INSERT whose placeholders carry per-value casts.
    ///
    /// `column_types` holds the qualified target type of each column and is
    /// only consulted for raw values.
    pub fn build_typed_insert(
        &self,
        table: &TableName,
        columns: &[String],
        rows: &[Vec<SqlValue>],
        column_types: Option<&[String]>,
    ) -> String {
        let cols = columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!("INSERT INTO {} ({}) VALUES ", self.qualify(table), cols);
        let mut param = 1;
        for (r, row) in rows.iter().enumerate() {
            if r > 0 {
                sql.push_str(", ");
            }
            sql.push('(');
            for (c, value) in row.iter().enumerate() {
                if c > 0 {
                    sql.push_str(", ");
                }
                let target = column_types.and_then(|t| t.get(c)).map(String::as_str);
                sql.push_str(&self.typed_placeholder(param, value, target));
                param += 1;
            }
            sql.push(')');
        }
        sql
    }

    /// `SELECT` listing each column, casting the flagged ones to text.
    pub fn build_select_columns(
        &self,
        table: &TableName,
        columns: &[String],
        as_text: &[bool],
    ) -> String {
        let list = columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let quoted = self.quote_ident(c);
                if as_text.get(i).copied().unwrap_or(false) {
                    format!("{}::text AS {}", quoted, quoted)
                } else {
                    quoted
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("SELECT {} FROM {}", list, self.qualify(table))
    }

    /// Schema-qualified, quoted type name usable in a cast.
    pub fn qualified_type(&self, schema: &str, name: &str) -> String {
        format!("{}.{}", self.quote_ident(schema), self.quote_ident(name))
    }
}

fn pg_cast(ty: SqlNullType) -> &'static str {
    match ty {
        SqlNullType::Bool => "bool",
        SqlNullType::I16 => "int2",
        SqlNullType::I32 => "int4",
        SqlNullType::I64 => "int8",
        SqlNullType::F32 => "float4",
        SqlNullType::F64 => "float8",
        SqlNullType::String => "text",
        SqlNullType::Bytes => "bytea",
        SqlNullType::Uuid => "uuid",
        SqlNullType::Decimal => "numeric",
        SqlNullType::DateTime => "timestamp",
        SqlNullType::DateTimeOffset => "timestamptz",
        SqlNullType::Date => "date",
        SqlNullType::Time => "time",
        SqlNullType::Json => "jsonb",
        SqlNullType::Raw => "text",
    }
}

impl Dialect for PostgresDialect {
    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn max_params(&self) -> usize {
        PG_MAX_PARAMS
    }
}
