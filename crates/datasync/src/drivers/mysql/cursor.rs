//! Binary-protocol cursor over a MySQL `SELECT *` result.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use mysql_async::consts::{ColumnFlags, ColumnType};
use mysql_async::prelude::FromValue;
use mysql_async::{BinaryProtocol, Column, QueryResult, Value};
use rust_decimal::Decimal;

use crate::core::{Row, RowCursor, SqlNullType, SqlValue};
use crate::error::{Result, SyncError};

/// Collation id of the `binary` character set.
const BINARY_CHARSET: u16 = 63;

/// How a column's wire values are turned into [`SqlValue`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColumnKind {
    Bool,
    Int16,
    Int32,
    Int64,
    UInt64,
    Float,
    Double,
    Decimal,
    Date,
    DateTime,
    Time,
    Text,
    Json,
    Bytes,
}

impl ColumnKind {
    pub(crate) fn of(column: &Column) -> Self {
        let unsigned = column.flags().contains(ColumnFlags::UNSIGNED_FLAG);
        match column.column_type() {
            ColumnType::MYSQL_TYPE_TINY if column.column_length() == 1 => ColumnKind::Bool,
            ColumnType::MYSQL_TYPE_TINY | ColumnType::MYSQL_TYPE_YEAR => ColumnKind::Int16,
            ColumnType::MYSQL_TYPE_SHORT if unsigned => ColumnKind::Int32,
            ColumnType::MYSQL_TYPE_SHORT => ColumnKind::Int16,
            ColumnType::MYSQL_TYPE_INT24 => ColumnKind::Int32,
            ColumnType::MYSQL_TYPE_LONG if unsigned => ColumnKind::Int64,
            ColumnType::MYSQL_TYPE_LONG => ColumnKind::Int32,
            ColumnType::MYSQL_TYPE_LONGLONG if unsigned => ColumnKind::UInt64,
            ColumnType::MYSQL_TYPE_LONGLONG => ColumnKind::Int64,
            ColumnType::MYSQL_TYPE_FLOAT => ColumnKind::Float,
            ColumnType::MYSQL_TYPE_DOUBLE => ColumnKind::Double,
            ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
                ColumnKind::Decimal
            }
            ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE => ColumnKind::Date,
            ColumnType::MYSQL_TYPE_DATETIME
            | ColumnType::MYSQL_TYPE_DATETIME2
            | ColumnType::MYSQL_TYPE_TIMESTAMP
            | ColumnType::MYSQL_TYPE_TIMESTAMP2 => ColumnKind::DateTime,
            ColumnType::MYSQL_TYPE_TIME | ColumnType::MYSQL_TYPE_TIME2 => ColumnKind::Time,
            ColumnType::MYSQL_TYPE_BIT | ColumnType::MYSQL_TYPE_GEOMETRY => ColumnKind::Bytes,
            ColumnType::MYSQL_TYPE_JSON => ColumnKind::Json,
            ColumnType::MYSQL_TYPE_ENUM | ColumnType::MYSQL_TYPE_SET => ColumnKind::Text,
            _ if column.character_set() == BINARY_CHARSET => ColumnKind::Bytes,
            _ => ColumnKind::Text,
        }
    }

    fn null_type(self) -> SqlNullType {
        match self {
            ColumnKind::Bool => SqlNullType::Bool,
            ColumnKind::Int16 => SqlNullType::I16,
            ColumnKind::Int32 => SqlNullType::I32,
            ColumnKind::Int64 | ColumnKind::UInt64 => SqlNullType::I64,
            ColumnKind::Float => SqlNullType::F32,
            ColumnKind::Double => SqlNullType::F64,
            ColumnKind::Decimal => SqlNullType::Decimal,
            ColumnKind::Date => SqlNullType::Date,
            ColumnKind::DateTime => SqlNullType::DateTime,
            ColumnKind::Time => SqlNullType::Time,
            ColumnKind::Text => SqlNullType::String,
            ColumnKind::Json => SqlNullType::Json,
            ColumnKind::Bytes => SqlNullType::Bytes,
        }
    }

    /// Convert one wire value.
    pub(crate) fn decode(self, value: Value) -> std::result::Result<SqlValue, String> {
        if value == Value::NULL {
            return Ok(SqlValue::Null(self.null_type()));
        }

        let decoded = match self {
            ColumnKind::Bool => SqlValue::Bool(convert::<i64>(value)? != 0),
            ColumnKind::Int16 => SqlValue::I16(convert(value)?),
            ColumnKind::Int32 => SqlValue::I32(convert(value)?),
            ColumnKind::Int64 => SqlValue::I64(convert(value)?),
            ColumnKind::UInt64 => {
                let v: u64 = convert(value)?;
                match i64::try_from(v) {
                    Ok(v) => SqlValue::I64(v),
                    Err(_) => SqlValue::Decimal(Decimal::from(v)),
                }
            }
            ColumnKind::Float => SqlValue::F32(convert(value)?),
            ColumnKind::Double => SqlValue::F64(convert(value)?),
            ColumnKind::Decimal => {
                let text: String = convert(value)?;
                SqlValue::Decimal(Decimal::from_str(&text).map_err(|e| e.to_string())?)
            }
            ColumnKind::Date => SqlValue::Date(convert::<NaiveDate>(value)?),
            ColumnKind::DateTime => SqlValue::DateTime(convert::<NaiveDateTime>(value)?),
            ColumnKind::Time => decode_time(value)?,
            ColumnKind::Text => match value {
                Value::Bytes(bytes) => {
                    SqlValue::Text(String::from_utf8(bytes).map_err(|e| e.to_string())?)
                }
                other => SqlValue::Text(other.as_sql(true)),
            },
            ColumnKind::Json => match value {
                Value::Bytes(bytes) => {
                    SqlValue::Json(serde_json::from_slice(&bytes).map_err(|e| e.to_string())?)
                }
                other => return Err(format!("expected JSON text, got {:?}", other)),
            },
            ColumnKind::Bytes => match value {
                Value::Bytes(bytes) => SqlValue::Bytes(bytes),
                other => return Err(format!("expected binary value, got {:?}", other)),
            },
        };
        Ok(decoded)
    }
}

fn convert<T: FromValue>(value: Value) -> std::result::Result<T, String> {
    mysql_async::from_value_opt::<T>(value).map_err(|e| e.to_string())
}

/// MySQL TIME covers -838:59:59..838:59:59; values outside a clock day
/// travel as text.
fn decode_time(value: Value) -> std::result::Result<SqlValue, String> {
    match value {
        Value::Time(false, 0, h, m, s, us) => {
            NaiveTime::from_hms_micro_opt(u32::from(h), u32::from(m), u32::from(s), us)
                .map(SqlValue::Time)
                .ok_or_else(|| format!("invalid time {:02}:{:02}:{:02}.{:06}", h, m, s, us))
        }
        Value::Time(neg, days, h, m, s, us) => {
            let hours = days * 24 + u32::from(h);
            Ok(SqlValue::Raw(format!(
                "{}{}:{:02}:{:02}.{:06}",
                if neg { "-" } else { "" },
                hours,
                m,
                s,
                us
            )))
        }
        other => convert::<NaiveTime>(other).map(SqlValue::Time),
    }
}

/// Forward-only cursor over `exec_iter`. Borrows the connection until dropped.
pub struct MysqlRowCursor<'c> {
    table: String,
    columns: Vec<String>,
    kinds: Vec<ColumnKind>,
    result: QueryResult<'c, 'static, BinaryProtocol>,
}

impl<'c> MysqlRowCursor<'c> {
    pub(crate) fn new(table: String, result: QueryResult<'c, 'static, BinaryProtocol>) -> Self {
        let columns = result
            .columns_ref()
            .iter()
            .map(|c| c.name_str().into_owned())
            .collect();
        let kinds = result.columns_ref().iter().map(ColumnKind::of).collect();
        Self {
            table,
            columns,
            kinds,
            result,
        }
    }
}

#[async_trait]
impl RowCursor for MysqlRowCursor<'_> {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        let mut row = match self.result.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) => return Err(SyncError::statement(&self.table, e)),
        };

        let mut values = Vec::with_capacity(self.kinds.len());
        for (idx, kind) in self.kinds.iter().enumerate() {
            let raw: Value = row.take(idx).unwrap_or(Value::NULL);
            let value = kind.decode(raw).map_err(|e| {
                SyncError::statement(
                    &self.table,
                    format!("decoding column '{}': {}", self.columns[idx], e),
                )
            })?;
            values.push(value);
        }
        Ok(Some(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_null_keeps_type() {
        assert_eq!(
            ColumnKind::Int32.decode(Value::NULL).unwrap(),
            SqlValue::Null(SqlNullType::I32)
        );
        assert_eq!(
            ColumnKind::UInt64.decode(Value::NULL).unwrap(),
            SqlValue::Null(SqlNullType::I64)
        );
    }

    #[test]
    fn test_decode_integers() {
        assert_eq!(ColumnKind::Bool.decode(Value::Int(1)).unwrap(), SqlValue::Bool(true));
        assert_eq!(ColumnKind::Int16.decode(Value::Int(-5)).unwrap(), SqlValue::I16(-5));
        assert_eq!(ColumnKind::Int64.decode(Value::Int(42)).unwrap(), SqlValue::I64(42));
        assert_eq!(
            ColumnKind::UInt64.decode(Value::UInt(u64::MAX)).unwrap(),
            SqlValue::Decimal(Decimal::from(u64::MAX))
        );
    }

    #[test]
    fn test_decode_decimal_text() {
        let v = ColumnKind::Decimal
            .decode(Value::Bytes(b"12.50".to_vec()))
            .unwrap();
        assert_eq!(v, SqlValue::Decimal(Decimal::new(1250, 2)));
    }

    #[test]
    fn test_decode_text_and_bytes() {
        assert_eq!(
            ColumnKind::Text.decode(Value::Bytes(b"abc".to_vec())).unwrap(),
            SqlValue::Text("abc".to_string())
        );
        assert_eq!(
            ColumnKind::Bytes.decode(Value::Bytes(vec![0, 159])).unwrap(),
            SqlValue::Bytes(vec![0, 159])
        );
        assert!(ColumnKind::Text.decode(Value::Bytes(vec![0xff, 0xfe])).is_err());
    }

    #[test]
    fn test_decode_json() {
        assert_eq!(
            ColumnKind::Json
                .decode(Value::Bytes(br#"{"tags":["a","b"]}"#.to_vec()))
                .unwrap(),
            SqlValue::Json(serde_json::json!({"tags": ["a", "b"]}))
        );
        assert_eq!(
            ColumnKind::Json.decode(Value::NULL).unwrap(),
            SqlValue::Null(SqlNullType::Json)
        );
        assert!(ColumnKind::Json.decode(Value::Bytes(b"{not json".to_vec())).is_err());
    }

    #[test]
    fn test_decode_datetime() {
        let v = ColumnKind::DateTime
            .decode(Value::Date(2024, 2, 29, 13, 45, 0, 0))
            .unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_opt(13, 45, 0)
            .unwrap();
        assert_eq!(v, SqlValue::DateTime(expected));
    }

    #[test]
    fn test_decode_time_ranges() {
        assert_eq!(
            ColumnKind::Time.decode(Value::Time(false, 0, 8, 30, 0, 0)).unwrap(),
            SqlValue::Time(NaiveTime::from_hms_opt(8, 30, 0).unwrap())
        );
        assert_eq!(
            ColumnKind::Time.decode(Value::Time(true, 1, 2, 0, 0, 0)).unwrap(),
            SqlValue::Raw("-26:00:00.000000".to_string())
        );
    }
}
