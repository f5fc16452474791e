//! TDS row stream cursor for SQL Server.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use futures::stream::BoxStream;
use futures::TryStreamExt;
use rust_decimal::Decimal;
use tiberius::{ColumnData, FromSql};

use crate::core::{Row, RowCursor, SqlNullType, SqlValue};
use crate::error::{Result, SyncError};

/// Forward-only cursor over a `simple_query` row stream.
///
/// Abandoning the stream early is safe; tiberius drains pending tokens
/// before the connection runs its next statement.
pub struct MssqlRowCursor<'c> {
    table: String,
    columns: Vec<String>,
    rows: BoxStream<'c, tiberius::Result<tiberius::Row>>,
}

impl<'c> MssqlRowCursor<'c> {
    pub(crate) fn new(
        table: String,
        columns: Vec<String>,
        rows: BoxStream<'c, tiberius::Result<tiberius::Row>>,
    ) -> Self {
        Self {
            table,
            columns,
            rows,
        }
    }
}

#[async_trait]
impl RowCursor for MssqlRowCursor<'_> {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        let row = match self.rows.try_next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) => return Err(SyncError::statement(&self.table, e)),
        };

        let mut values = Vec::with_capacity(self.columns.len());
        for (idx, data) in row.into_iter().enumerate() {
            let value = decode_column(data).map_err(|e| {
                let column = self.columns.get(idx).map(String::as_str).unwrap_or("?");
                SyncError::statement(&self.table, format!("decoding column '{}': {}", column, e))
            })?;
            values.push(value);
        }
        Ok(Some(values))
    }
}

/// Convert one TDS column value, keeping the NULL type of the column.
pub(crate) fn decode_column(data: ColumnData<'static>) -> std::result::Result<SqlValue, String> {
    let value = match data {
        ColumnData::U8(v) => match v {
            Some(v) => SqlValue::I16(i16::from(v)),
            None => SqlValue::Null(SqlNullType::I16),
        },
        ColumnData::I16(v) => v.into(),
        ColumnData::I32(v) => v.into(),
        ColumnData::I64(v) => v.into(),
        ColumnData::F32(v) => v.into(),
        ColumnData::F64(v) => v.into(),
        ColumnData::Bit(v) => v.into(),
        ColumnData::String(v) => v.map(|s| s.into_owned()).into(),
        ColumnData::Guid(v) => v.into(),
        ColumnData::Binary(v) => v.map(|b| b.into_owned()).into(),
        ColumnData::Numeric(v) => match v {
            Some(n) => SqlValue::Decimal(
                Decimal::try_from_i128_with_scale(n.value(), u32::from(n.scale()))
                    .map_err(|e| format!("numeric {} out of range: {}", n, e))?,
            ),
            None => SqlValue::Null(SqlNullType::Decimal),
        },
        ColumnData::Xml(v) => match v {
            Some(xml) => SqlValue::Text(xml.into_owned().into_string()),
            None => SqlValue::Null(SqlNullType::String),
        },
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(&data).map_err(|e| e.to_string())?.into()
        }
        ColumnData::Date(_) => NaiveDate::from_sql(&data).map_err(|e| e.to_string())?.into(),
        ColumnData::Time(_) => NaiveTime::from_sql(&data).map_err(|e| e.to_string())?.into(),
        ColumnData::DateTimeOffset(_) => DateTime::<FixedOffset>::from_sql(&data)
            .map_err(|e| e.to_string())?
            .into(),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn test_decode_scalars() {
        assert_eq!(decode_column(ColumnData::I32(Some(5))).unwrap(), SqlValue::I32(5));
        assert_eq!(decode_column(ColumnData::U8(Some(200))).unwrap(), SqlValue::I16(200));
        assert_eq!(decode_column(ColumnData::Bit(Some(true))).unwrap(), SqlValue::Bool(true));
        assert_eq!(
            decode_column(ColumnData::String(Some(Cow::Owned("x".to_string())))).unwrap(),
            SqlValue::Text("x".to_string())
        );
    }

    #[test]
    fn test_decode_nulls_are_typed() {
        assert_eq!(
            decode_column(ColumnData::I64(None)).unwrap(),
            SqlValue::Null(SqlNullType::I64)
        );
        assert_eq!(
            decode_column(ColumnData::String(None)).unwrap(),
            SqlValue::Null(SqlNullType::String)
        );
        assert_eq!(
            decode_column(ColumnData::DateTime2(None)).unwrap(),
            SqlValue::Null(SqlNullType::DateTime)
        );
    }

    #[test]
    fn test_decode_numeric() {
        let n = tiberius::numeric::Numeric::new_with_scale(12345, 2);
        assert_eq!(
            decode_column(ColumnData::Numeric(Some(n))).unwrap(),
            SqlValue::Decimal(Decimal::new(12345, 2))
        );
    }
}
