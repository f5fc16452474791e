//! Streaming `SELECT *` cursor over a PostgreSQL row stream.

use std::error::Error;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{Row as PgRow, RowStream};
use uuid::Uuid;

use super::describe_error;
use crate::core::{Row, RowCursor, SqlNullType, SqlValue};
use crate::error::{Result, SyncError};

/// How a result column is turned into a [`SqlValue`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ColumnDecode {
    /// Decoded from the binary wire format by its type.
    Typed(Type),
    /// Selected as `::text` and carried as [`SqlValue::Raw`].
    Text,
}

impl ColumnDecode {
    /// Pick the decoding for a column of type `ty`.
    pub(crate) fn for_type(ty: &Type) -> Self {
        if decodes_natively(ty) {
            ColumnDecode::Typed(ty.clone())
        } else {
            ColumnDecode::Text
        }
    }

    pub(crate) fn is_text(&self) -> bool {
        matches!(self, ColumnDecode::Text)
    }
}

/// Types with a dedicated [`SqlValue`] variant, plus anything the driver reads
/// as a Rust `String`.
fn decodes_natively(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::BOOL
            | Type::INT2
            | Type::INT4
            | Type::INT8
            | Type::OID
            | Type::CHAR
            | Type::FLOAT4
            | Type::FLOAT8
            | Type::NUMERIC
            | Type::BYTEA
            | Type::UUID
            | Type::TIMESTAMP
            | Type::TIMESTAMPTZ
            | Type::DATE
            | Type::TIME
            | Type::JSON
            | Type::JSONB
    ) || <String as FromSql>::accepts(ty)
}

/// Forward-only cursor fed by `query_raw`.
///
/// Rows are pulled from the server as the stream is polled, so the whole
/// result is never buffered.
pub struct PgRowCursor {
    table: String,
    columns: Vec<String>,
    decoders: Vec<ColumnDecode>,
    stream: Pin<Box<RowStream>>,
}

impl PgRowCursor {
    pub(crate) fn new(
        table: String,
        columns: Vec<String>,
        decoders: Vec<ColumnDecode>,
        stream: RowStream,
    ) -> Self {
        Self {
            table,
            columns,
            decoders,
            stream: Box::pin(stream),
        }
    }
}

#[async_trait]
impl RowCursor for PgRowCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        let row = match self.stream.try_next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) => return Err(SyncError::statement(&self.table, describe_error(&e))),
        };

        let mut values = Vec::with_capacity(self.decoders.len());
        for (idx, decoder) in self.decoders.iter().enumerate() {
            let value = decode_value(&row, idx, decoder).map_err(|e| {
                SyncError::statement(
                    &self.table,
                    format!("decoding column '{}': {}", self.columns[idx], describe_error(&e)),
                )
            })?;
            values.push(value);
        }
        Ok(Some(values))
    }
}

/// Decode one column by its PostgreSQL type.
fn decode_value(
    row: &PgRow,
    idx: usize,
    decoder: &ColumnDecode,
) -> std::result::Result<SqlValue, tokio_postgres::Error> {
    let ty = match decoder {
        ColumnDecode::Typed(ty) => ty,
        ColumnDecode::Text => {
            return Ok(match row.try_get::<_, Option<String>>(idx)? {
                Some(v) => SqlValue::Raw(v),
                None => SqlValue::Null(SqlNullType::Raw),
            })
        }
    };

    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.into(),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.into(),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.into(),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.into(),
        Type::OID => match row.try_get::<_, Option<u32>>(idx)? {
            Some(v) => SqlValue::I64(i64::from(v)),
            None => SqlValue::Null(SqlNullType::I64),
        },
        Type::CHAR => match row.try_get::<_, Option<i8>>(idx)? {
            Some(v) => SqlValue::I16(i16::from(v)),
            None => SqlValue::Null(SqlNullType::I16),
        },
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx)?.into(),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.into(),
        Type::NUMERIC => match row.try_get::<_, Option<PgNumeric>>(idx)? {
            Some(PgNumeric::Finite(d)) => SqlValue::Decimal(d),
            Some(PgNumeric::Special(s)) => SqlValue::Raw(s.to_string()),
            None => SqlValue::Null(SqlNullType::Decimal),
        },
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.into(),
        Type::UUID => row.try_get::<_, Option<Uuid>>(idx)?.into(),
        Type::TIMESTAMP => row.try_get::<_, Option<NaiveDateTime>>(idx)?.into(),
        Type::TIMESTAMPTZ => match row.try_get::<_, Option<DateTime<Utc>>>(idx)? {
            Some(v) => SqlValue::DateTimeOffset(DateTime::<FixedOffset>::from(v)),
            None => SqlValue::Null(SqlNullType::DateTimeOffset),
        },
        Type::DATE => row.try_get::<_, Option<NaiveDate>>(idx)?.into(),
        Type::TIME => row.try_get::<_, Option<NaiveTime>>(idx)?.into(),
        Type::JSON | Type::JSONB => row.try_get::<_, Option<serde_json::Value>>(idx)?.into(),
        _ => row.try_get::<_, Option<String>>(idx)?.into(),
    };
    Ok(value)
}

// numeric sign words for the non-finite values
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// A `numeric` value: a [`Decimal`], or one of NaN and ±Infinity, which
/// `Decimal` cannot hold.
#[derive(Debug, PartialEq)]
enum PgNumeric {
    Finite(Decimal),
    Special(&'static str),
}

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, Box<dyn Error + Sync + Send>> {
        // header: ndigits, weight, sign, dscale
        if raw.len() >= 8 {
            match u16::from_be_bytes([raw[4], raw[5]]) {
                NUMERIC_NAN => return Ok(PgNumeric::Special("NaN")),
                NUMERIC_PINF => return Ok(PgNumeric::Special("Infinity")),
                NUMERIC_NINF => return Ok(PgNumeric::Special("-Infinity")),
                _ => {}
            }
        }
        Decimal::from_sql(ty, raw).map(PgNumeric::Finite)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}
