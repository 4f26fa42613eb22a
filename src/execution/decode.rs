//! Postgres cell → JSON conversion.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Number, Value};
use sqlx::postgres::{PgRow, PgTypeInfo, PgTypeKind};
use sqlx::types::Uuid;
use sqlx::{Column, Row, TypeInfo};

use super::result::Row as ResultRow;

/// How a column's cells are read, picked once from its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellDecoder {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Json,
    Uuid,
    Date,
    Time,
    Timestamp,
    Timestamptz,
    /// User-defined enum; the wire value is the label text.
    Enum,
    TextArray,
    BoolArray,
    Int4Array,
    Int8Array,
    Float8Array,
    NumericArray,
    /// Anything else: decoded as text when sqlx accepts it, null otherwise.
    Text,
}

impl CellDecoder {
    pub fn for_type(pg_type_name: &str, kind: &PgTypeKind) -> Self {
        if let PgTypeKind::Enum(_) = kind {
            return CellDecoder::Enum;
        }
        match pg_type_name {
            "BOOL" => CellDecoder::Bool,
            "INT2" => CellDecoder::Int2,
            "INT4" => CellDecoder::Int4,
            "INT8" => CellDecoder::Int8,
            "FLOAT4" => CellDecoder::Float4,
            "FLOAT8" => CellDecoder::Float8,
            "NUMERIC" => CellDecoder::Numeric,
            "JSON" | "JSONB" => CellDecoder::Json,
            "UUID" => CellDecoder::Uuid,
            "DATE" => CellDecoder::Date,
            "TIME" => CellDecoder::Time,
            "TIMESTAMP" => CellDecoder::Timestamp,
            "TIMESTAMPTZ" => CellDecoder::Timestamptz,
            "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => CellDecoder::TextArray,
            "BOOL[]" => CellDecoder::BoolArray,
            "INT4[]" => CellDecoder::Int4Array,
            "INT8[]" => CellDecoder::Int8Array,
            "FLOAT8[]" => CellDecoder::Float8Array,
            "NUMERIC[]" => CellDecoder::NumericArray,
            _ => CellDecoder::Text,
        }
    }

    fn for_type_info(type_info: &PgTypeInfo) -> Self {
        Self::for_type(type_info.name(), type_info.kind())
    }
}

/// Convert a whole row, keyed by column name.
pub fn row_to_json(row: &PgRow) -> ResultRow {
    let mut out = ResultRow::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let decoder = CellDecoder::for_type_info(column.type_info());
        out.insert(column.name().to_string(), cell_to_json(row, idx, decoder));
    }
    out
}

/// Decode one cell. Undecodable cells become null rather than failing the
/// whole result.
pub fn cell_to_json(row: &PgRow, idx: usize, decoder: CellDecoder) -> Value {
    match decoder {
        CellDecoder::Bool => get::<bool>(row, idx).map(Value::Bool),
        CellDecoder::Int2 => get::<i16>(row, idx).map(|v| Value::from(i64::from(v))),
        CellDecoder::Int4 => get::<i32>(row, idx).map(|v| Value::from(i64::from(v))),
        CellDecoder::Int8 => get::<i64>(row, idx).map(Value::from),
        CellDecoder::Float4 => get::<f32>(row, idx).and_then(|v| float(f64::from(v))),
        CellDecoder::Float8 => get::<f64>(row, idx).and_then(float),
        CellDecoder::Numeric => get::<Decimal>(row, idx).map(decimal),
        CellDecoder::Json => get::<Value>(row, idx),
        CellDecoder::Uuid => get::<Uuid>(row, idx).map(|v| Value::String(v.to_string())),
        CellDecoder::Date => {
            get::<NaiveDate>(row, idx).map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
        }
        CellDecoder::Time => {
            get::<NaiveTime>(row, idx).map(|t| Value::String(t.format("%H:%M:%S%.f").to_string()))
        }
        CellDecoder::Timestamp => get::<NaiveDateTime>(row, idx)
            .map(|dt| Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        CellDecoder::Timestamptz => {
            get::<DateTime<Utc>>(row, idx).map(|dt| Value::String(dt.to_rfc3339()))
        }
        // sqlx has no static type for a user enum, so skip the compatibility check.
        CellDecoder::Enum => row
            .try_get_unchecked::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(Value::String),
        CellDecoder::TextArray => get::<Vec<String>>(row, idx).map(Value::from),
        CellDecoder::BoolArray => get::<Vec<bool>>(row, idx).map(Value::from),
        CellDecoder::Int4Array => get::<Vec<i32>>(row, idx).map(Value::from),
        CellDecoder::Int8Array => get::<Vec<i64>>(row, idx).map(Value::from),
        CellDecoder::Float8Array => get::<Vec<f64>>(row, idx).map(|v| {
            v.into_iter()
                .map(|f| float(f).unwrap_or(Value::Null))
                .collect()
        }),
        CellDecoder::NumericArray => {
            get::<Vec<Decimal>>(row, idx).map(|v| v.into_iter().map(decimal).collect())
        }
        CellDecoder::Text => get::<String>(row, idx).map(Value::String),
    }
    .unwrap_or(Value::Null)
}

fn get<'r, T>(row: &'r PgRow, idx: usize) -> Option<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get::<Option<T>, _>(idx).ok().flatten()
}

fn float(v: f64) -> Option<Value> {
    Number::from_f64(v).map(Value::Number)
}

/// Integral decimals become JSON integers, others floats; values that do not
/// fit either are kept exact as strings.
fn decimal(d: Decimal) -> Value {
    if d.fract().is_zero() {
        if let Some(i) = d.to_i64() {
            return Value::from(i);
        }
    }
    d.to_f64()
        .and_then(float)
        .unwrap_or_else(|| Value::String(d.to_string()))
}
