//! Row decoding across vendor type systems.
//!
//! Converts driver rows into JSON objects behind the uniform result shape.
//! Type conversion is two-phase: [`TypeCategory`] classifies the column
//! type, then a vendor-specific decoder extracts the value.

use crate::models::Vendor;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Binary,
    Json,
    Uuid,
    DateTime,
    Text,
}

/// Classify a vendor type name into a logical category.
pub fn categorize_type(type_name: &str, vendor: Vendor) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric first, it overlaps with the float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC affinity is a float
        if vendor == Vendor::Sqlite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("timestamp")
        || lower == "datetime"
        || lower == "date"
        || lower == "time"
        || lower == "timetz"
    {
        return TypeCategory::DateTime;
    }

    TypeCategory::Text
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper for raw DECIMAL/NUMERIC values as strings, preserving the exact
/// database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

/// Encode binary column data as base64 text.
pub fn encode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    JsonValue::String(STANDARD.encode(bytes))
}

// =============================================================================
// Row to JSON Trait
// =============================================================================

/// Conversion of a driver row into a JSON object.
pub trait RowToJson {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue>;
}

impl RowToJson for MySqlRow {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, Vendor::MySql);
                let value = mysql::decode_column(self, idx, type_name, category);
                (col.name().to_string(), value)
            })
            .collect()
    }
}

impl RowToJson for PgRow {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, Vendor::PostgreSql);
                let value = postgres::decode_column(self, idx, category);
                (col.name().to_string(), value)
            })
            .collect()
    }
}

impl RowToJson for SqliteRow {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, Vendor::Sqlite);
                let value = sqlite::decode_column(self, idx, type_name, category);
                (col.name().to_string(), value)
            })
            .collect()
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(
        row: &MySqlRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> JsonValue {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::DateTime => decode_datetime(row, idx),
            _ => decode_text(row, idx, type_name),
        }
    }

    fn decode_decimal(row: &MySqlRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(Some(v)) => JsonValue::String(v.0),
            Ok(None) => JsonValue::Null,
            Err(e) => {
                tracing::error!("Failed to decode DECIMAL: {:?}", e);
                JsonValue::Null
            }
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Null;
        }
        if let Ok(Some(v)) = row.try_get::<Option<i8>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        // Unsigned variants, MySQL 8.x reports BIGINT UNSIGNED
        if let Ok(Some(v)) = row.try_get::<Option<u8>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        JsonValue::Null
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> JsonValue {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return serde_json::Number::from_f64(v)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(v.to_string()));
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return serde_json::Number::from_f64(v as f64)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(v.to_string()));
        }
        JsonValue::Null
    }

    fn decode_binary(row: &MySqlRow, idx: usize) -> JsonValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| encode_binary_value(&v))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_json(row: &MySqlRow, idx: usize) -> JsonValue {
        row.try_get::<Option<serde_json::Value>, _>(idx)
            .ok()
            .flatten()
            .unwrap_or(JsonValue::Null)
    }

    fn decode_datetime(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
            return JsonValue::String(v.and_utc().to_rfc3339());
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveDate>, _>(idx) {
            return JsonValue::String(v.to_string());
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveTime>, _>(idx) {
            return JsonValue::String(v.to_string());
        }
        JsonValue::Null
    }

    fn decode_text(row: &MySqlRow, idx: usize, type_name: &str) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
            if type_name.to_lowercase().contains("json") {
                if let Ok(json) = serde_json::from_str::<JsonValue>(&v) {
                    return json;
                }
            }
            return JsonValue::String(v);
        }
        JsonValue::Null
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Uuid => decode_uuid(row, idx),
            TypeCategory::DateTime => decode_datetime(row, idx),
            _ => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &PgRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(Some(v)) => JsonValue::String(v.0),
            Ok(None) => JsonValue::Null,
            Err(e) => {
                tracing::error!("Failed to decode NUMERIC: {:?}", e);
                JsonValue::Null
            }
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Null;
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        JsonValue::Null
    }

    fn decode_boolean(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_float(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return serde_json::Number::from_f64(v)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(v.to_string()));
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return serde_json::Number::from_f64(v as f64)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(v.to_string()));
        }
        JsonValue::Null
    }

    fn decode_binary(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| encode_binary_value(&v))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_json(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<serde_json::Value>, _>(idx)
            .ok()
            .flatten()
            .unwrap_or(JsonValue::Null)
    }

    fn decode_uuid(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<sqlx::types::Uuid>, _>(idx)
            .ok()
            .flatten()
            .map(|v| JsonValue::String(v.to_string()))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_datetime(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<DateTime<Utc>>, _>(idx) {
            return JsonValue::String(v.to_rfc3339());
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
            return JsonValue::String(v.and_utc().to_rfc3339());
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveDate>, _>(idx) {
            return JsonValue::String(v.to_string());
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveTime>, _>(idx) {
            return JsonValue::String(v.to_string());
        }
        JsonValue::Null
    }

    fn decode_text(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null)
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(
        row: &SqliteRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> JsonValue {
        match category {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float | TypeCategory::Decimal => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            // SQLite stores dates and JSON with TEXT affinity
            _ => decode_text(row, idx, type_name),
        }
    }

    fn decode_integer(row: &SqliteRow, idx: usize) -> JsonValue {
        if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Null;
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        JsonValue::Null
    }

    fn decode_boolean(row: &SqliteRow, idx: usize) -> JsonValue {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_float(row: &SqliteRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return serde_json::Number::from_f64(v)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(v.to_string()));
        }
        JsonValue::Null
    }

    fn decode_binary(row: &SqliteRow, idx: usize) -> JsonValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| encode_binary_value(&v))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_text(row: &SqliteRow, idx: usize, type_name: &str) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
            if type_name.to_lowercase().contains("json") {
                if let Ok(json) = serde_json::from_str::<JsonValue>(&v) {
                    return json;
                }
            }
            return JsonValue::String(v);
        }
        JsonValue::Null
    }
}
