//! Query-related data models.
//!
//! This module defines parameter values, structured WHERE conditions, the
//! query input/result shapes, and the expansion of named parameters into
//! vendor placeholders.

use crate::error::{DbError, DbResult};
use crate::models::Vendor;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Default per-statement timeout in milliseconds.
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 30_000;

/// Maximum per-statement timeout in milliseconds.
pub const MAX_QUERY_TIMEOUT_MS: u64 = 300_000;

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
    /// JSON value (stored as text on SQLite)
    Json(JsonValue),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
        }
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for QueryParam {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Parameters for a statement: a positional list or a named map.
///
/// Named parameters are written as `:name` in the SQL and expanded into
/// vendor placeholders before execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Params {
    Positional(Vec<QueryParam>),
    Named(BTreeMap<String, QueryParam>),
}

impl Params {
    /// An empty positional parameter list.
    pub fn none() -> Self {
        Self::Positional(Vec::new())
    }

    /// Number of parameter values carried.
    pub fn len(&self) -> usize {
        match self {
            Self::Positional(v) => v.len(),
            Self::Named(m) => m.len(),
        }
    }

    /// Check if no parameters are carried.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::none()
    }
}

/// Per-statement execution options.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Statement timeout in milliseconds. Default: 30000, max: 300000.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl QueryOptions {
    /// Get the effective timeout (with bounds checking).
    pub fn effective_timeout_ms(&self) -> u64 {
        self.timeout_ms
            .map(|t| t.min(MAX_QUERY_TIMEOUT_MS))
            .unwrap_or(DEFAULT_QUERY_TIMEOUT_MS)
    }
}

/// A statement submitted by a caller, before placeholder normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryInput {
    pub sql: String,
    #[serde(default)]
    pub params: Params,
    pub vendor: Vendor,
    #[serde(default)]
    pub options: QueryOptions,
}

impl QueryInput {
    /// Create a new query input with no parameters.
    pub fn new(sql: impl Into<String>, vendor: Vendor) -> Self {
        Self {
            sql: sql.into(),
            params: Params::none(),
            vendor,
            options: QueryOptions::default(),
        }
    }

    /// Set positional parameters.
    pub fn with_params(mut self, params: Vec<QueryParam>) -> Self {
        self.params = Params::Positional(params);
        self
    }

    /// Set named parameters.
    pub fn with_named_params(mut self, params: BTreeMap<String, QueryParam>) -> Self {
        self.params = Params::Named(params);
        self
    }

    /// Set the statement timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.options.timeout_ms = Some(timeout_ms);
        self
    }

    /// Normalize into a [`BuiltQuery`], expanding `:name` parameters into
    /// vendor placeholders.
    pub fn into_built(self) -> DbResult<BuiltQuery> {
        let options = self.options;
        match self.params {
            Params::Positional(params) => Ok(BuiltQuery {
                sql: self.sql,
                params,
                vendor: self.vendor,
                options,
            }),
            Params::Named(map) => {
                let (sql, params) = expand_named_params(&self.sql, &map, self.vendor)?;
                Ok(BuiltQuery {
                    sql,
                    params,
                    vendor: self.vendor,
                    options,
                })
            }
        }
    }
}

/// An already-parameterized statement ready for execution.
///
/// Produced by the query builder or by [`QueryInput::into_built`]; never
/// hand-assembled from string fragments at the call site.
#[derive(Debug, Clone, Serialize)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<QueryParam>,
    pub vendor: Vendor,
    #[serde(skip_serializing)]
    pub options: QueryOptions,
}

impl BuiltQuery {
    /// Create a built query directly from SQL and positional parameters.
    /// Intended for the builder and for tests; callers should prefer the
    /// structured builder input.
    pub fn new(sql: impl Into<String>, params: Vec<QueryParam>, vendor: Vendor) -> Self {
        Self {
            sql: sql.into(),
            params,
            vendor,
            options: QueryOptions::default(),
        }
    }
}

/// Uniform execution result regardless of vendor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryExecutionResult {
    /// Returned rows as JSON objects; empty for write statements.
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    /// Best-effort affected/returned row count.
    pub row_count: u64,
    /// Wall clock around the execute call, in milliseconds.
    pub execution_time_ms: u64,
}

impl QueryExecutionResult {
    /// Create a result for a write statement.
    pub fn write(rows_affected: u64, execution_time_ms: u64) -> Self {
        Self {
            rows: Vec::new(),
            row_count: rows_affected,
            execution_time_ms,
        }
    }
}

// =============================================================================
// WHERE Conditions
// =============================================================================

/// Comparison operator for a structured WHERE condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl Operator {
    /// SQL fragment for this operator.
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }

    /// Whether this operator takes a list value.
    pub fn takes_list(&self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }

    /// Whether this operator takes no value at all.
    pub fn takes_no_value(&self) -> bool {
        matches!(self, Self::IsNull | Self::IsNotNull)
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.sql())
    }
}

/// Value carried by a WHERE condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Scalar(QueryParam),
    List(Vec<QueryParam>),
}

/// One conjunct of a WHERE clause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhereCondition {
    pub column: String,
    pub operator: Operator,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<ConditionValue>,
}

impl WhereCondition {
    /// Scalar comparison condition.
    pub fn new(
        column: impl Into<String>,
        operator: Operator,
        value: impl Into<QueryParam>,
    ) -> Self {
        Self {
            column: column.into(),
            operator,
            value: Some(ConditionValue::Scalar(value.into())),
        }
    }

    /// Equality shorthand.
    pub fn eq(column: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        Self::new(column, Operator::Eq, value)
    }

    /// `IN` condition over a list of values.
    pub fn in_list(column: impl Into<String>, values: Vec<QueryParam>) -> Self {
        Self {
            column: column.into(),
            operator: Operator::In,
            value: Some(ConditionValue::List(values)),
        }
    }

    /// `IS NULL` condition.
    pub fn is_null(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            operator: Operator::IsNull,
            value: None,
        }
    }

    /// `IS NOT NULL` condition.
    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            operator: Operator::IsNotNull,
            value: None,
        }
    }

    /// Validate the operator/value shape invariant. Errors name the column
    /// and operator.
    pub fn validate(&self) -> DbResult<()> {
        match (&self.operator, &self.value) {
            (op, Some(_)) if op.takes_no_value() => Err(DbError::validation(format!(
                "Condition on '{}' must not carry a value for operator {}",
                self.column, op
            ))),
            (op, None) if !op.takes_no_value() => Err(DbError::validation(format!(
                "Condition on '{}' requires a value for operator {}",
                self.column, op
            ))),
            (op, Some(ConditionValue::List(values))) if op.takes_list() => {
                if values.is_empty() {
                    Err(DbError::validation(format!(
                        "Condition on '{}' requires a non-empty list for operator {}",
                        self.column, op
                    )))
                } else {
                    Ok(())
                }
            }
            (op, Some(ConditionValue::Scalar(_))) if op.takes_list() => {
                Err(DbError::validation(format!(
                    "Condition on '{}' requires a list value for operator {}",
                    self.column, op
                )))
            }
            (op, Some(ConditionValue::List(_))) if !op.takes_list() => {
                Err(DbError::validation(format!(
                    "Condition on '{}' requires a scalar value for operator {}",
                    self.column, op
                )))
            }
            _ => Ok(()),
        }
    }
}

// =============================================================================
// Named Parameter Expansion
// =============================================================================

/// Expand `:name` placeholders into vendor placeholders and a positional
/// parameter list.
///
/// Skips string literals, quoted identifiers, comments, and PostgreSQL
/// `::type` casts. Each occurrence appends its value, so repeated names
/// work uniformly across placeholder styles.
fn expand_named_params(
    sql: &str,
    map: &BTreeMap<String, QueryParam>,
    vendor: Vendor,
) -> DbResult<(String, Vec<QueryParam>)> {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut params = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            // String literal with '' escaping
            '\'' => {
                let end = scan_quoted(bytes, i, b'\'');
                out.push_str(&sql[i..end]);
                i = end;
            }
            // Quoted identifier
            '"' => {
                let end = scan_quoted(bytes, i, b'"');
                out.push_str(&sql[i..end]);
                i = end;
            }
            '`' => {
                let end = scan_quoted(bytes, i, b'`');
                out.push_str(&sql[i..end]);
                i = end;
            }
            // Line comment
            '-' if bytes.get(i + 1) == Some(&b'-') => {
                let end = bytes[i..]
                    .iter()
                    .position(|&b| b == b'\n')
                    .map(|p| i + p + 1)
                    .unwrap_or(bytes.len());
                out.push_str(&sql[i..end]);
                i = end;
            }
            // Block comment
            '/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = sql[i..].find("*/").map(|p| i + p + 2).unwrap_or(bytes.len());
                out.push_str(&sql[i..end]);
                i = end;
            }
            ':' => {
                // `::` is a cast, not a parameter
                if bytes.get(i + 1) == Some(&b':') {
                    out.push_str("::");
                    i += 2;
                    continue;
                }
                let start = i + 1;
                let mut end = start;
                while end < bytes.len()
                    && ((bytes[end] as char).is_ascii_alphanumeric() || bytes[end] == b'_')
                {
                    end += 1;
                }
                if end == start || (bytes[start] as char).is_ascii_digit() {
                    out.push(':');
                    i += 1;
                    continue;
                }
                let name = &sql[start..end];
                let value = map.get(name).ok_or_else(|| {
                    DbError::validation(format!("Missing value for named parameter :{}", name))
                })?;
                params.push(value.clone());
                out.push_str(&vendor.placeholder(params.len()));
                i = end;
            }
            _ => {
                let ch_len = sql[i..].chars().next().map(char::len_utf8).unwrap_or(1);
                out.push_str(&sql[i..i + ch_len]);
                i += ch_len;
            }
        }
    }

    Ok((out, params))
}

/// Find the end (exclusive) of a quoted region starting at `start`, where
/// a doubled quote char is an escape.
fn scan_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_types() {
        assert!(QueryParam::Null.is_null());
        assert!(!QueryParam::Bool(true).is_null());
        assert_eq!(QueryParam::Int(42).type_name(), "int");
        assert_eq!(QueryParam::from("hello").type_name(), "string");
        assert_eq!(QueryParam::Bytes(vec![1, 2]).type_name(), "bytes");
    }

    #[test]
    fn test_bytes_param_base64_round_trip() {
        let param = QueryParam::Bytes(vec![0xde, 0xad, 0xbe, 0xef]);
        let json = serde_json::to_string(&param).unwrap();
        assert_eq!(json, "\"3q2+7w==\"");
    }

    #[test]
    fn test_options_bounds() {
        let opts = QueryOptions {
            timeout_ms: Some(999_999_999),
        };
        assert_eq!(opts.effective_timeout_ms(), MAX_QUERY_TIMEOUT_MS);
        assert_eq!(
            QueryOptions::default().effective_timeout_ms(),
            DEFAULT_QUERY_TIMEOUT_MS
        );
    }

    #[test]
    fn test_condition_shape_validation() {
        assert!(WhereCondition::eq("email", "a@b.c").validate().is_ok());
        assert!(WhereCondition::is_null("deleted_at").validate().is_ok());
        assert!(
            WhereCondition::in_list("id", vec![QueryParam::Int(1)])
                .validate()
                .is_ok()
        );

        // is_null must not carry a value
        let bad = WhereCondition {
            column: "x".into(),
            operator: Operator::IsNull,
            value: Some(ConditionValue::Scalar(QueryParam::Int(1))),
        };
        assert!(bad.validate().is_err());

        // in requires a non-empty list
        let empty_in = WhereCondition::in_list("id", vec![]);
        let err = empty_in.validate().unwrap_err();
        assert!(err.to_string().contains("id"));
        assert!(err.to_string().contains("IN"));

        // scalar operator rejects a list
        let bad_list = WhereCondition {
            column: "x".into(),
            operator: Operator::Gt,
            value: Some(ConditionValue::List(vec![QueryParam::Int(1)])),
        };
        assert!(bad_list.validate().is_err());

        // scalar operator requires a value
        let missing = WhereCondition {
            column: "x".into(),
            operator: Operator::Eq,
            value: None,
        };
        assert!(missing.validate().is_err());
    }

    #[test]
    fn test_named_expansion_postgres() {
        let mut map = BTreeMap::new();
        map.insert("name".to_string(), QueryParam::from("alice"));
        map.insert("age".to_string(), QueryParam::Int(30));
        let (sql, params) = expand_named_params(
            "SELECT * FROM users WHERE name = :name AND age > :age",
            &map,
            Vendor::PostgreSql,
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM users WHERE name = $1 AND age > $2");
        assert_eq!(params.len(), 2);
        assert_eq!(params[0], QueryParam::from("alice"));
    }

    #[test]
    fn test_named_expansion_question_mark_style() {
        let mut map = BTreeMap::new();
        map.insert("id".to_string(), QueryParam::Int(7));
        let (sql, params) = expand_named_params(
            "SELECT * FROM t WHERE a = :id OR b = :id",
            &map,
            Vendor::Sqlite,
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE a = ? OR b = ?");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_named_expansion_skips_strings_and_casts() {
        let mut map = BTreeMap::new();
        map.insert("v".to_string(), QueryParam::Int(1));
        let (sql, params) = expand_named_params(
            "SELECT ':not_a_param', x::text FROM t WHERE v = :v",
            &map,
            Vendor::PostgreSql,
        )
        .unwrap();
        assert_eq!(sql, "SELECT ':not_a_param', x::text FROM t WHERE v = $1");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_named_expansion_missing_param() {
        let map = BTreeMap::new();
        let err =
            expand_named_params("SELECT :missing", &map, Vendor::PostgreSql).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_query_input_into_built_positional_passthrough() {
        let built = QueryInput::new("SELECT 1", Vendor::Sqlite)
            .with_params(vec![QueryParam::Int(1)])
            .into_built()
            .unwrap();
        assert_eq!(built.sql, "SELECT 1");
        assert_eq!(built.params.len(), 1);
    }
}
