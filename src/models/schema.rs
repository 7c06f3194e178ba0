//! Schema introspection data models.
//!
//! These types form the vendor-independent, JSON-serializable snapshot
//! produced by the schema inspector.

use crate::models::Vendor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized description of the inspected schema at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub vendor: Vendor,
    pub captured_at: DateTime<Utc>,
    pub tables: Vec<TableSchema>,
}

impl SchemaSnapshot {
    /// Create an empty snapshot stamped now.
    pub fn new(vendor: Vendor) -> Self {
        Self {
            vendor,
            captured_at: Utc::now(),
            tables: Vec::new(),
        }
    }

    /// Find a table by name, optionally schema-qualified.
    pub fn table(&self, schema: Option<&str>, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| {
            t.name == name && (schema.is_none() || t.schema.as_deref() == schema)
        })
    }
}

/// One table with its columns, keys, and indexes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<IndexInfo>,
}

impl TableSchema {
    /// Create a new table schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Set the schema name.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Add a column definition.
    pub fn with_column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    /// Get the fully qualified table name.
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    /// Full vendor type (e.g. `varchar(30)`, `bigint unsigned`)
    pub data_type: String,
    pub nullable: bool,
    /// Default value with a JSON type matching the column type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    pub is_primary_key: bool,
    /// Vendor extras, e.g. `auto_increment`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ColumnDefinition {
    /// Create a new column definition.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default_value: None,
            is_primary_key: false,
            extra: None,
            comment: None,
        }
    }

    /// Set whether this is a primary key column.
    pub fn with_primary_key(mut self, is_pk: bool) -> Self {
        self.is_primary_key = is_pk;
        self
    }

    /// Set the default value from a string, converting to an appropriate
    /// JSON type based on the column's data type.
    pub fn with_default_str(mut self, default_str: &str) -> Self {
        self.default_value = Some(parse_default_value(default_str, &self.data_type));
        self
    }

    /// Set the extra attributes.
    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }

    /// Set the column comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKey {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub column: String,
    pub references_table: String,
    pub references_column: String,
    pub on_delete: ForeignKeyAction,
    pub on_update: ForeignKeyAction,
}

impl ForeignKey {
    /// Create a new foreign key.
    pub fn new(
        column: impl Into<String>,
        references_table: impl Into<String>,
        references_column: impl Into<String>,
    ) -> Self {
        Self {
            name: None,
            column: column.into(),
            references_table: references_table.into(),
            references_column: references_column.into(),
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
        }
    }

    /// Set the constraint name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the on delete action.
    pub fn with_on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Set the on update action.
    pub fn with_on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = action;
        self
    }
}

/// Foreign key referential action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    /// No action (error if referenced)
    #[default]
    NoAction,
    /// Restrict (same as NoAction in most databases)
    Restrict,
    /// Cascade the operation
    Cascade,
    /// Set to NULL
    SetNull,
    /// Set to default value
    SetDefault,
}

impl ForeignKeyAction {
    /// Parse from database-specific string.
    pub fn parse(s: &str) -> Self {
        let upper = s.to_uppercase();
        match upper.as_str() {
            "CASCADE" => Self::Cascade,
            "SET NULL" => Self::SetNull,
            "SET DEFAULT" => Self::SetDefault,
            "RESTRICT" => Self::Restrict,
            _ => Self::NoAction,
        }
    }
}

impl std::fmt::Display for ForeignKeyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAction => write!(f, "NO ACTION"),
            Self::Restrict => write!(f, "RESTRICT"),
            Self::Cascade => write!(f, "CASCADE"),
            Self::SetNull => write!(f, "SET NULL"),
            Self::SetDefault => write!(f, "SET DEFAULT"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
    pub is_primary: bool,
    /// BTREE, HASH, GIN, etc.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
}

impl IndexInfo {
    /// Create a new index info.
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            is_unique: false,
            is_primary: false,
            algorithm: None,
        }
    }

    /// Set whether this is a unique index.
    pub fn with_unique(mut self, is_unique: bool) -> Self {
        self.is_unique = is_unique;
        self
    }

    /// Set whether this is the primary key index. Primary implies unique.
    pub fn with_primary(mut self, is_primary: bool) -> Self {
        self.is_primary = is_primary;
        if is_primary {
            self.is_unique = true;
        }
        self
    }

    /// Set the index algorithm.
    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = Some(algorithm.into());
        self
    }
}

/// Parse a default value string into the appropriate JSON type based on the
/// column data type. Decimal/numeric stay as strings to preserve precision;
/// expressions (CURRENT_TIMESTAMP, nextval, ...) stay as strings.
pub fn parse_default_value(default_str: &str, data_type: &str) -> serde_json::Value {
    let dt_lower = data_type.to_lowercase();

    if dt_lower.contains("int") || dt_lower.contains("serial") {
        if let Ok(n) = default_str.parse::<i64>() {
            return serde_json::Value::Number(n.into());
        }
    }

    if (dt_lower.contains("float") || dt_lower.contains("double") || dt_lower == "real")
        && !dt_lower.contains("decimal")
        && !dt_lower.contains("numeric")
    {
        if let Ok(n) = default_str.parse::<f64>() {
            if let Some(num) = serde_json::Number::from_f64(n) {
                return serde_json::Value::Number(num);
            }
        }
    }

    if dt_lower.contains("bool") {
        match default_str.to_lowercase().as_str() {
            "true" | "1" | "t" => return serde_json::Value::Bool(true),
            "false" | "0" | "f" => return serde_json::Value::Bool(false),
            _ => {}
        }
    }

    if dt_lower == "json" || dt_lower == "jsonb" {
        if let Ok(parsed) = serde_json::from_str(default_str) {
            return parsed;
        }
    }

    serde_json::Value::String(default_str.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_schema_builder() {
        let schema = TableSchema::new("users")
            .with_schema("public")
            .with_column(ColumnDefinition::new("id", "bigint", false).with_primary_key(true))
            .with_column(ColumnDefinition::new("name", "varchar", false));

        assert_eq!(schema.qualified_name(), "public.users");
        assert_eq!(schema.columns.len(), 2);
    }

    #[test]
    fn test_snapshot_lookup() {
        let mut snapshot = SchemaSnapshot::new(Vendor::Sqlite);
        snapshot.tables.push(TableSchema::new("users"));
        snapshot
            .tables
            .push(TableSchema::new("orders").with_schema("sales"));

        assert!(snapshot.table(None, "users").is_some());
        assert!(snapshot.table(Some("sales"), "orders").is_some());
        assert!(snapshot.table(Some("public"), "orders").is_none());
        assert!(snapshot.table(None, "missing").is_none());
    }

    #[test]
    fn test_foreign_key_action_parsing() {
        assert_eq!(ForeignKeyAction::parse("CASCADE"), ForeignKeyAction::Cascade);
        assert_eq!(ForeignKeyAction::parse("SET NULL"), ForeignKeyAction::SetNull);
        assert_eq!(ForeignKeyAction::parse("UNKNOWN"), ForeignKeyAction::NoAction);
    }

    #[test]
    fn test_index_primary_implies_unique() {
        let index = IndexInfo::new("users_pkey", vec!["id".to_string()])
            .with_primary(true)
            .with_algorithm("BTREE");

        assert!(index.is_primary);
        assert!(index.is_unique);
        assert_eq!(index.algorithm, Some("BTREE".to_string()));
    }

    #[test]
    fn test_snapshot_serializes_vendor_tag() {
        let snapshot = SchemaSnapshot::new(Vendor::PostgreSql);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"vendor\":\"postgresql\""));
        assert!(json.contains("captured_at"));
    }

    #[test]
    fn test_parse_default_value() {
        assert_eq!(
            parse_default_value("42", "int"),
            serde_json::Value::Number(42.into())
        );
        assert_eq!(parse_default_value("1.5", "float"), serde_json::json!(1.5));
        assert_eq!(
            parse_default_value("99.99", "numeric(5,2)"),
            serde_json::Value::String("99.99".to_string())
        );
        assert_eq!(
            parse_default_value("true", "boolean"),
            serde_json::Value::Bool(true)
        );
        assert_eq!(parse_default_value("{}", "jsonb"), serde_json::json!({}));
        assert_eq!(
            parse_default_value("CURRENT_TIMESTAMP", "timestamp"),
            serde_json::Value::String("CURRENT_TIMESTAMP".to_string())
        );
    }
}
