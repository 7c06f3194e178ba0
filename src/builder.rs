//! Parameterized statement builders.
//!
//! Pure functions that turn structured input into a [`BuiltQuery`] for one
//! vendor. Nothing here executes SQL or touches a connection, so every
//! builder is testable without a database. Identifiers go through the
//! validation/quoting choke point in [`crate::ident`]; values are always
//! emitted as placeholders and carried in the parameter list.

use crate::error::{DbError, DbResult};
use crate::ident::{quote_identifier, quote_qualified, validate_identifier};
use crate::models::{
    BuiltQuery, ConditionValue, Operator, QueryParam, Vendor, WhereCondition,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sort direction for an ORDER BY term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    fn sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One ORDER BY term.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl OrderBy {
    /// Ascending order on a column.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    /// Descending order on a column.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Structured input for a SELECT statement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectInput {
    pub table: String,
    /// Projection; `None` means `*`.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default, rename = "where")]
    pub conditions: Vec<WhereCondition>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

impl SelectInput {
    /// Select everything from a table.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    /// Restrict the projection.
    pub fn columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    /// Add a WHERE conjunct.
    pub fn filter(mut self, condition: WhereCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Add an ORDER BY term.
    pub fn order(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Set the row limit.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the row offset.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Structured input for an INSERT statement. `rows` holds one entry for a
/// single-row insert and several for a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertInput {
    pub table: String,
    pub rows: Vec<BTreeMap<String, QueryParam>>,
    /// Columns to return from the inserted rows. Rejected for MySQL.
    #[serde(default)]
    pub returning: Option<Vec<String>>,
    /// Generated-key column for vendors without RETURNING; the caller
    /// re-fetches by this column after the insert.
    #[serde(default)]
    pub id_column: Option<String>,
}

impl InsertInput {
    /// Single-row insert.
    pub fn single(table: impl Into<String>, row: BTreeMap<String, QueryParam>) -> Self {
        Self {
            table: table.into(),
            rows: vec![row],
            returning: None,
            id_column: None,
        }
    }

    /// Batch insert.
    pub fn batch(table: impl Into<String>, rows: Vec<BTreeMap<String, QueryParam>>) -> Self {
        Self {
            table: table.into(),
            rows,
            returning: None,
            id_column: None,
        }
    }

    /// Request RETURNING columns (PostgreSQL, SQLite).
    pub fn returning(mut self, columns: Vec<String>) -> Self {
        self.returning = Some(columns);
        self
    }

    /// Name the generated-key column.
    pub fn id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = Some(column.into());
        self
    }
}

/// Optimistic-lock clause for UPDATE: a version-column equality predicate.
/// The caller treats `row_count == 0` as a lost-update signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimisticLock {
    pub column: String,
    pub version: QueryParam,
}

/// Structured input for an UPDATE statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateInput {
    pub table: String,
    pub data: BTreeMap<String, QueryParam>,
    #[serde(rename = "where")]
    pub conditions: Vec<WhereCondition>,
    #[serde(default)]
    pub optimistic_lock: Option<OptimisticLock>,
}

/// Soft-delete rewrite: instead of removing rows, set `column = value`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftDelete {
    pub column: String,
    pub value: QueryParam,
}

/// Structured input for a DELETE statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteInput {
    pub table: String,
    #[serde(default, rename = "where")]
    pub conditions: Vec<WhereCondition>,
    /// Deliberate opt-in for a DELETE with no WHERE clause.
    #[serde(default)]
    pub allow_full_table_delete: bool,
    #[serde(default)]
    pub soft_delete: Option<SoftDelete>,
}

impl DeleteInput {
    /// Delete rows matching the given conditions.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            conditions: Vec::new(),
            allow_full_table_delete: false,
            soft_delete: None,
        }
    }

    /// Add a WHERE conjunct.
    pub fn filter(mut self, condition: WhereCondition) -> Self {
        self.conditions.push(condition);
        self
    }
}

// =============================================================================
// SELECT
// =============================================================================

/// Build a parameterized SELECT statement.
pub fn build_select(input: &SelectInput, vendor: Vendor) -> DbResult<BuiltQuery> {
    let table = quote_qualified(&input.table, "table", vendor)?;

    let projection = match &input.columns {
        None => "*".to_string(),
        Some(cols) if cols.is_empty() => {
            return Err(DbError::validation("SELECT column list cannot be empty"));
        }
        Some(cols) => {
            let mut quoted = Vec::with_capacity(cols.len());
            for col in cols {
                validate_identifier(col, "column")?;
                quoted.push(quote_identifier(col, vendor));
            }
            quoted.join(", ")
        }
    };

    let mut sql = format!("SELECT {} FROM {}", projection, table);
    let mut params = Vec::new();

    append_where(&mut sql, &input.conditions, vendor, &mut params)?;

    if !input.order_by.is_empty() {
        let mut terms = Vec::with_capacity(input.order_by.len());
        for order in &input.order_by {
            validate_identifier(&order.column, "column")?;
            terms.push(format!(
                "{} {}",
                quote_identifier(&order.column, vendor),
                order.direction.sql()
            ));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&terms.join(", "));
    }

    if let Some(limit) = input.limit {
        params.push(QueryParam::Int(limit as i64));
        sql.push_str(&format!(" LIMIT {}", vendor.placeholder(params.len())));
    }
    if let Some(offset) = input.offset {
        if input.limit.is_none() && vendor == Vendor::MySql {
            // MySQL has no OFFSET without LIMIT
            return Err(DbError::validation(
                "OFFSET requires LIMIT on MySQL; set a limit as well",
            ));
        }
        params.push(QueryParam::Int(offset as i64));
        sql.push_str(&format!(" OFFSET {}", vendor.placeholder(params.len())));
    }

    Ok(BuiltQuery::new(sql, params, vendor))
}

// =============================================================================
// INSERT
// =============================================================================

/// Build a parameterized INSERT statement (single row or batch).
pub fn build_insert(input: &InsertInput, vendor: Vendor) -> DbResult<BuiltQuery> {
    let table = quote_qualified(&input.table, "table", vendor)?;

    if input.rows.is_empty() {
        return Err(DbError::validation("INSERT requires at least one row"));
    }

    // All-default-values rows have ambiguous batch semantics; reject.
    let columns: Vec<&String> = input.rows[0].keys().collect();
    if columns.is_empty() {
        return Err(DbError::validation(
            "INSERT of rows with no explicit values is unsupported",
        ));
    }
    for (i, row) in input.rows.iter().enumerate().skip(1) {
        let row_columns: Vec<&String> = row.keys().collect();
        if row_columns != columns {
            return Err(DbError::validation(format!(
                "Batch INSERT rows must share one column set; row {} differs from row 0",
                i
            )));
        }
    }

    let mut quoted_columns = Vec::with_capacity(columns.len());
    for col in &columns {
        validate_identifier(col, "column")?;
        quoted_columns.push(quote_identifier(col, vendor));
    }

    let mut params = Vec::with_capacity(columns.len() * input.rows.len());
    let mut tuples = Vec::with_capacity(input.rows.len());
    for row in &input.rows {
        let mut placeholders = Vec::with_capacity(columns.len());
        for col in &columns {
            params.push(row[*col].clone());
            placeholders.push(vendor.placeholder(params.len()));
        }
        tuples.push(format!("({})", placeholders.join(", ")));
    }

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        table,
        quoted_columns.join(", "),
        tuples.join(", ")
    );

    let returning = returning_columns(input, vendor)?;
    if let Some(cols) = returning {
        sql.push_str(" RETURNING ");
        sql.push_str(&cols.join(", "));
    }

    Ok(BuiltQuery::new(sql, params, vendor))
}

/// Resolve the RETURNING clause for an insert, enforcing the MySQL rule.
fn returning_columns(input: &InsertInput, vendor: Vendor) -> DbResult<Option<Vec<String>>> {
    if let Some(cols) = &input.returning {
        if !vendor.supports_returning() {
            return Err(DbError::validation(
                "MySQL does not support RETURNING; set id_column and re-fetch by the generated key instead",
            ));
        }
        if cols.is_empty() {
            return Err(DbError::validation("RETURNING column list cannot be empty"));
        }
        let mut quoted = Vec::with_capacity(cols.len());
        for col in cols {
            validate_identifier(col, "column")?;
            quoted.push(quote_identifier(col, vendor));
        }
        return Ok(Some(quoted));
    }
    if let Some(id_col) = &input.id_column {
        validate_identifier(id_col, "column")?;
        // MySQL callers re-fetch via the generated key; no clause emitted.
        if vendor.supports_returning() {
            return Ok(Some(vec![quote_identifier(id_col, vendor)]));
        }
    }
    Ok(None)
}

// =============================================================================
// UPDATE
// =============================================================================

/// Build a parameterized UPDATE statement.
pub fn build_update(input: &UpdateInput, vendor: Vendor) -> DbResult<BuiltQuery> {
    let table = quote_qualified(&input.table, "table", vendor)?;

    if input.data.is_empty() {
        return Err(DbError::validation("UPDATE requires at least one column"));
    }
    if input.conditions.is_empty() && input.optimistic_lock.is_none() {
        return Err(DbError::validation(
            "UPDATE requires at least one WHERE condition",
        ));
    }

    let mut params = Vec::with_capacity(input.data.len() + input.conditions.len());
    let mut assignments = Vec::with_capacity(input.data.len());
    for (col, value) in &input.data {
        validate_identifier(col, "column")?;
        params.push(value.clone());
        assignments.push(format!(
            "{} = {}",
            quote_identifier(col, vendor),
            vendor.placeholder(params.len())
        ));
    }

    let mut sql = format!("UPDATE {} SET {}", table, assignments.join(", "));

    let mut conditions = input.conditions.clone();
    if let Some(lock) = &input.optimistic_lock {
        conditions.push(WhereCondition::new(
            lock.column.clone(),
            Operator::Eq,
            lock.version.clone(),
        ));
    }
    append_where(&mut sql, &conditions, vendor, &mut params)?;

    Ok(BuiltQuery::new(sql, params, vendor))
}

// =============================================================================
// DELETE
// =============================================================================

/// Build a parameterized DELETE statement.
///
/// A DELETE with no WHERE conditions is rejected unless
/// `allow_full_table_delete` is explicitly set. With `soft_delete`, the
/// operation becomes an UPDATE that marks rows instead of removing them.
pub fn build_delete(input: &DeleteInput, vendor: Vendor) -> DbResult<BuiltQuery> {
    let table = quote_qualified(&input.table, "table", vendor)?;

    if input.conditions.is_empty() && !input.allow_full_table_delete {
        return Err(DbError::validation(
            "DELETE without WHERE conditions removes every row; set allow_full_table_delete to proceed",
        ));
    }

    if let Some(soft) = &input.soft_delete {
        validate_identifier(&soft.column, "column")?;
        let mut params = vec![soft.value.clone()];
        let mut sql = format!(
            "UPDATE {} SET {} = {}",
            table,
            quote_identifier(&soft.column, vendor),
            vendor.placeholder(1)
        );
        append_where(&mut sql, &input.conditions, vendor, &mut params)?;
        return Ok(BuiltQuery::new(sql, params, vendor));
    }

    let mut sql = format!("DELETE FROM {}", table);
    let mut params = Vec::new();
    append_where(&mut sql, &input.conditions, vendor, &mut params)?;

    Ok(BuiltQuery::new(sql, params, vendor))
}

// =============================================================================
// WHERE assembly
// =============================================================================

/// Validate and append a WHERE clause (conjunction of conditions),
/// extending `params` in place. No-op for an empty condition list.
fn append_where(
    sql: &mut String,
    conditions: &[WhereCondition],
    vendor: Vendor,
    params: &mut Vec<QueryParam>,
) -> DbResult<()> {
    if conditions.is_empty() {
        return Ok(());
    }

    let mut fragments = Vec::with_capacity(conditions.len());
    for condition in conditions {
        condition.validate()?;
        validate_identifier(&condition.column, "column")?;
        let column = quote_identifier(&condition.column, vendor);

        let fragment = match (&condition.operator, &condition.value) {
            (op, None) => format!("{} {}", column, op.sql()),
            (op, Some(ConditionValue::Scalar(value))) => {
                params.push(value.clone());
                format!("{} {} {}", column, op.sql(), vendor.placeholder(params.len()))
            }
            (op, Some(ConditionValue::List(values))) => {
                let mut placeholders = Vec::with_capacity(values.len());
                for value in values {
                    params.push(value.clone());
                    placeholders.push(vendor.placeholder(params.len()));
                }
                format!("{} {} ({})", column, op.sql(), placeholders.join(", "))
            }
        };
        fragments.push(fragment);
    }

    sql.push_str(" WHERE ");
    sql.push_str(&fragments.join(" AND "));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, QueryParam)]) -> BTreeMap<String, QueryParam> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    // =========================================================================
    // SELECT
    // =========================================================================

    #[test]
    fn test_select_star() {
        let built = build_select(&SelectInput::table("users"), Vendor::PostgreSql).unwrap();
        assert_eq!(built.sql, "SELECT * FROM \"users\"");
        assert!(built.params.is_empty());
    }

    #[test]
    fn test_select_with_conditions_postgres_placeholders() {
        let input = SelectInput::table("users")
            .columns(vec!["id".into(), "email".into()])
            .filter(WhereCondition::eq("email", "alice@example.com"))
            .filter(WhereCondition::new("age", Operator::Gte, 21i64));
        let built = build_select(&input, Vendor::PostgreSql).unwrap();
        assert_eq!(
            built.sql,
            "SELECT \"id\", \"email\" FROM \"users\" WHERE \"email\" = $1 AND \"age\" >= $2"
        );
        assert_eq!(built.params.len(), 2);
    }

    #[test]
    fn test_select_mysql_quoting_and_placeholders() {
        let input = SelectInput::table("users").filter(WhereCondition::eq("id", 1i64));
        let built = build_select(&input, Vendor::MySql).unwrap();
        assert_eq!(built.sql, "SELECT * FROM `users` WHERE `id` = ?");
    }

    #[test]
    fn test_select_in_list() {
        let input = SelectInput::table("users").filter(WhereCondition::in_list(
            "id",
            vec![QueryParam::Int(1), QueryParam::Int(2), QueryParam::Int(3)],
        ));
        let built = build_select(&input, Vendor::PostgreSql).unwrap();
        assert_eq!(
            built.sql,
            "SELECT * FROM \"users\" WHERE \"id\" IN ($1, $2, $3)"
        );
        assert_eq!(built.params.len(), 3);
    }

    #[test]
    fn test_select_is_null_emits_no_placeholder() {
        let input = SelectInput::table("users").filter(WhereCondition::is_null("deleted_at"));
        let built = build_select(&input, Vendor::Sqlite).unwrap();
        assert_eq!(built.sql, "SELECT * FROM \"users\" WHERE \"deleted_at\" IS NULL");
        assert!(built.params.is_empty());
    }

    #[test]
    fn test_select_order_limit_offset() {
        let input = SelectInput::table("users")
            .order(OrderBy::desc("created_at"))
            .order(OrderBy::asc("id"))
            .limit(10)
            .offset(20);
        let built = build_select(&input, Vendor::PostgreSql).unwrap();
        assert_eq!(
            built.sql,
            "SELECT * FROM \"users\" ORDER BY \"created_at\" DESC, \"id\" ASC LIMIT $1 OFFSET $2"
        );
        assert_eq!(built.params, vec![QueryParam::Int(10), QueryParam::Int(20)]);
    }

    #[test]
    fn test_select_offset_without_limit_rejected_on_mysql() {
        let input = SelectInput::table("users").offset(5);
        assert!(build_select(&input, Vendor::MySql).is_err());
        assert!(build_select(&input, Vendor::PostgreSql).is_ok());
    }

    #[test]
    fn test_select_malformed_condition_names_column_and_operator() {
        let input = SelectInput::table("users").filter(WhereCondition::in_list("id", vec![]));
        let err = build_select(&input, Vendor::PostgreSql).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("id"));
        assert!(msg.contains("IN"));
    }

    #[test]
    fn test_select_rejects_bad_identifiers() {
        let input = SelectInput::table("users; DROP TABLE users");
        assert!(build_select(&input, Vendor::PostgreSql).is_err());

        let input = SelectInput::table("users").filter(WhereCondition::eq("email'--", "x"));
        assert!(build_select(&input, Vendor::PostgreSql).is_err());
    }

    #[test]
    fn test_select_qualified_table() {
        let input = SelectInput::table("public.users");
        let built = build_select(&input, Vendor::PostgreSql).unwrap();
        assert_eq!(built.sql, "SELECT * FROM \"public\".\"users\"");
    }

    // =========================================================================
    // INSERT
    // =========================================================================

    #[test]
    fn test_insert_single_row() {
        let input = InsertInput::single("users", row(&[("name", QueryParam::from("Carol"))]));
        let built = build_insert(&input, Vendor::Sqlite).unwrap();
        assert_eq!(built.sql, "INSERT INTO \"users\" (\"name\") VALUES (?)");
        assert_eq!(built.params, vec![QueryParam::from("Carol")]);
    }

    #[test]
    fn test_insert_batch_postgres_numbering() {
        let input = InsertInput::batch(
            "users",
            vec![
                row(&[("age", QueryParam::Int(30)), ("name", QueryParam::from("a"))]),
                row(&[("age", QueryParam::Int(40)), ("name", QueryParam::from("b"))]),
            ],
        );
        let built = build_insert(&input, Vendor::PostgreSql).unwrap();
        assert_eq!(
            built.sql,
            "INSERT INTO \"users\" (\"age\", \"name\") VALUES ($1, $2), ($3, $4)"
        );
        assert_eq!(built.params.len(), 4);
    }

    #[test]
    fn test_insert_batch_mismatched_columns_rejected() {
        let input = InsertInput::batch(
            "users",
            vec![
                row(&[("name", QueryParam::from("a"))]),
                row(&[("email", QueryParam::from("b@c.d"))]),
            ],
        );
        let err = build_insert(&input, Vendor::PostgreSql).unwrap_err();
        assert!(err.to_string().contains("column set"));
    }

    #[test]
    fn test_insert_empty_rows_rejected() {
        let input = InsertInput::batch("users", vec![]);
        assert!(build_insert(&input, Vendor::Sqlite).is_err());

        let input = InsertInput::batch("users", vec![BTreeMap::new(), BTreeMap::new()]);
        let err = build_insert(&input, Vendor::Sqlite).unwrap_err();
        assert!(err.to_string().contains("no explicit values"));
    }

    #[test]
    fn test_insert_returning_postgres() {
        let input = InsertInput::single("users", row(&[("name", QueryParam::from("Carol"))]))
            .returning(vec!["id".into(), "name".into()]);
        let built = build_insert(&input, Vendor::PostgreSql).unwrap();
        assert_eq!(
            built.sql,
            "INSERT INTO \"users\" (\"name\") VALUES ($1) RETURNING \"id\", \"name\""
        );
    }

    #[test]
    fn test_insert_returning_rejected_on_mysql() {
        let input = InsertInput::single("users", row(&[("name", QueryParam::from("Carol"))]))
            .returning(vec!["id".into()]);
        let err = build_insert(&input, Vendor::MySql).unwrap_err();
        assert!(err.to_string().contains("id_column"));
    }

    #[test]
    fn test_insert_id_column_emits_returning_where_supported() {
        let input = InsertInput::single("users", row(&[("name", QueryParam::from("Carol"))]))
            .id_column("id");
        let built = build_insert(&input, Vendor::Sqlite).unwrap();
        assert!(built.sql.ends_with("RETURNING \"id\""));

        // MySQL: no clause; caller re-fetches by the generated key
        let built = build_insert(&input, Vendor::MySql).unwrap();
        assert!(!built.sql.contains("RETURNING"));
    }

    // =========================================================================
    // UPDATE
    // =========================================================================

    #[test]
    fn test_update_basic() {
        let input = UpdateInput {
            table: "users".into(),
            data: row(&[("name", QueryParam::from("Dave"))]),
            conditions: vec![WhereCondition::eq("id", 7i64)],
            optimistic_lock: None,
        };
        let built = build_update(&input, Vendor::PostgreSql).unwrap();
        assert_eq!(
            built.sql,
            "UPDATE \"users\" SET \"name\" = $1 WHERE \"id\" = $2"
        );
        assert_eq!(built.params.len(), 2);
    }

    #[test]
    fn test_update_without_where_rejected() {
        let input = UpdateInput {
            table: "users".into(),
            data: row(&[("name", QueryParam::from("Dave"))]),
            conditions: vec![],
            optimistic_lock: None,
        };
        assert!(build_update(&input, Vendor::PostgreSql).is_err());
    }

    #[test]
    fn test_update_optimistic_lock_appends_version_predicate() {
        let input = UpdateInput {
            table: "docs".into(),
            data: row(&[("body", QueryParam::from("new text"))]),
            conditions: vec![WhereCondition::eq("id", 1i64)],
            optimistic_lock: Some(OptimisticLock {
                column: "version".into(),
                version: QueryParam::Int(4),
            }),
        };
        let built = build_update(&input, Vendor::PostgreSql).unwrap();
        assert_eq!(
            built.sql,
            "UPDATE \"docs\" SET \"body\" = $1 WHERE \"id\" = $2 AND \"version\" = $3"
        );
        assert_eq!(built.params[2], QueryParam::Int(4));
    }

    #[test]
    fn test_update_empty_data_rejected() {
        let input = UpdateInput {
            table: "users".into(),
            data: BTreeMap::new(),
            conditions: vec![WhereCondition::eq("id", 1i64)],
            optimistic_lock: None,
        };
        assert!(build_update(&input, Vendor::Sqlite).is_err());
    }

    // =========================================================================
    // DELETE
    // =========================================================================

    #[test]
    fn test_delete_with_where() {
        let input = DeleteInput::table("users").filter(WhereCondition::eq("id", 3i64));
        let built = build_delete(&input, Vendor::Sqlite).unwrap();
        assert_eq!(built.sql, "DELETE FROM \"users\" WHERE \"id\" = ?");
    }

    #[test]
    fn test_delete_without_where_rejected_by_default() {
        let input = DeleteInput::table("users");
        let err = build_delete(&input, Vendor::Sqlite).unwrap_err();
        assert!(err.to_string().contains("allow_full_table_delete"));
    }

    #[test]
    fn test_delete_full_table_with_explicit_opt_in() {
        let mut input = DeleteInput::table("users");
        input.allow_full_table_delete = true;
        let built = build_delete(&input, Vendor::Sqlite).unwrap();
        assert_eq!(built.sql, "DELETE FROM \"users\"");
    }

    #[test]
    fn test_soft_delete_rewrites_to_update() {
        let input = DeleteInput {
            table: "users".into(),
            conditions: vec![WhereCondition::eq("id", 9i64)],
            allow_full_table_delete: false,
            soft_delete: Some(SoftDelete {
                column: "deleted_at".into(),
                value: QueryParam::from("2026-08-06T00:00:00Z"),
            }),
        };
        let built = build_delete(&input, Vendor::PostgreSql).unwrap();
        assert_eq!(
            built.sql,
            "UPDATE \"users\" SET \"deleted_at\" = $1 WHERE \"id\" = $2"
        );
    }

    #[test]
    fn test_soft_delete_still_guarded_without_where() {
        let input = DeleteInput {
            table: "users".into(),
            conditions: vec![],
            allow_full_table_delete: false,
            soft_delete: Some(SoftDelete {
                column: "deleted".into(),
                value: QueryParam::Bool(true),
            }),
        };
        assert!(build_delete(&input, Vendor::PostgreSql).is_err());
    }
}
