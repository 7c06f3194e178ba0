//! Schema introspection.
//!
//! [`SchemaInspector`] produces a normalized [`SchemaSnapshot`] by running
//! vendor catalog queries (tables, columns, primary keys, foreign keys,
//! indexes) and joining the results client-side on `(schema, table)`.
//! SQLite has no information_schema, so it walks `sqlite_master` plus the
//! table PRAGMAs instead.
//!
//! Snapshots are cached per cache key with a TTL. Concurrent callers that
//! share a key serialize on a per-key lock, so a burst of inspections
//! costs one catalog pass, not one per caller.

use crate::db::pool::{ConnectionManager, DbPool};
use crate::error::{DbError, DbResult};
use crate::ident::validate_qualified_identifier;
use crate::models::{
    ColumnDefinition, ForeignKey, ForeignKeyAction, IndexInfo, SchemaSnapshot, TableSchema,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Default snapshot time-to-live.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Options for one inspection.
#[derive(Debug, Clone, Default)]
pub struct InspectOptions {
    /// Restrict the snapshot to these tables; bare names or
    /// `schema.table`. All tables when empty.
    pub tables: Option<Vec<String>>,
}

/// Key for client-side assembly of catalog query results.
type TableKey = (Option<String>, String);

struct CachedSnapshot {
    snapshot: Arc<SchemaSnapshot>,
    fetched_at: Instant,
}

/// Schema inspector with a time-bounded snapshot cache.
pub struct SchemaInspector {
    ttl: Duration,
    cache: Mutex<HashMap<String, Arc<Mutex<Option<CachedSnapshot>>>>>,
    inspections: AtomicU64,
}

impl SchemaInspector {
    /// Create an inspector with the default TTL.
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_CACHE_TTL)
    }

    /// Create an inspector with a custom snapshot TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            cache: Mutex::new(HashMap::new()),
            inspections: AtomicU64::new(0),
        }
    }

    /// Number of catalog passes actually executed (cache misses).
    pub fn inspections_run(&self) -> u64 {
        self.inspections.load(Ordering::SeqCst)
    }

    /// Produce a snapshot, served from cache when fresh.
    ///
    /// `cache_key` is supplied by the caller, typically derived from the
    /// manager identity. Filter values failing identifier validation fail
    /// fast before any query is issued.
    pub async fn inspect(
        &self,
        manager: &ConnectionManager,
        cache_key: &str,
        options: &InspectOptions,
    ) -> DbResult<Arc<SchemaSnapshot>> {
        let filters = parse_filters(options)?;
        let effective_key = effective_cache_key(cache_key, options);

        // Per-key slot: concurrent same-key callers wait on the slot lock
        // instead of each running the catalog queries.
        let slot = {
            let mut cache = self.cache.lock().await;
            Arc::clone(
                cache
                    .entry(effective_key)
                    .or_insert_with(|| Arc::new(Mutex::new(None))),
            )
        };
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                debug!(cache_key = cache_key, "Schema snapshot served from cache");
                return Ok(Arc::clone(&cached.snapshot));
            }
        }

        let pool = manager.current_pool().await?;
        self.inspections.fetch_add(1, Ordering::SeqCst);
        let snapshot = Arc::new(run_inspection(&pool, &filters).await?);
        debug!(
            cache_key = cache_key,
            tables = snapshot.tables.len(),
            "Schema inspected"
        );

        *entry = Some(CachedSnapshot {
            snapshot: Arc::clone(&snapshot),
            fetched_at: Instant::now(),
        });
        Ok(snapshot)
    }

    /// Drop cached snapshots for one cache key; the next `inspect` runs a
    /// fresh catalog pass. Call after schema-changing DDL.
    pub async fn invalidate_cache(&self, cache_key: &str) {
        let prefix = format!("{}\u{1f}", cache_key);
        let mut cache = self.cache.lock().await;
        cache.retain(|k, _| !k.starts_with(&prefix));
    }

    /// Drop every cached snapshot.
    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }
}

impl Default for SchemaInspector {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache entries are keyed by the caller's key plus the filter set, so a
/// filtered snapshot is never served for an unfiltered request.
fn effective_cache_key(cache_key: &str, options: &InspectOptions) -> String {
    match &options.tables {
        None => format!("{}\u{1f}*", cache_key),
        Some(tables) => {
            let mut sorted: Vec<&str> = tables.iter().map(String::as_str).collect();
            sorted.sort_unstable();
            format!("{}\u{1f}{}", cache_key, sorted.join(","))
        }
    }
}

/// Validate table filters and split them into `(schema, name)` pairs.
fn parse_filters(options: &InspectOptions) -> DbResult<Option<Vec<TableKey>>> {
    let Some(tables) = &options.tables else {
        return Ok(None);
    };
    let mut parsed = Vec::with_capacity(tables.len());
    for filter in tables {
        validate_qualified_identifier(filter, "table")
            .map_err(|_| DbError::validation(format!("Invalid table filter: '{}'", filter)))?;
        match filter.split_once('.') {
            Some((schema, name)) => parsed.push((Some(schema.to_string()), name.to_string())),
            None => parsed.push((None, filter.to_string())),
        }
    }
    Ok(Some(parsed))
}

/// Whether a table survives the filter set. A bare-name filter matches any
/// schema; a qualified filter matches exactly.
fn filter_matches(filters: &Option<Vec<TableKey>>, schema: Option<&str>, name: &str) -> bool {
    match filters {
        None => true,
        Some(filters) => filters.iter().any(|(fschema, fname)| {
            fname == name && (fschema.is_none() || fschema.as_deref() == schema)
        }),
    }
}

async fn run_inspection(
    pool: &DbPool,
    filters: &Option<Vec<TableKey>>,
) -> DbResult<SchemaSnapshot> {
    let mut snapshot = SchemaSnapshot::new(pool.vendor());
    snapshot.tables = match pool {
        DbPool::Postgres(p) => postgres::inspect(p, filters).await?,
        DbPool::MySql(p) => mysql::inspect(p, filters).await?,
        DbPool::Sqlite(p) => sqlite::inspect(p, filters).await?,
    };
    Ok(snapshot)
}

// =============================================================================
// SQL Query Templates
// =============================================================================
//
// Catalog queries per vendor. PostgreSQL and MySQL fetch whole-schema
// result sets in five (or fewer) queries and assemble client-side; SQLite
// walks sqlite_master plus per-table PRAGMAs.

mod queries {
    pub mod postgres {
        pub const LIST_TABLES: &str = r#"
            SELECT table_schema, table_name
            FROM information_schema.tables
            WHERE table_type = 'BASE TABLE'
            AND table_schema NOT IN ('pg_catalog', 'information_schema')
            ORDER BY table_schema, table_name
            "#;

        pub const LIST_COLUMNS: &str = r#"
            SELECT table_schema, table_name, column_name, data_type,
                   is_nullable, column_default
            FROM information_schema.columns
            WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
            ORDER BY table_schema, table_name, ordinal_position
            "#;

        pub const LIST_PRIMARY_KEYS: &str = r#"
            SELECT tc.table_schema, tc.table_name, kcu.column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            WHERE tc.constraint_type = 'PRIMARY KEY'
            AND tc.table_schema NOT IN ('pg_catalog', 'information_schema')
            ORDER BY tc.table_schema, tc.table_name, kcu.ordinal_position
            "#;

        pub const LIST_FOREIGN_KEYS: &str = r#"
            SELECT tc.table_schema, tc.table_name, tc.constraint_name,
                   kcu.column_name,
                   ccu.table_name AS foreign_table_name,
                   ccu.column_name AS foreign_column_name,
                   rc.delete_rule, rc.update_rule
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            JOIN information_schema.constraint_column_usage ccu
                ON ccu.constraint_name = tc.constraint_name
                AND ccu.table_schema = tc.table_schema
            JOIN information_schema.referential_constraints rc
                ON rc.constraint_name = tc.constraint_name
                AND rc.constraint_schema = tc.table_schema
            WHERE tc.constraint_type = 'FOREIGN KEY'
            AND tc.table_schema NOT IN ('pg_catalog', 'information_schema')
            "#;

        pub const LIST_INDEXES: &str = r#"
            SELECT n.nspname AS table_schema,
                   t.relname AS table_name,
                   i.relname AS index_name,
                   array_agg(a.attname ORDER BY array_position(ix.indkey, a.attnum)) AS column_names,
                   ix.indisunique AS is_unique,
                   ix.indisprimary AS is_primary,
                   am.amname AS index_algorithm
            FROM pg_index ix
            JOIN pg_class i ON i.oid = ix.indexrelid
            JOIN pg_class t ON t.oid = ix.indrelid
            JOIN pg_namespace n ON n.oid = t.relnamespace
            LEFT JOIN pg_am am ON am.oid = i.relam
            JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
            WHERE n.nspname NOT IN ('pg_catalog', 'information_schema')
            GROUP BY n.nspname, t.relname, i.relname, ix.indisunique, ix.indisprimary, am.amname
            "#;
    }

    pub mod mysql {
        pub const LIST_TABLES: &str = r#"
            SELECT CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = DATABASE()
            AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
            "#;

        pub const LIST_COLUMNS: &str = r#"
            SELECT
                CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME,
                CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
                CONVERT(COLUMN_TYPE USING utf8) AS COLUMN_TYPE,
                CONVERT(IS_NULLABLE USING utf8) AS IS_NULLABLE,
                CONVERT(COLUMN_DEFAULT USING utf8) AS COLUMN_DEFAULT,
                CONVERT(COLUMN_KEY USING utf8) AS COLUMN_KEY,
                CONVERT(EXTRA USING utf8) AS EXTRA
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = DATABASE()
            ORDER BY TABLE_NAME, ORDINAL_POSITION
            "#;

        pub const LIST_FOREIGN_KEYS: &str = r#"
            SELECT
                CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME,
                CONVERT(CONSTRAINT_NAME USING utf8) AS CONSTRAINT_NAME,
                CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
                CONVERT(REFERENCED_TABLE_NAME USING utf8) AS REFERENCED_TABLE_NAME,
                CONVERT(REFERENCED_COLUMN_NAME USING utf8) AS REFERENCED_COLUMN_NAME
            FROM information_schema.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = DATABASE()
            AND REFERENCED_TABLE_NAME IS NOT NULL
            "#;

        pub const LIST_INDEXES: &str = r#"
            SELECT
                CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME,
                CONVERT(INDEX_NAME USING utf8) AS INDEX_NAME,
                CONVERT(GROUP_CONCAT(COLUMN_NAME ORDER BY SEQ_IN_INDEX) USING utf8) AS COLUMN_NAMES,
                NOT NON_UNIQUE AS IS_UNIQUE,
                CONVERT(INDEX_TYPE USING utf8) AS INDEX_ALGORITHM
            FROM information_schema.STATISTICS
            WHERE TABLE_SCHEMA = DATABASE()
            GROUP BY TABLE_NAME, INDEX_NAME, NON_UNIQUE, INDEX_TYPE
            "#;
    }

    pub mod sqlite {
        pub const LIST_TABLES: &str = r#"
            SELECT name FROM sqlite_master
            WHERE type = 'table'
            AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#;
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::{PgPool, Row};

    pub async fn inspect(
        pool: &PgPool,
        filters: &Option<Vec<TableKey>>,
    ) -> DbResult<Vec<TableSchema>> {
        let table_rows = sqlx::query(queries::postgres::LIST_TABLES)
            .fetch_all(pool)
            .await?;

        let mut tables: BTreeMap<TableKey, TableSchema> = BTreeMap::new();
        for row in &table_rows {
            let schema: String = row.get("table_schema");
            let name: String = row.get("table_name");
            if !filter_matches(filters, Some(&schema), &name) {
                continue;
            }
            tables.insert(
                (Some(schema.clone()), name.clone()),
                TableSchema::new(&name).with_schema(&schema),
            );
        }

        let column_rows = sqlx::query(queries::postgres::LIST_COLUMNS)
            .fetch_all(pool)
            .await?;
        for row in &column_rows {
            let schema: String = row.get("table_schema");
            let name: String = row.get("table_name");
            let Some(table) = tables.get_mut(&(Some(schema), name)) else {
                continue;
            };
            let column_name: String = row.get("column_name");
            let data_type: String = row.get("data_type");
            let nullable: String = row.get("is_nullable");
            let default_value: Option<String> = row.try_get("column_default").ok().flatten();

            let mut col = ColumnDefinition::new(&column_name, &data_type, nullable == "YES");
            if let Some(def) = &default_value {
                col = col.with_default_str(def);
            }
            table.columns.push(col);
        }

        let pk_rows = sqlx::query(queries::postgres::LIST_PRIMARY_KEYS)
            .fetch_all(pool)
            .await?;
        for row in &pk_rows {
            let schema: String = row.get("table_schema");
            let name: String = row.get("table_name");
            let Some(table) = tables.get_mut(&(Some(schema), name)) else {
                continue;
            };
            let column: String = row.get("column_name");
            if let Some(col) = table.columns.iter_mut().find(|c| c.name == column) {
                col.is_primary_key = true;
            }
            table.primary_key.push(column);
        }

        let fk_rows = sqlx::query(queries::postgres::LIST_FOREIGN_KEYS)
            .fetch_all(pool)
            .await?;
        for row in &fk_rows {
            let schema: String = row.get("table_schema");
            let name: String = row.get("table_name");
            let Some(table) = tables.get_mut(&(Some(schema), name)) else {
                continue;
            };
            let constraint: String = row.get("constraint_name");
            let column: String = row.get("column_name");
            let ref_table: String = row.get("foreign_table_name");
            let ref_column: String = row.get("foreign_column_name");
            let delete_rule: String = row.get("delete_rule");
            let update_rule: String = row.get("update_rule");
            table.foreign_keys.push(
                ForeignKey::new(column, ref_table, ref_column)
                    .with_name(constraint)
                    .with_on_delete(ForeignKeyAction::parse(&delete_rule))
                    .with_on_update(ForeignKeyAction::parse(&update_rule)),
            );
        }

        let index_rows = sqlx::query(queries::postgres::LIST_INDEXES)
            .fetch_all(pool)
            .await
            .unwrap_or_default();
        for row in &index_rows {
            let schema: String = row.get("table_schema");
            let name: String = row.get("table_name");
            let Some(table) = tables.get_mut(&(Some(schema), name)) else {
                continue;
            };
            let index_name: String = row.get("index_name");
            let columns: Vec<String> = row.get("column_names");
            let is_unique: bool = row.get("is_unique");
            let is_primary: bool = row.get("is_primary");
            let algorithm: Option<String> = row.get("index_algorithm");
            if columns.is_empty() {
                continue;
            }
            let mut idx = IndexInfo::new(index_name, columns)
                .with_unique(is_unique)
                .with_primary(is_primary);
            if let Some(algo) = algorithm {
                if !algo.is_empty() {
                    idx = idx.with_algorithm(algo);
                }
            }
            table.indexes.push(idx);
        }

        debug!(count = tables.len(), "Inspected PostgreSQL schema");
        Ok(tables.into_values().collect())
    }
}

mod mysql {
    use super::*;
    use sqlx::{MySqlPool, Row};

    /// MySQL may return VARBINARY instead of VARCHAR depending on charset
    /// configuration.
    fn get_string(row: &sqlx::mysql::MySqlRow, column: &str) -> String {
        row.try_get::<String, _>(column)
            .ok()
            .or_else(|| {
                row.try_get::<Vec<u8>, _>(column)
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
            .unwrap_or_default()
    }

    fn get_optional_string(row: &sqlx::mysql::MySqlRow, column: &str) -> Option<String> {
        row.try_get::<Option<String>, _>(column)
            .ok()
            .flatten()
            .or_else(|| {
                row.try_get::<Option<Vec<u8>>, _>(column)
                    .ok()
                    .flatten()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
    }

    pub async fn inspect(
        pool: &MySqlPool,
        filters: &Option<Vec<TableKey>>,
    ) -> DbResult<Vec<TableSchema>> {
        let table_rows = sqlx::query(queries::mysql::LIST_TABLES)
            .fetch_all(pool)
            .await?;

        let mut tables: BTreeMap<TableKey, TableSchema> = BTreeMap::new();
        for row in &table_rows {
            let name = get_string(row, "TABLE_NAME");
            if name.is_empty() || !filter_matches(filters, None, &name) {
                continue;
            }
            tables.insert((None, name.clone()), TableSchema::new(&name));
        }

        // Primary keys come from COLUMN_KEY, so MySQL needs four catalog
        // queries rather than five.
        let column_rows = sqlx::query(queries::mysql::LIST_COLUMNS)
            .fetch_all(pool)
            .await?;
        for row in &column_rows {
            let name = get_string(row, "TABLE_NAME");
            let Some(table) = tables.get_mut(&(None, name)) else {
                continue;
            };
            let column_name = get_string(row, "COLUMN_NAME");
            let column_type = get_string(row, "COLUMN_TYPE");
            let nullable = get_string(row, "IS_NULLABLE");
            let default_value = get_optional_string(row, "COLUMN_DEFAULT");
            let column_key = get_string(row, "COLUMN_KEY");
            let extra = get_optional_string(row, "EXTRA");
            let is_pk = column_key == "PRI";

            let mut col = ColumnDefinition::new(&column_name, &column_type, nullable == "YES")
                .with_primary_key(is_pk);
            if let Some(def) = &default_value {
                col = col.with_default_str(def);
            }
            if let Some(e) = extra {
                if !e.is_empty() {
                    col = col.with_extra(e);
                }
            }
            table.columns.push(col);
            if is_pk {
                table.primary_key.push(column_name);
            }
        }

        let fk_rows = sqlx::query(queries::mysql::LIST_FOREIGN_KEYS)
            .fetch_all(pool)
            .await?;
        for row in &fk_rows {
            let name = get_string(row, "TABLE_NAME");
            let Some(table) = tables.get_mut(&(None, name)) else {
                continue;
            };
            let constraint = get_string(row, "CONSTRAINT_NAME");
            let column = get_string(row, "COLUMN_NAME");
            let ref_table = get_string(row, "REFERENCED_TABLE_NAME");
            let ref_column = get_string(row, "REFERENCED_COLUMN_NAME");
            table
                .foreign_keys
                .push(ForeignKey::new(column, ref_table, ref_column).with_name(constraint));
        }

        let index_rows = sqlx::query(queries::mysql::LIST_INDEXES)
            .fetch_all(pool)
            .await
            .unwrap_or_default();
        for row in &index_rows {
            let name = get_string(row, "TABLE_NAME");
            let Some(table) = tables.get_mut(&(None, name)) else {
                continue;
            };
            let index_name = get_string(row, "INDEX_NAME");
            let columns_str = get_string(row, "COLUMN_NAMES");
            let is_unique: i64 = row.try_get("IS_UNIQUE").unwrap_or(0);
            let algorithm = get_optional_string(row, "INDEX_ALGORITHM");
            let columns: Vec<String> = columns_str.split(',').map(|s| s.to_string()).collect();
            let is_primary = index_name == "PRIMARY";

            let mut idx = IndexInfo::new(index_name, columns)
                .with_unique(is_unique != 0 || is_primary)
                .with_primary(is_primary);
            if let Some(algo) = algorithm {
                if !algo.is_empty() {
                    idx = idx.with_algorithm(algo);
                }
            }
            table.indexes.push(idx);
        }

        debug!(count = tables.len(), "Inspected MySQL schema");
        Ok(tables.into_values().collect())
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Row, SqlitePool};

    pub async fn inspect(
        pool: &SqlitePool,
        filters: &Option<Vec<TableKey>>,
    ) -> DbResult<Vec<TableSchema>> {
        let table_rows = sqlx::query(queries::sqlite::LIST_TABLES)
            .fetch_all(pool)
            .await?;

        let mut tables = Vec::new();
        for row in &table_rows {
            let name: String = row.get("name");
            if !filter_matches(filters, None, &name) {
                continue;
            }
            tables.push(describe_table(pool, &name).await?);
        }

        debug!(count = tables.len(), "Inspected SQLite schema");
        Ok(tables)
    }

    async fn describe_table(pool: &SqlitePool, table_name: &str) -> DbResult<TableSchema> {
        let mut table = TableSchema::new(table_name);

        let pragma = format!("PRAGMA table_info('{}')", table_name);
        let rows = sqlx::query(&pragma).fetch_all(pool).await?;
        // pk column: 1-based position within the primary key, 0 otherwise
        let mut pk_columns: Vec<(i32, String)> = Vec::new();
        for row in &rows {
            let name: String = row.get("name");
            let data_type: String = row.get("type");
            let notnull: i32 = row.get("notnull");
            let default_value: Option<String> = row.try_get("dflt_value").ok().flatten();
            let pk: i32 = row.get("pk");

            let mut col =
                ColumnDefinition::new(&name, &data_type, notnull == 0).with_primary_key(pk > 0);
            if let Some(def) = &default_value {
                col = col.with_default_str(def);
            }
            table.columns.push(col);
            if pk > 0 {
                pk_columns.push((pk, name));
            }
        }
        pk_columns.sort_by_key(|(pos, _)| *pos);
        table.primary_key = pk_columns.into_iter().map(|(_, name)| name).collect();

        let pragma = format!("PRAGMA foreign_key_list('{}')", table_name);
        let rows = sqlx::query(&pragma).fetch_all(pool).await.unwrap_or_default();
        for row in &rows {
            let column: String = row.get("from");
            let ref_table: String = row.get("table");
            let ref_column: Option<String> = row.try_get("to").ok().flatten();
            let on_delete: String = row.try_get("on_delete").unwrap_or_default();
            let on_update: String = row.try_get("on_update").unwrap_or_default();
            table.foreign_keys.push(
                ForeignKey::new(column, ref_table, ref_column.unwrap_or_default())
                    .with_on_delete(ForeignKeyAction::parse(&on_delete))
                    .with_on_update(ForeignKeyAction::parse(&on_update)),
            );
        }

        let pragma = format!("PRAGMA index_list('{}')", table_name);
        let index_rows = sqlx::query(&pragma).fetch_all(pool).await.unwrap_or_default();
        for idx_row in &index_rows {
            let name: String = idx_row.get("name");
            let is_unique: i32 = idx_row.get("unique");
            let origin: String = idx_row.try_get("origin").unwrap_or_default();
            let is_primary = origin == "pk";

            let columns = index_columns(pool, &name).await;
            if !columns.is_empty() {
                table.indexes.push(
                    IndexInfo::new(name, columns)
                        .with_unique(is_unique != 0)
                        .with_primary(is_primary),
                );
            }
        }

        Ok(table)
    }

    async fn index_columns(pool: &SqlitePool, index_name: &str) -> Vec<String> {
        let pragma = format!("PRAGMA index_info('{}')", index_name);
        sqlx::query(&pragma)
            .fetch_all(pool)
            .await
            .unwrap_or_default()
            .iter()
            .map(|row| row.get("name"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_table_filter_fails_fast() {
        let options = InspectOptions {
            tables: Some(vec!["users; DROP TABLE users".to_string()]),
        };
        let err = parse_filters(&options).unwrap_err();
        assert!(err.to_string().contains("Invalid table filter"));
    }

    #[test]
    fn test_filter_parsing_and_matching() {
        let options = InspectOptions {
            tables: Some(vec!["users".to_string(), "sales.orders".to_string()]),
        };
        let filters = parse_filters(&options).unwrap();
        assert!(filter_matches(&filters, None, "users"));
        assert!(filter_matches(&filters, Some("public"), "users"));
        assert!(filter_matches(&filters, Some("sales"), "orders"));
        assert!(!filter_matches(&filters, Some("public"), "orders"));
        assert!(!filter_matches(&filters, None, "missing"));
        assert!(filter_matches(&None, None, "anything"));
    }

    #[test]
    fn test_effective_cache_key_separates_filter_sets() {
        let all = InspectOptions::default();
        let filtered = InspectOptions {
            tables: Some(vec!["users".to_string()]),
        };
        assert_ne!(
            effective_cache_key("conn1", &all),
            effective_cache_key("conn1", &filtered)
        );
        // Filter order does not matter
        let a = InspectOptions {
            tables: Some(vec!["a".to_string(), "b".to_string()]),
        };
        let b = InspectOptions {
            tables: Some(vec!["b".to_string(), "a".to_string()]),
        };
        assert_eq!(
            effective_cache_key("conn1", &a),
            effective_cache_key("conn1", &b)
        );
    }
}
