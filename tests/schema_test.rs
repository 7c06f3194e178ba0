//! Integration tests for schema introspection against SQLite.

use sqlkit::db::schema::{InspectOptions, SchemaInspector};
use sqlkit::{ConnectionConfig, ConnectionManager, DbError, Vendor};
use std::sync::Arc;
use std::time::Duration;

async fn seeded_manager() -> ConnectionManager {
    let manager = ConnectionManager::new(ConnectionConfig::sqlite_memory()).unwrap();
    manager.connect().await.unwrap();
    manager
        .execute_ddl(
            "CREATE TABLE authors (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT UNIQUE
            )",
        )
        .await
        .unwrap();
    manager
        .execute_ddl(
            "CREATE TABLE books (
                id INTEGER PRIMARY KEY,
                author_id INTEGER NOT NULL REFERENCES authors(id) ON DELETE CASCADE,
                title TEXT NOT NULL
            )",
        )
        .await
        .unwrap();
    manager
        .execute_ddl("CREATE INDEX idx_books_author ON books(author_id)")
        .await
        .unwrap();
    manager
}

#[tokio::test]
async fn test_snapshot_normalizes_tables_columns_keys_indexes() {
    let manager = seeded_manager().await;
    let inspector = SchemaInspector::new();

    let snapshot = inspector
        .inspect(&manager, "conn", &InspectOptions::default())
        .await
        .unwrap();

    assert_eq!(snapshot.vendor, Vendor::Sqlite);
    assert_eq!(snapshot.tables.len(), 2);

    let authors = snapshot.table(None, "authors").unwrap();
    assert_eq!(authors.primary_key, vec!["id"]);
    let name_col = authors.columns.iter().find(|c| c.name == "name").unwrap();
    assert!(!name_col.nullable);
    let email_col = authors.columns.iter().find(|c| c.name == "email").unwrap();
    assert!(email_col.nullable);

    let books = snapshot.table(None, "books").unwrap();
    assert_eq!(books.foreign_keys.len(), 1);
    let fk = &books.foreign_keys[0];
    assert_eq!(fk.column, "author_id");
    assert_eq!(fk.references_table, "authors");
    assert_eq!(fk.on_delete, sqlkit::models::ForeignKeyAction::Cascade);
    assert!(books.indexes.iter().any(|i| i.name == "idx_books_author"));

    // The snapshot is JSON-serializable and vendor-tagged
    let json = serde_json::to_string(&*snapshot).unwrap();
    assert!(json.contains("\"vendor\":\"sqlite\""));
    manager.dispose().await;
}

#[tokio::test]
async fn test_cache_hit_within_ttl_then_reissue_after_invalidation() {
    let manager = seeded_manager().await;
    let inspector = SchemaInspector::with_ttl(Duration::from_secs(60));

    let first = inspector
        .inspect(&manager, "conn", &InspectOptions::default())
        .await
        .unwrap();
    let second = inspector
        .inspect(&manager, "conn", &InspectOptions::default())
        .await
        .unwrap();

    // Second call is a cache hit: one catalog pass, shared snapshot
    assert_eq!(inspector.inspections_run(), 1);
    assert!(Arc::ptr_eq(&first, &second));

    inspector.invalidate_cache("conn").await;
    let third = inspector
        .inspect(&manager, "conn", &InspectOptions::default())
        .await
        .unwrap();
    assert_eq!(inspector.inspections_run(), 2);
    assert!(!Arc::ptr_eq(&second, &third));
    manager.dispose().await;
}

#[tokio::test]
async fn test_expired_ttl_reissues_catalog_queries() {
    let manager = seeded_manager().await;
    let inspector = SchemaInspector::with_ttl(Duration::from_millis(50));

    inspector
        .inspect(&manager, "conn", &InspectOptions::default())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    inspector
        .inspect(&manager, "conn", &InspectOptions::default())
        .await
        .unwrap();
    assert_eq!(inspector.inspections_run(), 2);
    manager.dispose().await;
}

#[tokio::test]
async fn test_concurrent_callers_collapse_to_one_inspection() {
    let manager = Arc::new(seeded_manager().await);
    let inspector = Arc::new(SchemaInspector::with_ttl(Duration::from_secs(60)));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = Arc::clone(&manager);
        let inspector = Arc::clone(&inspector);
        handles.push(tokio::spawn(async move {
            inspector
                .inspect(&manager, "conn", &InspectOptions::default())
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // The catalog-query cost must not multiply with concurrent callers
    assert_eq!(inspector.inspections_run(), 1);
    manager.dispose().await;
}

#[tokio::test]
async fn test_table_filter_restricts_snapshot() {
    let manager = seeded_manager().await;
    let inspector = SchemaInspector::new();

    let options = InspectOptions {
        tables: Some(vec!["books".to_string()]),
    };
    let snapshot = inspector
        .inspect(&manager, "conn", &options)
        .await
        .unwrap();
    assert_eq!(snapshot.tables.len(), 1);
    assert_eq!(snapshot.tables[0].name, "books");
    manager.dispose().await;
}

#[tokio::test]
async fn test_invalid_filter_fails_before_any_query() {
    let manager = seeded_manager().await;
    let inspector = SchemaInspector::new();

    let options = InspectOptions {
        tables: Some(vec!["books; DROP TABLE books".to_string()]),
    };
    let err = inspector
        .inspect(&manager, "conn", &options)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Validation { .. }));
    assert!(err.to_string().contains("Invalid table filter"));
    assert_eq!(inspector.inspections_run(), 0);
    manager.dispose().await;
}

#[tokio::test]
async fn test_clear_cache_forces_fresh_pass() {
    let manager = seeded_manager().await;
    let inspector = SchemaInspector::with_ttl(Duration::from_secs(60));

    inspector
        .inspect(&manager, "conn", &InspectOptions::default())
        .await
        .unwrap();
    inspector.clear_cache().await;
    inspector
        .inspect(&manager, "conn", &InspectOptions::default())
        .await
        .unwrap();
    assert_eq!(inspector.inspections_run(), 2);
    manager.dispose().await;
}
