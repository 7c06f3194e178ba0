//! Tests for the generic execute boundary: sanitization, named
//! parameters, and the uniform result shape.

use sqlkit::{
    ConnectionConfig, ConnectionManager, DbError, QueryInput, QueryParam, Vendor,
};
use std::collections::BTreeMap;

async fn seeded_manager() -> ConnectionManager {
    let manager = ConnectionManager::new(ConnectionConfig::sqlite_memory()).unwrap();
    manager.connect().await.unwrap();
    manager
        .execute_ddl("CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)")
        .await
        .unwrap();
    manager
        .execute(
            QueryInput::new(
                "INSERT INTO people (name, age) VALUES (?, ?), (?, ?)",
                Vendor::Sqlite,
            )
            .with_params(vec![
                QueryParam::from("Ada"),
                QueryParam::Int(36),
                QueryParam::from("Grace"),
                QueryParam::Int(45),
            ]),
        )
        .await
        .unwrap();
    manager
}

#[tokio::test]
async fn test_multi_statement_payload_rejected() {
    let manager = seeded_manager().await;
    let err = manager
        .execute(QueryInput::new(
            "SELECT 1; DELETE FROM people",
            Vendor::Sqlite,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Validation { .. }));
    assert!(err.to_string().contains("Multi-statement"));

    // Nothing was deleted
    let result = manager
        .execute(QueryInput::new("SELECT COUNT(*) AS n FROM people", Vendor::Sqlite))
        .await
        .unwrap();
    assert_eq!(result.rows[0]["n"].as_i64().unwrap(), 2);
    manager.dispose().await;
}

#[tokio::test]
async fn test_ddl_rejected_on_generic_path() {
    let manager = seeded_manager().await;
    for sql in [
        "DROP TABLE people",
        "CREATE TABLE other (id INT)",
        "ALTER TABLE people ADD COLUMN email TEXT",
    ] {
        let err = manager
            .execute(QueryInput::new(sql, Vendor::Sqlite))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation { .. }), "{}", sql);
    }
    manager.dispose().await;
}

#[tokio::test]
async fn test_named_params_expand_and_bind() {
    let manager = seeded_manager().await;

    let mut params = BTreeMap::new();
    params.insert("min_age".to_string(), QueryParam::Int(40));
    let result = manager
        .execute(
            QueryInput::new(
                "SELECT name FROM people WHERE age >= :min_age",
                Vendor::Sqlite,
            )
            .with_named_params(params),
        )
        .await
        .unwrap();

    assert_eq!(result.row_count, 1);
    assert_eq!(result.rows[0]["name"], serde_json::json!("Grace"));
    manager.dispose().await;
}

#[tokio::test]
async fn test_missing_named_param_fails_before_execution() {
    let manager = seeded_manager().await;
    let err = manager
        .execute(
            QueryInput::new("SELECT * FROM people WHERE age > :age", Vendor::Sqlite)
                .with_named_params(BTreeMap::new()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Validation { .. }));
    manager.dispose().await;
}

#[tokio::test]
async fn test_uniform_result_shape_for_reads_and_writes() {
    let manager = seeded_manager().await;

    let read = manager
        .execute(QueryInput::new(
            "SELECT name, age FROM people ORDER BY age",
            Vendor::Sqlite,
        ))
        .await
        .unwrap();
    assert_eq!(read.row_count, 2);
    assert_eq!(read.rows.len(), 2);
    assert_eq!(read.rows[0]["age"].as_i64().unwrap(), 36);

    let write = manager
        .execute(
            QueryInput::new("UPDATE people SET age = age + 1 WHERE age < ?", Vendor::Sqlite)
                .with_params(vec![QueryParam::Int(40)]),
        )
        .await
        .unwrap();
    assert!(write.rows.is_empty());
    assert_eq!(write.row_count, 1);
    manager.dispose().await;
}

#[tokio::test]
async fn test_null_params_round_trip() {
    let manager = seeded_manager().await;
    manager
        .execute(
            QueryInput::new("INSERT INTO people (name, age) VALUES (?, ?)", Vendor::Sqlite)
                .with_params(vec![QueryParam::from("NoAge"), QueryParam::Null]),
        )
        .await
        .unwrap();

    let result = manager
        .execute(QueryInput::new(
            "SELECT name, age FROM people WHERE age IS NULL",
            Vendor::Sqlite,
        ))
        .await
        .unwrap();
    assert_eq!(result.row_count, 1);
    assert_eq!(result.rows[0]["age"], serde_json::Value::Null);
    manager.dispose().await;
}

#[tokio::test]
async fn test_pool_metrics_reports_counts() {
    let manager = seeded_manager().await;
    let metrics = manager.pool_metrics().await.unwrap();
    assert_eq!(metrics.total, metrics.idle + metrics.active);
    assert!(metrics.total <= 1);
    manager.dispose().await;

    assert!(manager.pool_metrics().await.is_err());
}

#[tokio::test]
async fn test_execution_time_is_measured() {
    let manager = seeded_manager().await;
    let result = manager
        .execute(QueryInput::new("SELECT * FROM people", Vendor::Sqlite))
        .await
        .unwrap();
    // Wall clock around the execute call; zero is possible on a fast
    // in-memory query, so only sanity-check the bound.
    assert!(result.execution_time_ms < 30_000);
    manager.dispose().await;
}
