//! Query execution engine.
//!
//! Runs a [`BuiltQuery`] against a vendor pool and produces the uniform
//! result shape. Statements that return rows are fetched and decoded to
//! JSON; write statements report their affected-row count. Every call is
//! wrapped in the per-statement timeout.
//!
//! # Architecture
//!
//! Database-specific implementations live in parallel submodules (mysql,
//! postgres, sqlite), each providing the same two functions adapted to the
//! vendor's type system.

use crate::db::params::{bind_mysql_param, bind_postgres_param, bind_sqlite_param};
use crate::db::pool::DbPool;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult, classify_driver_error};
use crate::models::{BuiltQuery, QueryExecutionResult, QueryParam};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// Execute a built query against the pool, dispatching on the statement
/// form: row-returning statements are fetched, writes are executed.
pub(crate) async fn execute(pool: &DbPool, built: &BuiltQuery) -> DbResult<QueryExecutionResult> {
    let start = Instant::now();
    let timeout_ms = built.options.effective_timeout_ms();
    let budget = Duration::from_millis(timeout_ms);

    debug!(
        sql = %built.sql,
        params = built.params.len(),
        timeout_ms = timeout_ms,
        "Executing statement"
    );

    if returns_rows(&built.sql) {
        let rows = match pool {
            DbPool::MySql(p) => {
                let rows = mysql::fetch_rows(p, &built.sql, &built.params, budget, timeout_ms).await?;
                rows.iter().map(|r| r.to_json_map()).collect::<Vec<_>>()
            }
            DbPool::Postgres(p) => {
                let rows =
                    postgres::fetch_rows(p, &built.sql, &built.params, budget, timeout_ms).await?;
                rows.iter().map(|r| r.to_json_map()).collect::<Vec<_>>()
            }
            DbPool::Sqlite(p) => {
                let rows =
                    sqlite::fetch_rows(p, &built.sql, &built.params, budget, timeout_ms).await?;
                rows.iter().map(|r| r.to_json_map()).collect::<Vec<_>>()
            }
        };
        let row_count = rows.len() as u64;
        Ok(QueryExecutionResult {
            rows,
            row_count,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    } else {
        let rows_affected = match pool {
            DbPool::MySql(p) => {
                mysql::execute_write(p, &built.sql, &built.params, budget, timeout_ms).await?
            }
            DbPool::Postgres(p) => {
                postgres::execute_write(p, &built.sql, &built.params, budget, timeout_ms).await?
            }
            DbPool::Sqlite(p) => {
                sqlite::execute_write(p, &built.sql, &built.params, budget, timeout_ms).await?
            }
        };
        Ok(QueryExecutionResult::write(
            rows_affected,
            start.elapsed().as_millis() as u64,
        ))
    }
}

/// Whether a statement produces a row set.
pub(crate) fn returns_rows(sql: &str) -> bool {
    let head = sql
        .trim_start()
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();
    if matches!(
        head.as_str(),
        "SELECT" | "VALUES" | "WITH" | "SHOW" | "EXPLAIN" | "DESCRIBE" | "PRAGMA"
    ) {
        return true;
    }
    sql.to_ascii_uppercase().contains(" RETURNING ")
}

fn timeout_error(operation: &str, timeout_ms: u64) -> DbError {
    DbError::timeout(operation, timeout_ms)
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database
// type. The structure is intentionally parallel to make differences
// obvious.

mod mysql {
    use super::*;
    use sqlx::MySqlPool;
    use sqlx::mysql::MySqlRow;

    pub async fn fetch_rows(
        pool: &MySqlPool,
        sql: &str,
        params: &[QueryParam],
        budget: Duration,
        timeout_ms: u64,
    ) -> DbResult<Vec<MySqlRow>> {
        // Raw SQL when params are empty avoids prepared statement issues
        let rows_future = async {
            if params.is_empty() {
                use sqlx::Executor;
                pool.fetch_all(sql).await
            } else {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_mysql_param(query, param);
                }
                query.fetch_all(pool).await
            }
        };

        match timeout(budget, rows_future).await {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) => Err(classify_driver_error(e, "query execution")),
            Err(_) => Err(timeout_error("query execution", timeout_ms)),
        }
    }

    pub async fn execute_write(
        pool: &MySqlPool,
        sql: &str,
        params: &[QueryParam],
        budget: Duration,
        timeout_ms: u64,
    ) -> DbResult<u64> {
        let result = if params.is_empty() {
            use sqlx::Executor;
            timeout(budget, pool.execute(sql)).await
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_mysql_param(query, param);
            }
            timeout(budget, query.execute(pool)).await
        };

        match result {
            Ok(Ok(r)) => Ok(r.rows_affected()),
            Ok(Err(e)) => Err(classify_driver_error(e, "write execution")),
            Err(_) => Err(timeout_error("write execution", timeout_ms)),
        }
    }
}

mod postgres {
    use super::*;
    use sqlx::PgPool;
    use sqlx::postgres::PgRow;

    pub async fn fetch_rows(
        pool: &PgPool,
        sql: &str,
        params: &[QueryParam],
        budget: Duration,
        timeout_ms: u64,
    ) -> DbResult<Vec<PgRow>> {
        let rows_future = async {
            if params.is_empty() {
                use sqlx::Executor;
                pool.fetch_all(sql).await
            } else {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_postgres_param(query, param);
                }
                query.fetch_all(pool).await
            }
        };

        match timeout(budget, rows_future).await {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) => Err(classify_driver_error(e, "query execution")),
            Err(_) => Err(timeout_error("query execution", timeout_ms)),
        }
    }

    pub async fn execute_write(
        pool: &PgPool,
        sql: &str,
        params: &[QueryParam],
        budget: Duration,
        timeout_ms: u64,
    ) -> DbResult<u64> {
        let result = if params.is_empty() {
            use sqlx::Executor;
            timeout(budget, pool.execute(sql)).await
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_postgres_param(query, param);
            }
            timeout(budget, query.execute(pool)).await
        };

        match result {
            Ok(Ok(r)) => Ok(r.rows_affected()),
            Ok(Err(e)) => Err(classify_driver_error(e, "write execution")),
            Err(_) => Err(timeout_error("write execution", timeout_ms)),
        }
    }
}

mod sqlite {
    use super::*;
    use sqlx::SqlitePool;
    use sqlx::sqlite::SqliteRow;

    pub async fn fetch_rows(
        pool: &SqlitePool,
        sql: &str,
        params: &[QueryParam],
        budget: Duration,
        timeout_ms: u64,
    ) -> DbResult<Vec<SqliteRow>> {
        let rows_future = async {
            if params.is_empty() {
                use sqlx::Executor;
                pool.fetch_all(sql).await
            } else {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_sqlite_param(query, param);
                }
                query.fetch_all(pool).await
            }
        };

        match timeout(budget, rows_future).await {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) => Err(classify_driver_error(e, "query execution")),
            Err(_) => Err(timeout_error("query execution", timeout_ms)),
        }
    }

    pub async fn execute_write(
        pool: &SqlitePool,
        sql: &str,
        params: &[QueryParam],
        budget: Duration,
        timeout_ms: u64,
    ) -> DbResult<u64> {
        let result = if params.is_empty() {
            use sqlx::Executor;
            timeout(budget, pool.execute(sql)).await
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_sqlite_param(query, param);
            }
            timeout(budget, query.execute(pool)).await
        };

        match result {
            Ok(Ok(r)) => Ok(r.rows_affected()),
            Ok(Err(e)) => Err(classify_driver_error(e, "write execution")),
            Err(_) => Err(timeout_error("write execution", timeout_ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_returns_rows_detection() {
        assert!(returns_rows("SELECT * FROM users"));
        assert!(returns_rows("  select 1"));
        assert!(returns_rows("WITH t AS (SELECT 1) SELECT * FROM t"));
        assert!(returns_rows("PRAGMA table_info('users')"));
        assert!(returns_rows(
            "INSERT INTO users (name) VALUES (?) RETURNING \"id\""
        ));
        assert!(!returns_rows("INSERT INTO users (name) VALUES (?)"));
        assert!(!returns_rows("UPDATE users SET name = ? WHERE id = ?"));
        assert!(!returns_rows("DELETE FROM users WHERE id = ?"));
    }
}
