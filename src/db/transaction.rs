//! Transaction management.
//!
//! [`with_transaction`] borrows one connection from the manager's pool,
//! issues `BEGIN`, runs the caller's closure against a
//! [`TransactionContext`], and commits on success or rolls back on error.
//! Savepoints nest inside a transaction; a savepoint failure rolls back to
//! that savepoint only and re-raises the error to the enclosing scope.
//!
//! # Timeout semantics
//!
//! If the configured budget elapses before the closure resolves, the
//! context flips into a terminal cancelled state, the transaction is
//! rolled back, and the connection returns to the pool - in that order.
//! Every `execute` checks the cancelled flag first, so a late call from a
//! still-running continuation fails fast instead of touching a connection
//! it no longer owns.

use crate::db::params::{bind_mysql_param, bind_postgres_param, bind_sqlite_param};
use crate::db::pool::{ConnectionManager, DbPool};
use crate::db::types::RowToJson;
use crate::db::{executor, sanitizer};
use crate::error::{DbError, DbResult, classify_driver_error};
use crate::ident::{quote_identifier, validate_identifier};
use crate::models::{BuiltQuery, QueryExecutionResult, QueryInput, Vendor};
use sqlx::{MySql, Postgres, Sqlite, Transaction};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Default transaction timeout in milliseconds.
pub const DEFAULT_TRANSACTION_TIMEOUT_MS: u64 = 60_000;

/// Maximum transaction timeout in milliseconds.
pub const MAX_TRANSACTION_TIMEOUT_MS: u64 = 300_000;

/// Options for [`with_transaction`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionOptions {
    /// Wall-clock budget for the whole transaction, in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl TransactionOptions {
    /// Budget with bounds applied.
    pub fn effective_timeout_ms(&self) -> u64 {
        self.timeout_ms
            .map(|t| t.min(MAX_TRANSACTION_TIMEOUT_MS))
            .unwrap_or(DEFAULT_TRANSACTION_TIMEOUT_MS)
    }
}

/// Database-specific transaction wrapper over one borrowed connection.
pub enum DbTransaction {
    MySql(Transaction<'static, MySql>),
    Postgres(Transaction<'static, Postgres>),
    Sqlite(Transaction<'static, Sqlite>),
}

impl DbTransaction {
    async fn begin(pool: &DbPool) -> DbResult<Self> {
        match pool {
            DbPool::MySql(p) => Ok(Self::MySql(
                p.begin()
                    .await
                    .map_err(|e| classify_driver_error(e, "begin transaction"))?,
            )),
            DbPool::Postgres(p) => Ok(Self::Postgres(
                p.begin()
                    .await
                    .map_err(|e| classify_driver_error(e, "begin transaction"))?,
            )),
            DbPool::Sqlite(p) => Ok(Self::Sqlite(
                p.begin()
                    .await
                    .map_err(|e| classify_driver_error(e, "begin transaction"))?,
            )),
        }
    }

    /// Commit, consuming the transaction and returning the connection to
    /// the pool.
    async fn commit(self) -> DbResult<()> {
        match self {
            Self::MySql(tx) => tx.commit().await,
            Self::Postgres(tx) => tx.commit().await,
            Self::Sqlite(tx) => tx.commit().await,
        }
        .map_err(|e| classify_driver_error(e, "commit"))
    }

    /// Roll back, consuming the transaction and returning the connection
    /// to the pool.
    async fn rollback(self) -> DbResult<()> {
        match self {
            Self::MySql(tx) => tx.rollback().await,
            Self::Postgres(tx) => tx.rollback().await,
            Self::Sqlite(tx) => tx.rollback().await,
        }
        .map_err(|e| classify_driver_error(e, "rollback"))
    }

    /// Run a statement on the borrowed connection.
    async fn run(&mut self, built: &BuiltQuery) -> DbResult<QueryExecutionResult> {
        let start = Instant::now();
        if executor::returns_rows(&built.sql) {
            let rows = match self {
                Self::MySql(tx) => {
                    let mut query = sqlx::query(&built.sql);
                    for param in &built.params {
                        query = bind_mysql_param(query, param);
                    }
                    let rows = query
                        .fetch_all(&mut **tx)
                        .await
                        .map_err(|e| classify_driver_error(e, "transaction query"))?;
                    rows.iter().map(|r| r.to_json_map()).collect::<Vec<_>>()
                }
                Self::Postgres(tx) => {
                    let mut query = sqlx::query(&built.sql);
                    for param in &built.params {
                        query = bind_postgres_param(query, param);
                    }
                    let rows = query
                        .fetch_all(&mut **tx)
                        .await
                        .map_err(|e| classify_driver_error(e, "transaction query"))?;
                    rows.iter().map(|r| r.to_json_map()).collect::<Vec<_>>()
                }
                Self::Sqlite(tx) => {
                    let mut query = sqlx::query(&built.sql);
                    for param in &built.params {
                        query = bind_sqlite_param(query, param);
                    }
                    let rows = query
                        .fetch_all(&mut **tx)
                        .await
                        .map_err(|e| classify_driver_error(e, "transaction query"))?;
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
            let rows_affected = match self {
                Self::MySql(tx) => {
                    let mut query = sqlx::query(&built.sql);
                    for param in &built.params {
                        query = bind_mysql_param(query, param);
                    }
                    query
                        .execute(&mut **tx)
                        .await
                        .map_err(|e| classify_driver_error(e, "transaction write"))?
                        .rows_affected()
                }
                Self::Postgres(tx) => {
                    let mut query = sqlx::query(&built.sql);
                    for param in &built.params {
                        query = bind_postgres_param(query, param);
                    }
                    query
                        .execute(&mut **tx)
                        .await
                        .map_err(|e| classify_driver_error(e, "transaction write"))?
                        .rows_affected()
                }
                Self::Sqlite(tx) => {
                    let mut query = sqlx::query(&built.sql);
                    for param in &built.params {
                        query = bind_sqlite_param(query, param);
                    }
                    query
                        .execute(&mut **tx)
                        .await
                        .map_err(|e| classify_driver_error(e, "transaction write"))?
                        .rows_affected()
                }
            };
            Ok(QueryExecutionResult::write(
                rows_affected,
                start.elapsed().as_millis() as u64,
            ))
        }
    }

    /// Run a savepoint control statement (no parameters, no result).
    async fn run_control(&mut self, sql: &str) -> DbResult<()> {
        let result = match self {
            Self::MySql(tx) => sqlx::query(sql).execute(&mut **tx).await.map(|_| ()),
            Self::Postgres(tx) => sqlx::query(sql).execute(&mut **tx).await.map(|_| ()),
            Self::Sqlite(tx) => sqlx::query(sql).execute(&mut **tx).await.map(|_| ()),
        };
        result.map_err(|e| classify_driver_error(e, "savepoint"))
    }
}

struct TxInner {
    id: String,
    vendor: Vendor,
    timeout_ms: u64,
    tx: Mutex<Option<DbTransaction>>,
    /// Terminal flag; once set, every execute fails fast.
    cancelled: AtomicBool,
    /// Monotonic counter for auto-named savepoints.
    savepoint_seq: AtomicU32,
}

/// Handle to an open transaction, passed to the caller's closure.
///
/// Cloneable so the closure, savepoint scopes, and the timeout arm can all
/// observe the same state. Unusable after commit, rollback, or timeout.
#[derive(Clone)]
pub struct TransactionContext {
    inner: Arc<TxInner>,
}

impl std::fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContext")
            .field("id", &self.inner.id)
            .field("vendor", &self.inner.vendor)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl TransactionContext {
    fn new(tx: DbTransaction, vendor: Vendor, timeout_ms: u64) -> Self {
        Self {
            inner: Arc::new(TxInner {
                id: format!("tx_{}", uuid::Uuid::new_v4().simple()),
                vendor,
                timeout_ms,
                tx: Mutex::new(Some(tx)),
                cancelled: AtomicBool::new(false),
                savepoint_seq: AtomicU32::new(0),
            }),
        }
    }

    /// Unique transaction id, used in logs.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Whether the transaction was cancelled by its timeout.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Execute a caller-submitted statement inside the transaction.
    pub async fn execute(&self, input: QueryInput) -> DbResult<QueryExecutionResult> {
        if input.vendor != self.inner.vendor {
            return Err(DbError::validation(format!(
                "Query targets {} but this transaction runs on {}",
                input.vendor, self.inner.vendor
            )));
        }
        let built = input.into_built()?;
        self.execute_built(&built).await
    }

    /// Execute an already-built statement inside the transaction.
    pub async fn execute_built(&self, built: &BuiltQuery) -> DbResult<QueryExecutionResult> {
        // Cancelled is checked before anything else so a late call from a
        // continuation cannot touch the released connection.
        if self.is_cancelled() {
            return Err(DbError::timeout("transaction", self.inner.timeout_ms));
        }
        sanitizer::sanitize_statement(&built.sql, self.inner.vendor)?;

        let mut guard = self.inner.tx.lock().await;
        if self.is_cancelled() {
            return Err(DbError::timeout("transaction", self.inner.timeout_ms));
        }
        let tx = guard.as_mut().ok_or_else(|| {
            DbError::validation("Transaction is no longer active (committed or rolled back)")
        })?;
        let result = tx.run(built).await?;
        debug!(
            transaction_id = %self.inner.id,
            sql = %built.sql,
            row_count = result.row_count,
            "Executed in transaction"
        );
        Ok(result)
    }

    /// Push a named savepoint. The name must satisfy the identifier
    /// grammar; anything with spaces or special characters is rejected.
    pub async fn create_savepoint(&self, name: &str) -> DbResult<()> {
        validate_identifier(name, "savepoint")?;
        self.savepoint_control(&format!(
            "SAVEPOINT {}",
            quote_identifier(name, self.inner.vendor)
        ))
        .await
    }

    /// Release a named savepoint, keeping its effects.
    pub async fn release_savepoint(&self, name: &str) -> DbResult<()> {
        validate_identifier(name, "savepoint")?;
        self.savepoint_control(&format!(
            "RELEASE SAVEPOINT {}",
            quote_identifier(name, self.inner.vendor)
        ))
        .await
    }

    /// Roll back to a named savepoint, discarding work since it was
    /// created but keeping the enclosing transaction open.
    pub async fn rollback_to_savepoint(&self, name: &str) -> DbResult<()> {
        validate_identifier(name, "savepoint")?;
        self.savepoint_control(&format!(
            "ROLLBACK TO SAVEPOINT {}",
            quote_identifier(name, self.inner.vendor)
        ))
        .await
    }

    /// Run `f` under a fresh auto-named savepoint. On error, work since
    /// the savepoint is rolled back and the error re-raised; the enclosing
    /// transaction stays usable.
    pub async fn with_savepoint<F, Fut, T>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(TransactionContext) -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        let seq = self.inner.savepoint_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let name = format!("sp_{}", seq);
        self.with_named_savepoint(&name, f).await
    }

    /// Run `f` under a caller-named savepoint.
    pub async fn with_named_savepoint<F, Fut, T>(&self, name: &str, f: F) -> DbResult<T>
    where
        F: FnOnce(TransactionContext) -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        self.create_savepoint(name).await?;
        match f(self.clone()).await {
            Ok(value) => {
                self.release_savepoint(name).await?;
                Ok(value)
            }
            Err(err) => {
                debug!(
                    transaction_id = %self.inner.id,
                    savepoint = name,
                    error = %err,
                    "Rolling back to savepoint"
                );
                if let Err(rollback_err) = self.rollback_to_savepoint(name).await {
                    warn!(
                        transaction_id = %self.inner.id,
                        savepoint = name,
                        error = %rollback_err,
                        "Savepoint rollback failed"
                    );
                }
                Err(err)
            }
        }
    }

    async fn savepoint_control(&self, sql: &str) -> DbResult<()> {
        if self.is_cancelled() {
            return Err(DbError::timeout("transaction", self.inner.timeout_ms));
        }
        let mut guard = self.inner.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(|| {
            DbError::validation("Transaction is no longer active (committed or rolled back)")
        })?;
        tx.run_control(sql).await
    }

    /// Take the transaction for commit. Fails if the timeout already
    /// cancelled it.
    async fn finish_commit(&self) -> DbResult<()> {
        let tx = {
            let mut guard = self.inner.tx.lock().await;
            guard.take()
        };
        match tx {
            Some(tx) => tx.commit().await,
            None if self.is_cancelled() => {
                Err(DbError::timeout("transaction", self.inner.timeout_ms))
            }
            None => Err(DbError::validation(
                "Transaction is no longer active (committed or rolled back)",
            )),
        }
    }

    /// Take the transaction and roll it back, logging rollback failures
    /// so the original error can propagate.
    async fn finish_rollback(&self) {
        let tx = {
            let mut guard = self.inner.tx.lock().await;
            guard.take()
        };
        if let Some(tx) = tx {
            if let Err(err) = tx.rollback().await {
                warn!(
                    transaction_id = %self.inner.id,
                    error = %err,
                    "Rollback failed"
                );
            }
        }
    }

    /// Timeout path: stop accepting executes, roll back, return the
    /// connection - in that order.
    async fn cancel_and_rollback(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let tx = {
            let mut guard = self.inner.tx.lock().await;
            guard.take()
        };
        if let Some(tx) = tx {
            warn!(
                transaction_id = %self.inner.id,
                timeout_ms = self.inner.timeout_ms,
                "Transaction timed out; rolling back"
            );
            if let Err(err) = tx.rollback().await {
                warn!(
                    transaction_id = %self.inner.id,
                    error = %err,
                    "Rollback after timeout failed"
                );
            }
        }
    }
}

/// Run `f` inside a transaction on a connection borrowed from the
/// manager's pool.
///
/// `BEGIN` precedes the closure; a normal return commits, an error rolls
/// back and re-raises the original error. If the budget in `options`
/// elapses first, the transaction is rolled back and the call rejects
/// with a timeout error naming the configured duration.
pub async fn with_transaction<F, Fut, T>(
    manager: &ConnectionManager,
    options: TransactionOptions,
    f: F,
) -> DbResult<T>
where
    F: FnOnce(TransactionContext) -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let pool = manager.current_pool().await?;
    let timeout_ms = options.effective_timeout_ms();

    let tx = DbTransaction::begin(&pool).await?;
    let ctx = TransactionContext::new(tx, manager.vendor(), timeout_ms);
    info!(
        transaction_id = %ctx.inner.id,
        vendor = %manager.vendor(),
        timeout_ms = timeout_ms,
        "Transaction started"
    );

    let body = f(ctx.clone());
    match tokio::time::timeout(Duration::from_millis(timeout_ms), body).await {
        Ok(Ok(value)) => {
            ctx.finish_commit().await?;
            info!(transaction_id = %ctx.inner.id, "Transaction committed");
            Ok(value)
        }
        Ok(Err(err)) => {
            ctx.finish_rollback().await;
            info!(
                transaction_id = %ctx.inner.id,
                error = %err,
                "Transaction rolled back"
            );
            Err(err)
        }
        Err(_elapsed) => {
            ctx.cancel_and_rollback().await;
            Err(DbError::timeout("transaction", timeout_ms))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::models::QueryParam;

    async fn seeded_manager() -> ConnectionManager {
        let manager = ConnectionManager::new(ConnectionConfig::sqlite_memory()).unwrap();
        manager.connect().await.unwrap();
        manager
            .execute_ddl("CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT NOT NULL)")
            .await
            .unwrap();
        manager
    }

    fn insert(label: &str) -> QueryInput {
        QueryInput::new("INSERT INTO items (label) VALUES (?)", Vendor::Sqlite)
            .with_params(vec![QueryParam::from(label)])
    }

    async fn count(manager: &ConnectionManager) -> i64 {
        let result = manager
            .execute(QueryInput::new("SELECT COUNT(*) AS n FROM items", Vendor::Sqlite))
            .await
            .unwrap();
        result.rows[0]["n"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_commit_persists_writes() {
        let manager = seeded_manager().await;
        with_transaction(&manager, TransactionOptions::default(), |tx| async move {
            tx.execute(insert("a")).await?;
            tx.execute(insert("b")).await?;
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(count(&manager).await, 2);
        manager.dispose().await;
    }

    #[tokio::test]
    async fn test_error_rolls_back_and_propagates_original() {
        let manager = seeded_manager().await;
        let result: DbResult<()> =
            with_transaction(&manager, TransactionOptions::default(), |tx| async move {
                tx.execute(insert("doomed")).await?;
                Err(DbError::validation("caller bailed"))
            })
            .await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("caller bailed"));
        assert_eq!(count(&manager).await, 0);
        manager.dispose().await;
    }

    #[tokio::test]
    async fn test_savepoint_failure_keeps_outer_work() {
        let manager = seeded_manager().await;
        with_transaction(&manager, TransactionOptions::default(), |tx| async move {
            tx.execute(insert("outer")).await?;
            let inner: DbResult<()> = tx
                .with_savepoint(|sp| async move {
                    sp.execute(insert("inner")).await?;
                    Err(DbError::validation("inner failed"))
                })
                .await;
            assert!(inner.is_err());
            tx.execute(insert("outer-2")).await?;
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(count(&manager).await, 2);
        manager.dispose().await;
    }

    #[tokio::test]
    async fn test_savepoint_name_grammar_enforced() {
        let manager = seeded_manager().await;
        with_transaction(&manager, TransactionOptions::default(), |tx| async move {
            assert!(tx.create_savepoint("bad name").await.is_err());
            assert!(tx.create_savepoint("bad;name").await.is_err());
            tx.create_savepoint("good_name").await?;
            tx.release_savepoint("good_name").await?;
            Ok(())
        })
        .await
        .unwrap();
        manager.dispose().await;
    }

    #[tokio::test]
    async fn test_timeout_rejects_with_duration_and_poisons_context() {
        let manager = seeded_manager().await;
        let options = TransactionOptions {
            timeout_ms: Some(100),
        };
        let (ctx_tx, ctx_rx) = tokio::sync::oneshot::channel::<TransactionContext>();

        let result: DbResult<()> = with_transaction(&manager, options, |tx| async move {
            let _ = ctx_tx.send(tx.clone());
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("100ms"), "{}", err);

        // A late execute from the leaked context fails fast.
        let ctx = ctx_rx.await.unwrap();
        assert!(ctx.is_cancelled());
        let late = ctx.execute(insert("late")).await.unwrap_err();
        assert!(matches!(late, DbError::Timeout { .. }));

        assert_eq!(count(&manager).await, 0);
        manager.dispose().await;
    }

    #[tokio::test]
    async fn test_transaction_rejects_ddl() {
        let manager = seeded_manager().await;
        let result: DbResult<()> =
            with_transaction(&manager, TransactionOptions::default(), |tx| async move {
                tx.execute(QueryInput::new("DROP TABLE items", Vendor::Sqlite))
                    .await?;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(DbError::Validation { .. })));
        manager.dispose().await;
    }
}
