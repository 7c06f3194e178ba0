//! Connection management.
//!
//! A [`ConnectionManager`] owns one vendor-specific connection pool
//! (`PgPool`, `MySqlPool`, or `SqlitePool`) for the lifetime of the
//! manager. It is an explicitly constructed, caller-owned value passed by
//! reference; there is no process-wide connection state.
//!
//! Lifecycle is a small state machine:
//! `disconnected -> connecting -> connected`, `connected -> disconnected`
//! via [`disconnect`](ConnectionManager::disconnect), and any failure lands
//! in `error` from which `connect()` may be retried.

use crate::config::ConnectionConfig;
use crate::db::{executor, sanitizer};
use crate::error::{DbError, DbResult};
use crate::models::{
    BuiltQuery, ConnectionEvent, ConnectionState, PoolMetrics, QueryExecutionResult, QueryInput,
    Vendor,
};
use sqlx::{
    MySqlPool, PgPool, SqlitePool, mysql::MySqlConnectOptions, mysql::MySqlPoolOptions,
    postgres::PgPoolOptions, sqlite::SqliteConnectOptions, sqlite::SqlitePoolOptions,
};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

/// Capacity of the lifecycle event channel. Slow observers lose old
/// events rather than blocking the manager.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Database-specific connection pool.
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl DbPool {
    /// Close the connection pool, draining idle connections.
    pub async fn close(&self) {
        match self {
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::Sqlite(pool) => pool.close().await,
        }
    }

    /// Get the vendor for this pool.
    pub fn vendor(&self) -> Vendor {
        match self {
            DbPool::MySql(_) => Vendor::MySql,
            DbPool::Postgres(_) => Vendor::PostgreSql,
            DbPool::Sqlite(_) => Vendor::Sqlite,
        }
    }

    /// Point-in-time occupancy counts.
    pub fn metrics(&self) -> PoolMetrics {
        let (size, idle) = match self {
            DbPool::MySql(pool) => (pool.size(), pool.num_idle()),
            DbPool::Postgres(pool) => (pool.size(), pool.num_idle()),
            DbPool::Sqlite(pool) => (pool.size(), pool.num_idle()),
        };
        let idle = idle as u32;
        PoolMetrics {
            total: size,
            idle,
            active: size.saturating_sub(idle),
        }
    }
}

/// Caller-owned manager for one pooled database connection.
pub struct ConnectionManager {
    config: ConnectionConfig,
    vendor: Vendor,
    pool: RwLock<Option<DbPool>>,
    state: RwLock<ConnectionState>,
    server_version: RwLock<Option<String>>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("vendor", &self.vendor)
            .field("url", &self.config.masked_url())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a manager for a validated configuration. No connection is
    /// attempted until [`connect`](Self::connect).
    pub fn new(config: ConnectionConfig) -> DbResult<Self> {
        let config = config.validated()?;
        let vendor = config.vendor();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            config,
            vendor,
            pool: RwLock::new(None),
            state: RwLock::new(ConnectionState::Disconnected),
            server_version: RwLock::new(None),
            events,
        })
    }

    /// The vendor this manager talks to, fixed at construction.
    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Whether a usable pool is currently held.
    pub async fn is_connected(&self) -> bool {
        self.state().await.is_connected()
    }

    /// Subscribe to lifecycle events (`connected`, `disconnected`,
    /// `error`).
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Server version reported by the database, if the probe succeeded.
    pub async fn server_version(&self) -> Option<String> {
        self.server_version.read().await.clone()
    }

    /// Establish the pool. Idempotent: calling while connected is a no-op.
    /// On failure the state transitions to `error` and the error is
    /// returned; there is no internal retry, but calling `connect()` again
    /// is permitted.
    pub async fn connect(&self) -> DbResult<()> {
        // The pool slot lock also serializes concurrent connect() calls.
        let mut pool_slot = self.pool.write().await;
        if pool_slot.is_some() {
            debug!(vendor = %self.vendor, "connect() called while connected; no-op");
            return Ok(());
        }

        *self.state.write().await = ConnectionState::Connecting;
        info!(vendor = %self.vendor, url = %self.config.masked_url(), "Connecting");

        match self.create_pool().await {
            Ok(pool) => {
                let version = probe_server_version(&pool).await;
                if let Some(v) = &version {
                    debug!(version = %v, "Got server version");
                }
                *self.server_version.write().await = version;
                *pool_slot = Some(pool);
                *self.state.write().await = ConnectionState::Connected;
                let _ = self.events.send(ConnectionEvent::Connected);
                info!(vendor = %self.vendor, "Connected");
                Ok(())
            }
            Err(err) => {
                *self.state.write().await = ConnectionState::Error;
                let _ = self.events.send(ConnectionEvent::Error {
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Drain and close the pool. Reconnecting afterwards is supported.
    pub async fn disconnect(&self) {
        let pool = self.pool.write().await.take();
        if let Some(pool) = pool {
            pool.close().await;
            info!(vendor = %self.vendor, "Disconnected");
        }
        *self.state.write().await = ConnectionState::Disconnected;
        let _ = self.events.send(ConnectionEvent::Disconnected);
    }

    /// Disconnect and release held resources (version cache, observers
    /// keep their receivers but no further events fire).
    pub async fn dispose(&self) {
        self.disconnect().await;
        *self.server_version.write().await = None;
    }

    /// Run a trivial round-trip query. Returns `false` on any failure;
    /// never errors.
    pub async fn is_healthy(&self) -> bool {
        let Ok(pool) = self.current_pool().await else {
            return false;
        };
        let probe = async {
            match &pool {
                DbPool::MySql(p) => sqlx::query("SELECT 1").execute(p).await.map(|_| ()),
                DbPool::Postgres(p) => sqlx::query("SELECT 1").execute(p).await.map(|_| ()),
                DbPool::Sqlite(p) => sqlx::query("SELECT 1").execute(p).await.map(|_| ()),
            }
        };
        match tokio::time::timeout(Duration::from_secs(5), probe).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "Health check failed");
                false
            }
            Err(_) => {
                warn!("Health check timed out");
                false
            }
        }
    }

    /// Pool occupancy counts. Errors when not connected.
    pub async fn pool_metrics(&self) -> DbResult<PoolMetrics> {
        Ok(self.current_pool().await?.metrics())
    }

    /// Execute a caller-submitted statement outside a transaction.
    ///
    /// The statement passes through the sanitizer: one statement per
    /// call, no DDL, no manual transaction control.
    pub async fn execute(&self, input: QueryInput) -> DbResult<QueryExecutionResult> {
        if input.vendor != self.vendor {
            return Err(DbError::validation(format!(
                "Query targets {} but this manager is connected to {}",
                input.vendor, self.vendor
            )));
        }
        let built = input.into_built()?;
        self.execute_built(&built).await
    }

    /// Execute an already-built statement (builder output) outside a
    /// transaction. Subject to the same sanitizer as [`execute`](Self::execute).
    pub async fn execute_built(&self, built: &BuiltQuery) -> DbResult<QueryExecutionResult> {
        if built.vendor != self.vendor {
            return Err(DbError::validation(format!(
                "Query was built for {} but this manager is connected to {}",
                built.vendor, self.vendor
            )));
        }
        sanitizer::sanitize_statement(&built.sql, self.vendor)?;
        let pool = self.current_pool().await?;
        executor::execute(&pool, built).await
    }

    /// Raw escape path for schema setup: executes DDL without the
    /// sanitizer. Reserved for migrations and test fixtures; application
    /// statements go through [`execute`](Self::execute).
    pub async fn execute_ddl(&self, sql: &str) -> DbResult<u64> {
        let pool = self.current_pool().await?;
        let built = BuiltQuery::new(sql, Vec::new(), self.vendor);
        debug!(sql = %sql, "Executing DDL via raw escape path");
        let result = executor::execute(&pool, &built).await?;
        Ok(result.row_count)
    }

    /// Borrow the underlying pool handle. This is the lower-level
    /// primitive used by the transaction manager, schema inspector, and
    /// stream executor.
    pub async fn current_pool(&self) -> DbResult<DbPool> {
        match &*self.pool.read().await {
            Some(pool) => Ok(pool.clone()),
            None => Err(DbError::connection(
                "Not connected; call connect() first",
            )),
        }
    }

    /// Create the vendor pool from the stored configuration.
    async fn create_pool(&self) -> DbResult<DbPool> {
        let opts = self.config.pool_options().clone();
        let url = self.config.connection_url();
        let acquire_timeout = Duration::from_secs(opts.acquire_timeout_or_default());
        let idle_timeout = Some(Duration::from_secs(opts.idle_timeout_or_default()));
        let max_connections = opts.max_connections_or_default(self.vendor);
        let min_connections = opts.min_connections_or_default().min(max_connections);
        let connect_budget = Duration::from_secs(self.config.connect_timeout_secs());

        let connect = async {
            match &self.config {
                ConnectionConfig::MySql(_) => {
                    let options = MySqlConnectOptions::from_str(&url)
                        .map_err(|e| connect_config_error(self.vendor, &e))?
                        .charset("utf8mb4");
                    let pool = MySqlPoolOptions::new()
                        .min_connections(min_connections)
                        .max_connections(max_connections)
                        .acquire_timeout(acquire_timeout)
                        .idle_timeout(idle_timeout)
                        .test_before_acquire(opts.test_before_acquire_or_default())
                        .connect_with(options)
                        .await
                        .map_err(|e| connect_failure(self.vendor, &e))?;
                    Ok(DbPool::MySql(pool))
                }
                ConnectionConfig::PostgreSql(_) => {
                    let pool = PgPoolOptions::new()
                        .min_connections(min_connections)
                        .max_connections(max_connections)
                        .acquire_timeout(acquire_timeout)
                        .idle_timeout(idle_timeout)
                        .test_before_acquire(opts.test_before_acquire_or_default())
                        .connect(&url)
                        .await
                        .map_err(|e| connect_failure(self.vendor, &e))?;
                    Ok(DbPool::Postgres(pool))
                }
                ConnectionConfig::Sqlite(sqlite_config) => {
                    let options = SqliteConnectOptions::from_str(&url)
                        .map_err(|e| connect_config_error(self.vendor, &e))?
                        .create_if_missing(sqlite_config.create_if_missing);
                    let pool = SqlitePoolOptions::new()
                        .min_connections(min_connections)
                        .max_connections(max_connections)
                        .acquire_timeout(acquire_timeout)
                        .idle_timeout(idle_timeout)
                        .test_before_acquire(opts.test_before_acquire_or_default())
                        .connect_with(options)
                        .await
                        .map_err(|e| connect_failure(self.vendor, &e))?;
                    Ok(DbPool::Sqlite(pool))
                }
            }
        };

        match tokio::time::timeout(connect_budget, connect).await {
            Ok(result) => result,
            Err(_) => Err(DbError::timeout(
                "connect",
                connect_budget.as_millis() as u64,
            )),
        }
    }
}

/// Safe connection error for an invalid connection string. The driver
/// detail goes to logs, not to the caller.
fn connect_config_error(vendor: Vendor, err: &dyn std::fmt::Display) -> DbError {
    warn!(vendor = %vendor, detail = %err, "Invalid connection string");
    DbError::connection(format!("Invalid {} connection string", vendor))
}

/// Safe connection error for a failed connect attempt.
fn connect_failure(vendor: Vendor, err: &sqlx::Error) -> DbError {
    warn!(vendor = %vendor, detail = %err, "Failed to connect");
    DbError::connection(format!(
        "{} is unavailable; check that the server is reachable and credentials are valid",
        vendor
    ))
}

/// Best-effort server version probe after connect.
async fn probe_server_version(pool: &DbPool) -> Option<String> {
    let result = match pool {
        DbPool::MySql(p) => {
            sqlx::query_scalar::<_, String>("SELECT version()")
                .fetch_one(p)
                .await
        }
        DbPool::Postgres(p) => {
            sqlx::query_scalar::<_, String>("SELECT version()")
                .fetch_one(p)
                .await
        }
        DbPool::Sqlite(p) => {
            sqlx::query_scalar::<_, String>("SELECT sqlite_version()")
                .fetch_one(p)
                .await
        }
    };
    match result {
        Ok(version) => Some(version),
        Err(e) => {
            warn!(error = %e, "Failed to get server version");
            None
        }
    }
}
