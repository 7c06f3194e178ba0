//! Vendor-agnostic SQL access layer for PostgreSQL, MySQL, and SQLite.
//!
//! The crate provides a caller-owned [`ConnectionManager`] over one pooled
//! vendor connection, a pure parameterized query [`builder`], scoped
//! transactions with savepoints and timeout cancellation, a schema
//! inspector with a TTL cache, and bounded chunked result streaming.

pub mod builder;
pub mod config;
pub mod db;
pub mod error;
pub mod ident;
pub mod models;

pub use config::{ConnectionConfig, MySqlConfig, PoolOptions, PostgresConfig, SqliteConfig};
pub use db::{
    ConnectionManager, InspectOptions, SchemaInspector, TransactionContext, TransactionOptions,
    with_transaction,
};
pub use error::{ConstraintKind, DbError, DbResult};
pub use models::{
    BuiltQuery, Operator, QueryExecutionResult, QueryInput, QueryParam, SchemaSnapshot, Vendor,
    WhereCondition,
};
