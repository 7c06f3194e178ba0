//! Data models for the SQL access layer.

pub mod connection;
pub mod query;
pub mod schema;

pub use connection::{ConnectionEvent, ConnectionState, PoolMetrics, Vendor};
pub use query::{
    BuiltQuery, ConditionValue, Operator, Params, QueryExecutionResult, QueryInput, QueryOptions,
    QueryParam, WhereCondition,
};
pub use schema::{
    ColumnDefinition, ForeignKey, ForeignKeyAction, IndexInfo, SchemaSnapshot, TableSchema,
};
