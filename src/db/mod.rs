//! Database access layer.
//!
//! - Connection pool management and lifecycle
//! - Statement sanitization and execution
//! - Transactions with savepoints and timeout cancellation
//! - Schema introspection with a TTL cache
//! - Bounded chunked result streaming

pub mod executor;
pub mod params;
pub mod pool;
pub mod sanitizer;
pub mod schema;
pub mod stream;
pub mod transaction;
pub mod types;

pub use pool::{ConnectionManager, DbPool};
pub use schema::{InspectOptions, SchemaInspector};
pub use stream::{RowChunk, RowChunkStream, STREAM_CANCELLED, stream_select_chunks};
pub use transaction::{TransactionContext, TransactionOptions, with_transaction};
