//! Chunked result streaming.
//!
//! [`stream_select_chunks`] executes a SELECT and yields rows in chunks of
//! at most `chunk_size`, holding no more than a small constant multiple of
//! one chunk in memory regardless of result size: the producer assembles
//! one chunk while at most one more waits in the bounded channel.
//!
//! The stream is lazy, finite, and non-restartable. Cancellation is
//! cooperative: [`RowChunkStream::cancel`] (or dropping the stream) flags
//! the producer, which stops fetching and releases the cursor and its
//! pooled connection promptly.

use crate::db::params::{bind_mysql_param, bind_postgres_param, bind_sqlite_param};
use crate::db::pool::{ConnectionManager, DbPool};
use crate::db::types::RowToJson;
use crate::db::{executor, sanitizer};
use crate::error::{DbError, DbResult, classify_driver_error};
use crate::models::BuiltQuery;
use futures_util::StreamExt;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

/// One chunk of decoded rows.
pub type RowChunk = Vec<serde_json::Map<String, JsonValue>>;

/// Message shown when a caller cancels mid-stream. Safe to surface.
pub const STREAM_CANCELLED: &str = "Stream cancelled by caller";

/// In-flight chunks beyond the one under assembly.
const CHANNEL_CAPACITY: usize = 1;

/// Handle to a running chunked SELECT.
#[derive(Debug)]
pub struct RowChunkStream {
    rx: mpsc::Receiver<DbResult<RowChunk>>,
    cancelled: Arc<AtomicBool>,
    finished: bool,
}

impl RowChunkStream {
    /// Receive the next chunk. Returns `None` when the result set is
    /// exhausted; after an `Err` (including cancellation) the stream is
    /// finished.
    pub async fn next_chunk(&mut self) -> Option<DbResult<RowChunk>> {
        if self.finished {
            return None;
        }
        if self.cancelled.load(Ordering::SeqCst) {
            self.finished = true;
            self.rx.close();
            return Some(Err(DbError::cancelled(STREAM_CANCELLED)));
        }
        match self.rx.recv().await {
            Some(Err(err)) => {
                self.finished = true;
                Some(Err(err))
            }
            Some(Ok(chunk)) => Some(Ok(chunk)),
            None => {
                self.finished = true;
                None
            }
        }
    }

    /// Cancel the stream. The producer stops at the next row boundary and
    /// releases the underlying connection; the next `next_chunk` call
    /// reports the cancellation error.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl Drop for RowChunkStream {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Execute a row-returning statement and stream its rows in bounded
/// chunks.
pub async fn stream_select_chunks(
    manager: &ConnectionManager,
    built: BuiltQuery,
    chunk_size: usize,
) -> DbResult<RowChunkStream> {
    if chunk_size == 0 {
        return Err(DbError::validation("chunk_size must be at least 1"));
    }
    if built.vendor != manager.vendor() {
        return Err(DbError::validation(format!(
            "Query was built for {} but this manager is connected to {}",
            built.vendor,
            manager.vendor()
        )));
    }
    sanitizer::sanitize_statement(&built.sql, manager.vendor())?;
    if !executor::returns_rows(&built.sql) {
        return Err(DbError::validation(
            "Streaming requires a row-returning statement",
        ));
    }

    let pool = manager.current_pool().await?;
    let cancelled = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel::<DbResult<RowChunk>>(CHANNEL_CAPACITY);

    let producer_cancelled = Arc::clone(&cancelled);
    tokio::spawn(async move {
        produce_chunks(pool, built, chunk_size, tx, producer_cancelled).await;
    });

    Ok(RowChunkStream {
        rx,
        cancelled,
        finished: false,
    })
}

/// Producer side: fetch rows from the cursor, assemble chunks, stop on
/// cancellation or receiver drop. Dropping the row stream at the end of
/// this function releases the pooled connection.
async fn produce_chunks(
    pool: DbPool,
    built: BuiltQuery,
    chunk_size: usize,
    tx: mpsc::Sender<DbResult<RowChunk>>,
    cancelled: Arc<AtomicBool>,
) {
    macro_rules! drive {
        ($rows:expr) => {{
            let mut rows = $rows;
            let mut chunk: RowChunk = Vec::with_capacity(chunk_size);
            let mut total: u64 = 0;
            while let Some(row) = rows.next().await {
                if cancelled.load(Ordering::SeqCst) {
                    debug!(rows_sent = total, "Stream cancelled; releasing cursor");
                    return;
                }
                match row {
                    Ok(row) => {
                        chunk.push(row.to_json_map());
                        if chunk.len() == chunk_size {
                            total += chunk.len() as u64;
                            let full = std::mem::replace(
                                &mut chunk,
                                Vec::with_capacity(chunk_size),
                            );
                            if tx.send(Ok(full)).await.is_err() {
                                // Receiver dropped; stop fetching.
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(classify_driver_error(err, "stream fetch"))).await;
                        return;
                    }
                }
            }
            if !chunk.is_empty() {
                total += chunk.len() as u64;
                let _ = tx.send(Ok(chunk)).await;
            }
            debug!(rows_sent = total, "Stream complete");
        }};
    }

    match &pool {
        DbPool::MySql(p) => {
            let mut query = sqlx::query(&built.sql);
            for param in &built.params {
                query = bind_mysql_param(query, param);
            }
            drive!(query.fetch(p));
        }
        DbPool::Postgres(p) => {
            let mut query = sqlx::query(&built.sql);
            for param in &built.params {
                query = bind_postgres_param(query, param);
            }
            drive!(query.fetch(p));
        }
        DbPool::Sqlite(p) => {
            let mut query = sqlx::query(&built.sql);
            for param in &built.params {
                query = bind_sqlite_param(query, param);
            }
            drive!(query.fetch(p));
        }
    }
}
