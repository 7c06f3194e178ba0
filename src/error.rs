//! Error types for the SQL access layer.
//!
//! This module defines all error types using `thiserror`. Every variant is
//! safe to surface to a caller: validation and constraint errors carry their
//! real message, while driver failures are sanitized into a generic message
//! with the underlying `sqlx::Error` retained as a non-displayed source.

use thiserror::Error;
use tracing::error;

/// Category of constraint violation, used to pick a fixed safe message
/// template independent of the vendor's wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    NotNull,
}

impl ConstraintKind {
    /// Vendor-neutral message template for this constraint category.
    pub fn template(&self) -> &'static str {
        match self {
            Self::Unique => "A row with this value already exists (unique constraint violated)",
            Self::ForeignKey => {
                "The operation references a missing or still-referenced row (foreign key constraint violated)"
            }
            Self::NotNull => "A required column is missing a value (not-null constraint violated)",
        }
    }
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unique => write!(f, "unique"),
            Self::ForeignKey => write!(f, "foreign_key"),
            Self::NotNull => write!(f, "not_null"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    /// Bad input detected before any network call: invalid identifier,
    /// malformed WHERE condition, unsupported builder input.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Classified constraint violation with a vendor-neutral message.
    #[error("{message}")]
    Constraint {
        kind: ConstraintKind,
        message: String,
        /// e.g. a cascade hint for FK-on-delete failures
        hint: Option<String>,
    },

    /// An operation exceeded its configured budget. The message always
    /// names the configured duration.
    #[error("Timeout: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Caller-initiated cancellation; safe to surface verbatim.
    #[error("{message}")]
    Cancelled { message: String },

    /// Connection-level failure. The message is a safe "unavailable"
    /// summary; raw driver text stays in logs only.
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Anything the classifier could not place. Displays a generic
    /// message; the real failure is retained as the source.
    #[error("Query failed; see logs for details")]
    Unclassified {
        #[source]
        source: Option<sqlx::Error>,
    },
}

impl DbError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a constraint violation with the fixed template for its kind.
    pub fn constraint(kind: ConstraintKind) -> Self {
        Self::Constraint {
            kind,
            message: kind.template().to_string(),
            hint: None,
        }
    }

    /// Create a constraint violation with an extra hint line.
    pub fn constraint_with_hint(kind: ConstraintKind, hint: impl Into<String>) -> Self {
        Self::Constraint {
            kind,
            message: kind.template().to_string(),
            hint: Some(hint.into()),
        }
    }

    /// Create a timeout error naming the configured duration.
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Create a connection error with a safe message.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Check if this error is retryable by a caller's policy. This crate
    /// never retries internally.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    /// Check if this error's message is safe to show verbatim.
    pub fn is_safe_to_surface(&self) -> bool {
        !matches!(self, Self::Unclassified { .. })
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Driver Error Classification
// =============================================================================

/// PostgreSQL SQLSTATE codes for constraint classes.
const PG_UNIQUE_VIOLATION: &str = "23505";
const PG_FOREIGN_KEY_VIOLATION: &str = "23503";
const PG_NOT_NULL_VIOLATION: &str = "23502";

/// MySQL error numbers (reported as strings by the driver).
const MYSQL_DUP_ENTRY: &str = "1062";
const MYSQL_NO_REFERENCED_ROW: &str = "1452";
const MYSQL_ROW_IS_REFERENCED: &str = "1451";
const MYSQL_BAD_NULL: &str = "1048";
const MYSQL_NO_DEFAULT: &str = "1364";

/// SQLite extended result codes.
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";
const SQLITE_CONSTRAINT_PRIMARYKEY: &str = "1555";
const SQLITE_CONSTRAINT_FOREIGNKEY: &str = "787";
const SQLITE_CONSTRAINT_NOTNULL: &str = "1299";

/// Map a vendor error code to a constraint kind, if it names one.
fn constraint_from_code(code: &str) -> Option<ConstraintKind> {
    match code {
        PG_UNIQUE_VIOLATION | MYSQL_DUP_ENTRY | SQLITE_CONSTRAINT_UNIQUE
        | SQLITE_CONSTRAINT_PRIMARYKEY => Some(ConstraintKind::Unique),
        PG_FOREIGN_KEY_VIOLATION | MYSQL_NO_REFERENCED_ROW | MYSQL_ROW_IS_REFERENCED
        | SQLITE_CONSTRAINT_FOREIGNKEY => Some(ConstraintKind::ForeignKey),
        PG_NOT_NULL_VIOLATION | MYSQL_BAD_NULL | MYSQL_NO_DEFAULT
        | SQLITE_CONSTRAINT_NOTNULL => Some(ConstraintKind::NotNull),
        _ => None,
    }
}

/// Fallback classification when the driver reports no usable code. Fragile
/// across driver versions; the code path above is preferred.
fn constraint_from_message(message: &str) -> Option<ConstraintKind> {
    let lower = message.to_lowercase();
    if lower.contains("unique constraint") || lower.contains("duplicate entry") {
        Some(ConstraintKind::Unique)
    } else if lower.contains("foreign key constraint") {
        Some(ConstraintKind::ForeignKey)
    } else if lower.contains("not null constraint") || lower.contains("cannot be null") {
        Some(ConstraintKind::NotNull)
    } else {
        None
    }
}

/// Whether the message suggests the row is still referenced by dependents,
/// the FK-on-delete case that a cascade hint helps with.
fn is_delete_restricted(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("still referenced") || lower.contains("a foreign key constraint fails")
}

/// Classify a failed execute into the error taxonomy.
///
/// Constraint violations become fixed safe templates; connection-level
/// failures become a safe "unavailable" message; everything else is wrapped
/// as [`DbError::Unclassified`] with the original error attached. Logging
/// happens here, at the point of wrapping, never in place of propagation.
pub fn classify_driver_error(err: sqlx::Error, operation: &str) -> DbError {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.to_string());
            let message = db_err.message().to_string();

            let kind = code
                .as_deref()
                .and_then(constraint_from_code)
                .or_else(|| constraint_from_message(&message));

            match kind {
                Some(ConstraintKind::ForeignKey) if is_delete_restricted(&message) => {
                    DbError::constraint_with_hint(
                        ConstraintKind::ForeignKey,
                        "Dependent rows exist; delete them first or declare ON DELETE CASCADE on the constraint",
                    )
                }
                Some(kind) => DbError::constraint(kind),
                None => {
                    error!(
                        operation = operation,
                        code = ?code,
                        detail = %message,
                        "Unclassified database error"
                    );
                    DbError::Unclassified {
                        source: Some(sqlx::Error::Database(db_err)),
                    }
                }
            }
        }
        sqlx::Error::PoolTimedOut => DbError::timeout("connection pool acquire", 30_000),
        sqlx::Error::PoolClosed => DbError::connection("Connection pool is closed"),
        sqlx::Error::Io(io_err) => {
            error!(operation = operation, detail = %io_err, "I/O error during database operation");
            DbError::connection("Database is unavailable")
        }
        sqlx::Error::Tls(tls_err) => {
            error!(operation = operation, detail = %tls_err, "TLS error during database operation");
            DbError::connection("Database is unavailable (TLS failure)")
        }
        sqlx::Error::Protocol(msg) => {
            error!(operation = operation, detail = %msg, "Protocol error during database operation");
            DbError::connection("Database is unavailable (protocol failure)")
        }
        sqlx::Error::Configuration(msg) => {
            error!(operation = operation, detail = %msg, "Invalid connection configuration");
            DbError::connection("Invalid connection configuration")
        }
        other => {
            error!(operation = operation, detail = %other, "Unclassified driver error");
            DbError::Unclassified {
                source: Some(other),
            }
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        classify_driver_error(err, "query")
    }
}
