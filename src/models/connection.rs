//! Connection-related data models.
//!
//! This module defines the vendor enum and the observable state of a
//! connection manager.

use serde::{Deserialize, Serialize};

/// Supported database vendors.
///
/// The vendor determines the SQL dialect, identifier quoting character,
/// parameter placeholder style, and catalog-query set. It is fixed when a
/// `ConnectionManager` is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    #[serde(rename = "postgresql")]
    PostgreSql,
    /// Includes MariaDB
    #[serde(rename = "mysql")]
    MySql,
    #[serde(rename = "sqlite")]
    Sqlite,
}

impl Vendor {
    /// Parse vendor from a connection string scheme.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSql)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySql)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::Sqlite)
        } else {
            None
        }
    }

    /// Get the display name for this vendor.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSql => "PostgreSQL",
            Self::MySql => "MySQL",
            Self::Sqlite => "SQLite",
        }
    }

    /// Get the default port for this vendor.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::PostgreSql => Some(5432),
            Self::MySql => Some(3306),
            Self::Sqlite => None,
        }
    }

    /// Identifier quoting character: backtick for MySQL, double quote
    /// otherwise.
    pub fn quote_char(&self) -> char {
        match self {
            Self::MySql => '`',
            Self::PostgreSql | Self::Sqlite => '"',
        }
    }

    /// Parameter placeholder for the 1-based position `n`.
    /// PostgreSQL uses `$n`; MySQL and SQLite use `?`.
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Self::PostgreSql => format!("${}", n),
            Self::MySql | Self::Sqlite => "?".to_string(),
        }
    }

    /// Whether the vendor supports a generic `RETURNING` clause.
    /// SQLite gained RETURNING in 3.35; MySQL has no generic form.
    pub fn supports_returning(&self) -> bool {
        !matches!(self, Self::MySql)
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Observable lifecycle state of a connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    /// Check if the manager currently holds a usable pool.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Lifecycle event emitted to observers on state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
    Error { message: String },
}

/// Point-in-time pool occupancy counts.
///
/// For SQLite this is a degenerate pool of at most one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolMetrics {
    /// Connections currently open (idle + active).
    pub total: u32,
    /// Connections sitting idle in the pool.
    pub idle: u32,
    /// Connections checked out by callers.
    pub active: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_from_connection_string() {
        assert_eq!(
            Vendor::from_connection_string("postgres://localhost/db"),
            Some(Vendor::PostgreSql)
        );
        assert_eq!(
            Vendor::from_connection_string("postgresql://localhost/db"),
            Some(Vendor::PostgreSql)
        );
        assert_eq!(
            Vendor::from_connection_string("mysql://localhost/db"),
            Some(Vendor::MySql)
        );
        assert_eq!(
            Vendor::from_connection_string("sqlite:test.db"),
            Some(Vendor::Sqlite)
        );
        assert_eq!(
            Vendor::from_connection_string("sqlite://path/to/db"),
            Some(Vendor::Sqlite)
        );
        assert_eq!(Vendor::from_connection_string("unknown://localhost"), None);
    }

    #[test]
    fn test_quote_chars() {
        assert_eq!(Vendor::MySql.quote_char(), '`');
        assert_eq!(Vendor::PostgreSql.quote_char(), '"');
        assert_eq!(Vendor::Sqlite.quote_char(), '"');
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(Vendor::PostgreSql.placeholder(1), "$1");
        assert_eq!(Vendor::PostgreSql.placeholder(12), "$12");
        assert_eq!(Vendor::MySql.placeholder(3), "?");
        assert_eq!(Vendor::Sqlite.placeholder(1), "?");
    }

    #[test]
    fn test_returning_support() {
        assert!(Vendor::PostgreSql.supports_returning());
        assert!(Vendor::Sqlite.supports_returning());
        assert!(!Vendor::MySql.supports_returning());
    }

    #[test]
    fn test_vendor_serde_tags() {
        assert_eq!(
            serde_json::to_string(&Vendor::PostgreSql).unwrap(),
            "\"postgresql\""
        );
        assert_eq!(serde_json::to_string(&Vendor::MySql).unwrap(), "\"mysql\"");
        assert_eq!(
            serde_json::to_string(&Vendor::Sqlite).unwrap(),
            "\"sqlite\""
        );
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Error.is_connected());
    }
}
