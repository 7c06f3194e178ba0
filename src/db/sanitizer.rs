//! Statement sanitization for the generic execute path.
//!
//! Uses [sqlparser](https://docs.rs/sqlparser/) for AST-based checks so a
//! multi-statement batch or DDL cannot slip through via formatting tricks
//! or comments. Two rules apply to everything submitted through
//! `ConnectionManager::execute` and the transaction context:
//!
//! - exactly one statement per call;
//! - no DDL (CREATE/DROP/ALTER/TRUNCATE) and no manual transaction control.
//!
//! Schema setup goes through the dedicated raw escape path
//! (`ConnectionManager::execute_ddl`), which skips this gate on purpose.

use crate::error::{DbError, DbResult};
use crate::models::Vendor;
use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

/// Class of statement the sanitizer cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatementClass {
    /// SELECT/INSERT/UPDATE/DELETE and other plain statements
    Allowed,
    /// CREATE, DROP, ALTER, TRUNCATE
    Ddl,
    /// BEGIN, COMMIT, ROLLBACK, SAVEPOINT
    TransactionControl,
}

/// Get the SQL dialect for the given vendor.
fn dialect_for(vendor: Vendor) -> Box<dyn Dialect> {
    match vendor {
        Vendor::PostgreSql => Box::new(PostgreSqlDialect {}),
        Vendor::MySql => Box::new(MySqlDialect {}),
        Vendor::Sqlite => Box::new(SQLiteDialect {}),
    }
}

/// Validate a statement for the generic execute path.
///
/// Rejects empty input, unparseable SQL, multi-statement batches, DDL, and
/// manual transaction control. Returns `Ok(())` for everything else.
pub fn sanitize_statement(sql: &str, vendor: Vendor) -> DbResult<()> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(DbError::validation("SQL statement is empty"));
    }

    let dialect = dialect_for(vendor);
    let statements = Parser::parse_sql(dialect.as_ref(), trimmed)
        .map_err(|e| DbError::validation(format!("Failed to parse SQL statement: {}", e)))?;

    match statements.len() {
        0 => return Err(DbError::validation("SQL statement is empty")),
        1 => {}
        n => {
            return Err(DbError::validation(format!(
                "Multi-statement SQL is not allowed ({} statements found); submit one statement per call",
                n
            )));
        }
    }

    let (class, name) = classify_statement(&statements[0]);
    match class {
        StatementClass::Allowed => Ok(()),
        StatementClass::Ddl => Err(DbError::validation(format!(
            "{} is not allowed on the generic execute path; use execute_ddl for schema changes",
            name
        ))),
        StatementClass::TransactionControl => Err(DbError::validation(format!(
            "{} is not allowed here; use the transaction manager",
            name
        ))),
    }
}

/// Classify a parsed statement.
fn classify_statement(stmt: &Statement) -> (StatementClass, &'static str) {
    match stmt {
        // DDL
        Statement::CreateTable { .. } => (StatementClass::Ddl, "CREATE TABLE"),
        Statement::CreateView { .. } => (StatementClass::Ddl, "CREATE VIEW"),
        Statement::CreateIndex(_) => (StatementClass::Ddl, "CREATE INDEX"),
        Statement::CreateSchema { .. } => (StatementClass::Ddl, "CREATE SCHEMA"),
        Statement::CreateDatabase { .. } => (StatementClass::Ddl, "CREATE DATABASE"),
        Statement::CreateSequence { .. } => (StatementClass::Ddl, "CREATE SEQUENCE"),
        Statement::CreateType { .. } => (StatementClass::Ddl, "CREATE TYPE"),
        Statement::CreateFunction { .. } => (StatementClass::Ddl, "CREATE FUNCTION"),
        Statement::CreateProcedure { .. } => (StatementClass::Ddl, "CREATE PROCEDURE"),
        Statement::CreateTrigger { .. } => (StatementClass::Ddl, "CREATE TRIGGER"),
        Statement::CreateVirtualTable { .. } => (StatementClass::Ddl, "CREATE VIRTUAL TABLE"),
        Statement::CreateExtension { .. } => (StatementClass::Ddl, "CREATE EXTENSION"),
        Statement::AlterTable { .. } => (StatementClass::Ddl, "ALTER TABLE"),
        Statement::AlterView { .. } => (StatementClass::Ddl, "ALTER VIEW"),
        Statement::AlterIndex { .. } => (StatementClass::Ddl, "ALTER INDEX"),
        Statement::AlterType { .. } => (StatementClass::Ddl, "ALTER TYPE"),
        Statement::Drop { .. } => (StatementClass::Ddl, "DROP"),
        Statement::DropFunction { .. } => (StatementClass::Ddl, "DROP FUNCTION"),
        Statement::DropProcedure { .. } => (StatementClass::Ddl, "DROP PROCEDURE"),
        Statement::DropTrigger { .. } => (StatementClass::Ddl, "DROP TRIGGER"),
        Statement::Truncate { .. } => (StatementClass::Ddl, "TRUNCATE"),

        // Manual transaction control conflicts with the transaction manager
        Statement::StartTransaction { .. } => (StatementClass::TransactionControl, "BEGIN"),
        Statement::Commit { .. } => (StatementClass::TransactionControl, "COMMIT"),
        Statement::Rollback { .. } => (StatementClass::TransactionControl, "ROLLBACK"),
        Statement::Savepoint { .. } => (StatementClass::TransactionControl, "SAVEPOINT"),
        Statement::ReleaseSavepoint { .. } => {
            (StatementClass::TransactionControl, "RELEASE SAVEPOINT")
        }

        _ => (StatementClass::Allowed, "statement"),
    }
}
