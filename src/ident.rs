//! SQL identifier validation and quoting.
//!
//! This is the single choke point for getting an identifier (table, column,
//! savepoint name) into SQL text. No other module interpolates a raw
//! identifier: callers validate here first, then quote for the target
//! vendor. Values never pass through this module; they are always bound as
//! parameters.

use crate::error::{DbError, DbResult};
use crate::models::Vendor;

/// Validate a single (unqualified) identifier against
/// `^[A-Za-z_][A-Za-z0-9_]*$`.
///
/// `context` names what is being validated ("table", "column",
/// "savepoint", ...) so the error message points at the offending input.
pub fn validate_identifier(name: &str, context: &str) -> DbResult<()> {
    if name.is_empty() {
        return Err(DbError::validation(format!(
            "{} name cannot be empty",
            context
        )));
    }
    let mut chars = name.chars();
    if !matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_') {
        return Err(DbError::validation(format!(
            "Invalid {} name '{}': must start with a letter or underscore",
            context, name
        )));
    }
    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        return Err(DbError::validation(format!(
            "Invalid {} name '{}': character '{}' is not allowed",
            context, name, bad
        )));
    }
    Ok(())
}

/// Validate a possibly qualified identifier (`schema.table` style), each
/// dot-separated segment matching the identifier grammar.
pub fn validate_qualified_identifier(name: &str, context: &str) -> DbResult<()> {
    if name.is_empty() {
        return Err(DbError::validation(format!(
            "{} name cannot be empty",
            context
        )));
    }
    for segment in name.split('.') {
        validate_identifier(segment, context)?;
    }
    Ok(())
}

/// Quote a validated identifier for the target vendor: backticks for
/// MySQL, double quotes for PostgreSQL and SQLite.
///
/// The input must have passed [`validate_identifier`]; quoting does not
/// substitute for validation.
pub fn quote_identifier(name: &str, vendor: Vendor) -> String {
    let q = vendor.quote_char();
    format!("{q}{name}{q}")
}

/// Validate and quote a possibly qualified identifier, quoting each
/// segment separately (`"schema"."table"`).
pub fn quote_qualified(name: &str, context: &str, vendor: Vendor) -> DbResult<String> {
    validate_qualified_identifier(name, context)?;
    Ok(name
        .split('.')
        .map(|segment| quote_identifier(segment, vendor))
        .collect::<Vec<_>>()
        .join("."))
}
