//! Database Error Types
//!
//! Errors raised by the storage backends themselves. They cross the
//! `TreeStore` boundary as `anyhow::Error`, so the engine only needs to
//! propagate them.

#[cfg(feature = "libsql")]
use std::path::PathBuf;
use thiserror::Error;

/// Storage backend errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish database connection
    #[cfg(feature = "libsql")]
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Failed to initialize the tree table
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// libsql operation error
    #[cfg(feature = "libsql")]
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// Table or column name that cannot be used as an SQL identifier
    #[error("Invalid identifier '{name}'")]
    InvalidIdentifier { name: String },

    /// Operation not supported for the given field
    #[error("Field {field} is not supported here: {reason}")]
    UnsupportedField { field: String, reason: String },

    /// Stored row could not be decoded into a tree node
    #[error("Malformed row: {0}")]
    MalformedRow(String),

    /// In-memory store lock was poisoned by a panicking writer
    #[error("Failed to acquire store lock")]
    LockPoisoned,
}

impl DatabaseError {
    /// Create a connection failed error
    #[cfg(feature = "libsql")]
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    pub fn invalid_identifier(name: impl Into<String>) -> Self {
        Self::InvalidIdentifier { name: name.into() }
    }

    pub fn unsupported_field(field: impl std::fmt::Debug, reason: impl Into<String>) -> Self {
        Self::UnsupportedField {
            field: format!("{:?}", field),
            reason: reason.into(),
        }
    }

    pub fn malformed_row(msg: impl Into<String>) -> Self {
        Self::MalformedRow(msg.into())
    }
}

/// True when `name` can be spliced into SQL as a bare identifier
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_validation() {
        assert!(is_valid_identifier("parent_id"));
        assert!(is_valid_identifier("_lft"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1lft"));
        assert!(!is_valid_identifier("lft; DROP TABLE x"));
        assert!(!is_valid_identifier("owner.name"));
    }

    #[test]
    fn test_error_display() {
        let err = DatabaseError::sql_execution("Failed to shift bounds");
        assert_eq!(err.to_string(), "SQL execution failed: Failed to shift bounds");

        let err = DatabaseError::invalid_identifier("a b");
        assert_eq!(err.to_string(), "Invalid identifier 'a b'");
    }
}
