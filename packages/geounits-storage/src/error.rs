//! Error types for geounits-storage

use std::fmt;
use thiserror::Error;

/// Storage error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Database errors (SQLite, in-memory catalog)
    Database,
    /// Table not found in the datastore
    TableNotFound,
    /// Table already exists
    TableExists,
    /// Column not declared by the table
    ColumnNotFound,
    /// Identifier rejected by the backend
    InvalidName,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Database => "database",
            ErrorKind::TableNotFound => "table_not_found",
            ErrorKind::TableExists => "table_exists",
            ErrorKind::ColumnNotFound => "column_not_found",
            ErrorKind::InvalidName => "invalid_name",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Storage error type
#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct StorageError {
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub kind: ErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // Convenience constructors
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    pub fn table_not_found(table: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::TableNotFound,
            format!("Table not found: {}", table.into()),
        )
    }

    pub fn table_exists(table: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::TableExists,
            format!("Table already exists: {}", table.into()),
        )
    }

    pub fn column_not_found(table: &str, column: &str) -> Self {
        Self::new(
            ErrorKind::ColumnNotFound,
            format!("Column {} not found in table {}", column, table),
        )
    }

    pub fn invalid_name(name: &str) -> Self {
        Self::new(
            ErrorKind::InvalidName,
            format!("Invalid table or column name: {:?}", name),
        )
    }
}

// SQLite error conversions
#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::database(format!("SQLite error: {}", err)).with_source(err)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, StorageError>;
