//! Storage errors

use std::fmt;

pub type StorageResult<T> = Result<T, StorageError>;

/// Failure of the maintenance store or the status cache
#[derive(Debug)]
pub enum StorageError {
    /// The database could not be opened
    Connection(String),

    /// A statement was rejected or failed while running
    Query(String),

    /// Embedded migrations could not be applied
    Migration(String),

    /// A stored row or report does not decode into a domain value
    InvalidData(String),

    /// No maintenance record with this id
    NotFound(i64),

    Io(std::io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Connection(msg) => write!(f, "cannot open status database: {}", msg),
            StorageError::Query(msg) => write!(f, "status database query failed: {}", msg),
            StorageError::Migration(msg) => write!(f, "status database migration failed: {}", msg),
            StorageError::InvalidData(msg) => write!(f, "invalid stored data: {}", msg),
            StorageError::NotFound(id) => write!(f, "maintenance record {} does not exist", id),
            StorageError::Io(err) => write!(f, "status database I/O error: {}", err),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let StorageError::Io(err) = self {
            return Some(err);
        }
        None
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err)
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(err) => StorageError::Io(err),
            sqlx::Error::ColumnDecode { index, source } => {
                StorageError::InvalidData(format!("column {index}: {source}"))
            }
            err => StorageError::Query(err.to_string()),
        }
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StorageError::Migration(err.to_string())
    }
}
