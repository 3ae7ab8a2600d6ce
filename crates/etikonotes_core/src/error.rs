//! Application error types for storage and notebook logic.
use std::fmt;
use thiserror::Error;

/// Durable-store operation that failed inside a persistence binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceOp {
    /// Initial load of stored updates into memory.
    Sync,
    /// Background append of local updates.
    Write,
    /// Flush and release of the binding.
    Destroy,
    /// Erasure of the stored bytes.
    Clear,
}

impl fmt::Display for PersistenceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Sync => "sync",
            Self::Write => "write",
            Self::Destroy => "destroy",
            Self::Clear => "clear",
        };
        f.write_str(label)
    }
}

/// Top-level application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] redb::Error),

    #[error("Storage error: {0}")]
    StorageMessage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Note with ID '{0}' does not exist")]
    NotFound(String),

    #[error("Persistence {op} failed for store '{store}': {message}")]
    Persistence {
        store: String,
        op: PersistenceOp,
        message: String,
    },

    #[error("Note '{0}' already has an open handle")]
    AlreadyOpen(String),

    #[error("CRDT error: {0}")]
    Crdt(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Wrap a store-level failure as a binding failure for `store`.
    ///
    /// # Returns
    /// [`AppError::Persistence`] carrying the rendered source error.
    pub fn persistence(store: &str, op: PersistenceOp, source: impl fmt::Display) -> Self {
        Self::Persistence {
            store: store.to_string(),
            op,
            message: source.to_string(),
        }
    }
}

impl From<redb::DatabaseError> for AppError {
    fn from(value: redb::DatabaseError) -> Self {
        Self::Database(value.into())
    }
}

impl From<redb::TransactionError> for AppError {
    fn from(value: redb::TransactionError) -> Self {
        Self::Database(value.into())
    }
}

impl From<redb::TableError> for AppError {
    fn from(value: redb::TableError) -> Self {
        Self::Database(value.into())
    }
}

impl From<redb::StorageError> for AppError {
    fn from(value: redb::StorageError) -> Self {
        Self::Database(value.into())
    }
}

impl From<redb::CommitError> for AppError {
    fn from(value: redb::CommitError) -> Self {
        Self::Database(value.into())
    }
}
