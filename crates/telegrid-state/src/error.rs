//! Error types for the telegrid agent store.

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("transient store error: {0}")]
    Transient(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store version {found} is not supported (expected {expected})")]
    Version { found: u64, expected: u64 },
}
