//! Error types for manager operations.

use thiserror::Error;
use uuid::Uuid;

use telegrid_bus::BusError;
use telegrid_state::StoreError;

/// Result type alias for manager operations.
pub type ManagerResult<T> = Result<T, ManagerError>;

/// Errors surfaced by manager operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The operation targets a UUID or pod that is not registered.
    #[error("agent unknown: {0}")]
    AgentUnknown(String),

    /// The cursor id is unregistered or has been deleted.
    #[error("cursor unknown: {0}")]
    CursorUnknown(Uuid),

    /// The operation's deadline expired before the batch committed. No
    /// partial state was written.
    #[error("operation cancelled: deadline expired before commit")]
    Cancelled,

    /// Retries of a retriable store error ran past the deadline.
    #[error("transient store error persisted past deadline: {0}")]
    Transient(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bus(#[from] BusError),
}
