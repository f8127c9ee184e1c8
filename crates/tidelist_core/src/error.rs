//! Error types for core storage.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in the core stores.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The persistence layer is unreachable.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A payload could not be serialized for the operation log.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
