//! Error types for storage operations.

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The connection URL could not be parsed.
    #[error("invalid storage URL: {0}")]
    InvalidUrl(String),

    /// Network or protocol failure talking to the backing store.
    #[error("storage transport error during {operation}: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    /// A read found only the id-claim placeholder: a create raced with the read.
    #[error("session {key} is claimed but has not been written yet")]
    PlaceholderCollision { key: String },

    /// The client was closed.
    #[error("storage client is closed")]
    Closed,
}

impl StorageError {
    pub(crate) fn transport(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            operation,
            message: err.to_string(),
        }
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
