//! Error types for session management.

use rsm_codec::{DecodeError, EncodeError};
use rsm_storage::StorageError;

/// Error type for session management operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Session state could not be encoded.
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    /// A stored blob could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The backing store failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// No unused session id was found within the configured attempts.
    #[error("Session id allocation gave up after {attempts} attempts")]
    IdAllocationExhausted { attempts: u32 },

    /// A configured skip pattern is not a valid regex.
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    /// A persistence strategy name was not recognised.
    #[error("Invalid session persistence strategy: [{0}]")]
    InvalidStrategy(String),
}

/// Result type for session management operations.
pub type Result<T> = std::result::Result<T, SessionError>;
