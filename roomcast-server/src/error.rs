//! Error types for roomcast-server
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. The taxonomy matters at the API boundary: conflicts are a
//! normal "try again" outcome, validation errors carry a user-facing
//! message, invariant violations are internal and only logged.

use thiserror::Error;

/// Main error type for roomcast-server
#[derive(Error, Debug)]
pub enum Error {
    /// Lock held by a concurrent operation; retryable, not exceptional
    #[error("Operation in progress, try again: {0}")]
    Conflict(String),

    /// User-facing validation failure (bad ratio, wrong state, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Playback operation on a room with no loaded track
    #[error("No track loaded for playback")]
    PlaybackNotLoaded,

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Logic or clock-skew bug; logged, never shown verbatim to users
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON encode/decode errors on stored records
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Track metadata provider errors (transient, surfaced upward)
    #[error("Metadata provider error: {0}")]
    Provider(String),

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using roomcast-server Error
pub type Result<T> = std::result::Result<T, Error>;
