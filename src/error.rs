//! Error types for tonesift.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SiftError {
    // Configuration errors
    #[error("invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("no tensor file: skip modes need a trained tensor (-d)")]
    MissingTensor,

    // Tensor file errors
    #[error("invalid tensor: {0}")]
    InvalidTensor(String),

    // Pipeline invariant violations; these indicate the output ring is too
    // shallow for the configured window/average constants and are fatal.
    #[error("skipped transition, buffer out of range (crossfade start {0})")]
    TransitionOutOfRange(i64),

    #[error("buffer full with no confirmed samples")]
    BufferStall,

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, SiftError>;
