//! Error types for cedarkv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using CedarError
pub type Result<T> = std::result::Result<T, CedarError>;

/// Unified error type for cedarkv operations
#[derive(Debug, Error)]
pub enum CedarError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Tree Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    KeyNotFound,

    #[error("Key already in database")]
    DuplicateKey,

    #[error("Token exceeds {max} bytes (got {len})")]
    TokenTooLong { len: usize, max: usize },

    #[error("Empty token")]
    EmptyToken,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
