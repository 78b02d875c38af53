//! Error types shared across the Woodshed crates
//!
//! Local store and I/O failures convert automatically via `#[from]`; remote
//! store failures arrive as `Http` through the sync layer's conversion.

use thiserror::Error;

/// Result alias used throughout Woodshed
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Local store failure (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Filesystem failure: root folder creation, export writing
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote store call failed (network, API status, or decode)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
