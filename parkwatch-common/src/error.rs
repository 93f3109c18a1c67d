//! Common error types for Parkwatch

use thiserror::Error;

/// Common result type for Parkwatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level errors shared across the Parkwatch crates
///
/// Per-service error enums (vault, gateway, redaction, ...) stay local to
/// their modules; this type covers the fatal, run-aborting class.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error.
    /// Fatal: aborts the run before any batch is created.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Cryptographic operation failure (key generation, reveal).
    /// Fatal for the requesting operation; never degrades to plaintext.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
