//! Error types for decayfit

use thiserror::Error;

/// decayfit error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error: caller-contract or configuration misuse.
    ///
    /// These are fatal to the requested operation and are never converted
    /// into a sentinel fit result.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error: a numerical problem inside a fit attempt.
    #[error("Computation error: {0}")]
    Computation(String),

    /// Integration error: a PDF normalisation could not be evaluated.
    #[error("Integration error: {0}")]
    Integration(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
