//! Error types for specmap.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using specmap's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for specmap operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A caller supplied an invalid parameter (bad chunking arguments etc.)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// One chunk's call to the extraction capability failed (non-fatal)
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// A remote rerank/disambiguate/classify call failed (non-fatal)
    #[error("Merge dependency error: {0}")]
    MergeDependency(String),

    /// Operation against an unknown job id
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    /// Another worker claimed the job first (expected under contention)
    #[error("Job already claimed: {0}")]
    ClaimLost(Uuid),

    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
