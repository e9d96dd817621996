//! Error types for the qavanin crate

use thiserror::Error;

/// Result type for qavanin operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for qavanin operations
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration or registry file
    #[error("Configuration error: {0}")]
    Config(String),

    /// Fetching or extraction error
    #[error("Crawl error: {0}")]
    Crawl(String),

    /// Classification or scoring error
    #[error("Classification error: {0}")]
    Classify(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Cache error
    #[error("Cache error: {0}")]
    Cache(String),

    /// Search error
    #[error("Search error: {0}")]
    Search(String),

    /// Requested item does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}
