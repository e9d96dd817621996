//! Error types for the response cache

use crate::error::Error as CrateError;
use crate::index::DbError;
use thiserror::Error;

/// Error type for cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// The SQLite tier failed
    #[error("Storage error: {0}")]
    Storage(#[from] DbError),

    /// Invalid cache configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<CacheError> for CrateError {
    fn from(err: CacheError) -> Self {
        CrateError::Cache(err.to_string())
    }
}
