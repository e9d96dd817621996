//! Error types for the scrape pipeline

use crate::cache::CacheError;
use crate::crawler::CrawlError;
use crate::error::Error as CrateError;
use crate::index::DbError;
use thiserror::Error;

/// Error type for scraping a URL
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The URL could not be used
    #[error("Invalid URL {0}")]
    InvalidUrl(String),

    /// Fetching or extraction failed
    #[error(transparent)]
    Crawl(#[from] CrawlError),

    /// The document could not be stored
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// The response cache failed
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

impl From<PipelineError> for CrateError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Crawl(e) => e.into(),
            PipelineError::Database(e) => e.into(),
            PipelineError::Cache(e) => e.into(),
            PipelineError::InvalidUrl(url) => CrateError::Crawl(format!("Invalid URL {}", url)),
        }
    }
}
