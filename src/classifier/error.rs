//! Error types for the classifier module

use crate::error::Error as CrateError;
use thiserror::Error;

/// Error type for classification
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// The model call failed
    #[error("Model error: {0}")]
    Model(String),

    /// The model answered with something that is not a category
    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    /// Invalid classifier configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<rig::completion::CompletionError> for ClassifyError {
    fn from(err: rig::completion::CompletionError) -> Self {
        ClassifyError::Model(err.to_string())
    }
}

impl From<ClassifyError> for CrateError {
    fn from(err: ClassifyError) -> Self {
        CrateError::Classify(err.to_string())
    }
}
