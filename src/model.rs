//! # LLM Client Module
//!
//! Completion models used by the optional model-backed classifier, with
//! rate limiting so batch scrapes do not exhaust an API quota.
//!
//! ## Key Components
//!
//! - `RateLimitedCompletionModel`: A wrapper that adds rate limiting to any completion model
//! - `gemini_completion`: Gemini model behind a per-minute quota
//! - `mock_model::MockCompletionModel`: canned replies for tests

use std::num::NonZeroU32;

use governor::{Quota, RateLimiter};
use rig::providers::gemini;

use crate::error::{Error, Result};

pub mod mock_model;
pub mod ratelimited_completion;

pub use ratelimited_completion::RateLimitedCompletionModel;

/// Default Gemini model for classification
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-lite";

pub struct RateLimitResponse<T> {
    #[allow(dead_code)]
    response: T,
}

/// Gemini completion model behind a rate limiter
pub type GeminiCompletionModel = RateLimitedCompletionModel<gemini::completion::CompletionModel>;

/// Gemini completion model allowed `per_minute` requests per minute
pub fn gemini_completion(
    api_key: &str,
    model: &str,
    per_minute: u32,
) -> Result<GeminiCompletionModel> {
    let per_minute = NonZeroU32::new(per_minute)
        .ok_or_else(|| Error::Config("model rate limit must be greater than zero".to_string()))?;
    let gemini_client = gemini::Client::new(api_key);
    let limiter = RateLimiter::direct(Quota::per_minute(per_minute));
    Ok(RateLimitedCompletionModel::new(
        gemini_client.completion_model(model),
        limiter,
    ))
}

/// Gemini model from `GEMINI_API_KEY`, if it is set
pub fn gemini_completion_from_env(per_minute: u32) -> Result<Option<GeminiCompletionModel>> {
    match std::env::var("GEMINI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => {
            let model = std::env::var("QAVANIN_GEMINI_MODEL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string());
            gemini_completion(key.trim(), &model, per_minute).map(Some)
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rate_limit_is_rejected() {
        assert!(matches!(
            gemini_completion("key", DEFAULT_GEMINI_MODEL, 0),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_gemini_model_builds() {
        assert!(gemini_completion("key", DEFAULT_GEMINI_MODEL, 30).is_ok());
    }
}
