use std::sync::Arc;

use governor::DefaultDirectRateLimiter;
use rig::completion::{self, CompletionError, CompletionModel, CompletionRequest, CompletionResponse};
use tracing::{Instrument, debug_span, info_span};

use super::RateLimitResponse;

/// Completion model that waits for a governor permit before every request
#[derive(Clone)]
pub struct RateLimitedCompletionModel<M: CompletionModel> {
    model: M,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl<M: CompletionModel> std::fmt::Debug for RateLimitedCompletionModel<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedCompletionModel").finish_non_exhaustive()
    }
}

impl<M> RateLimitedCompletionModel<M>
where
    M: CompletionModel,
{
    pub fn new(model: M, limiter: DefaultDirectRateLimiter) -> Self {
        Self {
            model,
            limiter: Arc::new(limiter),
        }
    }
}

impl<M: CompletionModel> CompletionModel for RateLimitedCompletionModel<M> {
    type Response = RateLimitResponse<M::Response>;

    async fn completion(
        &self,
        completion_request: CompletionRequest,
    ) -> Result<completion::CompletionResponse<Self::Response>, CompletionError> {
        self.limiter.until_ready().instrument(debug_span!("limiter")).await;
        let response = self
            .model
            .completion(completion_request)
            .instrument(info_span!("completion"))
            .await?;
        Ok(CompletionResponse {
            choice: response.choice,
            raw_response: RateLimitResponse {
                response: response.raw_response,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::mock_model::MockCompletionModel;
    use governor::{Quota, RateLimiter};
    use rig::completion::AssistantContent;
    use std::num::NonZeroU32;

    #[tokio::test]
    async fn test_passes_reply_through() {
        let mock = MockCompletionModel::new();
        mock.set_text_response("{\"category\":\"law\"}").await;
        let limiter = RateLimiter::direct(Quota::per_minute(NonZeroU32::new(60).unwrap()));
        let model = RateLimitedCompletionModel::new(mock.clone(), limiter);

        let response = model
            .completion_request("متن")
            .send()
            .await
            .unwrap();
        let text = response
            .choice
            .iter()
            .map(|c| match c {
                AssistantContent::Text(t) => t.text.clone(),
                _ => String::new(),
            })
            .collect::<String>();
        assert_eq!(text, "{\"category\":\"law\"}");
        assert_eq!(mock.calls(), 1);
    }
}
