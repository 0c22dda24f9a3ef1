use super::error::BackendError;
use super::types::{LLMRequest, LLMResponse};
use async_trait::async_trait;

/// Transport to an AI completion service.
///
/// One `chat` is one outbound call. Implementations must not retry on their
/// own; [`RetryingClient`](super::RetryingClient) layers that on.
#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn chat(&self, request: LLMRequest) -> Result<LLMResponse, BackendError>;

    /// Provider label used in logs
    fn name(&self) -> &str;

    fn model_info(&self) -> Option<String> {
        None
    }
}
