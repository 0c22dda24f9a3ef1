use super::client::LLMClient;
use super::error::BackendError;
use super::types::{LLMRequest, LLMResponse};
use crate::util::retry::{retry_with_backoff, RetryPolicy};
use async_trait::async_trait;
use std::sync::Arc;

/// Wraps another client and retries transient failures with bounded backoff.
///
/// Authentication and request-shape errors are returned on the first attempt.
pub struct RetryingClient {
    inner: Arc<dyn LLMClient>,
    policy: RetryPolicy,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn LLMClient>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl LLMClient for RetryingClient {
    async fn chat(&self, request: LLMRequest) -> Result<LLMResponse, BackendError> {
        retry_with_backoff(
            &self.policy,
            "completion",
            BackendError::is_transient,
            || self.inner.chat(request.clone()),
        )
        .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model_info(&self) -> Option<String> {
        self.inner.model_info()
    }
}
