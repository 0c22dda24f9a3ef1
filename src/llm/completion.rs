use super::client::LLMClient;
use super::types::LLMRequest;
use crate::error::PipelineError;
use crate::tools::{ToolInvocation, ToolRegistry};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A tool call dropped because it did not match its stage's schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedToolCall {
    pub name: String,
    pub reason: String,
}

/// Result of a single completion: free text, validated tool invocations, or
/// both.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: String,
    pub invocations: Vec<ToolInvocation>,
    pub rejected: Vec<RejectedToolCall>,
}

impl Completion {
    /// True when the model answered without any usable tool invocation
    pub fn is_text(&self) -> bool {
        self.invocations.is_empty()
    }
}

/// Sends one prompt with a stage's tool set and validates what comes back.
///
/// Exactly one `chat` is issued per [`complete`](Self::complete). Retrying,
/// if any, belongs to the wrapped client.
#[derive(Clone)]
pub struct CompletionClient {
    llm: Arc<dyn LLMClient>,
    temperature: Option<f32>,
}

impl CompletionClient {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self {
            llm,
            temperature: None,
        }
    }

    /// Sampling temperature sent with every request; provider default when unset
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn backend_name(&self) -> &str {
        self.llm.name()
    }

    pub async fn complete(
        &self,
        prompt: &str,
        registry: &ToolRegistry,
    ) -> Result<Completion, PipelineError> {
        let mut request = LLMRequest::prompt(prompt).with_tools(registry.as_tool_definitions());
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }

        debug!(
            backend = self.llm.name(),
            stage = %registry.stage(),
            prompt_bytes = prompt.len(),
            tools = ?registry.tool_names(),
            "Sending completion request"
        );

        let response = self.llm.chat(request).await?;

        let mut completion = Completion {
            text: response.text,
            ..Completion::default()
        };

        for call in &response.tool_calls {
            match registry.validate(call) {
                Ok(invocation) => completion.invocations.push(invocation),
                Err(err) => {
                    warn!(
                        stage = %registry.stage(),
                        tool = %err.tool,
                        reason = %err.reason,
                        "Dropping malformed tool call"
                    );
                    completion.rejected.push(RejectedToolCall {
                        name: err.tool,
                        reason: err.reason,
                    });
                }
            }
        }

        info!(
            stage = %registry.stage(),
            invocations = completion.invocations.len(),
            rejected = completion.rejected.len(),
            elapsed_ms = response.elapsed.as_millis() as u64,
            "Completion received"
        );

        Ok(completion)
    }
}

impl std::fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionClient")
            .field("backend", &self.llm.name())
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{BackendError, MockLLMClient, MockResponse, ToolCall};
    use crate::tools::Stage;
    use serde_json::json;

    #[tokio::test]
    async fn test_text_only_completion() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::text("I could not find any features."));
        let client = CompletionClient::new(mock.clone());

        let completion = client
            .complete("analyze", &ToolRegistry::for_stage(Stage::FeatureExtraction))
            .await
            .unwrap();

        assert!(completion.is_text());
        assert_eq!(completion.text, "I could not find any features.");
    }

    #[tokio::test]
    async fn test_request_carries_stage_tools() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::text("ok"));
        let client = CompletionClient::new(mock.clone());

        client
            .complete("edit", &ToolRegistry::for_stage(Stage::EditApplication))
            .await
            .unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        let names: Vec<_> = requests[0].tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["update_file", "add_file"]);
        assert_eq!(requests[0].prompt, "edit");
        assert_eq!(requests[0].temperature, None);
    }

    #[tokio::test]
    async fn test_configured_temperature_is_sent() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::text("ok"));
        let client = CompletionClient::new(mock.clone()).with_temperature(0.1);

        client
            .complete("link", &ToolRegistry::for_stage(Stage::FeatureConsolidation))
            .await
            .unwrap();
        assert_eq!(mock.requests()[0].temperature, Some(0.1));
    }

    #[tokio::test]
    async fn test_malformed_calls_are_dropped_not_fatal() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::with_tool_calls(vec![
            MockLLMClient::add_feature_call("Login", "Sign in", "OAuth flow", &["src/auth.rs"]),
            ToolCall::new("add_feature", json!({ "name": "Half a feature" })),
            ToolCall::new("delete_feature", json!({ "feature_id": "x" })),
            MockLLMClient::update_feature_call("abc", json!({ "name": "Renamed" })),
        ]));
        let client = CompletionClient::new(mock);

        let completion = client
            .complete("analyze", &ToolRegistry::for_stage(Stage::FeatureExtraction))
            .await
            .unwrap();

        assert!(!completion.is_text());
        let names: Vec<_> = completion.invocations.iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["add_feature", "update_feature"]);
        assert_eq!(completion.rejected.len(), 2);
        assert_eq!(completion.rejected[1].name, "delete_feature");
    }

    #[tokio::test]
    async fn test_backend_error_propagates() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::error(BackendError::AuthenticationError {
            message: "invalid key".to_string(),
        }));
        let client = CompletionClient::new(mock);

        let err = client
            .complete("analyze", &ToolRegistry::for_stage(Stage::FeatureExtraction))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::UpstreamAuth);
    }
}
