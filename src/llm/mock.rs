use super::client::LLMClient;
use super::error::BackendError;
use super::types::{LLMRequest, LLMResponse, ToolCall};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// One scripted answer
#[derive(Debug, Clone)]
pub enum MockResponse {
    Text(String),
    ToolCalls(Vec<ToolCall>),
    Error(BackendError),
}

impl MockResponse {
    pub fn text(text: impl Into<String>) -> Self {
        MockResponse::Text(text.into())
    }

    pub fn with_tool_calls(calls: Vec<ToolCall>) -> Self {
        MockResponse::ToolCalls(calls)
    }

    pub fn error(error: BackendError) -> Self {
        MockResponse::Error(error)
    }
}

#[derive(Default)]
struct Script {
    queue: VecDeque<MockResponse>,
    seen: Vec<LLMRequest>,
}

/// Scripted completion client for tests.
///
/// Answers are served first in, first out. Every request is kept so tests can
/// look at the rendered prompt and the offered tool set.
pub struct MockLLMClient {
    script: Mutex<Script>,
    name: String,
}

impl MockLLMClient {
    pub fn new() -> Self {
        Self::with_name("MockLLM")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(Script::default()),
            name: name.into(),
        }
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_response(&self, response: MockResponse) {
        self.script().queue.push_back(response);
    }

    pub fn add_responses(&self, responses: impl IntoIterator<Item = MockResponse>) {
        self.script().queue.extend(responses);
    }

    pub fn remaining_responses(&self) -> usize {
        self.script().queue.len()
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Vec<LLMRequest> {
        self.script().seen.clone()
    }

    pub fn add_feature_call(
        name: &str,
        user_description: &str,
        technical_description: &str,
        file_references: &[&str],
    ) -> ToolCall {
        ToolCall::new(
            "add_feature",
            json!({
                "name": name,
                "user_description": user_description,
                "technical_description": technical_description,
                "file_references": file_references,
            }),
        )
    }

    /// `fields` is merged next to `feature_id`
    pub fn update_feature_call(feature_id: &str, fields: Value) -> ToolCall {
        let mut arguments = json!({ "feature_id": feature_id });
        if let (Some(target), Value::Object(extra)) = (arguments.as_object_mut(), fields) {
            target.extend(extra);
        }
        ToolCall::new("update_feature", arguments)
    }

    pub fn link_features_call(feature_id: &str, neighbor_ids: &[&str]) -> ToolCall {
        ToolCall::new(
            "link_features",
            json!({ "feature_id": feature_id, "neighbor_ids": neighbor_ids }),
        )
    }

    pub fn update_file_call(filename: &str, content: &str) -> ToolCall {
        ToolCall::new(
            "update_file",
            json!({ "filename": filename, "content": content }),
        )
    }

    pub fn add_file_call(filename: &str, content: &str) -> ToolCall {
        ToolCall::new("add_file", json!({ "filename": filename, "content": content }))
    }
}

impl Default for MockLLMClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn chat(&self, request: LLMRequest) -> Result<LLMResponse, BackendError> {
        let next = {
            let mut script = self.script();
            script.seen.push(request);
            script.queue.pop_front()
        };

        let elapsed = Duration::from_millis(10);
        match next {
            Some(MockResponse::Text(text)) => Ok(LLMResponse::text(text, elapsed)),
            Some(MockResponse::ToolCalls(calls)) => Ok(LLMResponse::new("", calls, elapsed)),
            Some(MockResponse::Error(error)) => Err(error),
            None => Err(BackendError::Other {
                message: "MockLLMClient: no scripted response left".to_string(),
            }),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model_info(&self) -> Option<String> {
        Some("mock-model".to_string())
    }
}

impl std::fmt::Debug for MockLLMClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLLMClient")
            .field("name", &self.name)
            .field("remaining_responses", &self.remaining_responses())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serves_script_in_order_and_records_requests() {
        let client = MockLLMClient::new();
        client.add_responses(vec![
            MockResponse::text("Hello!"),
            MockResponse::with_tool_calls(vec![
                MockLLMClient::add_feature_call("Login", "Sign in", "JWT auth", &["src/auth.rs"]),
                MockLLMClient::add_feature_call("Search", "Find things", "Index", &["src/search.rs"]),
            ]),
        ]);

        let first = client.chat(LLMRequest::prompt("hi")).await.unwrap();
        assert_eq!(first.text, "Hello!");
        assert!(first.is_text_only());

        let second = client.chat(LLMRequest::prompt("map")).await.unwrap();
        assert_eq!(second.tool_calls.len(), 2);
        assert_eq!(second.tool_calls[1].arguments["name"], "Search");

        let prompts: Vec<_> = client.requests().into_iter().map(|r| r.prompt).collect();
        assert_eq!(prompts, vec!["hi", "map"]);
    }

    #[tokio::test]
    async fn test_scripted_error_and_exhaustion() {
        let client = MockLLMClient::new();
        client.add_response(MockResponse::error(BackendError::TimeoutError { seconds: 30 }));

        let result = client.chat(LLMRequest::prompt("x")).await;
        assert!(matches!(result, Err(BackendError::TimeoutError { .. })));

        let result = client.chat(LLMRequest::prompt("y")).await;
        assert!(matches!(result, Err(BackendError::Other { .. })));
        assert_eq!(client.requests().len(), 2);
    }

    #[test]
    fn test_update_feature_call_merges_fields() {
        let call = MockLLMClient::update_feature_call("f-1", json!({"name": "Foo"}));
        assert_eq!(call.name, "update_feature");
        assert_eq!(call.arguments["feature_id"], "f-1");
        assert_eq!(call.arguments["name"], "Foo");
    }
}
