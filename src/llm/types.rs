//! Provider-independent shapes exchanged with an [`LLMClient`](super::LLMClient)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// A structured call emitted by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned identifier, when the provider sends one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    pub name: String,
    /// Untyped arguments; validated later against the stage's schemas
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            call_id: None,
            name: name.into(),
            arguments,
        }
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }
}

/// A tool offered to the model, with its parameters as JSON Schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One completion call: a fully rendered prompt plus the tools the model may use
#[derive(Debug, Clone)]
pub struct LLMRequest {
    pub prompt: String,
    pub tools: Vec<ToolDefinition>,
    pub temperature: Option<f32>,
}

impl LLMRequest {
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            tools: Vec::new(),
            temperature: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn offers_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }
}

/// What came back: free text, tool calls in emission order, or both
#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub elapsed: Duration,
}

impl LLMResponse {
    pub fn new(text: impl Into<String>, tool_calls: Vec<ToolCall>, elapsed: Duration) -> Self {
        Self {
            text: text.into(),
            tool_calls,
            elapsed,
        }
    }

    pub fn text(text: impl Into<String>, elapsed: Duration) -> Self {
        Self::new(text, Vec::new(), elapsed)
    }

    pub fn is_text_only(&self) -> bool {
        self.tool_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_builder() {
        let request = LLMRequest::prompt("map this repo")
            .with_tools(vec![ToolDefinition {
                name: "add_feature".to_string(),
                description: "Record a feature".to_string(),
                parameters: json!({ "type": "object" }),
            }])
            .with_temperature(0.2);

        assert_eq!(request.prompt, "map this repo");
        assert_eq!(request.temperature, Some(0.2));
        assert!(request.offers_tool("add_feature"));
        assert!(!request.offers_tool("update_file"));
    }

    #[test]
    fn test_tool_call_id_is_optional_on_the_wire() {
        let call = ToolCall::new("link_features", json!({ "feature_id": "a" }));
        let encoded = serde_json::to_value(&call).unwrap();
        assert!(encoded.get("call_id").is_none());

        let decoded: ToolCall =
            serde_json::from_value(json!({ "name": "add_file", "arguments": {} })).unwrap();
        assert_eq!(decoded.call_id, None);

        let with_id = call.with_call_id("call_7");
        assert_eq!(with_id.call_id.as_deref(), Some("call_7"));
    }

    #[test]
    fn test_text_only_response() {
        let response = LLMResponse::text("nothing found", Duration::from_millis(100));
        assert!(response.is_text_only());

        let response = LLMResponse::new(
            "",
            vec![ToolCall::new("add_feature", json!({}))],
            Duration::from_millis(50),
        );
        assert!(!response.is_text_only());
    }
}
