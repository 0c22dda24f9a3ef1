//! Completion client backed by the `genai` crate
//!
//! One client speaks to Gemini, OpenAI, Anthropic, Ollama and the other
//! adapters genai knows. Provider, model, credential and timeout are fixed at
//! construction; nothing is read from process globals afterwards except the
//! provider's own key variable when no key was given.

use super::client::LLMClient;
use super::error::BackendError;
use super::types::{LLMRequest, LLMResponse, ToolCall, ToolDefinition};
use async_trait::async_trait;
use genai::adapter::AdapterKind;
use genai::chat::{ChatMessage, ChatOptions, ChatRequest, ChatResponse, Tool};
use genai::resolver::{AuthData, Endpoint, ServiceTargetResolver};
use genai::{Client, ModelIden, ServiceTarget};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct GenAIClient {
    client: Client,
    provider: AdapterKind,
    model: String,
    timeout: Duration,
}

impl GenAIClient {
    /// `api_key` takes precedence over the provider's key variable;
    /// `endpoint` replaces the provider's default base URL.
    pub fn new(
        provider: AdapterKind,
        model: impl Into<String>,
        api_key: Option<String>,
        endpoint: Option<String>,
        timeout: Duration,
    ) -> Self {
        let model = model.into();
        debug!(
            provider = provider.as_str(),
            model = %model,
            custom_endpoint = endpoint.is_some(),
            "Creating genai client"
        );

        let client = Client::builder()
            .with_service_target_resolver(fixed_target(provider, model.clone(), api_key, endpoint))
            .build();

        Self {
            client,
            provider,
            model,
            timeout,
        }
    }

    fn to_genai_request(request: &LLMRequest) -> (ChatRequest, ChatOptions) {
        let tools: Vec<Tool> = request.tools.iter().map(to_genai_tool).collect();
        let chat =
            ChatRequest::new(vec![ChatMessage::user(request.prompt.clone())]).with_tools(tools);

        let mut options = ChatOptions::default();
        if let Some(temperature) = request.temperature {
            options = options.with_temperature(temperature as f64);
        }
        (chat, options)
    }
}

/// Pins every request to one provider and model regardless of the model name
fn fixed_target(
    provider: AdapterKind,
    model: String,
    api_key: Option<String>,
    endpoint: Option<String>,
) -> ServiceTargetResolver {
    ServiceTargetResolver::from_resolver_fn(
        move |target: ServiceTarget| -> Result<ServiceTarget, genai::resolver::Error> {
            let endpoint = endpoint
                .as_ref()
                .map(|url| Endpoint::from_owned(url.clone()))
                .unwrap_or(target.endpoint);

            let auth = match (&api_key, provider.default_key_env_name()) {
                (Some(key), _) => AuthData::from_single(key.clone()),
                (None, Some(var)) => AuthData::from_env(var),
                (None, None) => AuthData::from_single(""),
            };

            Ok(ServiceTarget {
                endpoint,
                auth,
                model: ModelIden::new(provider, &model),
            })
        },
    )
}

fn to_genai_tool(tool: &ToolDefinition) -> Tool {
    Tool::new(&tool.name)
        .with_description(&tool.description)
        .with_schema(tool.parameters.clone())
}

fn from_genai_response(response: ChatResponse, elapsed: Duration) -> LLMResponse {
    let text = response.first_text().unwrap_or_default().to_string();
    let tool_calls = response
        .tool_calls()
        .into_iter()
        .map(|tc| {
            let call = ToolCall::new(tc.fn_name.clone(), tc.fn_arguments.clone());
            if tc.call_id.is_empty() {
                call
            } else {
                call.with_call_id(tc.call_id.clone())
            }
        })
        .collect();
    LLMResponse::new(text, tool_calls, elapsed)
}

#[async_trait]
impl LLMClient for GenAIClient {
    async fn chat(&self, request: LLMRequest) -> Result<LLMResponse, BackendError> {
        let started = Instant::now();
        let (chat, options) = Self::to_genai_request(&request);

        let call = self.client.exec_chat(&self.model, chat, Some(&options));
        let response = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                let err =
                    BackendError::from_provider_message(self.provider.as_str(), e.to_string());
                warn!(provider = self.provider.as_str(), error = %err, "Completion failed");
                return Err(err);
            }
            Err(_) => {
                warn!(
                    provider = self.provider.as_str(),
                    timeout_secs = self.timeout.as_secs(),
                    "Completion timed out"
                );
                return Err(BackendError::TimeoutError {
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        let response = from_genai_response(response, started.elapsed());
        debug!(
            provider = self.provider.as_str(),
            tool_calls = response.tool_calls.len(),
            elapsed_ms = response.elapsed.as_millis() as u64,
            "Completion received"
        );
        Ok(response)
    }

    fn name(&self) -> &str {
        self.provider.as_str()
    }

    fn model_info(&self) -> Option<String> {
        Some(self.model.clone())
    }
}

impl std::fmt::Debug for GenAIClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenAIClient")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}
