//! Completion client abstraction layer
//!
//! A trait-based seam over the AI completion service so the GenAI transport,
//! the retrying wrapper and the scripted mock can be used interchangeably.
//! [`CompletionClient`] sits on top and turns raw responses into validated
//! tool invocations.

mod client;
mod completion;
mod error;
mod genai;
mod mock;
mod retrying;
mod types;

pub use client::LLMClient;
pub use completion::{Completion, CompletionClient, RejectedToolCall};
pub use error::BackendError;
pub use genai::GenAIClient;
pub use mock::{MockLLMClient, MockResponse};
pub use retrying::RetryingClient;
pub use types::{LLMRequest, LLMResponse, ToolCall, ToolDefinition};
