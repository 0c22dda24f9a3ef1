//! Completion backend errors

use thiserror::Error;

/// Failure of a single call to the completion service
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("{}", api_error_message(.message, .status))]
    ApiError { message: String, status: Option<u16> },

    #[error("Authentication failed: {message}")]
    AuthenticationError { message: String },

    #[error("Request timed out after {seconds} seconds")]
    TimeoutError { seconds: u64 },

    #[error("Rate limit exceeded")]
    RateLimitError,

    /// The model answered with something the client cannot read
    #[error("Invalid response from model: {message}")]
    InvalidResponse { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("{message}")]
    Other { message: String },
}

fn api_error_message(message: &str, status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("API error ({}): {}", code, message),
        None => format!("API error: {}", message),
    }
}

impl BackendError {
    /// Whether a later attempt of the same request could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::TimeoutError { .. }
            | BackendError::RateLimitError
            | BackendError::NetworkError { .. } => true,
            BackendError::ApiError { status, .. } => matches!(status, Some(code) if *code >= 500),
            _ => false,
        }
    }

    /// Classifies a provider failure that arrives as plain text.
    ///
    /// genai reports HTTP failures as messages, so the status is recovered
    /// from the text when one is present.
    pub fn from_provider_message(provider: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        let mentions = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if mentions(&["401", "403", "unauthorized", "api key"]) {
            return BackendError::AuthenticationError {
                message: format!("{} rejected the credential: {}", provider, message),
            };
        }
        if mentions(&["429", "rate limit", "quota"]) {
            return BackendError::RateLimitError;
        }

        let status = [500u16, 502, 503, 504]
            .into_iter()
            .find(|code| lower.contains(&code.to_string()));

        if status.is_none() && mentions(&["connect", "dns", "reset"]) {
            return BackendError::NetworkError { message };
        }

        BackendError::ApiError {
            message: format!("{} request failed: {}", provider, message),
            status,
        }
    }
}
