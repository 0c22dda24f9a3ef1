//! Pipeline-level errors and the user-facing error taxonomy

use crate::config::ConfigError;
use crate::features::DocumentError;
use crate::github::{HostError, WriteBackError};
use crate::llm::BackendError;
use crate::store::StoreError;
use crate::workflow::WorkflowError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Classification every fatal condition is reported under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or invalid credentials or identifiers
    Configuration,
    /// The AI service or the repository host rejected the credential
    UpstreamAuth,
    NotFound,
    /// A remote file changed since it was read
    ConcurrencyConflict,
    MalformedToolCall,
    /// Network failure, rate limit, or server-side error upstream
    UpstreamUnavailable,
    Internal,
}

impl ErrorKind {
    /// Failures worth an automatic backoff-and-retry inside one request
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::UpstreamUnavailable)
    }

    /// Whether resubmitting the same request may succeed without changes.
    /// A conflict qualifies: the resubmission looks the file up again.
    pub fn is_resubmittable(&self) -> bool {
        matches!(
            self,
            ErrorKind::UpstreamUnavailable | ErrorKind::ConcurrencyConflict
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::UpstreamAuth => "upstream_auth",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ConcurrencyConflict => "concurrency_conflict",
            ErrorKind::MalformedToolCall => "malformed_tool_call",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&HostError> for ErrorKind {
    fn from(err: &HostError) -> Self {
        match err {
            HostError::Auth { .. } => ErrorKind::UpstreamAuth,
            HostError::NotFound { .. } => ErrorKind::NotFound,
            HostError::Conflict { .. } => ErrorKind::ConcurrencyConflict,
            HostError::Unavailable { .. } => ErrorKind::UpstreamUnavailable,
            HostError::Rejected { .. } | HostError::InvalidResponse { .. } => ErrorKind::Internal,
        }
    }
}

impl From<&BackendError> for ErrorKind {
    fn from(err: &BackendError) -> Self {
        match err {
            BackendError::AuthenticationError { .. } => ErrorKind::UpstreamAuth,
            BackendError::ConfigurationError { .. } => ErrorKind::Configuration,
            e if e.is_transient() => ErrorKind::UpstreamUnavailable,
            _ => ErrorKind::Internal,
        }
    }
}

impl From<&WriteBackError> for ErrorKind {
    fn from(err: &WriteBackError) -> Self {
        match err {
            WriteBackError::Conflict { .. } => ErrorKind::ConcurrencyConflict,
            WriteBackError::LookupFailed { source, .. }
            | WriteBackError::CommitFailed { source, .. } => source.into(),
        }
    }
}

impl From<&WorkflowError> for ErrorKind {
    fn from(err: &WorkflowError) -> Self {
        match err {
            WorkflowError::NotConfigured => ErrorKind::Configuration,
            WorkflowError::Auth { .. } => ErrorKind::UpstreamAuth,
            WorkflowError::Unavailable { .. } | WorkflowError::TimedOut { .. } => {
                ErrorKind::UpstreamUnavailable
            }
            WorkflowError::Rejected { .. }
            | WorkflowError::Failed { .. }
            | WorkflowError::InvalidOutput { .. } => ErrorKind::Internal,
        }
    }
}

/// Errors that abort a whole pipeline request
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("AI completion failed: {0}")]
    Backend(#[from] BackendError),

    #[error("repository access failed: {0}")]
    Host(#[from] HostError),

    #[error(transparent)]
    WriteBack(#[from] WriteBackError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("feature map storage failed: {0}")]
    Store(#[from] StoreError),

    /// A stored or generated feature map document could not be (de)serialized
    #[error("invalid feature map document: {0}")]
    Document(#[from] DocumentError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Config(_) => ErrorKind::Configuration,
            PipelineError::Backend(e) => e.into(),
            PipelineError::Host(e) => e.into(),
            PipelineError::WriteBack(e) => e.into(),
            PipelineError::Workflow(e) => e.into(),
            PipelineError::Store(_) | PipelineError::Document(_) => ErrorKind::Internal,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::new(self.kind(), self.to_string())
    }
}

/// Structured form of a failure, as shown to users
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    /// Sending the same request again may succeed
    pub resubmittable: bool,
}

impl ErrorReport {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            resubmittable: kind.is_resubmittable(),
        }
    }
}

impl From<&WriteBackError> for ErrorReport {
    fn from(err: &WriteBackError) -> Self {
        Self::new(err.into(), err.to_string())
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}
