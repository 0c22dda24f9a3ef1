//! Execution state and normalized results of asynchronous workflows

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

pub const DEFAULT_SUCCESS_MESSAGE: &str = "Workflow completed successfully";

/// Identifier handed out by the execution service when a job starts
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Running,
    Succeeded,
    Failed,
}

impl ExecutionStatus {
    /// Parses a status reported by the service. Other terminal failure states
    /// (`TIMED_OUT`, `ABORTED`) count as `Failed`.
    pub fn parse(status: &str) -> Option<Self> {
        match status.trim().to_ascii_uppercase().as_str() {
            "RUNNING" | "PENDING" => Some(ExecutionStatus::Running),
            "SUCCEEDED" => Some(ExecutionStatus::Succeeded),
            "FAILED" | "TIMED_OUT" | "ABORTED" => Some(ExecutionStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Running => write!(f, "RUNNING"),
            ExecutionStatus::Succeeded => write!(f, "SUCCEEDED"),
            ExecutionStatus::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("no execution service configured (set FEATUREMAP_EXECUTION_API)")]
    NotConfigured,

    #[error("execution service rejected the credential: {message}")]
    Auth { message: String },

    /// Network failure or server-side error while talking to the service
    #[error("execution service unavailable: {message}")]
    Unavailable { message: String },

    #[error("execution service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Workflow execution failed ({execution_id})")]
    Failed { execution_id: ExecutionId },

    #[error("gave up on {execution_id} after {attempts} status queries")]
    TimedOut {
        execution_id: ExecutionId,
        attempts: u32,
    },

    #[error("invalid execution payload: {message}")]
    InvalidOutput { message: String },
}

impl WorkflowError {
    /// Whether the poller should keep querying after this error
    pub fn is_transient(&self) -> bool {
        matches!(self, WorkflowError::Unavailable { .. })
    }
}

/// One status query's view of an execution
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionSnapshot {
    pub status: ExecutionStatus,
    /// Absent until the result has been persisted
    pub output: Option<Value>,
}

impl ExecutionSnapshot {
    pub fn running() -> Self {
        Self {
            status: ExecutionStatus::Running,
            output: None,
        }
    }

    pub fn succeeded(output: Option<Value>) -> Self {
        Self {
            status: ExecutionStatus::Succeeded,
            output,
        }
    }

    pub fn failed() -> Self {
        Self {
            status: ExecutionStatus::Failed,
            output: None,
        }
    }

    /// Reads a status payload, which may itself be a JSON-encoded string
    pub fn from_payload(payload: Value) -> Result<Self, WorkflowError> {
        let payload = match payload {
            Value::String(text) => {
                serde_json::from_str(&text).map_err(|e| WorkflowError::InvalidOutput {
                    message: format!("status payload is not JSON: {}", e),
                })?
            }
            other => other,
        };

        let status_text = payload
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| WorkflowError::InvalidOutput {
                message: "status payload has no status".to_string(),
            })?;
        let status =
            ExecutionStatus::parse(status_text).ok_or_else(|| WorkflowError::InvalidOutput {
                message: format!("unknown execution status '{}'", status_text),
            })?;

        let output = match payload.get("output") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(other) => Some(other.clone()),
        };

        Ok(Self { status, output })
    }
}

/// Normalized result of a successful execution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowResult {
    pub status: ExecutionStatus,
    pub message: String,
    pub commits: Vec<Value>,
}

impl WorkflowResult {
    /// Builds the result from an execution's output, which may be an object
    /// or a JSON-encoded string. A string that is not JSON becomes the message.
    pub fn from_output(output: &Value) -> Self {
        let parsed;
        let output = match output {
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(value) => {
                    parsed = value;
                    &parsed
                }
                Err(_) => {
                    return Self {
                        status: ExecutionStatus::Succeeded,
                        message: text.clone(),
                        commits: Vec::new(),
                    }
                }
            },
            other => other,
        };

        let message = output
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_SUCCESS_MESSAGE)
            .to_string();
        let commits = output
            .get("commits")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Self {
            status: ExecutionStatus::Succeeded,
            message,
            commits,
        }
    }
}
