//! Asynchronous execution service seam

use super::types::{ExecutionId, ExecutionSnapshot, WorkflowError};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Starts detached jobs and reports their status
#[async_trait]
pub trait ExecutionService: Send + Sync {
    async fn start(&self, input: &str, workflow_type: &str) -> Result<ExecutionId, WorkflowError>;

    async fn status(&self, id: &ExecutionId) -> Result<ExecutionSnapshot, WorkflowError>;

    fn name(&self) -> &str;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest<'a> {
    input: &'a str,
    workflow_type: &'a str,
}

/// Execution service reached over HTTP.
///
/// `POST {base}/workflows` starts a job and answers with `executionArn` (or
/// `executionId`); `GET {base}/workflows/status?executionArn=...` answers with
/// a status payload.
pub struct HttpExecutionService {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl HttpExecutionService {
    pub fn new(base: &str, token: Option<String>, timeout: Duration) -> Result<Self, WorkflowError> {
        let base = Url::parse(base).map_err(|e| WorkflowError::Rejected {
            status: 0,
            message: format!("invalid execution service URL '{}': {}", base, e),
        })?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WorkflowError::Unavailable {
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            base,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(segments);
        }
        url
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn read(response: reqwest::Response) -> Result<Value, WorkflowError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<Value>()
                .await
                .map_err(|e| WorkflowError::InvalidOutput {
                    message: e.to_string(),
                });
        }

        let message = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => WorkflowError::Auth { message },
            StatusCode::TOO_MANY_REQUESTS => WorkflowError::Unavailable { message },
            s if s.is_server_error() => WorkflowError::Unavailable {
                message: format!("{}: {}", s, message),
            },
            s => WorkflowError::Rejected {
                status: s.as_u16(),
                message,
            },
        })
    }
}

fn transport(err: reqwest::Error) -> WorkflowError {
    WorkflowError::Unavailable {
        message: err.to_string(),
    }
}

/// Some deployments wrap the payload in `{"data": ...}`
fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut object) if object.len() == 1 && object.contains_key("data") => {
            object.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

#[async_trait]
impl ExecutionService for HttpExecutionService {
    async fn start(&self, input: &str, workflow_type: &str) -> Result<ExecutionId, WorkflowError> {
        let request = self
            .http
            .post(self.url(&["workflows"]))
            .json(&StartRequest {
                input,
                workflow_type,
            });
        let response = self.authorize(request).send().await.map_err(transport)?;
        let body = unwrap_data(Self::read(response).await?);

        let id = ["executionArn", "executionId"]
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_str))
            .ok_or_else(|| WorkflowError::InvalidOutput {
                message: "start response has no execution id".to_string(),
            })?;

        debug!(execution_id = id, workflow_type, "Started workflow");
        Ok(ExecutionId::new(id))
    }

    async fn status(&self, id: &ExecutionId) -> Result<ExecutionSnapshot, WorkflowError> {
        let mut url = self.url(&["workflows", "status"]);
        url.query_pairs_mut().append_pair("executionArn", id.as_str());

        let response = self
            .authorize(self.http.get(url))
            .send()
            .await
            .map_err(transport)?;
        ExecutionSnapshot::from_payload(unwrap_data(Self::read(response).await?))
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Scripted execution service for tests
#[derive(Default)]
pub struct MockExecutionService {
    statuses: Mutex<VecDeque<Result<ExecutionSnapshot, WorkflowError>>>,
    started: Mutex<Vec<(String, String)>>,
    queries: Mutex<usize>,
}

impl MockExecutionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the answer to the next status query
    pub fn push_status(&self, status: Result<ExecutionSnapshot, WorkflowError>) {
        self.statuses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(status);
    }

    pub fn status_queries(&self) -> usize {
        *self.queries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// `(input, workflow_type)` of every started job
    pub fn started(&self) -> Vec<(String, String)> {
        self.started
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ExecutionService for MockExecutionService {
    async fn start(&self, input: &str, workflow_type: &str) -> Result<ExecutionId, WorkflowError> {
        let mut started = self.started.lock().unwrap_or_else(|e| e.into_inner());
        started.push((input.to_string(), workflow_type.to_string()));
        Ok(ExecutionId::new(format!("exec-{}", started.len())))
    }

    async fn status(&self, _id: &ExecutionId) -> Result<ExecutionSnapshot, WorkflowError> {
        *self.queries.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        self.statuses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Ok(ExecutionSnapshot::running()))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
