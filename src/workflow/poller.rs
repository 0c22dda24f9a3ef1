//! Status polling for detached executions

use super::service::ExecutionService;
use super::types::{ExecutionId, ExecutionStatus, WorkflowError, WorkflowResult};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// How often to poll, and for how long
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    /// `None` polls until a terminal state is seen
    pub max_attempts: Option<u32>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: None,
        }
    }
}

/// Queries an execution's status on a fixed interval until it settles.
///
/// `RUNNING`, and `SUCCEEDED` without output yet, keep polling. Transient
/// query failures are logged and polling continues; any other failure, and
/// `FAILED`, end it immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusPoller {
    config: PollConfig,
}

impl StatusPoller {
    pub fn new(config: PollConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub async fn wait(
        &self,
        service: &dyn ExecutionService,
        id: &ExecutionId,
    ) -> Result<WorkflowResult, WorkflowError> {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut attempts: u32 = 0;
        loop {
            ticker.tick().await;
            attempts += 1;

            match service.status(id).await {
                Ok(snapshot) => match (snapshot.status, snapshot.output) {
                    (ExecutionStatus::Failed, _) => {
                        warn!(execution_id = %id, attempts, "Workflow failed");
                        return Err(WorkflowError::Failed {
                            execution_id: id.clone(),
                        });
                    }
                    (ExecutionStatus::Succeeded, Some(output)) => {
                        let result = WorkflowResult::from_output(&output);
                        info!(
                            execution_id = %id,
                            attempts,
                            commits = result.commits.len(),
                            "Workflow succeeded"
                        );
                        return Ok(result);
                    }
                    (status, None) | (status @ ExecutionStatus::Running, _) => {
                        debug!(execution_id = %id, attempt = attempts, status = %status, "Workflow not settled");
                    }
                },
                Err(err) if err.is_transient() => {
                    warn!(execution_id = %id, attempt = attempts, error = %err, "Status query failed, polling again");
                }
                Err(err) => return Err(err),
            }

            // checked before waiting out another interval
            if self.config.max_attempts.is_some_and(|max| attempts >= max) {
                warn!(execution_id = %id, attempts, "Giving up on workflow");
                return Err(WorkflowError::TimedOut {
                    execution_id: id.clone(),
                    attempts,
                });
            }
        }
    }
}

/// Starts a job and waits for it to settle
pub async fn run_workflow(
    service: &dyn ExecutionService,
    poller: &StatusPoller,
    input: &str,
    workflow_type: &str,
) -> Result<WorkflowResult, WorkflowError> {
    let id = service.start(input, workflow_type).await?;
    info!(execution_id = %id, workflow_type, "Workflow started");
    poller.wait(service, &id).await
}
