//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { repo } => {
                info!(repo = %repo, "Starting pipeline");
            }
            ProgressEvent::StageStarted { stage } => {
                info!(stage = %stage, "Starting stage");
            }
            ProgressEvent::StageComplete { stage, duration } => {
                info!(
                    stage = %stage,
                    duration_ms = duration.as_millis(),
                    "Stage complete"
                );
            }
            ProgressEvent::LlmRequestStarted {
                stage,
                prompt_bytes,
            } => {
                debug!(stage = %stage, prompt_bytes, "Sending request to LLM");
            }
            ProgressEvent::LlmResponseReceived {
                stage,
                invocations,
                rejected,
            } => {
                debug!(stage = %stage, invocations, rejected, "Received LLM response");
            }
            ProgressEvent::ToolCallRejected {
                stage,
                tool,
                reason,
            } => {
                warn!(stage = %stage, tool = %tool, reason = %reason, "Tool call rejected");
            }
            ProgressEvent::FileWritten { path, action } => {
                info!(path = %path, action = %action, "File written");
            }
            ProgressEvent::FileWriteFailed { path, error } => {
                warn!(path = %path, error = %error, "File write failed");
            }
            ProgressEvent::Completed { total_time } => {
                info!(total_time_ms = total_time.as_millis(), "Pipeline complete");
            }
            ProgressEvent::Failed { error } => {
                warn!(error = %error, "Pipeline failed");
            }
        }
    }
}
