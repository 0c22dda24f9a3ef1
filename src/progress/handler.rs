//! Progress handler trait and events

use crate::tools::Stage;
use std::time::Duration;

/// Events emitted while a pipeline runs
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Pipeline started for a repository
    Started { repo: String },

    StageStarted { stage: Stage },

    StageComplete { stage: Stage, duration: Duration },

    /// Completion request sent for a stage
    LlmRequestStarted { stage: Stage, prompt_bytes: usize },

    LlmResponseReceived {
        stage: Stage,
        invocations: usize,
        rejected: usize,
    },

    /// A tool call failed validation and was dropped
    ToolCallRejected {
        stage: Stage,
        tool: String,
        reason: String,
    },

    FileWritten { path: String, action: String },

    FileWriteFailed { path: String, error: String },

    /// Pipeline completed successfully
    Completed { total_time: Duration },

    /// Pipeline failed
    Failed { error: String },
}

impl ProgressEvent {
    /// The stage an event belongs to, for stage-scoped events
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ProgressEvent::StageStarted { stage }
            | ProgressEvent::StageComplete { stage, .. }
            | ProgressEvent::LlmRequestStarted { stage, .. }
            | ProgressEvent::LlmResponseReceived { stage, .. }
            | ProgressEvent::ToolCallRejected { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Completed { .. } | ProgressEvent::Failed { .. }
        )
    }
}

/// Receives pipeline events as they happen. Must not block.
pub trait ProgressHandler: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}
