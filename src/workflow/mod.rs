//! Detached workflow executions and the status poller

pub mod poller;
pub mod service;
pub mod types;

pub use poller::{run_workflow, PollConfig, StatusPoller};
pub use service::{ExecutionService, HttpExecutionService, MockExecutionService};
pub use types::{
    ExecutionId, ExecutionSnapshot, ExecutionStatus, WorkflowError, WorkflowResult,
    DEFAULT_SUCCESS_MESSAGE,
};
