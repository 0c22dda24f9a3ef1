//! Pipeline context for managing dependencies

use std::sync::Arc;

use crate::features::{IdentityStrategy, UuidIdentity};
use crate::github::{PathLocks, RepositoryHost};
use crate::llm::{CompletionClient, LLMClient};
use crate::progress::{ProgressEvent, ProgressHandler};

use super::config::PipelineConfig;

/// Context that owns all long-lived pipeline dependencies.
///
/// Every collaborator is passed in explicitly, so tests swap in mocks and
/// credentials live only inside the clients that use them.
pub struct PipelineContext {
    pub completion: CompletionClient,

    pub host: Arc<dyn RepositoryHost>,

    /// Assigns ids to features added without one
    pub identity: Arc<dyn IdentityStrategy>,

    pub progress: Option<Arc<dyn ProgressHandler>>,

    pub config: PipelineConfig,

    /// Per-path write locks shared by every change request run on this context
    pub locks: PathLocks,
}

impl PipelineContext {
    pub fn new(llm_client: Arc<dyn LLMClient>, host: Arc<dyn RepositoryHost>) -> Self {
        Self {
            completion: CompletionClient::new(llm_client),
            host,
            identity: Arc::new(UuidIdentity),
            progress: None,
            config: PipelineConfig::default(),
            locks: PathLocks::new(),
        }
    }

    pub fn with_identity(mut self, identity: Arc<dyn IdentityStrategy>) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub(crate) fn emit(&self, event: ProgressEvent) {
        if let Some(handler) = &self.progress {
            handler.on_progress(&event);
        }
    }
}
