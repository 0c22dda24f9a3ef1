//! featuremap - AI-synthesized feature maps for source repositories
//!
//! Reads every text file of a GitHub repository, asks a completion model to
//! describe the repository's user-facing features through structured tool
//! calls, links related features, and stores the result per user. The same
//! machinery turns natural-language change requests into per-file commits.
//!
//! # Core Concepts
//!
//! - **Tools**: the fixed set of structured calls the model may make
//!   (`add_feature`, `update_feature`, `link_features`, `add_file`, `update_file`),
//!   validated against their schemas before anything acts on them
//! - **Feature map**: features keyed by a stable id, with undirected neighbor links
//! - **Write-back**: look up a file's current version token, then commit against it;
//!   a stale token is a conflict, never an overwrite
//! - **Workflows**: long-running jobs on a detached execution service, awaited
//!   by polling
//!
//! # Example Usage
//!
//! ```no_run
//! use featuremap::{synthesize_feature_map, FeatureMapConfig, PipelineContext, RepoCoordinates};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FeatureMapConfig::default();
//! let ctx = PipelineContext::new(config.create_llm_client()?, Arc::new(config.create_host()?))
//!     .with_config(config.pipeline_config());
//!
//! let report = synthesize_feature_map(&ctx, &RepoCoordinates::parse("octo/shop")?).await?;
//! println!("{} features", report.feature_map.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Project Structure
//!
//! - [`llm`]: completion client seam, genai transport, retries, mock
//! - [`tools`]: tool schemas and invocation validation
//! - [`features`]: feature model, identity strategies, graph builder
//! - [`github`]: repository host seam, fetcher, write-back
//! - [`workflow`]: execution service and status poller
//! - [`store`]: per-user feature map documents
//! - [`pipeline`]: synthesis and change-request orchestration

pub mod cli;
pub mod config;
pub mod error;
pub mod features;
pub mod github;
pub mod llm;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod store;
pub mod template;
pub mod tools;
pub mod util;
pub mod workflow;

pub use config::{ConfigError, FeatureMapConfig};
pub use error::{ErrorKind, ErrorReport, PipelineError};
pub use features::{Feature, FeatureGraphBuilder, FeatureId, FeatureMap, IdentityStrategy};
pub use github::{
    GitHubClient, HostError, MockRepositoryHost, RepoCoordinates, RepositoryHost, WriteBack,
    WriteBackError,
};
pub use llm::{CompletionClient, GenAIClient, LLMClient, MockLLMClient};
pub use pipeline::{
    apply_change_request, synthesize_feature_map, ChangeReport, PipelineConfig, PipelineContext,
    SynthesisReport,
};
pub use progress::{LoggingHandler, NoOpHandler, ProgressEvent, ProgressHandler};
pub use store::{FeatureMapStore, FileStore, MemoryStore};
pub use template::{render_template, TemplateParams};
pub use tools::{Stage, ToolInvocation, ToolRegistry};
pub use util::{init_from_env, init_logging, LogFormat, LoggingConfig};
pub use workflow::{
    ExecutionService, ExecutionStatus, PollConfig, StatusPoller, WorkflowError, WorkflowResult,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
