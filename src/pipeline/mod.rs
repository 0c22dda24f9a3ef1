//! Pipeline orchestration
//!
//! Two flows share one [`PipelineContext`]:
//!
//! - synthesis: fetch → extraction prompt → feature graph → consolidation prompt → links
//! - change request: fetch → edit prompt → concurrent per-file write-back
//!
//! Steps within a flow run strictly in sequence.

pub mod change;
pub mod config;
pub mod context;
pub mod persist;
mod stage;
pub mod synthesis;

pub use change::{apply_change_request, ChangeReport, FileChangeReport};
pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use persist::{load_feature_map, persist};
pub use synthesis::{synthesize_feature_map, SynthesisReport};
