//! Feature map model and the graph builder that assembles it from tool calls

pub mod builder;
pub mod identity;
pub mod model;

pub use builder::{apply_consolidation, ApplyOutcome, BuildReport, BuildWarning, FeatureGraphBuilder};
pub use identity::{
    strategy_by_name, IdentityStrategy, SequentialIdentity, SlugIdentity, UuidIdentity,
};
pub use model::{DocumentError, Feature, FeatureId, FeatureMap, FeatureSummary, LinkRefused};
