//! Tool schema registry and typed tool invocations

pub mod invocation;
pub mod registry;
pub mod schema;

pub use invocation::{
    AddFeatureArgs, FileArgs, LinkFeaturesArgs, MalformedToolCall, ToolInvocation,
    UpdateFeatureArgs,
};
pub use registry::{Stage, ToolRegistry};
pub use schema::{ParamKind, ParamSchema, ToolSchema};
