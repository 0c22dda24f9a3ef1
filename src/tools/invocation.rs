//! Typed tool invocations
//!
//! Raw [`ToolCall`](crate::llm::ToolCall)s carry an untyped argument map. Once a
//! call passes its stage's schema it is converted into one of these variants,
//! so downstream handlers never look at loose JSON.

use crate::github::types::canonical_path;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A tool call that could not be matched to a registered signature
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed tool call '{tool}': {reason}")]
pub struct MalformedToolCall {
    pub tool: String,
    pub reason: String,
}

impl MalformedToolCall {
    pub fn new(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddFeatureArgs {
    /// Identity proposed by the model; usually absent
    #[serde(default)]
    pub feature_id: Option<String>,
    pub name: String,
    pub user_description: String,
    pub technical_description: String,
    pub file_references: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateFeatureArgs {
    pub feature_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub user_description: Option<String>,
    #[serde(default)]
    pub technical_description: Option<String>,
    #[serde(default)]
    pub file_references: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkFeaturesArgs {
    pub feature_id: String,
    pub neighbor_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileArgs {
    /// Repository-relative path
    pub filename: String,
    pub content: String,
}

/// A validated tool invocation, one variant per registered tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocation {
    AddFeature(AddFeatureArgs),
    UpdateFeature(UpdateFeatureArgs),
    LinkFeatures(LinkFeaturesArgs),
    UpdateFile(FileArgs),
    AddFile(FileArgs),
}

impl ToolInvocation {
    pub fn name(&self) -> &'static str {
        match self {
            ToolInvocation::AddFeature(_) => "add_feature",
            ToolInvocation::UpdateFeature(_) => "update_feature",
            ToolInvocation::LinkFeatures(_) => "link_features",
            ToolInvocation::UpdateFile(_) => "update_file",
            ToolInvocation::AddFile(_) => "add_file",
        }
    }

    /// File payload for the edit-application tools
    pub fn as_file_write(&self) -> Option<&FileArgs> {
        match self {
            ToolInvocation::UpdateFile(args) | ToolInvocation::AddFile(args) => Some(args),
            _ => None,
        }
    }

    /// Builds the typed variant for `name`. The caller has already checked
    /// the arguments against the tool's schema.
    pub(crate) fn decode(name: &str, arguments: serde_json::Value) -> Result<Self, MalformedToolCall> {
        let arguments = strip_nulls(arguments);
        let invocation = match name {
            "add_feature" => serde_json::from_value(arguments).map(ToolInvocation::AddFeature),
            "update_feature" => {
                serde_json::from_value(arguments).map(ToolInvocation::UpdateFeature)
            }
            "link_features" => serde_json::from_value(arguments).map(ToolInvocation::LinkFeatures),
            "update_file" => serde_json::from_value(arguments).map(ToolInvocation::UpdateFile),
            "add_file" => serde_json::from_value(arguments).map(ToolInvocation::AddFile),
            other => return Err(MalformedToolCall::new(other, "no typed form for this tool")),
        }
        .map_err(|e| MalformedToolCall::new(name, e.to_string()))?;

        invocation.check_semantics()?;
        Ok(invocation)
    }

    fn check_semantics(&self) -> Result<(), MalformedToolCall> {
        match self {
            ToolInvocation::UpdateFeature(args) if args.feature_id.trim().is_empty() => Err(
                MalformedToolCall::new(self.name(), "feature_id must not be empty"),
            ),
            ToolInvocation::LinkFeatures(args) if args.feature_id.trim().is_empty() => Err(
                MalformedToolCall::new(self.name(), "feature_id must not be empty"),
            ),
            ToolInvocation::UpdateFile(args) | ToolInvocation::AddFile(args) => {
                validate_repo_path(&args.filename)
                    .map_err(|reason| MalformedToolCall::new(self.name(), reason))
            }
            _ => Ok(()),
        }
    }
}

/// Optional parameters may arrive as explicit `null`; treat them as absent.
fn strip_nulls(arguments: serde_json::Value) -> serde_json::Value {
    match arguments {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter().filter(|(_, v)| !v.is_null()).collect(),
        ),
        other => other,
    }
}

fn validate_repo_path(path: &str) -> Result<(), String> {
    if canonical_path(path.trim()).is_empty() {
        return Err("filename must not be empty".to_string());
    }
    if path.starts_with('/') {
        return Err(format!("filename '{}' must be repository-relative", path));
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(format!("filename '{}' escapes the repository root", path));
    }
    Ok(())
}
