//! Tool schema registry
//!
//! Declares, per pipeline stage, which tools the model may call and validates
//! the calls it makes.

use super::invocation::{MalformedToolCall, ToolInvocation};
use super::schema::{ParamKind, ParamSchema, ToolSchema};
use crate::llm::{ToolCall, ToolDefinition};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage a completion belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    FeatureExtraction,
    FeatureConsolidation,
    EditApplication,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::FeatureExtraction => "feature_extraction",
            Stage::FeatureConsolidation => "feature_consolidation",
            Stage::EditApplication => "edit_application",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tool signatures available in one stage
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    stage: Stage,
    tools: Vec<ToolSchema>,
}

impl ToolRegistry {
    pub fn for_stage(stage: Stage) -> Self {
        let tools = match stage {
            Stage::FeatureExtraction => vec![add_feature_schema(), update_feature_schema()],
            Stage::FeatureConsolidation => vec![link_features_schema()],
            Stage::EditApplication => vec![update_file_schema(), add_file_schema()],
        };
        Self { stage, tools }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn as_tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(ToolSchema::to_definition).collect()
    }

    pub fn get_tool(&self, name: &str) -> Option<&ToolSchema> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Matches a raw call against this stage's signatures and converts it to
    /// its typed form.
    pub fn validate(&self, call: &ToolCall) -> Result<ToolInvocation, MalformedToolCall> {
        let schema = self.get_tool(&call.name).ok_or_else(|| {
            MalformedToolCall::new(
                &call.name,
                format!("tool is not registered for stage {}", self.stage),
            )
        })?;

        schema
            .check(&call.arguments)
            .map_err(|reason| MalformedToolCall::new(&call.name, reason))?;

        ToolInvocation::decode(schema.name, call.arguments.clone())
    }
}

fn feature_field_params(required: bool) -> Vec<ParamSchema> {
    let make: fn(&'static str, ParamKind, &'static str) -> ParamSchema = if required {
        ParamSchema::required
    } else {
        ParamSchema::optional
    };
    vec![
        make("name", ParamKind::String, "Feature name"),
        make(
            "user_description",
            ParamKind::String,
            "Non-technical description",
        ),
        make(
            "technical_description",
            ParamKind::String,
            "Technical description",
        ),
        make(
            "file_references",
            ParamKind::StringArray,
            "List of repository-relative file paths",
        ),
    ]
}

fn add_feature_schema() -> ToolSchema {
    let mut params = feature_field_params(true);
    params.push(ParamSchema::optional(
        "feature_id",
        ParamKind::String,
        "Stable identifier to assign; pass it to later update_feature calls. Omit to let the system choose",
    ));
    ToolSchema {
        name: "add_feature",
        description: "Add a new feature to the feature map",
        params,
    }
}

fn update_feature_schema() -> ToolSchema {
    let mut params = vec![ParamSchema::required(
        "feature_id",
        ParamKind::String,
        "ID of feature to update",
    )];
    params.extend(feature_field_params(false));
    ToolSchema {
        name: "update_feature",
        description: "Update an existing feature in the feature map; omitted fields are kept",
        params,
    }
}

fn link_features_schema() -> ToolSchema {
    ToolSchema {
        name: "link_features",
        description: "Mark features as related. Links are undirected.",
        params: vec![
            ParamSchema::required("feature_id", ParamKind::String, "ID of the feature"),
            ParamSchema::required(
                "neighbor_ids",
                ParamKind::StringArray,
                "IDs of features related to it",
            ),
        ],
    }
}

fn update_file_schema() -> ToolSchema {
    ToolSchema {
        name: "update_file",
        description: "Replace the full contents of an existing file in the repository",
        params: vec![
            ParamSchema::required(
                "filename",
                ParamKind::String,
                "Repository-relative path of the file",
            ),
            ParamSchema::required("content", ParamKind::String, "The complete new file content"),
        ],
    }
}

fn add_file_schema() -> ToolSchema {
    ToolSchema {
        name: "add_file",
        description: "Create a new file in the repository",
        params: vec![
            ParamSchema::required(
                "filename",
                ParamKind::String,
                "Repository-relative path of the new file",
            ),
            ParamSchema::required("content", ParamKind::String, "The complete file content"),
        ],
    }
}
