//! Built-in prompt templates, one per pipeline stage

use crate::tools::Stage;

/// Parameter: `repo` (the serialized repository corpus)
pub const FEATURE_EXTRACTION: &str = r#"You are analyzing a software repository to build a feature map.

A feature is a user-visible unit of functionality. For every feature you find,
call `add_feature` once with:
- name: a short label
- user_description: what it does, for a non-technical reader
- technical_description: how it is implemented
- file_references: repository-relative paths of the files involved
- feature_id (optional): a short stable id of your choosing, such as `checkout`

If you later realize a feature you already added needs a correction, call
`update_feature` with the feature_id you gave it in `add_feature` and only the
fields that change. A feature added without a feature_id cannot be updated.
Do not answer in prose; use the tools.

The repository follows. Each file starts with a `=== path ===` header.

{{ repo }}
"#;

/// Parameter: `features` (the extracted feature map document)
pub const FEATURE_CONSOLIDATION: &str = r#"Below is a feature map extracted from a repository, as JSON keyed by feature id.

Identify which features are related: they share files, one depends on the
other, or a user would think of them together. For each feature that has
related features, call `link_features` with its id and the ids of the
related features. Links are undirected; do not link a feature to itself.
Only use ids that appear in the map. Do not change anything else.

{{ features }}
"#;

/// Parameters: `requestedFeature`, `featureMap`, `sourceCode`
pub const EDIT_APPLICATION: &str = r#"You are implementing a change request in a repository.

Change request:
{{ requestedFeature }}

Feature map of the repository (JSON keyed by feature id):
{{ featureMap }}

Use `update_file` to replace the complete content of an existing file and
`add_file` to create a new one. Always send the whole file, never a diff.
Paths are relative to the repository root. Only touch files the change needs.

Repository source. Each file starts with a `=== path ===` header.

{{ sourceCode }}
"#;

impl Stage {
    /// Built-in prompt template for this stage
    pub fn prompt_template(&self) -> &'static str {
        match self {
            Stage::FeatureExtraction => FEATURE_EXTRACTION,
            Stage::FeatureConsolidation => FEATURE_CONSOLIDATION,
            Stage::EditApplication => EDIT_APPLICATION,
        }
    }
}
