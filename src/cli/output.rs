//! Output formatting for multiple formats
//!
//! JSON and YAML serialize the report types directly. Human output is a
//! compact text rendering meant for a terminal.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::FeatureMapConfig;
use crate::error::ErrorReport;
use crate::features::FeatureMap;
use crate::github::SkipReason;
use crate::pipeline::{ChangeReport, SynthesisReport};
use crate::workflow::WorkflowResult;

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// YAML format
    Yaml,
    /// Human-readable formatted text
    Human,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    fn serialize<T: Serialize>(&self, value: &T, what: &str) -> Result<Option<String>> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(value)
                .map(Some)
                .with_context(|| format!("Failed to serialize {} to JSON", what)),
            OutputFormat::Yaml => serde_yaml::to_string(value)
                .map(Some)
                .with_context(|| format!("Failed to serialize {} to YAML", what)),
            OutputFormat::Human => Ok(None),
        }
    }

    pub fn format_synthesis(&self, report: &SynthesisReport) -> Result<String> {
        if let Some(out) = self.serialize(report, "synthesis report")? {
            return Ok(out);
        }

        let mut output = String::new();
        output.push_str(&format!(
            "\u{2713} Feature Map: {} ({})\n",
            report.repo, report.branch
        ));
        output.push_str(RULE);
        output.push_str("\n\n");
        output.push_str(&format!(
            "Files analyzed: {}   Features: {}\n\n",
            report.files_analyzed,
            report.feature_map.len()
        ));
        output.push_str(&human_feature_map(&report.feature_map));

        if !report.skipped_files.is_empty() {
            output.push_str("\nSkipped files:\n");
            for skipped in &report.skipped_files {
                let reason = match skipped.reason {
                    SkipReason::Binary => "binary",
                    SkipReason::NotUtf8 => "not UTF-8",
                };
                output.push_str(&format!("  - {} ({})\n", skipped.path, reason));
            }
        }

        if !report.warnings.is_empty() || !report.rejected_tool_calls.is_empty() {
            output.push_str("\n\u{26A0} Warnings:\n");
            for warning in &report.warnings {
                output.push_str(&format!("  - {}\n", warning));
            }
            for rejected in &report.rejected_tool_calls {
                output.push_str(&format!(
                    "  - rejected {} call: {}\n",
                    rejected.name, rejected.reason
                ));
            }
        }

        Ok(output)
    }

    /// Formats a stored map as its array view
    pub fn format_feature_map(&self, map: &FeatureMap) -> Result<String> {
        if let Some(out) = self.serialize(&map.to_array_view(), "feature map")? {
            return Ok(out);
        }
        if map.is_empty() {
            return Ok("No feature map stored.\n".to_string());
        }
        Ok(human_feature_map(map))
    }

    pub fn format_change(&self, report: &ChangeReport) -> Result<String> {
        if let Some(out) = self.serialize(report, "change report")? {
            return Ok(out);
        }

        let mut output = String::new();
        let header = if report.all_succeeded() {
            "\u{2713}"
        } else {
            "\u{26A0}"
        };
        output.push_str(&format!(
            "{} Change Request: {} ({})\n",
            header, report.repo, report.branch
        ));
        output.push_str(RULE);
        output.push_str("\n\n");

        if report.files.is_empty() {
            output.push_str("No files were changed.\n");
        }
        for (i, file) in report.files.iter().enumerate() {
            let connector = if i + 1 == report.files.len() {
                "\u{2514}\u{2500}"
            } else {
                "\u{251C}\u{2500}"
            };
            match (&file.action, &file.commit, &file.error) {
                (Some(action), Some(commit), _) => output.push_str(&format!(
                    "{} {} {} ({})\n",
                    connector,
                    action,
                    file.path,
                    short_sha(&commit.sha)
                )),
                (_, _, Some(error)) => output.push_str(&format!(
                    "{} failed {}: {}\n",
                    connector, file.path, error
                )),
                _ => output.push_str(&format!("{} {}\n", connector, file.path)),
            }
        }

        output.push_str(&format!(
            "\n{} committed, {} failed\n",
            report.succeeded(),
            report.failed()
        ));

        if !report.rejected_tool_calls.is_empty() {
            output.push_str("\n\u{26A0} Rejected edits:\n");
            for rejected in &report.rejected_tool_calls {
                output.push_str(&format!("  - {}: {}\n", rejected.name, rejected.reason));
            }
        }
        if !report.model_text.is_empty() {
            output.push_str(&format!("\nModel notes:\n{}\n", report.model_text.trim()));
        }

        Ok(output)
    }

    pub fn format_workflow(&self, result: &WorkflowResult) -> Result<String> {
        if let Some(out) = self.serialize(result, "workflow result")? {
            return Ok(out);
        }

        let mut output = format!("Status: {}\nMessage: {}\n", result.status, result.message);
        if !result.commits.is_empty() {
            output.push_str("Commits:\n");
            for commit in &result.commits {
                output.push_str(&format!("  - {}\n", commit));
            }
        }
        Ok(output)
    }

    pub fn format_config(&self, config: &FeatureMapConfig) -> Result<String> {
        if let Some(out) = self.serialize(&config.to_display_map(), "config")? {
            return Ok(out);
        }
        Ok(config.to_string())
    }

    pub fn format_error(&self, error: &ErrorReport) -> Result<String> {
        if let Some(out) = self.serialize(error, "error")? {
            return Ok(out);
        }
        let mut out = format!("\u{2717} {}\n", error);
        if error.resubmittable {
            out.push_str("  Resubmitting the same request may succeed.\n");
        }
        Ok(out)
    }
}

fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

fn human_feature_map(map: &FeatureMap) -> String {
    let mut output = String::new();
    for feature in map.iter() {
        output.push_str(&format!("{}  [{}]\n", feature.name, feature.id));
        output.push_str(&format!("\u{251C}\u{2500} {}\n", feature.user_summary));
        if !feature.file_references.is_empty() {
            output.push_str(&format!(
                "\u{251C}\u{2500} Files: {}\n",
                feature.file_references.join(", ")
            ));
        }
        let neighbors: Vec<String> = feature
            .neighbors
            .iter()
            .map(|id| {
                map.get(id)
                    .map(|n| n.name.clone())
                    .unwrap_or_else(|| id.to_string())
            })
            .collect();
        if neighbors.is_empty() {
            output.push_str("\u{2514}\u{2500} Related: (none)\n\n");
        } else {
            output.push_str(&format!(
                "\u{2514}\u{2500} Related: {}\n\n",
                neighbors.join(", ")
            ));
        }
    }
    output
}
