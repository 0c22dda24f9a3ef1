//! Change requests: turn a natural-language request into committed file edits

use super::context::PipelineContext;
use super::stage::complete_stage;
use crate::error::{ErrorReport, PipelineError};
use crate::features::FeatureMap;
use crate::github::{
    fetch_repository, CommitRef, FileWrite, FileWriteReport, RepoCoordinates, WriteAction,
    WriteBack,
};
use crate::llm::RejectedToolCall;
use crate::progress::ProgressEvent;
use crate::template::TemplateParams;
use crate::tools::{Stage, ToolInvocation};
use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

/// Outcome of one proposed file edit
#[derive(Debug, Clone, Serialize)]
pub struct FileChangeReport {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<WriteAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<CommitRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

impl FileChangeReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl From<FileWriteReport> for FileChangeReport {
    fn from(report: FileWriteReport) -> Self {
        match report.result {
            Ok(receipt) => Self {
                path: report.path,
                action: Some(receipt.action),
                commit: Some(receipt.commit),
                error: None,
            },
            Err(err) => Self {
                path: report.path,
                action: None,
                commit: None,
                error: Some(ErrorReport::from(&err)),
            },
        }
    }
}

/// Item-by-item result of a change request
#[derive(Debug, Clone, Serialize)]
pub struct ChangeReport {
    pub repo: String,
    pub branch: String,
    pub files: Vec<FileChangeReport>,
    pub rejected_tool_calls: Vec<RejectedToolCall>,
    /// Prose the model returned alongside (or instead of) edits
    #[serde(skip_serializing_if = "String::is_empty")]
    pub model_text: String,
}

impl ChangeReport {
    pub fn succeeded(&self) -> usize {
        self.files.iter().filter(|f| f.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.files.len() - self.succeeded()
    }

    /// Some, but not all, proposed edits were committed
    pub fn is_partial(&self) -> bool {
        self.succeeded() > 0 && self.failed() > 0
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }
}

fn commit_message(prefix: &str, invocation: &ToolInvocation, path: &str) -> String {
    let verb = match invocation {
        ToolInvocation::AddFile(_) => "added",
        _ => "updated",
    };
    format!("{}: {} {}", prefix, verb, path)
}

/// Applies a change request to a repository.
///
/// Each proposed file is written independently. A failed write is reported in
/// its own entry and does not stop the others.
pub async fn apply_change_request(
    ctx: &PipelineContext,
    coords: &RepoCoordinates,
    request: &str,
    feature_map: &FeatureMap,
) -> Result<ChangeReport, PipelineError> {
    let started = Instant::now();
    ctx.emit(ProgressEvent::Started {
        repo: coords.to_string(),
    });

    match apply(ctx, coords, request, feature_map).await {
        Ok(report) => {
            ctx.emit(ProgressEvent::Completed {
                total_time: started.elapsed(),
            });
            Ok(report)
        }
        Err(err) => {
            ctx.emit(ProgressEvent::Failed {
                error: err.to_string(),
            });
            Err(err)
        }
    }
}

async fn apply(
    ctx: &PipelineContext,
    coords: &RepoCoordinates,
    request: &str,
    feature_map: &FeatureMap,
) -> Result<ChangeReport, PipelineError> {
    let corpus = fetch_repository(ctx.host.as_ref(), coords, &ctx.config.read_retry).await?;

    let stage_started = Instant::now();
    ctx.emit(ProgressEvent::StageStarted {
        stage: Stage::EditApplication,
    });
    let params = TemplateParams::new()
        .with("requestedFeature", request)
        .with("featureMap", feature_map.to_document()?)
        .with("sourceCode", corpus.render());
    let completion = complete_stage(ctx, Stage::EditApplication, &params).await?;

    let writes: Vec<FileWrite> = completion
        .invocations
        .iter()
        .filter_map(|invocation| {
            let args = invocation.as_file_write()?;
            Some(FileWrite {
                file: coords.file(&args.filename, &corpus.branch),
                content: args.content.clone(),
                message: commit_message(&ctx.config.commit_prefix, invocation, &args.filename),
            })
        })
        .collect();

    if writes.is_empty() {
        warn!(repo = %coords, "Edit stage proposed no file changes");
    }

    let writer = WriteBack::new(ctx.host.clone())
        .with_lookup_retry(ctx.config.read_retry)
        .with_locks(ctx.locks.clone());
    let results = writer.write_many(writes).await;

    let files: Vec<FileChangeReport> = results.into_iter().map(FileChangeReport::from).collect();
    for file in &files {
        match (&file.action, &file.error) {
            (Some(action), _) => ctx.emit(ProgressEvent::FileWritten {
                path: file.path.clone(),
                action: action.to_string(),
            }),
            (None, Some(error)) => ctx.emit(ProgressEvent::FileWriteFailed {
                path: file.path.clone(),
                error: error.to_string(),
            }),
            (None, None) => {}
        }
    }
    ctx.emit(ProgressEvent::StageComplete {
        stage: Stage::EditApplication,
        duration: stage_started.elapsed(),
    });

    let report = ChangeReport {
        repo: coords.full_name(),
        branch: corpus.branch,
        files,
        rejected_tool_calls: completion.rejected,
        model_text: completion.text,
    };
    info!(
        repo = %coords,
        succeeded = report.succeeded(),
        failed = report.failed(),
        "Change request applied"
    );
    Ok(report)
}
