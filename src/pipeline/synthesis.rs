//! Feature map synthesis: fetch, extract, consolidate

use super::context::PipelineContext;
use super::stage::complete_stage;
use crate::error::PipelineError;
use crate::features::{apply_consolidation, BuildWarning, FeatureGraphBuilder, FeatureMap};
use crate::github::{fetch_repository, RepoCoordinates, SkippedFile};
use crate::llm::RejectedToolCall;
use crate::progress::ProgressEvent;
use crate::template::TemplateParams;
use crate::tools::Stage;
use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

/// Everything a synthesis run produced, including the non-fatal problems
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisReport {
    pub repo: String,
    pub branch: String,
    pub feature_map: FeatureMap,
    pub files_analyzed: usize,
    pub skipped_files: Vec<SkippedFile>,
    pub warnings: Vec<BuildWarning>,
    pub rejected_tool_calls: Vec<RejectedToolCall>,
}

/// Builds the feature map of a repository.
///
/// Extraction returning prose yields an empty map with a warning. Consolidation
/// returning prose keeps the extracted map without neighbor links.
pub async fn synthesize_feature_map(
    ctx: &PipelineContext,
    coords: &RepoCoordinates,
) -> Result<SynthesisReport, PipelineError> {
    let started = Instant::now();
    ctx.emit(ProgressEvent::Started {
        repo: coords.to_string(),
    });

    match synthesize(ctx, coords).await {
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

async fn synthesize(
    ctx: &PipelineContext,
    coords: &RepoCoordinates,
) -> Result<SynthesisReport, PipelineError> {
    let corpus = fetch_repository(ctx.host.as_ref(), coords, &ctx.config.read_retry).await?;

    let mut warnings = Vec::new();
    let mut rejected = Vec::new();

    // Extraction
    let stage_started = Instant::now();
    ctx.emit(ProgressEvent::StageStarted {
        stage: Stage::FeatureExtraction,
    });
    let params = TemplateParams::new().with("repo", corpus.render());
    let extraction = complete_stage(ctx, Stage::FeatureExtraction, &params).await?;
    rejected.extend(extraction.rejected);

    let mut builder = FeatureGraphBuilder::new(ctx.identity.clone());
    if extraction.invocations.is_empty() {
        warn!(repo = %coords, "Extraction returned no tool calls");
        warnings.push(BuildWarning::NoToolCalls {
            stage: Stage::FeatureExtraction.to_string(),
        });
    } else {
        let report = builder.apply_all(&extraction.invocations);
        info!(
            added = report.added,
            updated = report.updated,
            warnings = report.warnings.len(),
            "Extraction applied"
        );
        warnings.extend(report.warnings);
    }
    let mut feature_map = builder.finish();
    ctx.emit(ProgressEvent::StageComplete {
        stage: Stage::FeatureExtraction,
        duration: stage_started.elapsed(),
    });

    // Consolidation
    if !feature_map.is_empty() {
        let stage_started = Instant::now();
        ctx.emit(ProgressEvent::StageStarted {
            stage: Stage::FeatureConsolidation,
        });
        let params = TemplateParams::new().with("features", feature_map.to_document()?);
        let consolidation = complete_stage(ctx, Stage::FeatureConsolidation, &params).await?;
        rejected.extend(consolidation.rejected);

        if consolidation.invocations.is_empty() {
            warn!(repo = %coords, "Consolidation returned no tool calls; keeping unlinked map");
            warnings.push(BuildWarning::NoToolCalls {
                stage: Stage::FeatureConsolidation.to_string(),
            });
        } else {
            let (linked, link_warnings) =
                apply_consolidation(feature_map, &consolidation.invocations);
            feature_map = linked;
            warnings.extend(link_warnings);
        }
        ctx.emit(ProgressEvent::StageComplete {
            stage: Stage::FeatureConsolidation,
            duration: stage_started.elapsed(),
        });
    }

    info!(
        repo = %coords,
        features = feature_map.len(),
        warnings = warnings.len(),
        "Feature map synthesized"
    );

    Ok(SynthesisReport {
        repo: coords.full_name(),
        branch: corpus.branch.clone(),
        feature_map,
        files_analyzed: corpus.files.len(),
        skipped_files: corpus.skipped,
        warnings,
        rejected_tool_calls: rejected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureId, SequentialIdentity};
    use crate::github::{HostError, HostOp, MockRepositoryHost};
    use crate::llm::{MockLLMClient, MockResponse};
    use crate::pipeline::config::PipelineConfig;
    use crate::util::retry::RetryPolicy;
    use serde_json::json;
    use std::sync::Arc;

    fn coords() -> RepoCoordinates {
        RepoCoordinates::new("octo", "shop")
    }

    fn host() -> MockRepositoryHost {
        MockRepositoryHost::new()
            .with_file(&coords(), "main", "src/cart.rs", "pub struct Cart;")
            .with_file(&coords(), "main", "src/checkout.rs", "pub fn pay() {}")
    }

    fn context(llm: Arc<MockLLMClient>, host: MockRepositoryHost) -> PipelineContext {
        PipelineContext::new(llm, Arc::new(host))
            .with_identity(Arc::new(SequentialIdentity::default()))
            .with_config(PipelineConfig::new().with_read_retry(RetryPolicy::none()))
    }

    #[tokio::test]
    async fn test_extraction_then_consolidation() {
        let llm = Arc::new(MockLLMClient::new());
        llm.add_response(MockResponse::with_tool_calls(vec![
            MockLLMClient::add_feature_call("Cart", "Holds items", "Cart struct", &["src/cart.rs"]),
            MockLLMClient::add_feature_call(
                "Checkout",
                "Pay for items",
                "pay()",
                &["src/checkout.rs"],
            ),
            MockLLMClient::update_feature_call("feature-1", json!({ "name": "Shopping cart" })),
        ]));
        llm.add_response(MockResponse::with_tool_calls(vec![
            MockLLMClient::link_features_call("feature-1", &["feature-2"]),
        ]));

        let ctx = context(llm.clone(), host());
        let report = synthesize_feature_map(&ctx, &coords()).await.unwrap();

        assert_eq!(report.branch, "main");
        assert_eq!(report.files_analyzed, 2);
        assert!(report.warnings.is_empty());
        let map = &report.feature_map;
        assert_eq!(map.len(), 2);
        let cart = map.get(&FeatureId::new("feature-1")).unwrap();
        assert_eq!(cart.name, "Shopping cart");
        assert!(cart.neighbors.contains(&FeatureId::new("feature-2")));

        let requests = llm.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].prompt.contains("=== src/cart.rs ==="));
        assert!(requests[1].prompt.contains("\"feature-1\""));
        assert_eq!(requests[1].tools.len(), 1);
    }

    #[tokio::test]
    async fn test_text_only_extraction_yields_empty_map() {
        let llm = Arc::new(MockLLMClient::new());
        llm.add_response(MockResponse::text("This repository is empty."));

        let ctx = context(llm.clone(), host());
        let report = synthesize_feature_map(&ctx, &coords()).await.unwrap();

        assert!(report.feature_map.is_empty());
        assert_eq!(
            report.warnings,
            vec![BuildWarning::NoToolCalls {
                stage: "feature_extraction".to_string()
            }]
        );
        assert_eq!(llm.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_text_only_consolidation_keeps_map() {
        let llm = Arc::new(MockLLMClient::new());
        llm.add_response(MockResponse::with_tool_calls(vec![
            MockLLMClient::add_feature_call("Cart", "Holds items", "Cart struct", &["src/cart.rs"]),
        ]));
        llm.add_response(MockResponse::text("Nothing is related."));

        let ctx = context(llm, host());
        let report = synthesize_feature_map(&ctx, &coords()).await.unwrap();

        assert_eq!(report.feature_map.len(), 1);
        assert_eq!(report.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_before_ai_call() {
        let host = host();
        host.fail_next(
            HostOp::DefaultBranch,
            HostError::Auth {
                message: "Bad credentials".to_string(),
            },
        );
        let llm = Arc::new(MockLLMClient::new());

        let ctx = context(llm.clone(), host);
        let err = synthesize_feature_map(&ctx, &coords()).await.unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::UpstreamAuth);
        assert!(llm.requests().is_empty());
    }
}
