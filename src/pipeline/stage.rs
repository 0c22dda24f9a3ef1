//! One prompt-and-complete step of a pipeline

use super::context::PipelineContext;
use crate::error::PipelineError;
use crate::llm::Completion;
use crate::progress::ProgressEvent;
use crate::template::{render_template, TemplateParams};
use crate::tools::{Stage, ToolRegistry};

/// Renders `stage`'s prompt with `params` and runs one completion with the
/// stage's tool set.
pub(crate) async fn complete_stage(
    ctx: &PipelineContext,
    stage: Stage,
    params: &TemplateParams,
) -> Result<Completion, PipelineError> {
    let prompt = render_template(stage.prompt_template(), params);
    let registry = ToolRegistry::for_stage(stage);

    ctx.emit(ProgressEvent::LlmRequestStarted {
        stage,
        prompt_bytes: prompt.len(),
    });

    let completion = ctx.completion.complete(&prompt, &registry).await?;

    ctx.emit(ProgressEvent::LlmResponseReceived {
        stage,
        invocations: completion.invocations.len(),
        rejected: completion.rejected.len(),
    });
    for rejected in &completion.rejected {
        ctx.emit(ProgressEvent::ToolCallRejected {
            stage,
            tool: rejected.name.clone(),
            reason: rejected.reason.clone(),
        });
    }

    Ok(completion)
}
