//! Command handlers
//!
//! Each handler runs one subcommand, prints its output and returns the process
//! exit code: 0 on success, 1 on failure, 2 when a change request committed
//! only some of its files.

use super::commands::{ApplyArgs, MapArgs, PollArgs, RunArgs, ShowArgs, StatusArgs};
use super::output::{OutputFormat, OutputFormatter};
use crate::config::{ConfigError, FeatureMapConfig};
use crate::error::{ErrorKind, ErrorReport, PipelineError};
use crate::features::{strategy_by_name, IdentityStrategy};
use crate::github::RepoCoordinates;
use crate::pipeline::{
    apply_change_request, load_feature_map, persist, synthesize_feature_map, ChangeReport,
    PipelineContext,
};
use crate::progress::LoggingHandler;
use crate::workflow::{run_workflow, ExecutionId, PollConfig, StatusPoller, WorkflowError};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_PARTIAL: i32 = 2;

/// Branch precedence: `--branch`, then `owner/repo@branch`, then `FEATUREMAP_BRANCH`
pub fn resolve_coordinates(
    repo: &RepoCoordinates,
    branch: Option<&str>,
    config: &FeatureMapConfig,
) -> RepoCoordinates {
    let mut coords = repo.clone();
    if let Some(branch) = branch {
        coords.branch = Some(branch.to_string());
    } else if coords.branch.is_none() {
        coords.branch = config.branch.clone();
    }
    coords
}

/// Exit code for a finished change request
pub fn change_exit_code(report: &ChangeReport) -> i32 {
    if report.all_succeeded() {
        EXIT_SUCCESS
    } else if report.is_partial() {
        EXIT_PARTIAL
    } else {
        EXIT_FAILURE
    }
}

/// Classifies a failure that reached the CLI edge
pub fn error_report(err: &anyhow::Error) -> ErrorReport {
    if let Some(pipeline) = err.downcast_ref::<PipelineError>() {
        return pipeline.report();
    }
    if let Some(config) = err.downcast_ref::<ConfigError>() {
        return ErrorReport::new(ErrorKind::Configuration, config.to_string());
    }
    if let Some(workflow) = err.downcast_ref::<WorkflowError>() {
        return ErrorReport::new(ErrorKind::from(workflow), workflow.to_string());
    }
    ErrorReport::new(ErrorKind::Internal, format!("{:#}", err))
}

fn emit(formatter: &OutputFormatter, output: Result<String>) -> i32 {
    match output {
        Ok(text) => {
            print!("{}", text);
            EXIT_SUCCESS
        }
        Err(err) => fail(formatter, &err),
    }
}

fn fail(formatter: &OutputFormatter, err: &anyhow::Error) -> i32 {
    let report = error_report(err);
    error!(kind = %report.kind, "{}", report.message);
    match formatter.format_error(&report) {
        Ok(text) if formatter.format() == OutputFormat::Human => eprint!("{}", text),
        Ok(text) => print!("{}", text),
        Err(_) => eprintln!("{}", report),
    }
    EXIT_FAILURE
}

fn pipeline_context(
    config: &FeatureMapConfig,
    identity: Option<&str>,
    quiet: bool,
) -> Result<PipelineContext> {
    config.validate()?;

    let identity: Arc<dyn IdentityStrategy> = match identity {
        Some(name) => strategy_by_name(name).map(Arc::from).ok_or_else(|| {
            ConfigError::ValidationFailed(format!(
                "Invalid identity strategy: {}. Valid options: uuid, sequential, slug",
                name
            ))
        })?,
        None => config.identity_strategy()?,
    };

    let llm = config.create_llm_client()?;
    let host = config.create_host()?;
    let mut ctx = PipelineContext::new(llm, Arc::new(host))
        .with_identity(identity)
        .with_config(config.pipeline_config());
    if !quiet {
        ctx = ctx.with_progress(Arc::new(LoggingHandler));
    }
    Ok(ctx)
}

fn poller(config: &FeatureMapConfig, overrides: &PollArgs) -> StatusPoller {
    let mut poll: PollConfig = config.poll;
    if let Some(ms) = overrides.interval_ms {
        poll.interval = Duration::from_millis(ms.max(1));
    }
    if let Some(max) = overrides.max_attempts {
        poll.max_attempts = Some(max);
    }
    StatusPoller::new(poll)
}

pub async fn handle_map(args: &MapArgs, config: &FeatureMapConfig, quiet: bool) -> i32 {
    let formatter = OutputFormatter::new(args.format.into());
    let output = run_map(args, config, quiet, &formatter).await;
    emit(&formatter, output)
}

async fn run_map(
    args: &MapArgs,
    config: &FeatureMapConfig,
    quiet: bool,
    formatter: &OutputFormatter,
) -> Result<String> {
    let ctx = pipeline_context(config, args.identity.as_deref(), quiet)?;
    let coords = resolve_coordinates(&args.repo, args.branch.as_deref(), config);
    let user = args.user.as_deref().unwrap_or(&config.user);

    let report = synthesize_feature_map(&ctx, &coords).await?;

    if args.no_store {
        debug!("Skipping store (--no-store)");
    } else {
        let store = config.create_store();
        persist(store.as_ref(), user, &report.feature_map).await?;
        info!(user, "Feature map stored");
    }

    formatter.format_synthesis(&report)
}

pub async fn handle_show(args: &ShowArgs, config: &FeatureMapConfig) -> i32 {
    let formatter = OutputFormatter::new(args.format.into());
    let output = run_show(args, config, &formatter).await;
    emit(&formatter, output)
}

async fn run_show(
    args: &ShowArgs,
    config: &FeatureMapConfig,
    formatter: &OutputFormatter,
) -> Result<String> {
    let user = args.user.as_deref().unwrap_or(&config.user);
    let store = config.create_store();
    let map = load_feature_map(store.as_ref(), user).await?;
    formatter.format_feature_map(&map)
}

pub async fn handle_apply(args: &ApplyArgs, config: &FeatureMapConfig, quiet: bool) -> i32 {
    let formatter = OutputFormatter::new(args.format.into());

    let report = match run_apply(args, config, quiet).await {
        Ok(report) => report,
        Err(err) => return fail(&formatter, &err),
    };

    match formatter.format_change(&report) {
        Ok(text) => {
            print!("{}", text);
            change_exit_code(&report)
        }
        Err(err) => fail(&formatter, &err),
    }
}

async fn run_apply(
    args: &ApplyArgs,
    config: &FeatureMapConfig,
    quiet: bool,
) -> Result<ChangeReport> {
    let ctx = pipeline_context(config, None, quiet)?;
    let coords = resolve_coordinates(&args.repo, args.branch.as_deref(), config);
    let user = args.user.as_deref().unwrap_or(&config.user);

    let store = config.create_store();
    let feature_map = load_feature_map(store.as_ref(), user).await?;

    let report = apply_change_request(&ctx, &coords, &args.request, &feature_map).await?;
    Ok(report)
}

pub async fn handle_run(args: &RunArgs, config: &FeatureMapConfig) -> i32 {
    let formatter = OutputFormatter::new(args.format.into());
    let output = run_run(args, config, &formatter).await;
    emit(&formatter, output)
}

async fn run_run(
    args: &RunArgs,
    config: &FeatureMapConfig,
    formatter: &OutputFormatter,
) -> Result<String> {
    config.validate()?;
    let service = config.create_execution_service()?;
    let poller = poller(config, &args.poll);
    let result =
        run_workflow(service.as_ref(), &poller, &args.input, &args.workflow_type).await?;
    formatter.format_workflow(&result)
}

pub async fn handle_status(args: &StatusArgs, config: &FeatureMapConfig) -> i32 {
    let formatter = OutputFormatter::new(args.format.into());
    let output = run_status(args, config, &formatter).await;
    emit(&formatter, output)
}

async fn run_status(
    args: &StatusArgs,
    config: &FeatureMapConfig,
    formatter: &OutputFormatter,
) -> Result<String> {
    config.validate()?;
    let service = config.create_execution_service()?;
    let poller = poller(config, &args.poll);
    let id = ExecutionId::new(args.execution_id.clone());
    let result = poller
        .wait(service.as_ref(), &id)
        .await
        .with_context(|| format!("Execution {} did not succeed", id))?;
    formatter.format_workflow(&result)
}

pub fn handle_config(format: OutputFormat, config: &FeatureMapConfig) -> i32 {
    let formatter = OutputFormatter::new(format);
    emit(&formatter, formatter.format_config(config))
}
