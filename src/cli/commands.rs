use crate::github::RepoCoordinates;
use clap::{Parser, Subcommand, ValueEnum};

/// AI-powered feature maps for GitHub repositories
#[derive(Parser, Debug)]
#[command(
    name = "featuremap",
    about = "AI-powered feature maps for GitHub repositories",
    version,
    author,
    long_about = "featuremap reads a GitHub repository, asks an AI model to describe its \
                  user-facing features and how they relate, and stores the result as a \
                  feature map. It can also apply natural-language change requests by \
                  committing the edited files back to the repository."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Synthesize and store the feature map of a repository",
        long_about = "Fetches every text file of the repository, extracts features with the \
                      AI model, links related features, and stores the map for the user.\n\n\
                      Examples:\n  \
                      featuremap map octo/shop\n  \
                      featuremap map octo/shop --branch dev --format json\n  \
                      featuremap map octo/shop@dev --no-store"
    )]
    Map(MapArgs),

    #[command(
        about = "Print a stored feature map",
        long_about = "Prints the user's stored feature map as an array of features.\n\n\
                      Examples:\n  \
                      featuremap show\n  \
                      featuremap show --user alice --format yaml"
    )]
    Show(ShowArgs),

    #[command(
        about = "Apply a change request to a repository",
        long_about = "Asks the AI model to implement the request against the repository's \
                      source and commits each proposed file separately. Exits with 2 when \
                      only some of the files were committed.\n\n\
                      Examples:\n  \
                      featuremap apply octo/shop \"Add a search box to the header\""
    )]
    Apply(ApplyArgs),

    #[command(
        about = "Start an asynchronous workflow and wait for it",
        long_about = "Starts a job on the execution service configured by \
                      FEATUREMAP_EXECUTION_API and polls until it settles.\n\n\
                      Examples:\n  \
                      featuremap run generate-feature-map '{\"repo\":\"octo/shop\"}'"
    )]
    Run(RunArgs),

    #[command(
        about = "Wait for an asynchronous workflow execution",
        long_about = "Polls the execution service until the execution succeeds or fails.\n\n\
                      Examples:\n  \
                      featuremap status arn:aws:states:us-east-1:123:execution:fm:42"
    )]
    Status(StatusArgs),

    #[command(about = "Print the effective configuration")]
    Config(ConfigArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct MapArgs {
    #[arg(value_name = "OWNER/REPO", value_parser = parse_repo, help = "Repository, optionally as owner/repo@branch")]
    pub repo: RepoCoordinates,

    #[arg(short = 'b', long, help = "Branch to read (defaults to the repository's default branch)")]
    pub branch: Option<String>,

    #[arg(short = 'u', long, help = "User whose feature map is stored")]
    pub user: Option<String>,

    #[arg(long, help = "Feature id strategy: uuid, sequential or slug")]
    pub identity: Option<String>,

    #[arg(long, help = "Print the map without storing it")]
    pub no_store: bool,

    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct ShowArgs {
    #[arg(short = 'u', long, help = "User whose feature map is printed")]
    pub user: Option<String>,

    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct ApplyArgs {
    #[arg(value_name = "OWNER/REPO", value_parser = parse_repo, help = "Repository, optionally as owner/repo@branch")]
    pub repo: RepoCoordinates,

    #[arg(value_name = "REQUEST", help = "The change to make, in plain language")]
    pub request: String,

    #[arg(short = 'b', long, help = "Branch to read and commit to")]
    pub branch: Option<String>,

    #[arg(short = 'u', long, help = "User whose feature map is given to the model as context")]
    pub user: Option<String>,

    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    #[arg(value_name = "WORKFLOW_TYPE", help = "Workflow type understood by the execution service")]
    pub workflow_type: String,

    #[arg(value_name = "INPUT", default_value = "{}", help = "Workflow input, passed through as a string")]
    pub input: String,

    #[command(flatten)]
    pub poll: PollArgs,

    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct StatusArgs {
    #[arg(value_name = "EXECUTION_ID", help = "Execution identifier returned when the job started")]
    pub execution_id: String,

    #[command(flatten)]
    pub poll: PollArgs,

    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct PollArgs {
    #[arg(long, value_name = "MS", help = "Poll interval in milliseconds")]
    pub interval_ms: Option<u64>,

    #[arg(long, value_name = "N", help = "Give up after N status queries")]
    pub max_attempts: Option<u32>,
}

#[derive(Parser, Debug, Clone)]
pub struct ConfigArgs {
    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

fn parse_repo(s: &str) -> Result<RepoCoordinates, String> {
    RepoCoordinates::parse(s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_verify() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_map_defaults() {
        let args = CliArgs::parse_from(["featuremap", "map", "octo/shop"]);
        match args.command {
            Commands::Map(map) => {
                assert_eq!(map.repo.full_name(), "octo/shop");
                assert!(map.repo.branch.is_none());
                assert!(map.branch.is_none());
                assert!(map.user.is_none());
                assert!(!map.no_store);
                assert_eq!(map.format, OutputFormatArg::Human);
            }
            _ => panic!("Expected Map command"),
        }
    }

    #[test]
    fn test_map_with_branch_suffix_and_flags() {
        let args = CliArgs::parse_from([
            "featuremap",
            "map",
            "octo/shop@dev",
            "--user",
            "alice",
            "--format",
            "json",
            "--no-store",
        ]);
        match args.command {
            Commands::Map(map) => {
                assert_eq!(map.repo.branch.as_deref(), Some("dev"));
                assert_eq!(map.user.as_deref(), Some("alice"));
                assert_eq!(map.format, OutputFormatArg::Json);
                assert!(map.no_store);
            }
            _ => panic!("Expected Map command"),
        }
    }

    #[test]
    fn test_invalid_repo_is_rejected() {
        let result = CliArgs::try_parse_from(["featuremap", "map", "just-a-name"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_apply_args() {
        let args = CliArgs::parse_from([
            "featuremap",
            "apply",
            "octo/shop",
            "Add a search box",
            "-b",
            "feature/search",
        ]);
        match args.command {
            Commands::Apply(apply) => {
                assert_eq!(apply.request, "Add a search box");
                assert_eq!(apply.branch.as_deref(), Some("feature/search"));
            }
            _ => panic!("Expected Apply command"),
        }
    }

    #[test]
    fn test_status_poll_overrides() {
        let args = CliArgs::parse_from([
            "featuremap",
            "status",
            "exec-1",
            "--interval-ms",
            "500",
            "--max-attempts",
            "3",
        ]);
        match args.command {
            Commands::Status(status) => {
                assert_eq!(status.execution_id, "exec-1");
                assert_eq!(status.poll.interval_ms, Some(500));
                assert_eq!(status.poll.max_attempts, Some(3));
            }
            _ => panic!("Expected Status command"),
        }
    }

    #[test]
    fn test_run_default_input() {
        let args = CliArgs::parse_from(["featuremap", "run", "generate"]);
        match args.command {
            Commands::Run(run) => {
                assert_eq!(run.workflow_type, "generate");
                assert_eq!(run.input, "{}");
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_global_flags() {
        let args = CliArgs::parse_from(["featuremap", "show", "-v"]);
        assert!(args.verbose);
        assert!(!args.quiet);

        let result = CliArgs::try_parse_from(["featuremap", "show", "-v", "-q"]);
        assert!(result.is_err());
    }
}
