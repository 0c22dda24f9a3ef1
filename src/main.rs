use featuremap::cli::commands::{CliArgs, Commands};
use featuremap::cli::handlers::{
    handle_apply, handle_config, handle_map, handle_run, handle_show, handle_status,
};
use featuremap::util::logging::{init_logging, parse_level};
use featuremap::{FeatureMapConfig, VERSION};

use clap::Parser;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    let config = FeatureMapConfig::default();
    init_logging_from_args(&args, &config);

    debug!("featuremap v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Map(map_args) => handle_map(map_args, &config, args.quiet).await,
        Commands::Show(show_args) => handle_show(show_args, &config).await,
        Commands::Apply(apply_args) => handle_apply(apply_args, &config, args.quiet).await,
        Commands::Run(run_args) => handle_run(run_args, &config).await,
        Commands::Status(status_args) => handle_status(status_args, &config).await,
        Commands::Config(config_args) => handle_config(config_args.format.into(), &config),
    };

    std::process::exit(exit_code);
}

/// `--log-level` beats `--verbose`/`--quiet`, which beat the environment
fn init_logging_from_args(args: &CliArgs, config: &FeatureMapConfig) {
    let mut logging = config.logging_config();

    if let Some(name) = &args.log_level {
        match parse_level(name) {
            Some(level) => logging.level = level,
            None => eprintln!(
                "Invalid log level '{}', keeping {}. Valid levels: trace, debug, info, warn, error",
                name, logging.level
            ),
        }
    } else if args.verbose {
        logging.level = Level::DEBUG;
    } else if args.quiet {
        logging.level = Level::ERROR;
    }

    init_logging(&logging);
}
