pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{ApplyArgs, CliArgs, Commands, MapArgs, RunArgs, ShowArgs, StatusArgs};
pub use output::{OutputFormat, OutputFormatter};
