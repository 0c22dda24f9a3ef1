//! Process-wide `tracing` subscriber
//!
//! Events go to stderr so stdout stays clean for `--format json|yaml`.
//! `RUST_LOG` replaces the level-derived filter when it is set and valid.
//!
//! ```no_run
//! use featuremap::util::logging;
//! use tracing::info;
//!
//! logging::init_from_env();
//! info!(repo = "octo/shop", "Synthesizing feature map");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// HTTP stacks that are too chatty below `warn`
const NOISY_TARGETS: &[&str] = &["h2", "hyper", "hyper_util", "reqwest"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Console,
    /// One JSON object per event, for log shippers
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Minimum level for this crate's events
    pub level: Level,
    pub format: LogFormat,
    /// Add file and line to every event
    pub with_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Console,
            with_location: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Switches to JSON lines with source locations
    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self.with_location = true;
        self
    }
}

/// Case-insensitive level name; `warning` is accepted for `warn`
pub fn parse_level(name: &str) -> Option<Level> {
    match name.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Filter directives used when `RUST_LOG` is absent
pub fn default_directives(level: Level) -> String {
    std::iter::once(format!("featuremap={}", level))
        .chain(NOISY_TARGETS.iter().map(|target| format!("{}=warn", target)))
        .collect::<Vec<_>>()
        .join(",")
}

fn build_filter(level: Level) -> EnvFilter {
    env::var("RUST_LOG")
        .ok()
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directives(level)))
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init_logging(config: &LoggingConfig) {
    INIT.call_once(|| {
        let json = (config.format == LogFormat::Json).then(|| {
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_file(config.with_location)
                .with_line_number(config.with_location)
        });
        let console = (config.format == LogFormat::Console).then(|| {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(config.with_location)
                .with_line_number(config.with_location)
        });

        tracing_subscriber::registry()
            .with(build_filter(config.level))
            .with(json)
            .with(console)
            .init();
    });
}

/// Reads `FEATUREMAP_LOG_LEVEL` and `FEATUREMAP_LOG_JSON`
pub fn config_from_env() -> LoggingConfig {
    let level = env::var("FEATUREMAP_LOG_LEVEL")
        .ok()
        .and_then(|name| parse_level(&name))
        .unwrap_or(Level::INFO);
    let config = LoggingConfig::with_level(level);
    if env_flag("FEATUREMAP_LOG_JSON") {
        config.json()
    } else {
        config
    }
}

pub fn init_from_env() {
    init_logging(&config_from_env());
}

pub(crate) fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
