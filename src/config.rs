//! Configuration management for featuremap
//!
//! Settings are loaded from environment variables with defaults and then passed
//! into components as plain values. Nothing reads the environment after the
//! config has been built.
//!
//! # Environment Variables
//!
//! ## Completion service
//! - `FEATUREMAP_PROVIDER`: genai adapter (gemini|openai|anthropic|ollama|groq|xai) - default: "gemini"
//! - `FEATUREMAP_MODEL`: model name - default: "gemini-2.5-flash"
//! - `FEATUREMAP_API_KEY`: overrides the provider's own key variable (`GEMINI_API_KEY`, `OPENAI_API_KEY`, ...)
//! - `FEATUREMAP_REQUEST_TIMEOUT`: per-call timeout in seconds - default: "120"
//! - `FEATUREMAP_MAX_RETRIES`, `FEATUREMAP_RETRY_BASE_MS`, `FEATUREMAP_RETRY_MAX_MS`: backoff for transient failures
//!
//! ## Source control
//! - `GITHUB_TOKEN`: credential for reads and commits
//! - `FEATUREMAP_GITHUB_API`: API base - default: "https://api.github.com"
//! - `FEATUREMAP_BRANCH`: branch to read and write - default: the repository's default branch
//!
//! ## Execution service
//! - `FEATUREMAP_EXECUTION_API`: base URL of the asynchronous execution service
//! - `FEATUREMAP_POLL_INTERVAL_MS`: status poll interval - default: "2000"
//! - `FEATUREMAP_POLL_MAX_ATTEMPTS`: give up after this many polls - default: unbounded
//!
//! ## Local state
//! - `FEATUREMAP_STORE_DIR`: feature map store - default: platform data dir + "featuremap"
//! - `FEATUREMAP_USER`: user whose map is read and written - default: "default"
//! - `FEATUREMAP_IDENTITY`: feature id strategy (uuid|sequential|slug) - default: "uuid"
//! - `FEATUREMAP_LOG_LEVEL`: logging level - default: "info"
//! - `FEATUREMAP_LOG_JSON`: "true" for JSON log lines on stderr
//!
//! # Example
//!
//! ```no_run
//! use featuremap::FeatureMapConfig;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FeatureMapConfig::default();
//! config.validate()?;
//!
//! let llm = config.create_llm_client()?;
//! let host = config.create_host()?;
//! # Ok(())
//! # }
//! ```

use crate::features::{strategy_by_name, IdentityStrategy};
use crate::github::{GitHubClient, DEFAULT_GITHUB_API_BASE};
use crate::llm::{GenAIClient, LLMClient, RetryingClient};
use crate::pipeline::PipelineConfig;
use crate::store::{FeatureMapStore, FileStore};
use crate::util::logging::{self, LoggingConfig};
use crate::util::retry::RetryPolicy;
use crate::workflow::{ExecutionService, HttpExecutionService, PollConfig, WorkflowError};
use genai::adapter::AdapterKind;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_PROVIDER: AdapterKind = AdapterKind::Gemini;
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_RETRY_BASE_MS: u64 = 500;
const DEFAULT_RETRY_MAX_MS: u64 = 8_000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
const DEFAULT_USER: &str = "default";
const DEFAULT_IDENTITY: &str = "uuid";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A credential needed for the requested operation is absent
    #[error("Missing credential: set {0}")]
    MissingCredential(String),

    #[error("Invalid provider: {0}. Valid options: gemini, openai, anthropic, ollama, groq, xai")]
    InvalidProvider(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

/// Parses a provider name as accepted by `FEATUREMAP_PROVIDER`
pub fn parse_provider(name: &str) -> Result<AdapterKind, ConfigError> {
    match name.trim().to_lowercase().as_str() {
        "gemini" | "google" => Ok(AdapterKind::Gemini),
        "openai" => Ok(AdapterKind::OpenAI),
        "anthropic" | "claude" => Ok(AdapterKind::Anthropic),
        "ollama" => Ok(AdapterKind::Ollama),
        "groq" => Ok(AdapterKind::Groq),
        "xai" | "grok" => Ok(AdapterKind::Xai),
        other => Err(ConfigError::InvalidProvider(other.to_string())),
    }
}

/// Main configuration structure for featuremap
///
/// `Default::default()` loads from `FEATUREMAP_*` environment variables with
/// fallbacks. Unparseable values fall back to defaults; [`validate`] reports
/// the problems that remain.
///
/// [`validate`]: FeatureMapConfig::validate
#[derive(Clone)]
pub struct FeatureMapConfig {
    pub provider: AdapterKind,
    pub model: String,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
    pub retry: RetryPolicy,

    pub github_token: Option<String>,
    pub github_api: String,
    /// `None` uses the repository's default branch
    pub branch: Option<String>,

    pub execution_api: Option<String>,
    pub poll: PollConfig,

    pub store_dir: PathBuf,
    pub user: String,
    pub identity: String,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_json: bool,
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_nonempty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn default_store_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(env::temp_dir)
        .join("featuremap")
}

impl Default for FeatureMapConfig {
    fn default() -> Self {
        let provider = env::var("FEATUREMAP_PROVIDER")
            .ok()
            .and_then(|s| parse_provider(&s).ok())
            .unwrap_or(DEFAULT_PROVIDER);

        let model = env_nonempty("FEATUREMAP_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let retry = RetryPolicy {
            max_retries: env_parsed("FEATUREMAP_MAX_RETRIES").unwrap_or(DEFAULT_MAX_RETRIES),
            base_delay: Duration::from_millis(
                env_parsed("FEATUREMAP_RETRY_BASE_MS").unwrap_or(DEFAULT_RETRY_BASE_MS),
            ),
            max_delay: Duration::from_millis(
                env_parsed("FEATUREMAP_RETRY_MAX_MS").unwrap_or(DEFAULT_RETRY_MAX_MS),
            ),
        };

        let poll = PollConfig {
            interval: Duration::from_millis(
                env_parsed("FEATUREMAP_POLL_INTERVAL_MS").unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
            max_attempts: env_parsed("FEATUREMAP_POLL_MAX_ATTEMPTS"),
        };

        let log_level = env::var("FEATUREMAP_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        Self {
            provider,
            model,
            api_key: env_nonempty("FEATUREMAP_API_KEY"),
            request_timeout_secs: env_parsed("FEATUREMAP_REQUEST_TIMEOUT")
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            retry,
            github_token: env_nonempty("GITHUB_TOKEN"),
            github_api: env_nonempty("FEATUREMAP_GITHUB_API")
                .unwrap_or_else(|| DEFAULT_GITHUB_API_BASE.to_string()),
            branch: env_nonempty("FEATUREMAP_BRANCH"),
            execution_api: env_nonempty("FEATUREMAP_EXECUTION_API"),
            poll,
            store_dir: env_nonempty("FEATUREMAP_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_store_dir),
            user: env_nonempty("FEATUREMAP_USER").unwrap_or_else(|| DEFAULT_USER.to_string()),
            identity: env_nonempty("FEATUREMAP_IDENTITY")
                .unwrap_or_else(|| DEFAULT_IDENTITY.to_string())
                .to_lowercase(),
            log_level,
            log_json: logging::env_flag("FEATUREMAP_LOG_JSON"),
        }
    }
}

impl FeatureMapConfig {
    /// Validates the configuration
    ///
    /// Credentials are not checked here: each is only required by the
    /// operation that uses it, and that operation's constructor reports it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Request timeout must be at least 1 second".to_string(),
            ));
        }
        if self.request_timeout_secs > 600 {
            return Err(ConfigError::ValidationFailed(
                "Request timeout cannot exceed 10 minutes".to_string(),
            ));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Model name must not be empty".to_string(),
            ));
        }

        if self.retry.base_delay > self.retry.max_delay {
            return Err(ConfigError::ValidationFailed(format!(
                "Retry base delay ({}ms) exceeds max delay ({}ms)",
                self.retry.base_delay.as_millis(),
                self.retry.max_delay.as_millis()
            )));
        }

        if self.poll.interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "Poll interval must be greater than zero".to_string(),
            ));
        }
        if self.poll.max_attempts == Some(0) {
            return Err(ConfigError::ValidationFailed(
                "Poll max attempts must be at least 1 when set".to_string(),
            ));
        }

        reqwest::Url::parse(&self.github_api).map_err(|e| ConfigError::ParseError {
            field: "FEATUREMAP_GITHUB_API".to_string(),
            error: e.to_string(),
        })?;
        if let Some(api) = &self.execution_api {
            reqwest::Url::parse(api).map_err(|e| ConfigError::ParseError {
                field: "FEATUREMAP_EXECUTION_API".to_string(),
                error: e.to_string(),
            })?;
        }

        if strategy_by_name(&self.identity).is_none() {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid identity strategy: {}. Valid options: uuid, sequential, slug",
                self.identity
            )));
        }

        if logging::parse_level(&self.log_level).is_none() {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Builds the completion client: genai transport wrapped in bounded retries.
    ///
    /// Ollama runs locally without a key; every other provider needs either
    /// `FEATUREMAP_API_KEY` or its own key variable.
    pub fn create_llm_client(&self) -> Result<Arc<dyn LLMClient>, ConfigError> {
        if self.api_key.is_none() && self.provider != AdapterKind::Ollama {
            if let Some(key_env) = self.provider.default_key_env_name() {
                if env_nonempty(key_env).is_none() {
                    return Err(ConfigError::MissingCredential(format!(
                        "FEATUREMAP_API_KEY or {}",
                        key_env
                    )));
                }
            }
        }

        let client = GenAIClient::new(
            self.provider,
            self.model.clone(),
            self.api_key.clone(),
            None,
            self.request_timeout(),
        );
        Ok(Arc::new(RetryingClient::new(Arc::new(client), self.retry)))
    }

    pub fn create_host(&self) -> Result<GitHubClient, ConfigError> {
        GitHubClient::new(
            &self.github_api,
            self.github_token.clone(),
            self.request_timeout(),
        )
        .map_err(|e| ConfigError::ValidationFailed(e.to_string()))
    }

    pub fn create_store(&self) -> Arc<dyn FeatureMapStore> {
        Arc::new(FileStore::new(self.store_dir.clone()))
    }

    /// Builds the execution service client, if one is configured
    pub fn create_execution_service(&self) -> Result<Arc<dyn ExecutionService>, WorkflowError> {
        let base = self
            .execution_api
            .as_deref()
            .ok_or(WorkflowError::NotConfigured)?;
        let service = HttpExecutionService::new(
            base,
            self.github_token.clone(),
            self.request_timeout(),
        )?;
        Ok(Arc::new(service))
    }

    pub fn identity_strategy(&self) -> Result<Arc<dyn IdentityStrategy>, ConfigError> {
        strategy_by_name(&self.identity)
            .map(Arc::from)
            .ok_or_else(|| {
                ConfigError::ValidationFailed(format!(
                    "Invalid identity strategy: {}",
                    self.identity
                ))
            })
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::new().with_read_retry(self.retry)
    }

    /// Subscriber settings; an unknown level has already failed `validate`
    /// and falls back to `info` here
    pub fn logging_config(&self) -> LoggingConfig {
        let config = LoggingConfig::with_level(
            logging::parse_level(&self.log_level).unwrap_or(tracing::Level::INFO),
        );
        if self.log_json {
            config.json()
        } else {
            config
        }
    }

    /// Converts configuration to a display map for output formatting
    pub fn to_display_map(&self) -> std::collections::BTreeMap<String, String> {
        let mut map = std::collections::BTreeMap::new();

        map.insert("provider".to_string(), self.provider.as_str().to_string());
        map.insert("model".to_string(), self.model.clone());
        map.insert(
            "request_timeout_secs".to_string(),
            self.request_timeout_secs.to_string(),
        );
        map.insert("max_retries".to_string(), self.retry.max_retries.to_string());
        map.insert("github_api".to_string(), self.github_api.clone());
        map.insert(
            "github_token".to_string(),
            redact(self.github_token.as_deref()).to_string(),
        );
        if let Some(branch) = &self.branch {
            map.insert("branch".to_string(), branch.clone());
        }
        if let Some(api) = &self.execution_api {
            map.insert("execution_api".to_string(), api.clone());
        }
        map.insert(
            "store_dir".to_string(),
            self.store_dir.display().to_string(),
        );
        map.insert("user".to_string(), self.user.clone());
        map.insert("identity".to_string(), self.identity.clone());
        map.insert("log_level".to_string(), self.log_level.clone());
        map.insert("log_json".to_string(), self.log_json.to_string());

        map
    }
}

fn redact(secret: Option<&str>) -> &'static str {
    match secret {
        Some(_) => "<set>",
        None => "<unset>",
    }
}

impl fmt::Debug for FeatureMapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureMapConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &redact(self.api_key.as_deref()))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("retry", &self.retry)
            .field("github_token", &redact(self.github_token.as_deref()))
            .field("github_api", &self.github_api)
            .field("branch", &self.branch)
            .field("execution_api", &self.execution_api)
            .field("poll", &self.poll)
            .field("store_dir", &self.store_dir)
            .field("user", &self.user)
            .field("identity", &self.identity)
            .field("log_level", &self.log_level)
            .field("log_json", &self.log_json)
            .finish()
    }
}

impl fmt::Display for FeatureMapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Featuremap Configuration:")?;
        writeln!(f, "  Provider: {}", self.provider.as_str())?;
        writeln!(f, "  Model: {}", self.model)?;
        writeln!(f, "  API Key: {}", redact(self.api_key.as_deref()))?;
        writeln!(f, "  Request Timeout: {}s", self.request_timeout_secs)?;
        writeln!(
            f,
            "  Retries: {} (backoff {}ms..{}ms)",
            self.retry.max_retries,
            self.retry.base_delay.as_millis(),
            self.retry.max_delay.as_millis()
        )?;
        writeln!(f, "  GitHub API: {}", self.github_api)?;
        writeln!(f, "  GitHub Token: {}", redact(self.github_token.as_deref()))?;
        writeln!(
            f,
            "  Branch: {}",
            self.branch.as_deref().unwrap_or("<repository default>")
        )?;
        if let Some(api) = &self.execution_api {
            writeln!(f, "  Execution API: {}", api)?;
        }
        writeln!(f, "  Poll Interval: {}ms", self.poll.interval.as_millis())?;
        writeln!(f, "  Store Dir: {}", self.store_dir.display())?;
        writeln!(f, "  User: {}", self.user)?;
        writeln!(f, "  Identity: {}", self.identity)?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}
