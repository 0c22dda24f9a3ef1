use crate::util::retry::RetryPolicy;

pub const DEFAULT_COMMIT_PREFIX: &str = "featuremap";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Retry policy for read-only repository calls
    pub read_retry: RetryPolicy,
    /// First word of every commit message
    pub commit_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            read_retry: RetryPolicy::default(),
            commit_prefix: DEFAULT_COMMIT_PREFIX.to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_read_retry(mut self, read_retry: RetryPolicy) -> Self {
        self.read_retry = read_retry;
        self
    }

    pub fn with_commit_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.commit_prefix = prefix.into();
        self
    }
}
