//! Utility modules: logging setup and retry with backoff

pub mod logging;
pub mod retry;

pub use logging::{init_from_env, init_logging, LogFormat, LoggingConfig};
pub use retry::{retry_with_backoff, RetryPolicy};
