//! Persistent document store for feature maps
//!
//! The store keeps one opaque string per user and enforces no schema on it.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid user id '{0}'")]
    InvalidUser(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt record {path}: {message}")]
    Corrupt { path: PathBuf, message: String },
}

/// Reads and writes one feature map document per user
#[async_trait]
pub trait FeatureMapStore: Send + Sync {
    /// `Ok(None)` when the user has no stored map
    async fn load(&self, user: &str) -> Result<Option<String>, StoreError>;

    async fn save(&self, user: &str, document: &str) -> Result<(), StoreError>;

    fn name(&self) -> &str;
}

pub(crate) fn validate_user(user: &str) -> Result<&str, StoreError> {
    let trimmed = user.trim();
    if trimmed.is_empty() {
        return Err(StoreError::InvalidUser(user.to_string()));
    }
    Ok(trimmed)
}
