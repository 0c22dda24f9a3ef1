//! Source-control hosting seam

use super::types::{FileRef, PutFile, PutOutcome, RemoteFile, RepoCoordinates, TreeEntry};
use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by a repository host
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// Credential missing, rejected, or lacking permission
    #[error("authentication failed: {message}")]
    Auth { message: String },

    #[error("not found: {what}")]
    NotFound { what: String },

    /// The concurrency token no longer matches the remote file
    #[error("conflict on {path}: {message}")]
    Conflict { path: String, message: String },

    /// Network failure, rate limit, or server-side error
    #[error("host unavailable{}: {message}", status_suffix(.status))]
    Unavailable {
        message: String,
        status: Option<u16>,
    },

    /// Any other client-side rejection
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid response: {message}")]
    InvalidResponse { message: String },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

impl HostError {
    pub fn is_transient(&self) -> bool {
        matches!(self, HostError::Unavailable { .. })
    }
}

/// Read/write access to repositories on a hosting service.
///
/// Implementations must not cache file state across calls: the remote file
/// may change out-of-band at any time.
#[async_trait]
pub trait RepositoryHost: Send + Sync {
    async fn default_branch(&self, coords: &RepoCoordinates) -> Result<String, HostError>;

    /// Every blob reachable from `branch`, recursively
    async fn list_files(
        &self,
        coords: &RepoCoordinates,
        branch: &str,
    ) -> Result<Vec<TreeEntry>, HostError>;

    /// Raw bytes of a listed blob
    async fn read_blob(
        &self,
        coords: &RepoCoordinates,
        entry: &TreeEntry,
    ) -> Result<Vec<u8>, HostError>;

    /// Current state of a path, `Ok(None)` when nothing exists there
    async fn get_file(&self, file: &FileRef) -> Result<Option<RemoteFile>, HostError>;

    /// Creates (`token == None`) or replaces a file in one commit
    async fn put_file(&self, file: &FileRef, put: PutFile) -> Result<PutOutcome, HostError>;

    fn name(&self) -> &str;
}
