//! Optimistic-concurrency write-back of whole files
//!
//! Each write runs a lookup then a commit. The lookup captures the remote
//! concurrency token (or learns the path is free), and the commit hands that
//! token back to the host so a file changed in between is rejected as a
//! conflict instead of being overwritten.
//!
//! ```text
//! Idle -> LookingUp -> { NotFound | Found(token) | LookupFailed }
//!      -> Committing -> { Committed | Conflict | CommitFailed }
//! ```

use super::host::{HostError, RepositoryHost};
use super::types::{CommitRef, ConcurrencyToken, FileRef, PutFile};
use crate::util::retry::{retry_with_backoff, RetryPolicy};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

/// One whole-content replacement of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWrite {
    pub file: FileRef,
    pub content: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteAction {
    Created,
    Updated,
}

impl fmt::Display for WriteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteAction::Created => write!(f, "created"),
            WriteAction::Updated => write!(f, "updated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteReceipt {
    pub path: String,
    pub action: WriteAction,
    pub commit: CommitRef,
    pub new_token: ConcurrencyToken,
}

/// States a single write passes through
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteState {
    Idle,
    LookingUp,
    NotFound,
    Found(ConcurrencyToken),
    LookupFailed,
    Committing,
    Committed,
    Conflict,
    CommitFailed,
}

impl WriteState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WriteState::LookupFailed
                | WriteState::Committed
                | WriteState::Conflict
                | WriteState::CommitFailed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteBackError {
    /// Reading the current remote state failed for a reason other than
    /// "no such file"
    #[error("lookup of {path} failed: {source}")]
    LookupFailed { path: String, source: HostError },

    /// The remote file changed between lookup and commit
    #[error("conflict writing {path}: {message}")]
    Conflict { path: String, message: String },

    #[error("commit of {path} failed: {source}")]
    CommitFailed { path: String, source: HostError },
}

impl WriteBackError {
    pub fn path(&self) -> &str {
        match self {
            WriteBackError::LookupFailed { path, .. }
            | WriteBackError::Conflict { path, .. }
            | WriteBackError::CommitFailed { path, .. } => path,
        }
    }

    /// Underlying transport error, if any
    pub fn host_error(&self) -> Option<&HostError> {
        match self {
            WriteBackError::LookupFailed { source, .. }
            | WriteBackError::CommitFailed { source, .. } => Some(source),
            WriteBackError::Conflict { .. } => None,
        }
    }
}

/// One async mutex per `(owner, repo, path, branch)`.
///
/// Holding the guard across lookup and commit keeps this process from
/// interleaving two commits on the same path. Entries are removed once the
/// last holder or waiter is gone.
#[derive(Debug, Default, Clone)]
pub struct PathLocks {
    locks: Arc<Mutex<HashMap<FileRef, Arc<tokio::sync::Mutex<()>>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<FileRef, Arc<tokio::sync::Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Waits for exclusive access to the canonical form of `file`
    pub async fn acquire(&self, file: &FileRef) -> PathGuard {
        let key = file.canonical();
        let lock = self.table().entry(key.clone()).or_default().clone();
        let guard = lock.lock_owned().await;
        PathGuard {
            locks: self.clone(),
            key,
            guard: Some(guard),
        }
    }

    /// Paths currently held or waited on
    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive access to one path; releases and prunes its table entry on drop
pub struct PathGuard {
    locks: PathLocks,
    key: FileRef,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut table = self.locks.table();
        if table
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&self.key);
        }
    }
}

/// Outcome of one item of [`WriteBack::write_many`]
#[derive(Debug, Clone)]
pub struct FileWriteReport {
    pub path: String,
    pub result: Result<WriteReceipt, WriteBackError>,
}

impl FileWriteReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

struct Attempt<'a> {
    file: &'a FileRef,
    trace: Vec<WriteState>,
}

impl<'a> Attempt<'a> {
    fn new(file: &'a FileRef) -> Self {
        Self {
            file,
            trace: vec![WriteState::Idle],
        }
    }

    fn enter(&mut self, state: WriteState) {
        debug!(file = %self.file, state = ?state, "Write-back transition");
        self.trace.push(state);
    }
}

/// Writes files back to a repository host
pub struct WriteBack {
    host: Arc<dyn RepositoryHost>,
    lookup_policy: RetryPolicy,
    locks: PathLocks,
}

impl WriteBack {
    pub fn new(host: Arc<dyn RepositoryHost>) -> Self {
        Self {
            host,
            lookup_policy: RetryPolicy::none(),
            locks: PathLocks::new(),
        }
    }

    /// Retries transient lookup failures. Commits are never retried.
    pub fn with_lookup_retry(mut self, policy: RetryPolicy) -> Self {
        self.lookup_policy = policy;
        self
    }

    /// Shares a lock table with other writers in the same process
    pub fn with_locks(mut self, locks: PathLocks) -> Self {
        self.locks = locks;
        self
    }

    pub async fn write_file(&self, write: FileWrite) -> Result<WriteReceipt, WriteBackError> {
        self.write_file_traced(write).await.0
    }

    /// Like [`write_file`](Self::write_file), also returning every state visited
    pub async fn write_file_traced(
        &self,
        write: FileWrite,
    ) -> (Result<WriteReceipt, WriteBackError>, Vec<WriteState>) {
        let write = FileWrite {
            file: write.file.canonical(),
            ..write
        };
        let _guard = self.locks.acquire(&write.file).await;

        let mut attempt = Attempt::new(&write.file);
        let result = self.run(&mut attempt, &write).await;
        (result, attempt.trace)
    }

    async fn run(
        &self,
        attempt: &mut Attempt<'_>,
        write: &FileWrite,
    ) -> Result<WriteReceipt, WriteBackError> {
        let file = &write.file;
        let host = self.host.as_ref();

        attempt.enter(WriteState::LookingUp);
        let lookup = retry_with_backoff(
            &self.lookup_policy,
            "get_file",
            HostError::is_transient,
            || host.get_file(file),
        )
        .await;

        let token = match lookup {
            Ok(Some(remote)) => {
                attempt.enter(WriteState::Found(remote.token.clone()));
                Some(remote.token)
            }
            Ok(None) => {
                attempt.enter(WriteState::NotFound);
                None
            }
            Err(source) => {
                attempt.enter(WriteState::LookupFailed);
                warn!(file = %file, error = %source, "Write-back lookup failed");
                return Err(WriteBackError::LookupFailed {
                    path: file.path.clone(),
                    source,
                });
            }
        };

        let action = if token.is_some() {
            WriteAction::Updated
        } else {
            WriteAction::Created
        };

        attempt.enter(WriteState::Committing);
        let put = PutFile {
            message: write.message.clone(),
            content: write.content.clone(),
            token,
        };

        match host.put_file(file, put).await {
            Ok(outcome) => {
                attempt.enter(WriteState::Committed);
                info!(
                    file = %file,
                    action = %action,
                    commit = %outcome.commit.sha,
                    token = outcome.new_token.short(),
                    "Committed file"
                );
                Ok(WriteReceipt {
                    path: file.path.clone(),
                    action,
                    commit: outcome.commit,
                    new_token: outcome.new_token,
                })
            }
            Err(HostError::Conflict { message, .. }) => {
                attempt.enter(WriteState::Conflict);
                warn!(file = %file, "Remote file changed since lookup; not overwriting");
                Err(WriteBackError::Conflict {
                    path: file.path.clone(),
                    message,
                })
            }
            Err(source) => {
                attempt.enter(WriteState::CommitFailed);
                warn!(file = %file, error = %source, "Commit failed");
                Err(WriteBackError::CommitFailed {
                    path: file.path.clone(),
                    source,
                })
            }
        }
    }

    /// Dispatches all writes concurrently. Writes to the same path run one
    /// after another; every item gets its own report, in input order.
    pub async fn write_many(&self, writes: Vec<FileWrite>) -> Vec<FileWriteReport> {
        let tasks = writes.into_iter().map(|write| async move {
            let path = write.file.path.clone();
            let result = self.write_file(write).await;
            FileWriteReport { path, result }
        });
        join_all(tasks).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::mock::{HostOp, MockRepositoryHost};
    use crate::github::types::RepoCoordinates;
    use std::time::Duration;

    fn coords() -> RepoCoordinates {
        RepoCoordinates::new("octo", "hello")
    }

    fn write(path: &str, content: &str) -> FileWrite {
        FileWrite {
            file: coords().file(path, "main"),
            content: content.to_string(),
            message: format!("featuremap: wrote {}", path),
        }
    }

    #[tokio::test]
    async fn test_create_has_no_token() {
        let host = MockRepositoryHost::new().with_repo(&coords(), "main");
        let writer = WriteBack::new(Arc::new(host.clone()));

        let (result, trace) = writer.write_file_traced(write("new.txt", "hi")).await;
        let receipt = result.unwrap();

        assert_eq!(receipt.action, WriteAction::Created);
        assert_eq!(
            trace,
            vec![
                WriteState::Idle,
                WriteState::LookingUp,
                WriteState::NotFound,
                WriteState::Committing,
                WriteState::Committed,
            ]
        );
        let commits = host.commits();
        assert_eq!(commits.len(), 1);
        assert!(commits[0].created);
    }

    #[tokio::test]
    async fn test_update_uses_captured_token() {
        let host = MockRepositoryHost::new().with_file(&coords(), "main", "a.txt", "old");
        let writer = WriteBack::new(Arc::new(host.clone()));

        let (result, trace) = writer.write_file_traced(write("a.txt", "new")).await;
        let receipt = result.unwrap();

        assert_eq!(receipt.action, WriteAction::Updated);
        assert_eq!(trace[2], WriteState::Found(ConcurrencyToken::new("a.txt-v1")));
        assert_eq!(receipt.new_token.as_str(), "a.txt-v2");
        assert_eq!(
            host.file_content(&coords().file("a.txt", "main")).as_deref(),
            Some("new")
        );
    }

    #[tokio::test]
    async fn test_stale_token_is_conflict_and_keeps_remote() {
        let host = MockRepositoryHost::new().with_file(&coords(), "main", "a.txt", "old");
        host.interleave_write("a.txt", "someone else");
        let writer = WriteBack::new(Arc::new(host.clone()));

        let (result, trace) = writer.write_file_traced(write("a.txt", "mine")).await;

        assert!(matches!(result, Err(WriteBackError::Conflict { .. })));
        assert_eq!(trace.last(), Some(&WriteState::Conflict));
        assert_eq!(
            host.file_content(&coords().file("a.txt", "main")).as_deref(),
            Some("someone else")
        );
        assert!(host.commits().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_failure_aborts_before_commit() {
        let host = MockRepositoryHost::new().with_repo(&coords(), "main");
        host.fail_next(
            HostOp::GetFile,
            HostError::Auth {
                message: "Bad credentials".to_string(),
            },
        );
        let writer = WriteBack::new(Arc::new(host.clone()));

        let (result, trace) = writer.write_file_traced(write("a.txt", "x")).await;

        let err = result.unwrap_err();
        assert!(matches!(err, WriteBackError::LookupFailed { .. }));
        assert!(matches!(err.host_error(), Some(HostError::Auth { .. })));
        assert_eq!(trace.last(), Some(&WriteState::LookupFailed));
        assert_eq!(host.call_count(HostOp::PutFile), 0);
    }

    #[tokio::test]
    async fn test_commit_is_not_retried() {
        let host = MockRepositoryHost::new().with_repo(&coords(), "main");
        host.fail_next(
            HostOp::PutFile,
            HostError::Unavailable {
                message: "bad gateway".to_string(),
                status: Some(502),
            },
        );
        let writer = WriteBack::new(Arc::new(host.clone())).with_lookup_retry(RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        });

        let err = writer.write_file(write("a.txt", "x")).await.unwrap_err();
        assert!(matches!(err, WriteBackError::CommitFailed { .. }));
        assert_eq!(host.call_count(HostOp::PutFile), 1);
    }

    #[tokio::test]
    async fn test_write_many_reports_each_item() {
        let host = MockRepositoryHost::new()
            .with_file(&coords(), "main", "a.txt", "a")
            .with_file(&coords(), "main", "b.txt", "b");
        host.interleave_write("b.txt", "changed");
        let writer = WriteBack::new(Arc::new(host.clone()));

        let reports = writer
            .write_many(vec![
                write("a.txt", "a2"),
                write("b.txt", "b2"),
                write("c.txt", "c"),
            ])
            .await;

        let paths: Vec<_> = reports.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "b.txt", "c.txt"]);
        assert!(reports[0].is_success());
        assert!(matches!(
            reports[1].result,
            Err(WriteBackError::Conflict { .. })
        ));
        assert_eq!(
            reports[2].result.as_ref().unwrap().action,
            WriteAction::Created
        );
    }

    #[tokio::test]
    async fn test_same_path_writes_are_serialised() {
        let host = MockRepositoryHost::new().with_file(&coords(), "main", "a.txt", "a");
        let writer = WriteBack::new(Arc::new(host.clone()));

        let reports = writer
            .write_many(vec![write("a.txt", "first"), write("a.txt", "second")])
            .await;

        assert!(reports.iter().all(FileWriteReport::is_success));
        assert_eq!(host.commits().len(), 2);
    }

    #[tokio::test]
    async fn test_aliased_paths_share_one_lock() {
        let host = MockRepositoryHost::new().with_file(&coords(), "main", "a.txt", "a");
        let writer = WriteBack::new(Arc::new(host.clone()));

        let reports = writer
            .write_many(vec![write("a.txt", "first"), write("./a.txt", "second")])
            .await;

        assert!(reports.iter().all(FileWriteReport::is_success));
        let commits = host.commits();
        assert_eq!(commits.len(), 2);
        assert!(commits.iter().all(|c| c.file.path == "a.txt"));
        assert!(commits.iter().all(|c| !c.created));
    }

    #[tokio::test]
    async fn test_lock_table_is_pruned_after_release() {
        let locks = PathLocks::new();
        let file = coords().file("src/./lib.rs", "main");

        let guard = locks.acquire(&file).await;
        assert_eq!(locks.len(), 1);
        drop(guard);
        assert!(locks.is_empty());

        let host = MockRepositoryHost::new().with_repo(&coords(), "main");
        let writer = WriteBack::new(Arc::new(host)).with_locks(locks.clone());
        writer
            .write_many(vec![write("a.txt", "1"), write("b.txt", "2")])
            .await;
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_waiter_keeps_entry_alive() {
        let locks = PathLocks::new();
        let file = coords().file("a.txt", "main");

        let first = locks.acquire(&file).await;
        let waiter = {
            let locks = locks.clone();
            let file = coords().file("./a.txt", "main");
            tokio::spawn(async move {
                let _second = locks.acquire(&file).await;
            })
        };
        tokio::task::yield_now().await;
        drop(first);
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }

    #[test]
    fn test_canonical_path() {
        assert_eq!(crate::github::types::canonical_path("./src//a.rs"), "src/a.rs");
        assert_eq!(crate::github::types::canonical_path("src/./x.rs"), "src/x.rs");
        assert_eq!(crate::github::types::canonical_path("a.txt"), "a.txt");
        assert_eq!(crate::github::types::canonical_path("./"), "");
    }

    #[test]
    fn test_terminal_states() {
        assert!(WriteState::Committed.is_terminal());
        assert!(WriteState::Conflict.is_terminal());
        assert!(!WriteState::Committing.is_terminal());
        assert!(!WriteState::Found(ConcurrencyToken::new("x")).is_terminal());
    }
}
