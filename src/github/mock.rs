//! In-memory repository host for tests

use super::host::{HostError, RepositoryHost};
use super::types::{
    CommitRef, ConcurrencyToken, FileRef, PutFile, PutOutcome, RemoteFile, RepoCoordinates,
    TreeEntry,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

type RepoKey = (String, String);

#[derive(Debug, Clone)]
struct StoredFile {
    content: Vec<u8>,
    version: u64,
}

impl StoredFile {
    fn token(&self, path: &str) -> ConcurrencyToken {
        ConcurrencyToken::new(format!("{}-v{}", path, self.version))
    }
}

#[derive(Debug, Default)]
struct RepoState {
    default_branch: String,
    branches: HashMap<String, BTreeMap<String, StoredFile>>,
}

/// A commit recorded by [`MockRepositoryHost`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommit {
    pub file: FileRef,
    pub message: String,
    pub content: String,
    pub created: bool,
    pub sha: String,
}

/// Which host operation a queued failure applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOp {
    DefaultBranch,
    ListFiles,
    ReadBlob,
    GetFile,
    PutFile,
}

#[derive(Default)]
struct Inner {
    repos: HashMap<RepoKey, RepoState>,
    failures: HashMap<HostOp, VecDeque<HostError>>,
    /// Content written out-of-band right after the next lookup of a path
    interleaved: HashMap<String, String>,
    commits: Vec<RecordedCommit>,
    calls: HashMap<HostOp, usize>,
    next_sha: u64,
}

/// Repository host backed by in-memory maps.
///
/// Tokens are `{path}-v{version}` and change on every write. Replacing an
/// existing file requires the current token, mirroring optimistic
/// concurrency on real hosts.
#[derive(Clone, Default)]
pub struct MockRepositoryHost {
    inner: Arc<Mutex<Inner>>,
}

impl MockRepositoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seeds a file on `branch`. The first branch seeded for a repo becomes
    /// its default branch.
    pub fn with_file(
        self,
        coords: &RepoCoordinates,
        branch: &str,
        path: &str,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        {
            let mut inner = self.lock();
            let repo = inner
                .repos
                .entry((coords.owner.clone(), coords.repo.clone()))
                .or_default();
            if repo.default_branch.is_empty() {
                repo.default_branch = branch.to_string();
            }
            repo.branches.entry(branch.to_string()).or_default().insert(
                path.to_string(),
                StoredFile {
                    content: content.into(),
                    version: 1,
                },
            );
        }
        self
    }

    /// Registers an empty repository with the given default branch
    pub fn with_repo(self, coords: &RepoCoordinates, default_branch: &str) -> Self {
        {
            let mut inner = self.lock();
            let repo = inner
                .repos
                .entry((coords.owner.clone(), coords.repo.clone()))
                .or_default();
            repo.default_branch = default_branch.to_string();
            repo.branches.entry(default_branch.to_string()).or_default();
        }
        self
    }

    /// Queues an error returned by the next call of `op`
    pub fn fail_next(&self, op: HostOp, error: HostError) {
        self.lock().failures.entry(op).or_default().push_back(error);
    }

    /// After the next `get_file` of `path`, another writer replaces it with
    /// `content`, so the token just handed out goes stale.
    pub fn interleave_write(&self, path: &str, content: &str) {
        self.lock()
            .interleaved
            .insert(path.to_string(), content.to_string());
    }

    pub fn commits(&self) -> Vec<RecordedCommit> {
        self.lock().commits.clone()
    }

    pub fn call_count(&self, op: HostOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Current content of a file, for assertions
    pub fn file_content(&self, file: &FileRef) -> Option<String> {
        let inner = self.lock();
        inner
            .repos
            .get(&(file.owner.clone(), file.repo.clone()))
            .and_then(|r| r.branches.get(&file.branch))
            .and_then(|b| b.get(&file.path))
            .map(|f| String::from_utf8_lossy(&f.content).into_owned())
    }

    fn begin(&self, op: HostOp) -> Result<std::sync::MutexGuard<'_, Inner>, HostError> {
        let mut inner = self.lock();
        *inner.calls.entry(op).or_default() += 1;
        if let Some(err) = inner.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        Ok(inner)
    }
}

fn not_found(what: impl Into<String>) -> HostError {
    HostError::NotFound { what: what.into() }
}

#[async_trait]
impl RepositoryHost for MockRepositoryHost {
    async fn default_branch(&self, coords: &RepoCoordinates) -> Result<String, HostError> {
        let inner = self.begin(HostOp::DefaultBranch)?;
        inner
            .repos
            .get(&(coords.owner.clone(), coords.repo.clone()))
            .map(|r| r.default_branch.clone())
            .ok_or_else(|| not_found(coords.full_name()))
    }

    async fn list_files(
        &self,
        coords: &RepoCoordinates,
        branch: &str,
    ) -> Result<Vec<TreeEntry>, HostError> {
        let inner = self.begin(HostOp::ListFiles)?;
        let files = inner
            .repos
            .get(&(coords.owner.clone(), coords.repo.clone()))
            .and_then(|r| r.branches.get(branch))
            .ok_or_else(|| not_found(format!("{}@{}", coords.full_name(), branch)))?;

        Ok(files
            .iter()
            .map(|(path, file)| TreeEntry {
                path: path.clone(),
                token: file.token(path),
                size: Some(file.content.len() as u64),
            })
            .collect())
    }

    async fn read_blob(
        &self,
        coords: &RepoCoordinates,
        entry: &TreeEntry,
    ) -> Result<Vec<u8>, HostError> {
        let inner = self.begin(HostOp::ReadBlob)?;
        inner
            .repos
            .get(&(coords.owner.clone(), coords.repo.clone()))
            .into_iter()
            .flat_map(|r| r.branches.values())
            .filter_map(|b| b.get(&entry.path))
            .find(|f| f.token(&entry.path) == entry.token)
            .map(|f| f.content.clone())
            .ok_or_else(|| not_found(entry.path.clone()))
    }

    async fn get_file(&self, file: &FileRef) -> Result<Option<RemoteFile>, HostError> {
        let mut inner = self.begin(HostOp::GetFile)?;
        let key = (file.owner.clone(), file.repo.clone());

        let current = inner
            .repos
            .get(&key)
            .and_then(|r| r.branches.get(&file.branch))
            .and_then(|b| b.get(&file.path))
            .map(|f| RemoteFile {
                path: file.path.clone(),
                content: f.content.clone(),
                token: f.token(&file.path),
            });

        if let Some(content) = inner.interleaved.remove(&file.path) {
            let branch = inner
                .repos
                .entry(key)
                .or_default()
                .branches
                .entry(file.branch.clone())
                .or_default();
            let version = branch.get(&file.path).map(|f| f.version + 1).unwrap_or(1);
            branch.insert(
                file.path.clone(),
                StoredFile {
                    content: content.into_bytes(),
                    version,
                },
            );
        }

        Ok(current)
    }

    async fn put_file(&self, file: &FileRef, put: PutFile) -> Result<PutOutcome, HostError> {
        let mut inner = self.begin(HostOp::PutFile)?;
        inner.next_sha += 1;
        let sha = format!("commit{:04}", inner.next_sha);

        let branch = inner
            .repos
            .get_mut(&(file.owner.clone(), file.repo.clone()))
            .ok_or_else(|| not_found(format!("{}/{}", file.owner, file.repo)))?
            .branches
            .entry(file.branch.clone())
            .or_default();

        let existing = branch.get(&file.path).map(|f| (f.token(&file.path), f.version));
        let version = match (&existing, &put.token) {
            (None, None) => 1,
            (None, Some(_)) => {
                return Err(HostError::Conflict {
                    path: file.path.clone(),
                    message: "file no longer exists".to_string(),
                })
            }
            (Some(_), None) => {
                return Err(HostError::Conflict {
                    path: file.path.clone(),
                    message: "file already exists and no sha was supplied".to_string(),
                })
            }
            (Some((current, version)), Some(expected)) => {
                if current != expected {
                    return Err(HostError::Conflict {
                        path: file.path.clone(),
                        message: format!("{} does not match {}", file.path, expected),
                    });
                }
                version + 1
            }
        };

        let stored = StoredFile {
            content: put.content.clone().into_bytes(),
            version,
        };
        let new_token = stored.token(&file.path);
        branch.insert(file.path.clone(), stored);

        inner.commits.push(RecordedCommit {
            file: file.clone(),
            message: put.message,
            content: put.content,
            created: existing.is_none(),
            sha: sha.clone(),
        });

        Ok(PutOutcome {
            commit: CommitRef { sha, url: None },
            new_token,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
