//! Repository coordinates and remote file shapes

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identifies a repository, optionally pinned to a branch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoCoordinates {
    pub owner: String,
    pub repo: String,
    /// `None` means the repository's default branch
    pub branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid repository '{input}': expected owner/repo[@branch]")]
pub struct InvalidCoordinates {
    pub input: String,
}

impl RepoCoordinates {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch: None,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Parses `owner/repo` or `owner/repo@branch`
    pub fn parse(input: &str) -> Result<Self, InvalidCoordinates> {
        let invalid = || InvalidCoordinates {
            input: input.to_string(),
        };

        let (slug, branch) = match input.trim().split_once('@') {
            Some((slug, branch)) if !branch.is_empty() => (slug, Some(branch)),
            Some(_) => return Err(invalid()),
            None => (input.trim(), None),
        };

        let (owner, repo) = slug.split_once('/').ok_or_else(invalid)?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return Err(invalid());
        }

        let coords = Self::new(owner, repo);
        Ok(match branch {
            Some(branch) => coords.with_branch(branch),
            None => coords,
        })
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Reference to `path` on `branch` of this repository
    pub fn file(&self, path: impl Into<String>, branch: impl Into<String>) -> FileRef {
        FileRef {
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            path: path.into(),
            branch: branch.into(),
        }
    }
}

impl fmt::Display for RepoCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.branch {
            Some(branch) => write!(f, "{}/{}@{}", self.owner, self.repo, branch),
            None => write!(f, "{}/{}", self.owner, self.repo),
        }
    }
}

/// A single path on a single branch. Also the key for per-path write locks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileRef {
    pub owner: String,
    pub repo: String,
    pub path: String,
    pub branch: String,
}

impl FileRef {
    /// Same reference with `.` and empty path segments removed, so every
    /// spelling of one remote file compares equal
    pub fn canonical(&self) -> FileRef {
        FileRef {
            path: canonical_path(&self.path),
            ..self.clone()
        }
    }
}

/// `./src//a.rs` and `src/a.rs` name the same repository path
pub fn canonical_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}@{}", self.owner, self.repo, self.path, self.branch)
    }
}

/// Opaque version marker of a remote file (the blob SHA on GitHub)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConcurrencyToken(String);

impl ConcurrencyToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First seven characters, for log lines
    pub fn short(&self) -> &str {
        self.0.get(..7).unwrap_or(&self.0)
    }
}

impl fmt::Display for ConcurrencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Current remote state of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub path: String,
    pub content: Vec<u8>,
    pub token: ConcurrencyToken,
}

/// Entry of a recursive tree listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub token: ConcurrencyToken,
    pub size: Option<u64>,
}

/// Commit request for a single file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutFile {
    pub message: String,
    /// Plain content; transports encode it as they require
    pub content: String,
    /// Required when replacing an existing file
    pub token: Option<ConcurrencyToken>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub sha: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Result of a successful commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
    pub commit: CommitRef,
    pub new_token: ConcurrencyToken,
}
