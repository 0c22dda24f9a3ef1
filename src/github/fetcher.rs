//! Repository content fetcher
//!
//! Walks a branch's tree and concatenates every textual file into a single
//! corpus for the model. Binary and non-UTF-8 files are skipped. Transport
//! failures fail the whole fetch.

use super::host::{HostError, RepositoryHost};
use super::types::{RepoCoordinates, TreeEntry};
use crate::util::retry::{retry_with_backoff, RetryPolicy};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::fmt::Write as _;
use tracing::{debug, info};

const CONCURRENT_BLOB_READS: usize = 8;

/// Why a file was left out of the corpus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Binary,
    NotUtf8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

/// Every textual file of one branch, in path order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryCorpus {
    pub branch: String,
    pub files: Vec<SourceFile>,
    pub skipped: Vec<SkippedFile>,
}

impl RepositoryCorpus {
    /// Serializes the corpus as one text blob with a header per file
    pub fn render(&self) -> String {
        let mut out = String::new();
        for file in &self.files {
            let _ = writeln!(out, "=== {} ===", file.path);
            out.push_str(&file.content);
            if !file.content.ends_with('\n') {
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }

    pub fn total_bytes(&self) -> usize {
        self.files.iter().map(|f| f.content.len()).sum()
    }
}

fn classify(path: String, bytes: Vec<u8>) -> Result<SourceFile, SkippedFile> {
    if bytes.contains(&0) {
        return Err(SkippedFile {
            path,
            reason: SkipReason::Binary,
        });
    }
    match String::from_utf8(bytes) {
        Ok(content) => Ok(SourceFile { path, content }),
        Err(_) => Err(SkippedFile {
            path,
            reason: SkipReason::NotUtf8,
        }),
    }
}

/// Fetches every file on the requested (or default) branch.
///
/// Read calls are retried per `policy` on transient failures only.
pub async fn fetch_repository(
    host: &dyn RepositoryHost,
    coords: &RepoCoordinates,
    policy: &RetryPolicy,
) -> Result<RepositoryCorpus, HostError> {
    let branch = match &coords.branch {
        Some(branch) => branch.clone(),
        None => {
            retry_with_backoff(policy, "default_branch", HostError::is_transient, || {
                host.default_branch(coords)
            })
            .await?
        }
    };

    let mut entries = retry_with_backoff(policy, "list_files", HostError::is_transient, || {
        host.list_files(coords, &branch)
    })
    .await?;
    entries.sort_by(|a, b| a.path.cmp(&b.path));

    debug!(repo = %coords, branch = %branch, entries = entries.len(), "Listed repository tree");

    let blobs: Vec<(TreeEntry, Vec<u8>)> = stream::iter(entries)
        .map(|entry| async move {
            let bytes = retry_with_backoff(policy, "read_blob", HostError::is_transient, || {
                host.read_blob(coords, &entry)
            })
            .await?;
            Ok::<_, HostError>((entry, bytes))
        })
        .buffered(CONCURRENT_BLOB_READS)
        .try_collect()
        .await?;

    let mut files = Vec::new();
    let mut skipped = Vec::new();
    for (entry, bytes) in blobs {
        match classify(entry.path, bytes) {
            Ok(file) => files.push(file),
            Err(skip) => {
                debug!(path = %skip.path, reason = ?skip.reason, "Skipping file");
                skipped.push(skip);
            }
        }
    }

    let corpus = RepositoryCorpus {
        branch,
        files,
        skipped,
    };
    info!(
        repo = %coords,
        branch = %corpus.branch,
        files = corpus.files.len(),
        skipped = corpus.skipped.len(),
        bytes = corpus.total_bytes(),
        "Fetched repository"
    );
    Ok(corpus)
}
