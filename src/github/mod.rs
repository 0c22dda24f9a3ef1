//! Source-control access: fetching repository content and writing files back

pub mod client;
pub mod fetcher;
pub mod host;
pub mod mock;
pub mod types;
pub mod writeback;

pub use client::{GitHubClient, DEFAULT_GITHUB_API_BASE};
pub use fetcher::{fetch_repository, RepositoryCorpus, SkipReason, SkippedFile, SourceFile};
pub use host::{HostError, RepositoryHost};
pub use mock::{HostOp, MockRepositoryHost, RecordedCommit};
pub use types::{
    CommitRef, ConcurrencyToken, FileRef, InvalidCoordinates, PutFile, PutOutcome, RemoteFile,
    RepoCoordinates, TreeEntry,
};
pub use writeback::{
    FileWrite, FileWriteReport, PathGuard, PathLocks, WriteAction, WriteBack, WriteBackError,
    WriteReceipt, WriteState,
};
