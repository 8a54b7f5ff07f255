//! Version control backend port (driven/secondary port)
//!
//! This module defines the repository-level operations the sync pipeline
//! sequences: fetch, pull, push, stage, commit, rebase, reset, status,
//! checkout and merge abort. The primary implementation wraps libgit2.
//!
//! ## Design Notes
//!
//! - Unlike the other ports this one returns a classified [`VcsError`]
//!   instead of `anyhow::Result`: the pipeline branches on the error class
//!   (network, auth, conflict) and must not parse message text.
//! - Implementations never retry internally. Recovery (rebase on rejection,
//!   reconnect retries) belongs to the caller.
//! - Network operations must be bounded in time by the implementation.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Classified failure of a backend operation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VcsError {
    /// The remote is missing from the repository config or its URL is unusable
    #[error("invalid remote: {0}")]
    InvalidRemote(String),

    /// Credentials were rejected or none were acceptable
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Connection could not be established or was dropped
    #[error("transport error: {0}")]
    Transport(String),

    /// A network operation exceeded its time bound
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Checking out files would overwrite or conflict with working tree content
    #[error("checkout conflict: {0}")]
    CheckoutConflict(String),

    /// Uncommitted local modifications block the operation
    #[error("dirty working tree: {0}")]
    DirtyWorktree(String),

    /// An object could not be inflated or allocated
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// The repository, a reference or an object does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Anything the backend could not classify further
    #[error("{0}")]
    Generic(String),
}

impl VcsError {
    /// Whether the failure indicates lost connectivity
    pub fn is_network(&self) -> bool {
        matches!(self, VcsError::Transport(_) | VcsError::Timeout(_))
    }
}

// ============================================================================
// DTOs
// ============================================================================

/// Result of fetching a remote
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResult {
    /// Commit id of local HEAD, `None` on an unborn branch
    pub local_head: Option<String>,
    /// Commit id of the fetched upstream tracking ref, `None` if there is none
    pub remote_head: Option<String>,
    /// Number of tracking refs the fetch moved
    pub updated_refs: usize,
}

impl FetchResult {
    /// True when local HEAD and the fetched remote ref point to the same commit
    pub fn heads_match(&self) -> bool {
        self.local_head == self.remote_head
    }
}

/// Result of a pull (fetch + merge)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "paths", rename_all = "snake_case")]
pub enum MergeResult {
    /// Local history already contains the upstream tip
    AlreadyUpToDate,
    /// HEAD was moved forward to the upstream tip
    FastForward,
    /// A merge commit was created without conflicts
    Merged,
    /// The merge stopped with conflict markers in these files
    Conflicting(Vec<PathBuf>),
    /// Uncommitted changes in these files would be overwritten
    DirtyWorktree(Vec<PathBuf>),
}

impl MergeResult {
    /// Whether the merge left the repository in a consistent, committed state
    pub fn is_successful(&self) -> bool {
        matches!(
            self,
            MergeResult::AlreadyUpToDate | MergeResult::FastForward | MergeResult::Merged
        )
    }
}

/// Per-ref outcome of a push as reported by the remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefUpdateStatus {
    Ok,
    UpToDate,
    RejectedNonFastForward,
    RejectedNoDelete,
    RejectedRemoteChanged,
    NonExisting,
    RejectedOtherReason(Option<String>),
}

impl RefUpdateStatus {
    /// Maps a remote rejection message to a status
    ///
    /// `None` means the remote accepted the update. Servers only report
    /// free-form text here, so this is the one place message matching is used.
    pub fn from_remote_message(message: Option<&str>) -> Self {
        let Some(message) = message else {
            return RefUpdateStatus::Ok;
        };
        let lower = message.to_lowercase();
        if lower.contains("non-fast-forward")
            || lower.contains("fetch first")
            || lower.contains("not fast-forward")
        {
            RefUpdateStatus::RejectedNonFastForward
        } else if lower.contains("deletion prohibited") || lower.contains("deny deleting") {
            RefUpdateStatus::RejectedNoDelete
        } else if lower.contains("stale info") || lower.contains("remote ref changed") {
            RefUpdateStatus::RejectedRemoteChanged
        } else if lower.contains("does not exist") || lower.contains("does not match any") {
            RefUpdateStatus::NonExisting
        } else if lower.contains("up to date") {
            RefUpdateStatus::UpToDate
        } else {
            RefUpdateStatus::RejectedOtherReason(Some(message.to_string()))
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, RefUpdateStatus::Ok | RefUpdateStatus::UpToDate)
    }
}

/// One remote ref touched by a push
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRefUpdate {
    pub refname: String,
    pub status: RefUpdateStatus,
}

/// Result of rebasing the current branch onto an upstream ref
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum RebaseResult {
    /// All local commits were replayed
    Ok,
    /// Nothing to replay
    UpToDate,
    /// Replaying stopped on conflicts in these files; the rebase is still in progress
    Conflicts(Vec<PathBuf>),
    /// The rebase could not start or continue
    Failed(String),
}

impl RebaseResult {
    pub fn is_successful(&self) -> bool {
        matches!(self, RebaseResult::Ok | RebaseResult::UpToDate)
    }
}

/// Working tree status split into the sets the pipeline needs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoStatus {
    /// Tracked paths modified, deleted, renamed or staged
    pub modified: Vec<PathBuf>,
    /// Paths not yet tracked
    pub untracked: Vec<PathBuf>,
    /// Paths with unresolved merge conflicts
    pub conflicting: Vec<PathBuf>,
}

impl RepoStatus {
    /// Union of modified and untracked paths, modified first
    pub fn changed_paths(&self) -> Vec<PathBuf> {
        self.modified
            .iter()
            .chain(self.untracked.iter())
            .cloned()
            .collect()
    }

    pub fn has_changes(&self) -> bool {
        !self.modified.is_empty() || !self.untracked.is_empty()
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicting.is_empty()
    }
}

/// In-progress operation recorded in the repository metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryState {
    Clean,
    Merging,
    Rebasing,
    Other,
}

/// Commit author identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Author {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl std::fmt::Display for Author {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// Summary of one commit for history listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    /// Abbreviated commit id
    pub id: String,
    /// First line of the message
    pub summary: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    /// Lines added relative to the first parent
    pub additions: usize,
    /// Lines removed relative to the first parent
    pub deletions: usize,
}

// ============================================================================
// IVersionControl trait
// ============================================================================

/// Port trait for repository operations against one working tree
///
/// ## Implementation Notes
///
/// - `pull` must report a blocked merge through [`MergeResult`] rather than
///   an error, so the pipeline can route it into conflict resolution.
/// - `push` returns one [`RemoteRefUpdate`] per pushed ref. A transport-level
///   non-fast-forward refusal is reported as `RejectedNonFastForward`, not
///   as an error.
/// - `stage` with `None` stages every change; with a list it stages only
///   those paths (relative to the working tree). Deletions are staged too.
/// - `commit` completes an in-progress merge when MERGE_HEAD is present.
#[async_trait::async_trait]
pub trait IVersionControl: Send + Sync {
    /// Fetches `remote` and reports local HEAD against the upstream ref
    async fn fetch(&self, remote: &str) -> Result<FetchResult, VcsError>;

    /// Fetches `remote` and merges the upstream ref into the current branch
    async fn pull(&self, remote: &str) -> Result<MergeResult, VcsError>;

    /// Pushes the current branch to `remote`
    async fn push(&self, remote: &str, force: bool) -> Result<Vec<RemoteRefUpdate>, VcsError>;

    /// Adds new/modified paths, then records deletions
    async fn stage(&self, paths: Option<&[PathBuf]>) -> Result<(), VcsError>;

    /// Commits the index and returns the new commit id
    async fn commit(&self, author: &Author, message: &str) -> Result<String, VcsError>;

    /// Rebases the current branch onto `upstream` (a full ref name)
    async fn rebase(&self, upstream: &str) -> Result<RebaseResult, VcsError>;

    /// Aborts an in-progress rebase; a no-op when none is in progress
    async fn rebase_abort(&self) -> Result<(), VcsError>;

    /// Resets index and working tree to `reference` (HEAD when `None`)
    async fn reset_hard(&self, reference: Option<&str>) -> Result<(), VcsError>;

    async fn status(&self) -> Result<RepoStatus, VcsError>;

    /// Discards local changes to one path
    async fn checkout_path(&self, path: &Path) -> Result<(), VcsError>;

    /// Abandons an in-progress merge and clears merge state
    async fn merge_abort(&self) -> Result<(), VcsError>;

    async fn state(&self) -> Result<RepositoryState, VcsError>;

    /// Full name of the current branch's upstream tracking ref
    async fn upstream_ref(&self) -> Result<Option<String>, VcsError>;

    /// `user.name` / `user.email` from repository or global config
    async fn configured_author(&self) -> Result<Option<Author>, VcsError>;

    /// Most recent commits on the current branch, newest first
    async fn recent_commits(&self, limit: usize) -> Result<Vec<CommitSummary>, VcsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_message_classification() {
        assert_eq!(RefUpdateStatus::from_remote_message(None), RefUpdateStatus::Ok);
        assert_eq!(
            RefUpdateStatus::from_remote_message(Some("rejected (non-fast-forward)")),
            RefUpdateStatus::RejectedNonFastForward
        );
        assert_eq!(
            RefUpdateStatus::from_remote_message(Some("fetch first")),
            RefUpdateStatus::RejectedNonFastForward
        );
        assert_eq!(
            RefUpdateStatus::from_remote_message(Some("deletion prohibited")),
            RefUpdateStatus::RejectedNoDelete
        );
        assert_eq!(
            RefUpdateStatus::from_remote_message(Some("stale info")),
            RefUpdateStatus::RejectedRemoteChanged
        );
        assert_eq!(
            RefUpdateStatus::from_remote_message(Some("pre-receive hook declined")),
            RefUpdateStatus::RejectedOtherReason(Some("pre-receive hook declined".into()))
        );
    }

    #[test]
    fn test_status_changed_paths() {
        let status = RepoStatus {
            modified: vec![PathBuf::from("a")],
            untracked: vec![PathBuf::from("b")],
            conflicting: vec![],
        };
        assert_eq!(
            status.changed_paths(),
            vec![PathBuf::from("a"), PathBuf::from("b")]
        );
        assert!(status.has_changes());
        assert!(!status.has_conflicts());
        assert!(!RepoStatus::default().has_changes());
    }

    #[test]
    fn test_fetch_heads_match() {
        let same = FetchResult {
            local_head: Some("abc".into()),
            remote_head: Some("abc".into()),
            updated_refs: 0,
        };
        assert!(same.heads_match());
        let differ = FetchResult {
            remote_head: Some("def".into()),
            ..same.clone()
        };
        assert!(!differ.heads_match());
    }

    #[test]
    fn test_network_classification() {
        assert!(VcsError::Transport("x".into()).is_network());
        assert!(VcsError::Timeout("x".into()).is_network());
        assert!(!VcsError::Authentication("x".into()).is_network());
    }

    #[test]
    fn test_merge_result_success() {
        assert!(MergeResult::FastForward.is_successful());
        assert!(!MergeResult::Conflicting(vec![]).is_successful());
        assert!(!MergeResult::DirtyWorktree(vec![]).is_successful());
    }
}
