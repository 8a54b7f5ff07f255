//! gitsync Sync - Synchronization orchestrator
//!
//! Provides:
//! - A pull-then-push pipeline with lock-aware waiting and rebase recovery
//! - A debounced, coalescing coordinator that allows one run at a time
//! - Reconnect-triggered retries when the network is down
//! - Ordered delivery of user-facing notifications
//!
//! ## Modules
//!
//! - [`pipeline`] - One download/upload attempt against the version control backend
//! - [`coordinator`] - Request intake, debounce and the busy/pending state machine
//! - [`retry`] - At-most-one reconnect retry task
//! - [`lock`] - Waiting for the repository lock artifact to clear
//! - [`notifier`] - Single-consumer notification dispatcher
//! - [`watcher`] - Working tree change detection

pub mod coordinator;
pub mod lock;
pub mod notifier;
pub mod pipeline;
pub mod retry;
pub mod watcher;

use std::path::PathBuf;

use gitsync_core::domain::errors::DomainError;
use gitsync_core::ports::{SyncEvent, VcsError};
use thiserror::Error;

pub use coordinator::{CoordinatorSettings, SyncCoordinator, SyncHandle, SyncRequest};
pub use notifier::{NotificationDispatcher, TracingNotifier};
pub use pipeline::{PipelineSettings, SyncPipeline, SyncReport, MAX_REBASE_ATTEMPTS};
pub use retry::NetworkRetryScheduler;

/// Errors that can terminate a synchronization attempt
#[derive(Debug, Error)]
pub enum SyncError {
    /// No network connection; the attempt is retried on reconnect
    #[error("Network unavailable")]
    NetworkUnavailable,

    #[error("Invalid remote: {0}")]
    InvalidRemote(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Transport failure or timeout talking to the remote
    #[error("Transport error: {0}")]
    Transport(String),

    /// Local modifications block the merge of incoming changes
    #[error("Local changes conflict with incoming changes: {0}")]
    DirtyWorktreeConflict(String),

    /// The merge stopped with conflicts that need manual resolution
    #[error("Checkout conflict: {0}")]
    CheckoutConflict(String),

    /// A previous merge still has unresolved files
    #[error("Ongoing merge conflict in {} file(s)", .0.len())]
    OngoingMergeConflict(Vec<PathBuf>),

    #[error("Push rejected (non-fast-forward) for {0}")]
    NonFastForwardRejected(String),

    #[error("Remote ref does not exist: {0}")]
    RefDoesNotExist(String),

    #[error("Remote refused to delete {0}")]
    DeleteRejected(String),

    #[error("Remote ref changed during push: {0}")]
    RemoteChangedRejected(String),

    #[error("Push rejected{}", .0.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    OtherRejected(Option<String>),

    /// The backend ran out of memory, typically on a very large file
    #[error("File too large: {0}")]
    FileTooLarge(String),

    /// The repository lock artifact never cleared
    #[error("Repository lock {path} still held after {waited_secs}s")]
    LockTimeout { path: PathBuf, waited_secs: u64 },

    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    /// The coordinator is no longer accepting requests
    #[error("Sync coordinator stopped")]
    CoordinatorStopped,

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl SyncError {
    /// Failures caused by lost connectivity, handled by retry scheduling
    pub fn is_network(&self) -> bool {
        matches!(self, SyncError::NetworkUnavailable | SyncError::Transport(_))
    }

    /// Failures that hand the repository over to manual conflict resolution
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            SyncError::DirtyWorktreeConflict(_)
                | SyncError::CheckoutConflict(_)
                | SyncError::OngoingMergeConflict(_)
        )
    }

    /// The user-facing event that reports this failure
    pub fn user_event(&self) -> SyncEvent {
        match self {
            SyncError::DirtyWorktreeConflict(_) | SyncError::CheckoutConflict(_) => {
                SyncEvent::CheckoutConflictDetected
            }
            SyncError::OngoingMergeConflict(_) => SyncEvent::OngoingMergeConflict,
            SyncError::RepositoryNotFound(_) => SyncEvent::RepositoryNotFound,
            _ => SyncEvent::SyncFailed,
        }
    }
}

impl From<VcsError> for SyncError {
    fn from(err: VcsError) -> Self {
        match err {
            VcsError::InvalidRemote(m) => SyncError::InvalidRemote(m),
            VcsError::Authentication(m) => SyncError::AuthenticationFailed(m),
            VcsError::Transport(m) | VcsError::Timeout(m) => SyncError::Transport(m),
            VcsError::CheckoutConflict(m) => SyncError::CheckoutConflict(m),
            VcsError::DirtyWorktree(m) => SyncError::DirtyWorktreeConflict(m),
            VcsError::OutOfMemory(m) => SyncError::FileTooLarge(m),
            VcsError::NotFound(m) | VcsError::Generic(m) => SyncError::Unexpected(m),
        }
    }
}

impl From<DomainError> for SyncError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidPath(p) | DomainError::NotARepository(p) => {
                SyncError::RepositoryNotFound(p)
            }
            other => SyncError::Unexpected(other.to_string()),
        }
    }
}

/// Renders a path list for error messages
pub(crate) fn describe_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "no paths reported".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vcs_errors_map_to_taxonomy() {
        assert!(matches!(
            SyncError::from(VcsError::Timeout("slow".into())),
            SyncError::Transport(_)
        ));
        assert!(matches!(
            SyncError::from(VcsError::OutOfMemory("inflate".into())),
            SyncError::FileTooLarge(_)
        ));
        assert!(matches!(
            SyncError::from(VcsError::DirtyWorktree("a.txt".into())),
            SyncError::DirtyWorktreeConflict(_)
        ));
    }

    #[test]
    fn test_classification() {
        assert!(SyncError::NetworkUnavailable.is_network());
        assert!(SyncError::Transport("reset".into()).is_network());
        assert!(!SyncError::AuthenticationFailed("bad token".into()).is_network());

        assert!(SyncError::CheckoutConflict("x".into()).is_conflict());
        assert!(!SyncError::NonFastForwardRejected("refs/heads/main".into()).is_conflict());
    }

    #[test]
    fn test_user_events() {
        assert_eq!(
            SyncError::DirtyWorktreeConflict("x".into()).user_event(),
            SyncEvent::CheckoutConflictDetected
        );
        assert_eq!(
            SyncError::OngoingMergeConflict(vec![PathBuf::from("a")]).user_event(),
            SyncEvent::OngoingMergeConflict
        );
        assert_eq!(
            SyncError::from(DomainError::NotARepository("/tmp/x".into())).user_event(),
            SyncEvent::RepositoryNotFound
        );
        assert_eq!(
            SyncError::RefDoesNotExist("refs/heads/x".into()).user_event(),
            SyncEvent::SyncFailed
        );
    }

    #[test]
    fn test_other_rejected_message() {
        assert_eq!(SyncError::OtherRejected(None).to_string(), "Push rejected");
        assert_eq!(
            SyncError::OtherRejected(Some("hook declined".into())).to_string(),
            "Push rejected: hook declined"
        );
    }
}
