//! Synchronization pipeline
//!
//! The [`SyncPipeline`] runs one attempt against the version control
//! backend and classifies what happened.
//!
//! ## Flow
//!
//! 1. **Download**: fetch, compare local HEAD with the fetched upstream,
//!    pull only when they differ
//! 2. **Lock wait**: block until `.git/index.lock` is gone
//! 3. **Upload**: stage and commit local changes, then push
//! 4. **Recovery**: on a non-fast-forward rejection, rebase onto the
//!    upstream (or, if that fails, download again) and push once more
//! 5. **Lock wait** again before reporting
//!
//! Any phase error ends the run; the error *is* the Failed outcome.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use gitsync_core::config::{CommitConfig, Config};
use gitsync_core::domain::{RepositoryHandle, SyncOutcome};
use gitsync_core::ports::{
    Author, IVersionControl, MergeResult, RefUpdateStatus, RemoteRefUpdate, RepositoryState,
    SyncEvent,
};
use tracing::{debug, info, warn};

use crate::lock::wait_for_lock_release;
use crate::notifier::NotificationDispatcher;
use crate::{describe_paths, SyncError};

/// How many times a rejected push is recovered and retried
pub const MAX_REBASE_ATTEMPTS: u32 = 1;

// ============================================================================
// Settings
// ============================================================================

/// Inputs the pipeline reads but does not own
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub remote: String,
    pub lock_poll: Duration,
    pub lock_timeout: Duration,
    pub commit: CommitConfig,
    /// Username from the auth settings, last resort for the commit author
    pub auth_username: Option<String>,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            remote: config.repository.remote.clone(),
            lock_poll: config.sync.lock_poll(),
            lock_timeout: config.sync.lock_timeout(),
            commit: config.commit.clone(),
            auth_username: config.auth.username().map(str::to_string),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

// ============================================================================
// SyncReport
// ============================================================================

/// Per-phase outcome of a successful run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub download: SyncOutcome,
    pub upload: SyncOutcome,
}

impl SyncReport {
    /// Performed if either phase did work, otherwise NotRequired
    pub fn outcome(&self) -> SyncOutcome {
        self.download.combine(self.upload)
    }

    pub fn not_required() -> Self {
        Self {
            download: SyncOutcome::NotRequired,
            upload: SyncOutcome::NotRequired,
        }
    }
}

/// What the upload phase should stage and how to label the commit
#[derive(Debug, Clone, Default)]
struct UploadPlan {
    /// Explicit path list; `None` stages every change
    paths: Option<Vec<PathBuf>>,
    message: Option<String>,
    /// Commit even without changed paths when a merge is in progress
    completes_merge: bool,
}

/// Start notifications are sent once per run, by the first phase that acts
#[derive(Debug)]
struct RunProgress {
    announced: bool,
    start_event: Option<SyncEvent>,
}

impl RunProgress {
    fn new(start_event: Option<SyncEvent>) -> Self {
        Self {
            announced: false,
            start_event,
        }
    }
}

enum PushVerdict {
    Accepted,
    NonFastForward(String),
}

// ============================================================================
// SyncPipeline
// ============================================================================

/// Executes download-then-upload attempts against one repository
pub struct SyncPipeline {
    backend: Arc<dyn IVersionControl>,
    repository: RepositoryHandle,
    settings: PipelineSettings,
    notifier: NotificationDispatcher,
}

impl SyncPipeline {
    pub fn new(
        backend: Arc<dyn IVersionControl>,
        repository: RepositoryHandle,
        settings: PipelineSettings,
        notifier: NotificationDispatcher,
    ) -> Self {
        Self {
            backend,
            repository,
            settings,
            notifier,
        }
    }

    pub fn backend(&self) -> &Arc<dyn IVersionControl> {
        &self.backend
    }

    pub fn repository(&self) -> &RepositoryHandle {
        &self.repository
    }

    pub fn notifier(&self) -> &NotificationDispatcher {
        &self.notifier
    }

    /// Full sync: download, then upload every change
    ///
    /// `forced` only affects notifications: a forced run that changes
    /// nothing reports "sync not required", an unforced one stays silent.
    #[tracing::instrument(skip(self), fields(repo = %self.repository))]
    pub async fn run(&self, forced: bool) -> Result<SyncReport, SyncError> {
        info!("Starting sync");
        self.ensure_repository()?;
        let mut progress = RunProgress::new(None);

        let download = self.download(&mut progress).await?;
        debug!(%download, "Download phase finished");
        self.wait_for_lock().await?;

        let upload = self.upload(UploadPlan::default(), &mut progress).await?;
        debug!(%upload, "Upload phase finished");
        self.wait_for_lock().await?;

        let report = SyncReport { download, upload };
        self.announce(&report, forced);
        Ok(report)
    }

    /// Commits and pushes only `paths`, with a user-supplied message
    #[tracing::instrument(skip(self, paths), fields(paths = paths.len()))]
    pub async fn run_manual(
        &self,
        paths: Vec<PathBuf>,
        message: String,
    ) -> Result<SyncReport, SyncError> {
        info!("Starting manual sync");
        self.ensure_repository()?;
        let mut progress = RunProgress::new(None);
        let plan = UploadPlan {
            paths: Some(paths),
            message: Some(message),
            completes_merge: false,
        };

        let upload = self.upload(plan, &mut progress).await?;
        self.wait_for_lock().await?;

        let report = SyncReport {
            download: SyncOutcome::NotRequired,
            upload,
        };
        self.announce(&report, true);
        Ok(report)
    }

    /// Commits the resolved merge and pushes it
    ///
    /// The follow-up forced sync is the coordinator's job.
    #[tracing::instrument(skip(self))]
    pub async fn run_merge(&self, message: Option<String>) -> Result<SyncReport, SyncError> {
        info!("Completing merge");
        self.ensure_repository()?;
        let mut progress = RunProgress::new(Some(SyncEvent::ResolvingMerge));
        let plan = UploadPlan {
            paths: None,
            message,
            completes_merge: true,
        };

        let upload = self.upload(plan, &mut progress).await?;
        self.wait_for_lock().await?;
        self.notifier.event(SyncEvent::MergeComplete);

        Ok(SyncReport {
            download: SyncOutcome::NotRequired,
            upload,
        })
    }

    // ------------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------------

    #[tracing::instrument(skip(self, progress))]
    async fn download(&self, progress: &mut RunProgress) -> Result<SyncOutcome, SyncError> {
        let remote = self.settings.remote.as_str();
        let fetch = self.backend.fetch(remote).await?;

        if fetch.remote_head.is_none() || fetch.heads_match() {
            debug!(
                local = ?fetch.local_head,
                remote = ?fetch.remote_head,
                "Local HEAD matches upstream, pull not required"
            );
            return Ok(SyncOutcome::NotRequired);
        }

        info!(
            local = ?fetch.local_head,
            upstream = ?fetch.remote_head,
            "Pulling changes"
        );
        self.start(progress, SyncEvent::PullStarted);

        match self.backend.pull(remote).await? {
            MergeResult::AlreadyUpToDate => Ok(SyncOutcome::NotRequired),
            MergeResult::FastForward | MergeResult::Merged => Ok(SyncOutcome::Performed),
            MergeResult::DirtyWorktree(paths) => {
                warn!(files = paths.len(), "Local changes block the merge");
                Err(SyncError::DirtyWorktreeConflict(describe_paths(&paths)))
            }
            MergeResult::Conflicting(paths) => {
                warn!(files = paths.len(), "Merge stopped on conflicts");
                Err(SyncError::CheckoutConflict(describe_paths(&paths)))
            }
        }
    }

    #[tracing::instrument(skip(self, plan, progress))]
    async fn upload(
        &self,
        plan: UploadPlan,
        progress: &mut RunProgress,
    ) -> Result<SyncOutcome, SyncError> {
        let status = self.backend.status().await?;
        let changed = match &plan.paths {
            Some(paths) => paths.clone(),
            None => status.changed_paths(),
        };
        let merging =
            plan.completes_merge && self.backend.state().await? == RepositoryState::Merging;

        let mut upload = SyncOutcome::NotRequired;
        if !changed.is_empty() || merging {
            info!(files = changed.len(), merging, "Committing local changes");
            self.start(progress, SyncEvent::PushStarted);

            let stage_paths = plan.paths.as_deref();
            self.backend.stage(stage_paths).await?;

            let author = self.resolve_author().await?;
            let message = plan
                .message
                .clone()
                .unwrap_or_else(|| self.settings.commit.format_message(&Local::now()));
            let commit = self.backend.commit(&author, &message).await?;
            info!(%commit, %author, "Created commit");
            upload = SyncOutcome::Performed;
        } else {
            debug!("No local changes to commit");
        }

        self.push_with_recovery(progress).await?;
        Ok(upload)
    }

    async fn push_with_recovery(&self, progress: &mut RunProgress) -> Result<(), SyncError> {
        let remote = self.settings.remote.as_str();
        let mut attempt = 0;

        loop {
            let updates = self.backend.push(remote, false).await?;
            match check_push(&updates)? {
                PushVerdict::Accepted => {
                    debug!(refs = updates.len(), "Push accepted");
                    return Ok(());
                }
                PushVerdict::NonFastForward(refname) => {
                    if attempt >= MAX_REBASE_ATTEMPTS {
                        warn!(%refname, attempt, "Push still rejected after recovery");
                        return Err(SyncError::NonFastForwardRejected(refname));
                    }
                    attempt += 1;
                    info!(%refname, attempt, "Push rejected as non-fast-forward, rebasing");
                    self.recover_rejected_push(progress).await?;
                }
            }
        }
    }

    /// Brings local history on top of the upstream after a rejected push
    async fn recover_rejected_push(&self, progress: &mut RunProgress) -> Result<(), SyncError> {
        if self.backend.state().await? == RepositoryState::Merging {
            info!("Aborting stale merge before rebase");
            self.backend.merge_abort().await?;
        }

        let upstream = self.backend.upstream_ref().await?.ok_or_else(|| {
            SyncError::Unexpected("automatic rebase failed: branch has no upstream".to_string())
        })?;

        let result = self.backend.rebase(&upstream).await?;
        if result.is_successful() {
            info!(%upstream, "Rebased onto upstream");
            return Ok(());
        }

        warn!(%upstream, ?result, "Rebase failed, aborting and downloading again");
        self.backend.rebase_abort().await?;
        self.download(progress).await?;
        self.wait_for_lock().await?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Explicit settings, then repository config, then the auth username
    async fn resolve_author(&self) -> Result<Author, SyncError> {
        let commit = &self.settings.commit;
        let configured = self.backend.configured_author().await?;

        let name = commit
            .author_name
            .clone()
            .filter(|n| !n.is_empty())
            .or_else(|| configured.as_ref().map(|a| a.name.clone()))
            .filter(|n| !n.is_empty())
            .or_else(|| self.settings.auth_username.clone())
            .ok_or_else(|| {
                SyncError::Unexpected(
                    "no commit author: set commit.author_name or git user.name".to_string(),
                )
            })?;
        let email = commit
            .author_email
            .clone()
            .or_else(|| configured.map(|a| a.email))
            .unwrap_or_default();

        Ok(Author::new(name, email))
    }

    /// The working tree or its `.git` may have vanished since startup
    fn ensure_repository(&self) -> Result<(), SyncError> {
        RepositoryHandle::open(self.repository.path())?;
        Ok(())
    }

    async fn wait_for_lock(&self) -> Result<(), SyncError> {
        wait_for_lock_release(
            &self.repository,
            self.settings.lock_poll,
            self.settings.lock_timeout,
        )
        .await
        .map(|_| ())
    }

    fn start(&self, progress: &mut RunProgress, default_event: SyncEvent) {
        if progress.announced {
            return;
        }
        progress.announced = true;
        self.notifier
            .event(progress.start_event.unwrap_or(default_event));
    }

    fn announce(&self, report: &SyncReport, forced: bool) {
        match report.outcome() {
            SyncOutcome::Performed => self.notifier.event(SyncEvent::SyncComplete),
            SyncOutcome::NotRequired if forced => self.notifier.event(SyncEvent::SyncNotRequired),
            _ => debug!("Sync not required"),
        }
    }
}

/// First non-accepted ref update decides the verdict
fn check_push(updates: &[RemoteRefUpdate]) -> Result<PushVerdict, SyncError> {
    for update in updates {
        let refname = update.refname.clone();
        match &update.status {
            RefUpdateStatus::Ok | RefUpdateStatus::UpToDate => continue,
            RefUpdateStatus::RejectedNonFastForward => {
                return Ok(PushVerdict::NonFastForward(refname))
            }
            RefUpdateStatus::NonExisting => return Err(SyncError::RefDoesNotExist(refname)),
            RefUpdateStatus::RejectedNoDelete => return Err(SyncError::DeleteRejected(refname)),
            RefUpdateStatus::RejectedRemoteChanged => {
                return Err(SyncError::RemoteChangedRejected(refname))
            }
            RefUpdateStatus::RejectedOtherReason(reason) => {
                return Err(SyncError::OtherRejected(
                    reason.clone().filter(|r| !r.is_empty()),
                ))
            }
        }
    }
    Ok(PushVerdict::Accepted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(status: RefUpdateStatus) -> RemoteRefUpdate {
        RemoteRefUpdate {
            refname: "refs/heads/main".to_string(),
            status,
        }
    }

    #[test]
    fn test_accepted_push() {
        let verdict = check_push(&[update(RefUpdateStatus::Ok), update(RefUpdateStatus::UpToDate)]);
        assert!(matches!(verdict, Ok(PushVerdict::Accepted)));
        assert!(matches!(check_push(&[]), Ok(PushVerdict::Accepted)));
    }

    #[test]
    fn test_non_fast_forward_is_recoverable() {
        let verdict = check_push(&[update(RefUpdateStatus::RejectedNonFastForward)]);
        assert!(matches!(verdict, Ok(PushVerdict::NonFastForward(r)) if r == "refs/heads/main"));
    }

    #[test]
    fn test_other_rejections_are_fatal() {
        assert!(matches!(
            check_push(&[update(RefUpdateStatus::NonExisting)]),
            Err(SyncError::RefDoesNotExist(_))
        ));
        assert!(matches!(
            check_push(&[update(RefUpdateStatus::RejectedNoDelete)]),
            Err(SyncError::DeleteRejected(_))
        ));
        assert!(matches!(
            check_push(&[update(RefUpdateStatus::RejectedRemoteChanged)]),
            Err(SyncError::RemoteChangedRejected(_))
        ));
        assert!(matches!(
            check_push(&[update(RefUpdateStatus::RejectedOtherReason(Some(String::new())))]),
            Err(SyncError::OtherRejected(None))
        ));
        assert!(matches!(
            check_push(&[update(RefUpdateStatus::RejectedOtherReason(Some("hook".into())))]),
            Err(SyncError::OtherRejected(Some(r))) if r == "hook"
        ));
    }

    #[test]
    fn test_report_outcome() {
        let report = SyncReport {
            download: SyncOutcome::NotRequired,
            upload: SyncOutcome::Performed,
        };
        assert_eq!(report.outcome(), SyncOutcome::Performed);
        assert_eq!(SyncReport::not_required().outcome(), SyncOutcome::NotRequired);
    }

    #[test]
    fn test_settings_from_config() {
        let config = gitsync_core::config::ConfigBuilder::new()
            .repository_remote("upstream")
            .sync_lock_poll_ms(250)
            .build();
        let settings = PipelineSettings::from_config(&config);
        assert_eq!(settings.remote, "upstream");
        assert_eq!(settings.lock_poll, Duration::from_millis(250));
        assert!(settings.auth_username.is_none());
    }
}
