//! Git2Backend - IVersionControl implementation over libgit2
//!
//! Each port call hops onto the blocking pool, opens the repository, runs
//! one synchronous routine and returns a classified result. Network calls
//! (fetch, pull, push) are additionally bounded by the network timeout.
//!
//! ## Design Notes
//!
//! - The repository is reopened per call. `git2::Repository` is not `Sync`,
//!   and reopening also picks up config and refs written by other tools.
//! - A merge that cannot start because local edits would be overwritten is
//!   reported as [`MergeResult::DirtyWorktree`], and one that stops with
//!   conflict markers as [`MergeResult::Conflicting`]. Neither is an error.
//! - Push rejections arrive either per ref through `push_update_reference`
//!   or, for local transports, as a `NotFastForward` error. Both end up as
//!   [`RefUpdateStatus`] values.

use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use git2::build::CheckoutBuilder;
use git2::{
    AnnotatedCommit, CheckoutNotificationType, Commit, ErrorCode, FetchOptions, Index,
    IndexAddOption, PushOptions, Repository, ResetType, Signature, Sort, Status,
    StatusOptions,
};
use tracing::{debug, info, warn};

use gitsync_core::config::AuthConfig;
use gitsync_core::domain::RepositoryHandle;
use gitsync_core::ports::{
    Author, CommitSummary, FetchResult, IVersionControl, MergeResult, RebaseResult,
    RefUpdateStatus, RemoteRefUpdate, RepoStatus, RepositoryState, VcsError,
};

use crate::credentials::remote_callbacks;
use crate::error::{classify, is_non_fast_forward};

/// Default bound on fetch, pull and push
pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(120);

/// Identity used for commits the backend creates on its own (merge, rebase)
const FALLBACK_NAME: &str = "gitsync";

type GitResult<T> = Result<T, VcsError>;

// ============================================================================
// Git2Backend
// ============================================================================

/// Version control backend for one working tree
#[derive(Debug, Clone)]
pub struct Git2Backend {
    root: PathBuf,
    auth: AuthConfig,
    network_timeout: Duration,
}

impl Git2Backend {
    pub fn new(repository: &RepositoryHandle, auth: AuthConfig) -> Self {
        Self {
            root: repository.path().to_path_buf(),
            auth,
            network_timeout: DEFAULT_NETWORK_TIMEOUT,
        }
    }

    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Runs `op` against a freshly opened repository on the blocking pool
    async fn with_repo<T, F>(&self, name: &'static str, op: F) -> GitResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Repository, &AuthConfig) -> GitResult<T> + Send + 'static,
    {
        let root = self.root.clone();
        let auth = self.auth.clone();
        tokio::task::spawn_blocking(move || {
            let mut repo = Repository::open(&root).map_err(classify)?;
            op(&mut repo, &auth)
        })
        .await
        .map_err(|e| VcsError::Generic(format!("{name} task failed: {e}")))?
    }

    /// Like [`Self::with_repo`], bounded by the network timeout
    async fn with_network<T, F>(&self, name: &'static str, op: F) -> GitResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Repository, &AuthConfig) -> GitResult<T> + Send + 'static,
    {
        match tokio::time::timeout(self.network_timeout, self.with_repo(name, op)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation = name, timeout = ?self.network_timeout, "Network operation timed out");
                Err(VcsError::Timeout(format!(
                    "{name} did not finish within {}s",
                    self.network_timeout.as_secs()
                )))
            }
        }
    }
}

#[async_trait]
impl IVersionControl for Git2Backend {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, remote: &str) -> Result<FetchResult, VcsError> {
        let remote = remote.to_string();
        self.with_network("fetch", move |repo, auth| fetch_remote(repo, &remote, auth))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn pull(&self, remote: &str) -> Result<MergeResult, VcsError> {
        let remote = remote.to_string();
        self.with_network("pull", move |repo, auth| {
            fetch_remote(repo, &remote, auth)?;
            merge_upstream(repo, &remote)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn push(&self, remote: &str, force: bool) -> Result<Vec<RemoteRefUpdate>, VcsError> {
        let remote = remote.to_string();
        self.with_network("push", move |repo, auth| {
            push_branch(repo, &remote, force, auth)
        })
        .await
    }

    async fn stage(&self, paths: Option<&[PathBuf]>) -> Result<(), VcsError> {
        let paths = paths.map(<[PathBuf]>::to_vec);
        self.with_repo("stage", move |repo, _| stage_paths(repo, paths.as_deref()))
            .await
    }

    #[tracing::instrument(skip(self, author, message), fields(author = %author))]
    async fn commit(&self, author: &Author, message: &str) -> Result<String, VcsError> {
        let author = author.clone();
        let message = message.to_string();
        self.with_repo("commit", move |repo, _| {
            commit_index(repo, &author, &message)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn rebase(&self, upstream: &str) -> Result<RebaseResult, VcsError> {
        let upstream = upstream.to_string();
        self.with_repo("rebase", move |repo, _| rebase_onto(repo, &upstream))
            .await
    }

    async fn rebase_abort(&self) -> Result<(), VcsError> {
        self.with_repo("rebase_abort", |repo, _| match repo.open_rebase(None) {
            Ok(mut rebase) => {
                info!("Aborting in-progress rebase");
                rebase.abort().map_err(classify)
            }
            Err(e) if e.code() == ErrorCode::NotFound => Ok(()),
            Err(e) => Err(classify(e)),
        })
        .await
    }

    async fn reset_hard(&self, reference: Option<&str>) -> Result<(), VcsError> {
        let reference = reference.map(str::to_string);
        self.with_repo("reset_hard", move |repo, _| {
            let target = match reference.as_deref() {
                Some(spec) => repo.revparse_single(spec).map_err(classify)?,
                None => head_commit(repo)?.into_object(),
            };
            repo.reset(&target, ResetType::Hard, None).map_err(classify)
        })
        .await
    }

    async fn status(&self) -> Result<RepoStatus, VcsError> {
        self.with_repo("status", |repo, _| read_status(repo)).await
    }

    async fn checkout_path(&self, path: &Path) -> Result<(), VcsError> {
        let path = path.to_path_buf();
        self.with_repo("checkout_path", move |repo, _| discard_path(repo, &path))
            .await
    }

    async fn merge_abort(&self) -> Result<(), VcsError> {
        self.with_repo("merge_abort", |repo, _| {
            let head = head_commit(repo)?;
            repo.reset(head.as_object(), ResetType::Hard, None)
                .map_err(classify)?;
            repo.cleanup_state().map_err(classify)?;
            info!("Merge aborted");
            Ok(())
        })
        .await
    }

    async fn state(&self) -> Result<RepositoryState, VcsError> {
        self.with_repo("state", |repo, _| {
            Ok(match repo.state() {
                git2::RepositoryState::Clean => RepositoryState::Clean,
                git2::RepositoryState::Merge => RepositoryState::Merging,
                git2::RepositoryState::Rebase
                | git2::RepositoryState::RebaseInteractive
                | git2::RepositoryState::RebaseMerge
                | git2::RepositoryState::ApplyMailboxOrRebase => RepositoryState::Rebasing,
                _ => RepositoryState::Other,
            })
        })
        .await
    }

    async fn upstream_ref(&self) -> Result<Option<String>, VcsError> {
        self.with_repo("upstream_ref", |repo, _| upstream_ref_name(repo, None))
            .await
    }

    async fn configured_author(&self) -> Result<Option<Author>, VcsError> {
        self.with_repo("configured_author", |repo, _| {
            let config = repo.config().map_err(classify)?;
            let Ok(name) = config.get_string("user.name") else {
                return Ok(None);
            };
            let email = config.get_string("user.email").unwrap_or_default();
            Ok(Some(Author::new(name, email)))
        })
        .await
    }

    async fn recent_commits(&self, limit: usize) -> Result<Vec<CommitSummary>, VcsError> {
        self.with_repo("recent_commits", move |repo, _| {
            list_commits(repo, limit)
        })
        .await
    }
}

// ============================================================================
// Network operations
// ============================================================================

fn find_remote<'r>(repo: &'r Repository, name: &str) -> GitResult<git2::Remote<'r>> {
    repo.find_remote(name).map_err(|e| {
        VcsError::InvalidRemote(format!("remote '{name}': {}", e.message()))
    })
}

fn fetch_remote(repo: &Repository, remote_name: &str, auth: &AuthConfig) -> GitResult<FetchResult> {
    let mut remote = find_remote(repo, remote_name)?;
    let updated = Cell::new(0usize);

    {
        let mut callbacks = remote_callbacks(auth);
        callbacks.update_tips(|refname, _, _| {
            debug!(refname, "Tracking ref updated");
            updated.set(updated.get() + 1);
            true
        });
        let mut options = FetchOptions::new();
        options.remote_callbacks(callbacks);

        // empty refspec list: use the remote's configured refspecs
        let refspecs: [&str; 0] = [];
        remote
            .fetch(&refspecs, Some(&mut options), None)
            .map_err(classify)?;
    }

    let local_head = match repo.head() {
        Ok(head) => head.target().map(|oid| oid.to_string()),
        Err(e) if is_unborn(&e) => None,
        Err(e) => return Err(classify(e)),
    };
    let remote_head = upstream_ref_name(repo, Some(remote_name))?
        .and_then(|name| repo.refname_to_id(&name).ok())
        .map(|oid| oid.to_string());

    let result = FetchResult {
        local_head,
        remote_head,
        updated_refs: updated.get(),
    };
    debug!(?result, "Fetch finished");
    Ok(result)
}

/// Merges the upstream tracking ref into the current branch
fn merge_upstream(repo: &Repository, remote_name: &str) -> GitResult<MergeResult> {
    let Some(upstream) = upstream_ref_name(repo, Some(remote_name))? else {
        return Ok(MergeResult::AlreadyUpToDate);
    };
    let reference = match repo.find_reference(&upstream) {
        Ok(r) => r,
        // remote branch not created yet
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(MergeResult::AlreadyUpToDate),
        Err(e) => return Err(classify(e)),
    };
    let theirs = repo
        .reference_to_annotated_commit(&reference)
        .map_err(classify)?;
    let (analysis, _) = repo.merge_analysis(&[&theirs]).map_err(classify)?;

    if analysis.is_up_to_date() {
        return Ok(MergeResult::AlreadyUpToDate);
    }
    if analysis.is_unborn() || analysis.is_fast_forward() {
        return fast_forward(repo, &theirs);
    }
    three_way_merge(repo, &theirs, &upstream)
}

fn fast_forward(repo: &Repository, theirs: &AnnotatedCommit<'_>) -> GitResult<MergeResult> {
    let target = repo.find_commit(theirs.id()).map_err(classify)?;
    let blocked = RefCell::new(Vec::new());

    let checkout = {
        let mut builder = CheckoutBuilder::new();
        builder
            .safe()
            .notify_on(CheckoutNotificationType::CONFLICT)
            .notify(|_, path, _, _, _| {
                if let Some(path) = path {
                    blocked.borrow_mut().push(path.to_path_buf());
                }
                true
            });
        repo.checkout_tree(target.as_object(), Some(&mut builder))
    };
    match checkout {
        Ok(()) => {}
        Err(e) if e.code() == ErrorCode::Conflict => {
            let paths = blocked.into_inner();
            warn!(files = paths.len(), "Fast-forward blocked by local changes");
            return Ok(MergeResult::DirtyWorktree(paths));
        }
        Err(e) => return Err(classify(e)),
    }

    match repo.head() {
        Ok(mut head) => {
            head.set_target(target.id(), "gitsync: fast-forward")
                .map_err(classify)?;
        }
        Err(e) if is_unborn(&e) => {
            let branch = unborn_branch_name(repo)?;
            repo.reference(&branch, target.id(), true, "gitsync: initial fast-forward")
                .map_err(classify)?;
        }
        Err(e) => return Err(classify(e)),
    }

    info!(commit = %target.id(), "Fast-forwarded to upstream");
    Ok(MergeResult::FastForward)
}

fn three_way_merge(
    repo: &Repository,
    theirs: &AnnotatedCommit<'_>,
    upstream: &str,
) -> GitResult<MergeResult> {
    let blocked = RefCell::new(Vec::new());

    let merged = {
        let mut builder = CheckoutBuilder::new();
        builder
            .safe()
            .allow_conflicts(true)
            .conflict_style_merge(true)
            .notify_on(CheckoutNotificationType::CONFLICT)
            .notify(|_, path, _, _, _| {
                if let Some(path) = path {
                    blocked.borrow_mut().push(path.to_path_buf());
                }
                true
            });
        repo.merge(&[theirs], None, Some(&mut builder))
    };
    match merged {
        Ok(()) => {}
        Err(e) if matches!(e.code(), ErrorCode::Conflict | ErrorCode::Uncommitted) => {
            repo.cleanup_state().map_err(classify)?;
            return Ok(MergeResult::DirtyWorktree(blocked.into_inner()));
        }
        Err(e) => return Err(classify(e)),
    }

    let mut index = repo.index().map_err(classify)?;
    if index.has_conflicts() {
        let paths = conflicted_paths(&index)?;
        warn!(files = paths.len(), "Merge stopped on conflicts");
        return Ok(MergeResult::Conflicting(paths));
    }

    let tree_id = index.write_tree().map_err(classify)?;
    let tree = repo.find_tree(tree_id).map_err(classify)?;
    let ours = head_commit(repo)?;
    let theirs = repo.find_commit(theirs.id()).map_err(classify)?;
    let signature = default_signature(repo)?;
    let short = upstream.trim_start_matches("refs/remotes/");
    repo.commit(
        Some("HEAD"),
        &signature,
        &signature,
        &format!("Merge {short}"),
        &tree,
        &[&ours, &theirs],
    )
    .map_err(classify)?;
    repo.cleanup_state().map_err(classify)?;

    info!(upstream = short, "Merged upstream changes");
    Ok(MergeResult::Merged)
}

fn push_branch(
    repo: &Repository,
    remote_name: &str,
    force: bool,
    auth: &AuthConfig,
) -> GitResult<Vec<RemoteRefUpdate>> {
    let head = match repo.head() {
        Ok(head) => head,
        // nothing committed yet, nothing to push
        Err(e) if is_unborn(&e) => return Ok(Vec::new()),
        Err(e) => return Err(classify(e)),
    };
    let Some(local) = head.name().map(str::to_string) else {
        return Err(VcsError::Generic("HEAD has no UTF-8 name".into()));
    };
    if !head.is_branch() {
        return Err(VcsError::Generic("HEAD is detached; nothing to push".into()));
    }

    let destination = merge_ref_of(repo, &local).unwrap_or_else(|| local.clone());
    let refspec = if force {
        format!("+{local}:{destination}")
    } else {
        format!("{local}:{destination}")
    };

    let mut remote = find_remote(repo, remote_name)?;
    let updates = RefCell::new(Vec::new());
    {
        let mut callbacks = remote_callbacks(auth);
        callbacks.push_update_reference(|refname, status| {
            updates.borrow_mut().push(RemoteRefUpdate {
                refname: refname.to_string(),
                status: RefUpdateStatus::from_remote_message(status),
            });
            Ok(())
        });
        let mut options = PushOptions::new();
        options.remote_callbacks(callbacks);

        if let Err(e) = remote.push(&[refspec.as_str()], Some(&mut options)) {
            if is_non_fast_forward(&e) {
                warn!(refspec = %refspec, "Push rejected as non-fast-forward");
                return Ok(vec![RemoteRefUpdate {
                    refname: destination,
                    status: RefUpdateStatus::RejectedNonFastForward,
                }]);
            }
            return Err(classify(e));
        }
    }

    let mut updates = updates.into_inner();
    if updates.is_empty() {
        updates.push(RemoteRefUpdate {
            refname: destination,
            status: RefUpdateStatus::UpToDate,
        });
    }
    debug!(?updates, "Push finished");
    Ok(updates)
}

// ============================================================================
// Local operations
// ============================================================================

fn stage_paths(repo: &Repository, paths: Option<&[PathBuf]>) -> GitResult<()> {
    let mut index = repo.index().map_err(classify)?;

    match paths {
        None => {
            let all = ["*"];
            index
                .add_all(all.iter(), IndexAddOption::DEFAULT, None)
                .map_err(classify)?;
            // records deletions, which add_all skips
            index.update_all(all.iter(), None).map_err(classify)?;
        }
        Some(paths) => {
            let workdir = repo
                .workdir()
                .ok_or_else(|| VcsError::Generic("repository has no working tree".into()))?;
            for path in paths {
                let relative = relative_to_workdir(repo, path);
                let absolute = workdir.join(&relative);
                if absolute.is_dir() {
                    let spec = [relative.to_string_lossy().into_owned()];
                    index
                        .add_all(spec.iter(), IndexAddOption::DEFAULT, None)
                        .map_err(classify)?;
                    index.update_all(spec.iter(), None).map_err(classify)?;
                } else if absolute.exists() {
                    // also clears conflict entries for the path
                    index.add_path(&relative).map_err(classify)?;
                } else {
                    index.remove_path(&relative).map_err(classify)?;
                }
            }
        }
    }

    index.write().map_err(classify)?;
    debug!(paths = paths.map_or(0, <[PathBuf]>::len), "Staged changes");
    Ok(())
}

fn commit_index(repo: &mut Repository, author: &Author, message: &str) -> GitResult<String> {
    let merging = repo.state() == git2::RepositoryState::Merge;
    let mut merge_heads = Vec::new();
    if merging {
        repo.mergehead_foreach(|oid| {
            merge_heads.push(*oid);
            true
        })
        .map_err(classify)?;
    }
    let repo: &Repository = repo;

    let signature = Signature::now(&author.name, &author.email).map_err(classify)?;
    let mut index = repo.index().map_err(classify)?;
    let tree_id = index.write_tree().map_err(classify)?;
    let tree = repo.find_tree(tree_id).map_err(classify)?;

    let mut parents: Vec<Commit<'_>> = Vec::new();
    match repo.head() {
        Ok(head) => parents.push(head.peel_to_commit().map_err(classify)?),
        Err(e) if is_unborn(&e) => {}
        Err(e) => return Err(classify(e)),
    }

    if merging {
        for oid in merge_heads {
            parents.push(repo.find_commit(oid).map_err(classify)?);
        }
    }

    let parent_refs: Vec<&Commit<'_>> = parents.iter().collect();
    let oid = repo
        .commit(Some("HEAD"), &signature, &signature, message, &tree, &parent_refs)
        .map_err(classify)?;
    if merging {
        repo.cleanup_state().map_err(classify)?;
    }

    info!(commit = %oid, parents = parent_refs.len(), "Committed");
    Ok(oid.to_string())
}

fn rebase_onto(repo: &Repository, upstream: &str) -> GitResult<RebaseResult> {
    let reference = repo.find_reference(upstream).map_err(classify)?;
    let onto = repo
        .reference_to_annotated_commit(&reference)
        .map_err(classify)?;
    let (analysis, _) = repo.merge_analysis(&[&onto]).map_err(classify)?;
    if analysis.is_up_to_date() {
        return Ok(RebaseResult::UpToDate);
    }

    let committer = default_signature(repo)?;
    let mut rebase = match repo.rebase(None, Some(&onto), None, None) {
        Ok(rebase) => rebase,
        Err(e) => return Ok(RebaseResult::Failed(e.message().to_string())),
    };

    while let Some(operation) = rebase.next() {
        if let Err(e) = operation {
            return Ok(RebaseResult::Failed(e.message().to_string()));
        }
        let index = repo.index().map_err(classify)?;
        if index.has_conflicts() {
            let paths = conflicted_paths(&index)?;
            warn!(files = paths.len(), "Rebase stopped on conflicts");
            return Ok(RebaseResult::Conflicts(paths));
        }
        match rebase.commit(None, &committer, None) {
            Ok(_) => {}
            // patch already upstream
            Err(e) if e.code() == ErrorCode::Applied => {}
            Err(e) => return Ok(RebaseResult::Failed(e.message().to_string())),
        }
    }

    rebase.finish(Some(&committer)).map_err(classify)?;
    info!(upstream, "Rebased local commits");
    Ok(RebaseResult::Ok)
}

fn read_status(repo: &Repository) -> GitResult<RepoStatus> {
    let mut options = StatusOptions::new();
    options
        .include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false)
        .renames_head_to_index(true);
    let statuses = repo.statuses(Some(&mut options)).map_err(classify)?;

    let mut status = RepoStatus::default();
    for entry in statuses.iter() {
        let Some(path) = entry.path() else {
            continue;
        };
        let path = PathBuf::from(path);
        let flags = entry.status();
        if flags.is_conflicted() {
            status.conflicting.push(path);
        } else if flags == Status::WT_NEW {
            status.untracked.push(path);
        } else if flags != Status::CURRENT && !flags.is_ignored() {
            status.modified.push(path);
        }
    }
    Ok(status)
}

/// Restores a tracked path from HEAD, or deletes an untracked one
fn discard_path(repo: &Repository, path: &Path) -> GitResult<()> {
    let relative = relative_to_workdir(repo, path);
    let workdir = repo
        .workdir()
        .ok_or_else(|| VcsError::Generic("repository has no working tree".into()))?;

    let flags = repo.status_file(&relative).map_err(classify)?;
    if flags.intersects(Status::WT_NEW | Status::INDEX_NEW) {
        let mut index = repo.index().map_err(classify)?;
        if flags.contains(Status::INDEX_NEW) {
            index.remove_path(&relative).map_err(classify)?;
            index.write().map_err(classify)?;
        }
        let absolute = workdir.join(&relative);
        if absolute.exists() {
            std::fs::remove_file(&absolute)
                .map_err(|e| VcsError::Generic(format!("{}: {e}", absolute.display())))?;
        }
        info!(path = %relative.display(), "Removed untracked file");
        return Ok(());
    }

    let head = head_commit(repo)?;
    repo.reset_default(Some(head.as_object()), [relative.as_path()])
        .map_err(classify)?;
    let mut builder = CheckoutBuilder::new();
    builder.force().path(relative.as_path());
    repo.checkout_head(Some(&mut builder)).map_err(classify)?;
    info!(path = %relative.display(), "Restored file from HEAD");
    Ok(())
}

fn list_commits(repo: &Repository, limit: usize) -> GitResult<Vec<CommitSummary>> {
    let mut walk = repo.revwalk().map_err(classify)?;
    match walk.push_head() {
        Ok(()) => {}
        Err(e) if is_unborn(&e) => return Ok(Vec::new()),
        Err(e) => return Err(classify(e)),
    }
    walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME).map_err(classify)?;

    let mut commits = Vec::new();
    for oid in walk.take(limit) {
        let oid = oid.map_err(classify)?;
        let commit = repo.find_commit(oid).map_err(classify)?;

        let tree = commit.tree().map_err(classify)?;
        let parent_tree = match commit.parent(0) {
            Ok(parent) => Some(parent.tree().map_err(classify)?),
            Err(_) => None,
        };
        let stats = repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)
            .and_then(|diff| diff.stats())
            .map_err(classify)?;

        let id = oid.to_string();
        commits.push(CommitSummary {
            id: id[..id.len().min(7)].to_string(),
            summary: commit.summary().unwrap_or_default().to_string(),
            author: commit.author().name().unwrap_or_default().to_string(),
            timestamp: Utc
                .timestamp_opt(commit.time().seconds(), 0)
                .single()
                .unwrap_or_default(),
            additions: stats.insertions(),
            deletions: stats.deletions(),
        });
    }
    Ok(commits)
}

// ============================================================================
// Helpers
// ============================================================================

fn is_unborn(err: &git2::Error) -> bool {
    matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound)
}

fn head_commit(repo: &Repository) -> GitResult<Commit<'_>> {
    repo.head()
        .and_then(|head| head.peel_to_commit())
        .map_err(classify)
}

fn default_signature(repo: &Repository) -> GitResult<Signature<'static>> {
    repo.signature()
        .or_else(|_| Signature::now(FALLBACK_NAME, ""))
        .map_err(classify)
}

/// `branch.<name>.merge` for a local branch ref
fn merge_ref_of(repo: &Repository, local: &str) -> Option<String> {
    let short = local.strip_prefix("refs/heads/")?;
    repo.config()
        .ok()?
        .get_string(&format!("branch.{short}.merge"))
        .ok()
}

/// Name HEAD points at while the branch has no commits
fn unborn_branch_name(repo: &Repository) -> GitResult<String> {
    let head = repo.find_reference("HEAD").map_err(classify)?;
    head.symbolic_target()
        .map(str::to_string)
        .ok_or_else(|| VcsError::Generic("HEAD is not symbolic".into()))
}

/// Upstream tracking ref of the current branch
///
/// Uses the configured upstream when present; otherwise, if a remote is
/// given, falls back to `refs/remotes/<remote>/<branch>`.
fn upstream_ref_name(repo: &Repository, remote: Option<&str>) -> GitResult<Option<String>> {
    let branch_ref = match repo.head() {
        Ok(head) => match head.name() {
            Some(name) if head.is_branch() => name.to_string(),
            _ => return Ok(None),
        },
        Err(e) if is_unborn(&e) => unborn_branch_name(repo)?,
        Err(e) => return Err(classify(e)),
    };

    match repo.branch_upstream_name(&branch_ref) {
        Ok(name) => return Ok(name.as_str().map(str::to_string)),
        Err(e) if e.code() == ErrorCode::NotFound => {}
        Err(e) => return Err(classify(e)),
    }

    let short = branch_ref.trim_start_matches("refs/heads/");
    Ok(remote.map(|remote| format!("refs/remotes/{remote}/{short}")))
}

fn conflicted_paths(index: &Index) -> GitResult<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for conflict in index.conflicts().map_err(classify)? {
        let conflict = conflict.map_err(classify)?;
        let entry = conflict.our.or(conflict.their).or(conflict.ancestor);
        if let Some(entry) = entry {
            paths.push(PathBuf::from(
                String::from_utf8_lossy(&entry.path).into_owned(),
            ));
        }
    }
    Ok(paths)
}

fn relative_to_workdir(repo: &Repository, path: &Path) -> PathBuf {
    match repo.workdir() {
        Some(workdir) if path.is_absolute() => path
            .strip_prefix(workdir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unborn_detection() {
        let unborn = git2::Error::new(ErrorCode::UnbornBranch, git2::ErrorClass::Reference, "x");
        assert!(is_unborn(&unborn));
        let other = git2::Error::new(ErrorCode::Locked, git2::ErrorClass::Index, "x");
        assert!(!is_unborn(&other));
    }
}
