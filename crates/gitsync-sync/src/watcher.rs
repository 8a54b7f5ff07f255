//! Working tree watcher
//!
//! Wraps the `notify` crate to observe a repository's working tree and
//! turn every relevant change into a plain sync request. Events inside the
//! metadata directory are dropped: the pipeline itself writes there, and
//! reacting to those writes would trigger endless syncs. Paths matched by
//! the repository's ignore rules are dropped too, since they never produce
//! a commit.
//!
//! ```text
//! inotify ──→ WorkTreeWatcher ──→ mpsc ──→ forward_changes ──→ SyncHandle
//! ```
//!
//! Bursts are not collapsed here; the coordinator's debounce does that.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gitsync_core::domain::RepositoryHandle;
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::coordinator::SyncHandle;

/// A change observed in the working tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    Renamed { old: PathBuf, new: PathBuf },
}

impl ChangeEvent {
    /// Primary path; the destination for renames
    pub fn path(&self) -> &Path {
        match self {
            ChangeEvent::Created(p) | ChangeEvent::Modified(p) | ChangeEvent::Deleted(p) => p,
            ChangeEvent::Renamed { new, .. } => new,
        }
    }
}

/// Decides which working tree changes are worth a sync request
pub struct ChangeFilter {
    repository: RepositoryHandle,
    ignores: Option<git2::Repository>,
}

impl ChangeFilter {
    /// Falls back to forwarding ignored paths when the ignore rules cannot be read
    pub fn new(repository: RepositoryHandle) -> Self {
        let ignores = match git2::Repository::open(repository.path()) {
            Ok(repo) => Some(repo),
            Err(e) => {
                warn!(error = %e, "Cannot read ignore rules; ignored paths will trigger syncs");
                None
            }
        };
        Self {
            repository,
            ignores,
        }
    }

    pub fn accepts(&self, change: &ChangeEvent) -> bool {
        match change {
            // moving a tracked file into an ignored path still deletes it
            ChangeEvent::Renamed { old, new } => self.is_relevant(old) || self.is_relevant(new),
            other => self.is_relevant(other.path()),
        }
    }

    fn is_relevant(&self, path: &Path) -> bool {
        if self.repository.is_metadata_path(path) {
            return false;
        }
        let Some(repo) = &self.ignores else {
            return true;
        };
        let Ok(relative) = self.repository.relativize(path) else {
            return true;
        };
        match repo.is_path_ignored(&relative) {
            Ok(ignored) => !ignored,
            Err(e) => {
                debug!(path = %relative.display(), error = %e, "Ignore check failed");
                true
            }
        }
    }
}

/// Recursive watcher over one working tree
///
/// Watching stops when the value is dropped.
pub struct WorkTreeWatcher {
    watcher: RecommendedWatcher,
    repository: RepositoryHandle,
}

impl WorkTreeWatcher {
    /// Creates the watcher and starts watching the working tree root
    ///
    /// # Errors
    /// Returns an error if the OS watcher cannot be created or the root
    /// cannot be watched (e.g. inotify watch limit reached).
    pub fn start(repository: RepositoryHandle) -> Result<(Self, mpsc::Receiver<ChangeEvent>)> {
        let (tx, rx) = mpsc::channel::<ChangeEvent>(1024);
        let filter = ChangeFilter::new(repository.clone());

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    let Some(change) = map_notify_event(&event) else {
                        return;
                    };
                    if !filter.accepts(&change) {
                        return;
                    }
                    if let Err(e) = tx.blocking_send(change) {
                        warn!(error = %e, "Failed to send change event (receiver dropped)");
                    }
                }
                Err(err) => error!(error = %err, "File watcher error"),
            },
            notify::Config::default(),
        )
        .context("Failed to create file watcher")?;

        watcher
            .watch(repository.path(), RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch path: {}", repository.path().display()))?;
        info!(path = %repository.path().display(), "Watching working tree");

        Ok((
            Self {
                watcher,
                repository,
            },
            rx,
        ))
    }

    pub fn stop(mut self) -> Result<()> {
        self.watcher
            .unwatch(self.repository.path())
            .with_context(|| format!("Failed to unwatch path: {}", self.repository.path().display()))
    }
}

/// Submits a plain sync request for every change until shutdown
pub async fn forward_changes(
    mut changes: mpsc::Receiver<ChangeEvent>,
    handle: SyncHandle,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            change = changes.recv() => {
                let Some(change) = change else { break };
                debug!(?change, "Working tree changed");
                if handle.request_sync(false).is_err() {
                    break;
                }
            }
        }
    }
    debug!("Change forwarding stopped");
}

/// Maps raw notify events; access and unknown events are ignored
fn map_notify_event(event: &notify::Event) -> Option<ChangeEvent> {
    let paths = &event.paths;

    match &event.kind {
        EventKind::Create(_) => Some(ChangeEvent::Created(paths.first()?.clone())),
        EventKind::Remove(_) => Some(ChangeEvent::Deleted(paths.first()?.clone())),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() >= 2 => {
            Some(ChangeEvent::Renamed {
                old: paths[0].clone(),
                new: paths[1].clone(),
            })
        }
        EventKind::Modify(_) => Some(ChangeEvent::Modified(paths.first()?.clone())),
        _ => None,
    }
}
