//! Scripted test doubles for pipeline and coordinator tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gitsync_core::domain::RepositoryHandle;
use gitsync_core::ports::{
    Author, CommitSummary, FetchResult, IConnectivity, INotificationService, IVersionControl,
    MergeResult, Notification, RebaseResult, RefUpdateStatus, RemoteRefUpdate, RepoStatus,
    RepositoryState, SyncEvent, VcsError,
};
use gitsync_sync::{NotificationDispatcher, PipelineSettings, SyncPipeline};
use tempfile::TempDir;

pub const LOCAL: &str = "1111111";
pub const REMOTE: &str = "2222222";

/// Version control backend that replays queued results
///
/// Each operation pops its next scripted result; an empty queue yields a
/// benign default (heads match, fast-forward, push accepted, rebase ok).
pub struct MockBackend {
    pub calls: Mutex<Vec<String>>,
    pub fetches: Mutex<VecDeque<Result<FetchResult, VcsError>>>,
    pub pulls: Mutex<VecDeque<Result<MergeResult, VcsError>>>,
    pub pushes: Mutex<VecDeque<Result<Vec<RemoteRefUpdate>, VcsError>>>,
    pub rebases: Mutex<VecDeque<RebaseResult>>,
    pub status: Mutex<RepoStatus>,
    pub state: Mutex<RepositoryState>,
    pub configured_author: Mutex<Option<Author>>,
    pub upstream: Mutex<Option<String>>,
    pub staged: Mutex<Vec<Option<Vec<PathBuf>>>>,
    pub commits: Mutex<Vec<(Author, String)>>,
    pub fetch_delay: Mutex<Duration>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fetches: Mutex::new(VecDeque::new()),
            pulls: Mutex::new(VecDeque::new()),
            pushes: Mutex::new(VecDeque::new()),
            rebases: Mutex::new(VecDeque::new()),
            status: Mutex::new(RepoStatus::default()),
            state: Mutex::new(RepositoryState::Clean),
            configured_author: Mutex::new(Some(Author::new("Repo User", "repo@example.com"))),
            upstream: Mutex::new(Some("refs/remotes/origin/main".to_string())),
            staged: Mutex::new(Vec::new()),
            commits: Mutex::new(Vec::new()),
            fetch_delay: Mutex::new(Duration::ZERO),
        }
    }
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == name).count()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }

    pub fn remote_ahead(&self) {
        self.fetches.lock().unwrap().push_back(Ok(FetchResult {
            local_head: Some(LOCAL.into()),
            remote_head: Some(REMOTE.into()),
            updated_refs: 1,
        }));
    }

    pub fn local_changes(&self, paths: &[&str]) {
        self.status.lock().unwrap().modified = paths.iter().map(PathBuf::from).collect();
    }

    pub fn conflicts(&self, paths: &[&str]) {
        self.status.lock().unwrap().conflicting = paths.iter().map(PathBuf::from).collect();
    }

    pub fn push_result(&self, status: RefUpdateStatus) {
        self.pushes.lock().unwrap().push_back(Ok(vec![RemoteRefUpdate {
            refname: "refs/heads/main".into(),
            status,
        }]));
    }

    pub fn last_commit(&self) -> Option<(Author, String)> {
        self.commits.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl IVersionControl for MockBackend {
    async fn fetch(&self, _remote: &str) -> Result<FetchResult, VcsError> {
        self.record("fetch");
        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.fetches.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(FetchResult {
                local_head: Some(LOCAL.into()),
                remote_head: Some(LOCAL.into()),
                updated_refs: 0,
            })
        })
    }

    async fn pull(&self, _remote: &str) -> Result<MergeResult, VcsError> {
        self.record("pull");
        let scripted = self.pulls.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(MergeResult::FastForward))
    }

    async fn push(&self, _remote: &str, _force: bool) -> Result<Vec<RemoteRefUpdate>, VcsError> {
        self.record("push");
        let scripted = self.pushes.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(vec![RemoteRefUpdate {
                refname: "refs/heads/main".into(),
                status: RefUpdateStatus::Ok,
            }])
        })
    }

    async fn stage(&self, paths: Option<&[PathBuf]>) -> Result<(), VcsError> {
        self.record("stage");
        self.staged.lock().unwrap().push(paths.map(<[PathBuf]>::to_vec));
        Ok(())
    }

    async fn commit(&self, author: &Author, message: &str) -> Result<String, VcsError> {
        self.record("commit");
        self.commits
            .lock()
            .unwrap()
            .push((author.clone(), message.to_string()));
        let mut status = self.status.lock().unwrap();
        status.modified.clear();
        status.untracked.clear();
        *self.state.lock().unwrap() = RepositoryState::Clean;
        Ok("3333333".to_string())
    }

    async fn rebase(&self, _upstream: &str) -> Result<RebaseResult, VcsError> {
        self.record("rebase");
        let scripted = self.rebases.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or(RebaseResult::Ok))
    }

    async fn rebase_abort(&self) -> Result<(), VcsError> {
        self.record("rebase_abort");
        Ok(())
    }

    async fn reset_hard(&self, _reference: Option<&str>) -> Result<(), VcsError> {
        self.record("reset_hard");
        Ok(())
    }

    async fn status(&self) -> Result<RepoStatus, VcsError> {
        self.record("status");
        Ok(self.status.lock().unwrap().clone())
    }

    async fn checkout_path(&self, _path: &Path) -> Result<(), VcsError> {
        self.record("checkout_path");
        Ok(())
    }

    async fn merge_abort(&self) -> Result<(), VcsError> {
        self.record("merge_abort");
        *self.state.lock().unwrap() = RepositoryState::Clean;
        Ok(())
    }

    async fn state(&self) -> Result<RepositoryState, VcsError> {
        Ok(*self.state.lock().unwrap())
    }

    async fn upstream_ref(&self) -> Result<Option<String>, VcsError> {
        Ok(self.upstream.lock().unwrap().clone())
    }

    async fn configured_author(&self) -> Result<Option<Author>, VcsError> {
        Ok(self.configured_author.lock().unwrap().clone())
    }

    async fn recent_commits(&self, _limit: usize) -> Result<Vec<CommitSummary>, VcsError> {
        Ok(Vec::new())
    }
}

/// Notification sink that keeps every delivered event
#[derive(Default)]
pub struct RecordingNotifier {
    pub delivered: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<SyncEvent> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.event)
            .collect()
    }
}

#[async_trait]
impl INotificationService for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        self.delivered.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Connectivity switch
pub struct ToggleNetwork(pub AtomicBool);

impl ToggleNetwork {
    pub fn online() -> Arc<Self> {
        Arc::new(Self(AtomicBool::new(true)))
    }

    pub fn offline() -> Arc<Self> {
        Arc::new(Self(AtomicBool::new(false)))
    }

    pub fn set(&self, online: bool) {
        self.0.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl IConnectivity for ToggleNetwork {
    async fn is_network_available(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A pipeline over a temporary working tree with a `.git` directory
pub struct Fixture {
    pub dir: TempDir,
    pub backend: Arc<MockBackend>,
    pub notifier: Arc<RecordingNotifier>,
    pub dispatcher: NotificationDispatcher,
    pub pipeline: Arc<SyncPipeline>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_settings(|_| {})
    }

    pub fn with_settings(adjust: impl FnOnce(&mut PipelineSettings)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let repository = RepositoryHandle::open(dir.path()).unwrap();

        let backend = MockBackend::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = NotificationDispatcher::spawn(notifier.clone(), true);

        let mut settings = PipelineSettings::default();
        settings.lock_poll = Duration::from_millis(10);
        settings.lock_timeout = Duration::from_millis(100);
        adjust(&mut settings);

        let pipeline = Arc::new(SyncPipeline::new(
            backend.clone(),
            repository,
            settings,
            dispatcher.clone(),
        ));

        Self {
            dir,
            backend,
            notifier,
            dispatcher,
            pipeline,
        }
    }

    /// Events delivered so far, after draining the dispatcher
    pub async fn events(&self) -> Vec<SyncEvent> {
        self.dispatcher.flush().await;
        self.notifier.events()
    }
}
