//! Sync coordinator
//!
//! The [`SyncCoordinator`] is the single owner of [`SyncState`]. Triggers
//! reach it through cloneable [`SyncHandle`]s; it debounces bursts of plain
//! sync requests, checks connectivity, and allows at most one pipeline run
//! at a time. Requests arriving mid-run collapse into one deferred run that
//! starts after a cooldown.
//!
//! ## Flow
//!
//! ```text
//! SyncHandle ──→ mpsc ──→ debounce ──→ dispatch ──┬──→ worker task (pipeline runs)
//!                                                  └──→ NetworkRetryScheduler (offline)
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gitsync_core::config::Config;
use gitsync_core::domain::{CompletionDecision, RequestDecision, SyncOutcome, SyncState};
use gitsync_core::ports::{IConnectivity, Notification};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::pipeline::{SyncPipeline, SyncReport};
use crate::retry::NetworkRetryScheduler;
use crate::SyncError;

// ============================================================================
// Requests
// ============================================================================

/// A trigger submitted to the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRequest {
    /// Regular sync; `forced` makes "not required" visible to the user
    Sync { forced: bool },
    /// Commit and push a manually resolved merge, then sync
    Merge { message: Option<String> },
    /// Commit and push only these paths
    ManualFiles { paths: Vec<PathBuf>, message: String },
}

impl SyncRequest {
    pub fn is_plain(&self) -> bool {
        matches!(self, SyncRequest::Sync { .. })
    }

    /// Merge requests exist to finish a conflicted merge, so only they skip the gate
    fn needs_conflict_gate(&self) -> bool {
        !matches!(self, SyncRequest::Merge { .. })
    }

    /// Folds an incoming request into the pending slot
    ///
    /// Plain requests become the deferred `forced = false` run; a pending
    /// merge or manual request is never replaced by a plain one.
    fn coalesce(pending: Option<SyncRequest>, incoming: SyncRequest) -> SyncRequest {
        match (pending, incoming) {
            (Some(existing), SyncRequest::Sync { .. }) if !existing.is_plain() => existing,
            (_, SyncRequest::Sync { .. }) => SyncRequest::Sync { forced: false },
            (Some(existing), other) => {
                if !existing.is_plain() {
                    warn!(replaced = ?existing, "Pending request superseded");
                }
                other
            }
            (None, other) => other,
        }
    }
}

/// Cloneable entry point for sync triggers
#[derive(Debug, Clone)]
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<SyncRequest>,
}

impl SyncHandle {
    /// Creates a handle and the receiver a coordinator consumes
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SyncRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn submit(&self, request: SyncRequest) -> Result<(), SyncError> {
        debug!(?request, "Submitting sync request");
        self.tx
            .send(request)
            .map_err(|_| SyncError::CoordinatorStopped)
    }

    pub fn request_sync(&self, forced: bool) -> Result<(), SyncError> {
        self.submit(SyncRequest::Sync { forced })
    }

    pub fn request_merge(&self, message: Option<String>) -> Result<(), SyncError> {
        self.submit(SyncRequest::Merge { message })
    }

    pub fn request_manual_file_sync(
        &self,
        paths: Vec<PathBuf>,
        message: impl Into<String>,
    ) -> Result<(), SyncError> {
        self.submit(SyncRequest::ManualFiles {
            paths,
            message: message.into(),
        })
    }
}

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct CoordinatorSettings {
    /// Trailing window that collapses bursts of plain requests
    pub debounce: Duration,
    /// Pause before the deferred run
    pub cooldown: Duration,
    /// Connectivity probe interval while offline
    pub network_retry: Duration,
}

impl CoordinatorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            debounce: config.sync.debounce(),
            cooldown: config.sync.cooldown(),
            network_retry: config.sync.network_retry(),
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

// ============================================================================
// SyncCoordinator
// ============================================================================

struct Slot {
    state: SyncState,
    pending: Option<SyncRequest>,
}

struct Inner {
    pipeline: Arc<SyncPipeline>,
    connectivity: Arc<dyn IConnectivity>,
    retry: NetworkRetryScheduler,
    settings: CoordinatorSettings,
    slot: Mutex<Slot>,
    state_tx: watch::Sender<SyncState>,
    shutdown: CancellationToken,
}

/// Serializes sync requests into at most one pipeline run
pub struct SyncCoordinator {
    inner: Arc<Inner>,
    rx: mpsc::UnboundedReceiver<SyncRequest>,
    handle: SyncHandle,
}

impl SyncCoordinator {
    pub fn new(
        pipeline: Arc<SyncPipeline>,
        connectivity: Arc<dyn IConnectivity>,
        settings: CoordinatorSettings,
        shutdown: CancellationToken,
    ) -> Self {
        let (handle, rx) = SyncHandle::channel();
        let retry = NetworkRetryScheduler::new(
            handle.clone(),
            connectivity.clone(),
            settings.network_retry,
            shutdown.clone(),
        );
        let (state_tx, _) = watch::channel(SyncState::Idle);

        info!(
            debounce_ms = settings.debounce.as_millis() as u64,
            cooldown_secs = settings.cooldown.as_secs(),
            "Creating sync coordinator"
        );

        Self {
            inner: Arc::new(Inner {
                pipeline,
                connectivity,
                retry,
                settings,
                slot: Mutex::new(Slot {
                    state: SyncState::Idle,
                    pending: None,
                }),
                state_tx,
                shutdown,
            }),
            rx,
            handle,
        }
    }

    pub fn handle(&self) -> SyncHandle {
        self.handle.clone()
    }

    /// Watch channel mirroring every state transition
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.inner.state_tx.subscribe()
    }

    pub async fn state(&self) -> SyncState {
        self.inner.slot.lock().await.state
    }

    pub fn retry_scheduler(&self) -> &NetworkRetryScheduler {
        &self.inner.retry
    }

    /// Consumes requests until the shutdown token is cancelled
    pub async fn run(mut self) {
        info!("Sync coordinator started");
        let shutdown = self.inner.shutdown.clone();

        loop {
            let first = tokio::select! {
                _ = shutdown.cancelled() => break,
                request = self.rx.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            if !first.is_plain() {
                self.inner.dispatch(first).await;
                continue;
            }

            let (settled, interrupted_by) =
                debounce(&mut self.rx, first, self.inner.settings.debounce, &shutdown).await;
            if let Some(request) = settled {
                self.inner.dispatch(request).await;
            }
            if let Some(request) = interrupted_by {
                self.inner.dispatch(request).await;
            }
        }

        info!("Sync coordinator stopped");
    }

    /// Runs one request to completion in the caller's task
    ///
    /// Used by one-shot hosts. Offline is reported as
    /// [`SyncError::NetworkUnavailable`] instead of scheduling a retry.
    pub async fn run_once(&self, request: SyncRequest) -> Result<SyncReport, SyncError> {
        if !self.inner.connectivity.is_network_available().await {
            return Err(SyncError::NetworkUnavailable);
        }
        {
            let mut slot = self.inner.slot.lock().await;
            if slot.state == SyncState::Idle {
                self.inner.admit(&request).await?;
            }
            if slot.state.accept_request() == RequestDecision::Coalesced {
                slot.pending = Some(SyncRequest::coalesce(slot.pending.take(), request));
                self.inner.publish(slot.state);
                return Ok(SyncReport::not_required());
            }
            self.inner.publish(slot.state);
        }

        let result = self.inner.execute(&request).await;

        let mut slot = self.inner.slot.lock().await;
        if let Err(e) = slot.state.complete_run() {
            warn!(error = %e, "Unexpected state after run");
        }
        slot.state = SyncState::Idle;
        slot.pending = None;
        self.inner.publish(slot.state);
        drop(slot);

        self.inner.pipeline.notifier().flush().await;
        result
    }
}

/// Longest a burst of plain requests can hold off a run, in debounce windows
const MAX_DEBOUNCE_WINDOWS: u32 = 5;

/// Trailing debounce over plain requests, last `forced` wins
///
/// Each plain request restarts the window, but never past
/// [`MAX_DEBOUNCE_WINDOWS`] windows after the first one. Returns the settled
/// request and, if a non-plain request cut the window short, that request
/// as well.
async fn debounce(
    rx: &mut mpsc::UnboundedReceiver<SyncRequest>,
    first: SyncRequest,
    window: Duration,
    shutdown: &CancellationToken,
) -> (Option<SyncRequest>, Option<SyncRequest>) {
    let mut settled = first;
    let mut collapsed = 0u32;
    let cap = Instant::now() + window * MAX_DEBOUNCE_WINDOWS;
    let deadline = tokio::time::sleep(window);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return (None, None),
            _ = &mut deadline => break,
            request = rx.recv() => match request {
                Some(request) if request.is_plain() => {
                    collapsed += 1;
                    settled = request;
                    deadline.as_mut().reset((Instant::now() + window).min(cap));
                }
                Some(other) => {
                    debug!(collapsed, "Debounce window cut short");
                    return (Some(settled), Some(other));
                }
                None => break,
            },
        }
    }

    debug!(collapsed, request = ?settled, "Debounce window settled");
    (Some(settled), None)
}

impl Inner {
    fn publish(&self, state: SyncState) {
        self.state_tx.send_replace(state);
    }

    async fn dispatch(self: &Arc<Self>, request: SyncRequest) {
        if !self.connectivity.is_network_available().await {
            info!(?request, "Network unavailable, deferring sync");
            self.retry.schedule();
            return;
        }

        let mut slot = self.slot.lock().await;
        if slot.state == SyncState::Idle {
            if let Err(e) = self.admit(&request).await {
                drop(slot);
                self.settle(Err(e)).await;
                return;
            }
        }
        match slot.state.accept_request() {
            RequestDecision::Coalesced => {
                slot.pending = Some(SyncRequest::coalesce(slot.pending.take(), request));
                debug!(pending = ?slot.pending, "Sync in progress, request coalesced");
                self.publish(slot.state);
            }
            RequestDecision::Start => {
                self.publish(slot.state);
                drop(slot);
                let inner = Arc::clone(self);
                tokio::spawn(async move {
                    inner.drive(request).await;
                });
            }
        }
    }

    /// Worker loop: run, then run the deferred request after a cooldown
    ///
    /// The first request was admitted by the caller; deferred ones pass the
    /// conflict gate again before they run.
    async fn drive(self: Arc<Self>, mut request: SyncRequest) {
        let mut deferred = false;
        loop {
            let admitted = if deferred {
                self.admit(&request).await
            } else {
                Ok(())
            };
            let result = match admitted {
                Ok(()) => self.execute(&request).await,
                Err(e) => Err(e),
            };
            let outcome = self.settle(result).await;
            debug!(%outcome, "Pipeline run finished");

            let mut slot = self.slot.lock().await;
            let decision = match slot.state.complete_run() {
                Ok(decision) => decision,
                Err(e) => {
                    error!(error = %e, "Sync state out of step");
                    slot.state = SyncState::Idle;
                    CompletionDecision::Stop
                }
            };
            self.publish(slot.state);

            match decision {
                CompletionDecision::Stop => {
                    info!("Sync idle");
                    return;
                }
                CompletionDecision::RunPending => {
                    request = slot
                        .pending
                        .take()
                        .unwrap_or(SyncRequest::Sync { forced: false });
                    drop(slot);

                    info!(?request, cooldown_secs = self.settings.cooldown.as_secs(), "Deferred sync scheduled");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => {
                            let mut slot = self.slot.lock().await;
                            slot.state = SyncState::Idle;
                            slot.pending = None;
                            self.publish(slot.state);
                            return;
                        }
                        _ = tokio::time::sleep(self.settings.cooldown) => {}
                    }
                    deferred = true;
                }
            }
        }
    }

    /// One admitted request through the pipeline
    async fn execute(&self, request: &SyncRequest) -> Result<SyncReport, SyncError> {
        match request {
            SyncRequest::Sync { forced } => self.pipeline.run(*forced).await,
            SyncRequest::ManualFiles { paths, message } => {
                self.pipeline.run_manual(paths.clone(), message.clone()).await
            }
            SyncRequest::Merge { message } => {
                let merged = self.pipeline.run_merge(message.clone()).await?;
                let synced = self.pipeline.run(true).await?;
                Ok(SyncReport {
                    download: synced.download,
                    upload: merged.upload.combine(synced.upload),
                })
            }
        }
    }

    /// Rejects a request that would run into an ongoing merge conflict
    async fn admit(&self, request: &SyncRequest) -> Result<(), SyncError> {
        if request.needs_conflict_gate() {
            self.ensure_no_conflicts().await
        } else {
            Ok(())
        }
    }

    async fn ensure_no_conflicts(&self) -> Result<(), SyncError> {
        let status = self.pipeline.backend().status().await?;
        if status.has_conflicts() {
            warn!(files = status.conflicting.len(), "Ongoing merge conflict, sync rejected");
            return Err(SyncError::OngoingMergeConflict(status.conflicting));
        }
        Ok(())
    }

    /// Maps a run result to its outcome and produces the user signal
    async fn settle(&self, result: Result<SyncReport, SyncError>) -> SyncOutcome {
        let err = match result {
            Ok(report) => return report.outcome(),
            Err(e) => e,
        };

        if err.is_network() && !self.connectivity.is_network_available().await {
            info!(error = %err, "Connectivity lost during sync, retrying on reconnect");
            self.retry.schedule();
            return SyncOutcome::Failed;
        }

        if err.is_conflict() {
            warn!(error = %err, "Sync stopped for manual conflict resolution");
        } else {
            error!(error = %err, "Sync failed");
        }
        self.pipeline
            .notifier()
            .notify(Notification::new(err.user_event()).with_detail(err.to_string()));
        SyncOutcome::Failed
    }
}
