//! gitsync Daemon - Background synchronization service
//!
//! This binary runs as a user service and keeps one working tree in sync
//! with its remote:
//! - Periodic sync requests on `sync.poll_interval_secs`
//! - Working tree watching, one plain request per change
//! - `SIGUSR1` requests a forced sync
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! All triggers feed a single [`SyncCoordinator`] through cloned
//! [`SyncHandle`]s. The coordinator debounces, serializes runs and schedules
//! reconnect retries. Every task watches the same `CancellationToken`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use gitsync_core::config::{Config, LoggingConfig};
use gitsync_core::domain::RepositoryHandle;
use gitsync_core::ports::{AlwaysOnline, IConnectivity};
use gitsync_git::{Git2Backend, TcpConnectivityProbe};
use gitsync_sync::watcher::{forward_changes, WorkTreeWatcher};
use gitsync_sync::{
    CoordinatorSettings, NotificationDispatcher, PipelineSettings, SyncCoordinator, SyncHandle,
    SyncPipeline, TracingNotifier,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// DaemonService
// ============================================================================

/// Owns the configuration and the repository being kept in sync
struct DaemonService {
    config: Config,
    repository: RepositoryHandle,
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Validates the configuration and opens the working tree
    fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let problems = config.validate();
        if !problems.is_empty() {
            for problem in &problems {
                error!(%problem, "Invalid configuration");
            }
            anyhow::bail!("configuration has {} error(s)", problems.len());
        }

        let root = config.repository.resolved_path();
        let repository = RepositoryHandle::open(&root)
            .with_context(|| format!("Failed to open repository at {}", root.display()))?;
        info!(repository = %repository, remote = %config.repository.remote, "Repository opened");

        Ok(Self {
            config,
            repository,
            shutdown,
        })
    }

    /// Wires the coordinator and its triggers, then waits for shutdown
    async fn run(&self) -> Result<()> {
        let backend = Arc::new(Git2Backend::new(&self.repository, self.config.auth.clone()));
        let connectivity = self.connectivity();
        let dispatcher = NotificationDispatcher::spawn(
            Arc::new(TracingNotifier),
            self.config.sync.show_sync_messages,
        );
        let pipeline = Arc::new(SyncPipeline::new(
            backend,
            self.repository.clone(),
            PipelineSettings::from_config(&self.config),
            dispatcher.clone(),
        ));

        let coordinator = SyncCoordinator::new(
            pipeline,
            connectivity,
            CoordinatorSettings::from_config(&self.config),
            self.shutdown.clone(),
        );
        let handle = coordinator.handle();
        let coordinator_task = tokio::spawn(coordinator.run());

        let watcher = if self.config.sync.watch_files {
            self.start_watcher(&handle)
        } else {
            info!("Working tree watching disabled");
            None
        };

        tokio::spawn(external_trigger(handle.clone(), self.shutdown.clone()));

        // catch up with anything that changed while the daemon was down
        handle
            .request_sync(false)
            .context("Coordinator stopped before the first sync")?;

        match self.config.sync.poll_interval() {
            Some(interval) => periodic_sync(handle, interval, self.shutdown.clone()).await,
            None => {
                info!("Periodic sync disabled");
                self.shutdown.cancelled().await;
            }
        }

        if let Some(watcher) = watcher {
            if let Err(e) = watcher.stop() {
                warn!(error = %e, "Failed to stop working tree watcher");
            }
        }
        if let Err(e) = coordinator_task.await {
            error!(error = %e, "Coordinator task panicked");
        }
        dispatcher.flush().await;
        Ok(())
    }

    /// TCP probe for the configured remote, or always-online if the URL has no host
    fn connectivity(&self) -> Arc<dyn IConnectivity> {
        match TcpConnectivityProbe::for_remote(
            self.repository.path(),
            &self.config.repository.remote,
        ) {
            Ok(probe) => {
                debug!(endpoint = ?probe.endpoint(), "Using TCP reachability probe");
                Arc::new(probe)
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Cannot probe remote; assuming it is reachable");
                Arc::new(AlwaysOnline)
            }
        }
    }

    fn start_watcher(&self, handle: &SyncHandle) -> Option<WorkTreeWatcher> {
        match WorkTreeWatcher::start(self.repository.clone()) {
            Ok((watcher, changes)) => {
                tokio::spawn(forward_changes(
                    changes,
                    handle.clone(),
                    self.shutdown.clone(),
                ));
                Some(watcher)
            }
            Err(e) => {
                error!(error = %format!("{e:#}"), "Failed to start working tree watcher");
                None
            }
        }
    }
}

// ============================================================================
// Triggers
// ============================================================================

/// Requests a plain sync on every tick until shutdown
async fn periodic_sync(handle: SyncHandle, period: Duration, shutdown: CancellationToken) {
    info!(poll_interval_secs = period.as_secs(), "Starting periodic sync");

    let mut interval = tokio::time::interval(period);
    // the first tick completes immediately; the startup request covers it
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if handle.request_sync(false).is_err() {
                    warn!("Coordinator stopped; ending periodic sync");
                    break;
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }

    info!("Periodic sync terminated");
}

/// Forced sync on SIGUSR1
#[cfg(unix)]
async fn external_trigger(handle: SyncHandle, shutdown: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut usr1 = match signal(SignalKind::user_defined1()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGUSR1 handler");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = usr1.recv() => {
                info!("Received SIGUSR1, requesting forced sync");
                if handle.request_sync(true).is_err() {
                    break;
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

#[cfg(not(unix))]
async fn external_trigger(_handle: SyncHandle, shutdown: CancellationToken) {
    shutdown.cancelled().await;
}

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }

    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

/// `RUST_LOG` wins over the configured level
fn init_tracing(logging: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

/// Defaults when no file exists; a malformed file stops startup
fn load_config(path: &Path) -> Result<Config> {
    Config::load_if_present(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = Config::default_path();
    let config = load_config(&config_path)?;
    init_tracing(&config.logging);

    info!(config_path = %config_path.display(), "gitsync daemon starting (gitsyncd)");

    let shutdown_token = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown_token.clone()));

    let service = DaemonService::new(config, shutdown_token.clone())?;
    let result = service.run().await;

    match &result {
        Ok(()) => info!("gitsync daemon shut down gracefully"),
        Err(e) => error!(error = %e, "gitsync daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
