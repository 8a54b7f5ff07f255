//! Shared state for one CLI invocation

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use gitsync_core::config::Config;
use gitsync_core::domain::RepositoryHandle;
use gitsync_core::ports::{AlwaysOnline, IConnectivity, IVersionControl};
use gitsync_git::{Git2Backend, TcpConnectivityProbe};
use gitsync_sync::{
    CoordinatorSettings, NotificationDispatcher, PipelineSettings, SyncCoordinator, SyncPipeline,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::output::{get_formatter, ConsoleNotifier, OutputFormat, OutputFormatter};

/// Loaded configuration plus the global output flags
pub struct CliContext {
    pub config_path: PathBuf,
    pub config: Config,
    pub format: OutputFormat,
    pub quiet: bool,
}

impl CliContext {
    /// Loads `--config` strictly; the default path may be absent but not malformed
    pub fn load(config: Option<&Path>, format: OutputFormat, quiet: bool) -> Result<Self> {
        let (config_path, config) = match config {
            Some(path) => {
                let config = Config::load(path)
                    .with_context(|| format!("Failed to load config from {}", path.display()))?;
                (path.to_path_buf(), config)
            }
            None => {
                let path = Config::default_path();
                let config = Config::load_if_present(&path)
                    .with_context(|| format!("Failed to load config from {}", path.display()))?;
                (path, config)
            }
        };

        Ok(Self {
            config_path,
            config,
            format,
            quiet,
        })
    }

    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.format, self.quiet)
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Opens the configured working tree
    pub fn repository(&self) -> Result<RepositoryHandle> {
        let root = self.config.repository.resolved_path();
        RepositoryHandle::open(&root)
            .with_context(|| format!("Failed to open repository at {}", root.display()))
    }

    pub fn backend(&self, repository: &RepositoryHandle) -> Arc<Git2Backend> {
        Arc::new(Git2Backend::new(repository, self.config.auth.clone()))
    }

    /// Coordinator for a single `run_once` request
    ///
    /// Notifications print to the console unless `--quiet` is set.
    pub fn coordinator(&self, repository: &RepositoryHandle) -> SyncCoordinator {
        let backend: Arc<dyn IVersionControl> = self.backend(repository);
        let dispatcher = NotificationDispatcher::spawn(
            Arc::new(ConsoleNotifier::new(self.format)),
            self.config.sync.show_sync_messages && !self.quiet,
        );
        let pipeline = Arc::new(SyncPipeline::new(
            backend,
            repository.clone(),
            PipelineSettings::from_config(&self.config),
            dispatcher,
        ));

        SyncCoordinator::new(
            pipeline,
            self.connectivity(repository),
            CoordinatorSettings::from_config(&self.config),
            CancellationToken::new(),
        )
    }

    fn connectivity(&self, repository: &RepositoryHandle) -> Arc<dyn IConnectivity> {
        match TcpConnectivityProbe::for_remote(repository.path(), &self.config.repository.remote) {
            Ok(probe) => Arc::new(probe),
            Err(e) => {
                debug!(error = %format!("{e:#}"), "No reachability probe; assuming online");
                Arc::new(AlwaysOnline)
            }
        }
    }

    /// Converts user-supplied paths into paths relative to the working tree
    ///
    /// Relative arguments resolve against the current directory when it is
    /// inside the working tree, otherwise against the working tree root.
    pub fn repo_relative(
        &self,
        repository: &RepositoryHandle,
        paths: &[PathBuf],
    ) -> Result<Vec<PathBuf>> {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        paths
            .iter()
            .map(|p| repo_relative_path(repository, &cwd, p))
            .collect()
    }
}

fn repo_relative_path(repository: &RepositoryHandle, cwd: &Path, path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };
    match repository.relativize(&absolute) {
        Ok(relative) => Ok(relative),
        Err(_) if path.is_relative() => Ok(path.to_path_buf()),
        Err(_) => anyhow::bail!("{} is outside the repository", path.display()),
    }
}
