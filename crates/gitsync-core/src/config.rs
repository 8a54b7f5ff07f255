//! Configuration module for gitsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

/// Environment variable that overrides the configuration file location
pub const CONFIG_PATH_ENV: &str = "GITSYNC_CONFIG";

/// Environment variable that supplies the token for `username_token` auth
pub const TOKEN_ENV: &str = "GITSYNC_TOKEN";

/// Placeholder in the commit message template replaced by the timestamp
pub const TIMESTAMP_PLACEHOLDER: &str = "%s";

/// Timestamp layout substituted into commit messages
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for gitsync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub repository: RepositoryConfig,
    pub sync: SyncConfig,
    pub commit: CommitConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// Which working tree to keep in sync, and against which remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Working tree root. A leading `~` is expanded at runtime.
    pub path: PathBuf,
    /// Remote name to fetch from and push to.
    pub remote: String,
}

/// Scheduling and waiting behaviour of the sync orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Trailing window (ms) in which bursts of requests collapse into one.
    pub debounce_ms: u64,
    /// Seconds to wait before the deferred run after a coalesced request.
    pub cooldown_secs: u64,
    /// Interval (ms) between checks of the index lock artifact.
    pub lock_poll_ms: u64,
    /// Seconds to wait for the index lock before giving up.
    pub lock_timeout_secs: u64,
    /// Seconds between periodic sync requests in the daemon. 0 disables.
    pub poll_interval_secs: u64,
    /// Seconds between reachability probes while offline.
    pub network_retry_secs: u64,
    /// Whether the daemon watches the working tree for local edits.
    pub watch_files: bool,
    /// Whether progress/completion notifications are shown. Failures always are.
    pub show_sync_messages: bool,
}

/// Commit message and author identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
    /// Message template; `%s` is replaced with a `yyyy-MM-dd HH:mm:ss` timestamp.
    pub message_template: String,
    /// Author name override. Falls back to repository config, then the auth username.
    pub author_name: Option<String>,
    /// Author email override.
    pub author_email: Option<String>,
}

/// Credentials applied by the git adapter when the remote asks for them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthConfig {
    /// ssh-agent for ssh remotes, the git credential helper for http remotes.
    #[default]
    Default,
    /// Username plus personal access or OAuth token over https.
    UsernameToken {
        username: String,
        /// Token; when absent, read from `GITSYNC_TOKEN`.
        #[serde(default)]
        token: Option<String>,
    },
    /// Private key file for ssh remotes.
    SshKey {
        #[serde(default = "default_ssh_user")]
        username: String,
        private_key: PathBuf,
        #[serde(default)]
        public_key: Option<PathBuf>,
        #[serde(default)]
        passphrase: Option<String>,
    },
}

/// Logging / tracing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

fn default_ssh_user() -> String {
    "git".to_string()
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load from `path` if the file exists, otherwise [`Config::default`].
    ///
    /// An existing file that cannot be read or parsed is an error.
    pub fn load_if_present(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// `$GITSYNC_CONFIG` when set, otherwise typically
    /// `$XDG_CONFIG_HOME/gitsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("gitsync")
            .join("config.yaml")
    }

    /// Copy of the configuration with secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        match &mut copy.auth {
            AuthConfig::UsernameToken { token, .. } => {
                if token.is_some() {
                    *token = Some("***".to_string());
                }
            }
            AuthConfig::SshKey { passphrase, .. } => {
                if passphrase.is_some() {
                    *passphrase = Some("***".to_string());
                }
            }
            AuthConfig::Default => {}
        }
        copy
    }
}

/// Expands a leading `~` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

impl RepositoryConfig {
    /// Working tree root with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        expand_home(&self.path)
    }
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn lock_poll(&self) -> Duration {
        Duration::from_millis(self.lock_poll_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn network_retry(&self) -> Duration {
        Duration::from_secs(self.network_retry_secs)
    }

    /// Periodic trigger interval, `None` when disabled.
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_secs > 0).then(|| Duration::from_secs(self.poll_interval_secs))
    }
}

impl CommitConfig {
    /// Renders the message template for the given instant.
    pub fn format_message<Tz>(&self, at: &DateTime<Tz>) -> String
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let stamp = at.format(TIMESTAMP_FORMAT).to_string();
        self.message_template
            .replacen(TIMESTAMP_PLACEHOLDER, &stamp, 1)
    }
}

impl AuthConfig {
    /// Username the remote will see, if one is configured.
    pub fn username(&self) -> Option<&str> {
        match self {
            AuthConfig::Default => None,
            AuthConfig::UsernameToken { username, .. } | AuthConfig::SshKey { username, .. } => {
                Some(username.as_str())
            }
        }
    }

    /// Token from the config file, or from `GITSYNC_TOKEN`.
    pub fn resolved_token(&self) -> Option<String> {
        match self {
            AuthConfig::UsernameToken { token, .. } => token
                .clone()
                .or_else(|| std::env::var(TOKEN_ENV).ok()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("~/gitsync"),
            remote: "origin".to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            cooldown_secs: 10,
            lock_poll_ms: 1000,
            lock_timeout_secs: 300,
            poll_interval_secs: 300,
            network_retry_secs: 15,
            watch_files: true,
            show_sync_messages: true,
        }
    }
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            message_template: "Last Sync: %s".to_string(),
            author_name: None,
            author_email: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.debounce_ms"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut positive = |field: &str, value: u64| {
            if value == 0 {
                errors.push(ValidationError {
                    field: field.into(),
                    message: "must be greater than 0".into(),
                });
            }
        };

        // --- sync ---
        positive("sync.debounce_ms", self.sync.debounce_ms);
        positive("sync.lock_poll_ms", self.sync.lock_poll_ms);
        positive("sync.lock_timeout_secs", self.sync.lock_timeout_secs);
        positive("sync.network_retry_secs", self.sync.network_retry_secs);

        // --- repository ---
        if self.repository.remote.trim().is_empty() {
            errors.push(ValidationError {
                field: "repository.remote".into(),
                message: "must not be empty".into(),
            });
        }

        // Check the path only when it does not start with `~` (tilde is expanded at runtime).
        let path_str = self.repository.path.to_string_lossy();
        if !path_str.starts_with('~') && !self.repository.path.exists() {
            errors.push(ValidationError {
                field: "repository.path".into(),
                message: format!(
                    "directory does not exist: {}",
                    self.repository.path.display()
                ),
            });
        }

        // --- commit ---
        if self.commit.message_template.trim().is_empty() {
            errors.push(ValidationError {
                field: "commit.message_template".into(),
                message: "must not be empty".into(),
            });
        }
        for (field, value) in [
            ("commit.author_name", &self.commit.author_name),
            ("commit.author_email", &self.commit.author_email),
        ] {
            if let Some(value) = value {
                if value.contains('<') || value.contains('>') {
                    errors.push(ValidationError {
                        field: field.into(),
                        message: "must not contain angle brackets".into(),
                    });
                }
            }
        }

        // --- auth ---
        match &self.auth {
            AuthConfig::Default => {}
            AuthConfig::UsernameToken { username, .. } => {
                if username.trim().is_empty() {
                    errors.push(ValidationError {
                        field: "auth.username".into(),
                        message: "must not be empty".into(),
                    });
                }
            }
            AuthConfig::SshKey { private_key, .. } => {
                let key_str = private_key.to_string_lossy();
                if !key_str.starts_with('~') && !private_key.exists() {
                    errors.push(ValidationError {
                        field: "auth.private_key".into(),
                        message: format!("file does not exist: {}", private_key.display()),
                    });
                }
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use gitsync_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .repository_path(PathBuf::from("/home/user/notes"))
///     .sync_debounce_ms(500)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- repository ---

    pub fn repository_path(mut self, path: PathBuf) -> Self {
        self.config.repository.path = path;
        self
    }

    pub fn repository_remote(mut self, remote: impl Into<String>) -> Self {
        self.config.repository.remote = remote.into();
        self
    }

    // --- sync ---

    pub fn sync_debounce_ms(mut self, ms: u64) -> Self {
        self.config.sync.debounce_ms = ms;
        self
    }

    pub fn sync_cooldown_secs(mut self, seconds: u64) -> Self {
        self.config.sync.cooldown_secs = seconds;
        self
    }

    pub fn sync_lock_poll_ms(mut self, ms: u64) -> Self {
        self.config.sync.lock_poll_ms = ms;
        self
    }

    pub fn sync_lock_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.sync.lock_timeout_secs = seconds;
        self
    }

    pub fn sync_poll_interval_secs(mut self, seconds: u64) -> Self {
        self.config.sync.poll_interval_secs = seconds;
        self
    }

    pub fn sync_network_retry_secs(mut self, seconds: u64) -> Self {
        self.config.sync.network_retry_secs = seconds;
        self
    }

    pub fn sync_watch_files(mut self, enabled: bool) -> Self {
        self.config.sync.watch_files = enabled;
        self
    }

    pub fn sync_show_messages(mut self, enabled: bool) -> Self {
        self.config.sync.show_sync_messages = enabled;
        self
    }

    // --- commit ---

    pub fn commit_message_template(mut self, template: impl Into<String>) -> Self {
        self.config.commit.message_template = template.into();
        self
    }

    pub fn commit_author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.config.commit.author_name = Some(name.into());
        self.config.commit.author_email = Some(email.into());
        self
    }

    // --- auth ---

    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.config.auth = auth;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
