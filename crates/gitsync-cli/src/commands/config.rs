//! Config command - View and check gitsync configuration
//!
//! Provides the `gitsync config` CLI command which:
//! 1. Shows the effective configuration with secrets redacted
//! 2. Sets individual values via dot-notation keys
//! 3. Validates the configuration file and reports errors
//! 4. Prints the configuration file path

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use gitsync_core::config::Config;
use tracing::info;

use crate::context::CliContext;
use crate::output::plural;

const SUPPORTED_KEYS: &[(&str, &str)] = &[
    ("repository.path", "Working tree to keep in sync"),
    ("repository.remote", "Remote name (default: origin)"),
    ("sync.debounce_ms", "Quiet period before a triggered sync"),
    ("sync.cooldown_secs", "Pause after a run before the queued one"),
    ("sync.lock_poll_ms", "Index lock poll interval"),
    ("sync.lock_timeout_secs", "Give up waiting for the index lock"),
    ("sync.poll_interval_secs", "Periodic sync interval, 0 disables"),
    ("sync.network_retry_secs", "Retry delay while offline"),
    ("sync.watch_files", "true|false"),
    ("sync.show_sync_messages", "true|false"),
    ("commit.message_template", "strftime template for commit messages"),
    ("commit.author_name", "Commit author name"),
    ("commit.author_email", "Commit author email"),
    ("logging.level", "trace|debug|info|warn|error"),
    ("logging.json", "true|false"),
];

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "sync.debounce_ms")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
    /// Print the configuration file path
    Path,
}

impl ConfigCommand {
    pub fn execute(&self, ctx: &CliContext) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(ctx),
            ConfigCommand::Set { key, value } => self.execute_set(ctx, key, value),
            ConfigCommand::Validate => self.execute_validate(ctx),
            ConfigCommand::Path => {
                if ctx.is_json() {
                    ctx.formatter().print_json(&serde_json::json!({
                        "config_path": ctx.config_path,
                        "exists": ctx.config_path.exists(),
                    }));
                } else {
                    println!("{}", ctx.config_path.display());
                }
                Ok(())
            }
        }
    }

    fn execute_show(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.config.redacted();
        info!(config_path = %ctx.config_path.display(), "Showing configuration");

        if ctx.is_json() {
            let json = serde_json::to_value(&config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
            return Ok(());
        }

        formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
        let yaml =
            serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            println!("  {line}");
        }
        Ok(())
    }

    fn execute_set(&self, ctx: &CliContext, key: &str, value: &str) -> Result<()> {
        let formatter = ctx.formatter();
        let mut config = ctx.config.clone();

        if let Err(e) = apply_config_value(&mut config, key, value) {
            formatter.info("Supported keys:");
            for (name, help) in SUPPORTED_KEYS {
                formatter.info(&format!("  {name:<26} {help}"));
            }
            return Err(e.context(format!("Failed to set '{key}'")));
        }

        // the repository may not be cloned yet when the path is first set
        let problems: Vec<_> = config
            .validate()
            .into_iter()
            .filter(|p| p.field != "repository.path")
            .collect();
        if !problems.is_empty() {
            let messages: Vec<String> = problems.iter().map(ToString::to_string).collect();
            anyhow::bail!("Invalid value for '{key}': {}", messages.join("; "));
        }

        if let Some(parent) = ctx.config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
        }
        let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
        std::fs::write(&ctx.config_path, yaml).context("Failed to write configuration file")?;
        info!(key, value, "Configuration value set");

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "key": key,
                "value": value,
                "config_path": ctx.config_path,
            }));
        } else {
            formatter.success(&format!("Set {key} = {value}"));
            formatter.info(&format!("Saved to {}", ctx.config_path.display()));
        }
        Ok(())
    }

    fn execute_validate(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let path = &ctx.config_path;

        // load strictly so parse errors are reported instead of defaulted
        let config = if path.exists() {
            Config::load(path)
                .with_context(|| format!("Failed to parse configuration {}", path.display()))?
        } else {
            formatter.info(&format!(
                "Configuration file not found at {}; checking defaults",
                path.display()
            ));
            ctx.config.clone()
        };

        let errors = config.validate();

        if ctx.is_json() {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": path,
                "errors": messages,
            }));
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", path.display()));
        } else {
            for error in &errors {
                formatter.warn(&format!("{} - {}", error.field, error.message));
            }
        }

        if !errors.is_empty() {
            anyhow::bail!("Configuration has {}", plural(errors.len(), "error"));
        }
        Ok(())
    }
}

/// Applies one dot-notation `key = value` to `config`
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    fn number(value: &str) -> Result<u64> {
        value
            .parse()
            .with_context(|| format!("'{value}' is not a non-negative integer"))
    }
    fn flag(value: &str) -> Result<bool> {
        value
            .parse()
            .with_context(|| format!("'{value}' is not true or false"))
    }
    fn optional(value: &str) -> Option<String> {
        (!value.is_empty()).then(|| value.to_string())
    }

    match key {
        "repository.path" => config.repository.path = PathBuf::from(value),
        "repository.remote" => config.repository.remote = value.to_string(),
        "sync.debounce_ms" => config.sync.debounce_ms = number(value)?,
        "sync.cooldown_secs" => config.sync.cooldown_secs = number(value)?,
        "sync.lock_poll_ms" => config.sync.lock_poll_ms = number(value)?,
        "sync.lock_timeout_secs" => config.sync.lock_timeout_secs = number(value)?,
        "sync.poll_interval_secs" => config.sync.poll_interval_secs = number(value)?,
        "sync.network_retry_secs" => config.sync.network_retry_secs = number(value)?,
        "sync.watch_files" => config.sync.watch_files = flag(value)?,
        "sync.show_sync_messages" => config.sync.show_sync_messages = flag(value)?,
        "commit.message_template" => config.commit.message_template = value.to_string(),
        "commit.author_name" => config.commit.author_name = optional(value),
        "commit.author_email" => config.commit.author_email = optional(value),
        "logging.level" => config.logging.level = value.to_string(),
        "logging.json" => config.logging.json = flag(value)?,
        _ => anyhow::bail!("Unknown configuration key '{key}'"),
    }
    Ok(())
}
