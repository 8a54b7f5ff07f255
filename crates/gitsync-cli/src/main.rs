//! gitsync CLI - Command-line interface for gitsync
//!
//! Provides commands for:
//! - Running a one-shot sync (optionally limited to a set of paths)
//! - Viewing repository status and recent commits
//! - Listing, showing and resolving merge conflicts
//! - Completing or aborting a merge, discarding local changes
//! - Inspecting configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use gitsync_core::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

mod commands;
mod context;
mod output;

use commands::{
    completions::CompletionsCommand, config::ConfigCommand, conflicts::ConflictsCommand,
    discard::DiscardCommand, log::LogCommand, merge::MergeCommand, status::StatusCommand,
    sync::SyncCommand,
};
use context::CliContext;
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "gitsync",
    version,
    about = "Keep a git working tree in sync with its remote"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Pull remote changes and push local ones
    Sync(SyncCommand),
    /// Show repository and sync status
    Status(StatusCommand),
    /// Manage merge conflicts
    #[command(subcommand)]
    Conflicts(ConflictsCommand),
    /// Commit a resolved merge and push it
    Merge(MergeCommand),
    /// Discard local changes to files
    Discard(DiscardCommand),
    /// Show recent commits
    Log(LogCommand),
    /// View and check configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

/// Verbosity flags raise the configured level, `RUST_LOG` overrides both
fn log_filter(verbose: u8, logging: &LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::new(effective_level(verbose, &logging.level))
}

fn effective_level(verbose: u8, configured: &str) -> &str {
    match verbose {
        0 => configured,
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn init_tracing(verbose: u8, logging: &LoggingConfig) {
    let filter = log_filter(verbose, logging);
    // logs go to stderr so --json output stays parseable
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = OutputFormat::from_flag(cli.json);

    if let Commands::Completions(cmd) = &cli.command {
        return cmd.execute();
    }

    let ctx = CliContext::load(cli.config.as_deref(), format, cli.quiet)?;
    init_tracing(cli.verbose, &ctx.config.logging);

    let result = match &cli.command {
        Commands::Sync(cmd) => cmd.execute(&ctx).await,
        Commands::Status(cmd) => cmd.execute(&ctx).await,
        Commands::Conflicts(cmd) => cmd.execute(&ctx).await,
        Commands::Merge(cmd) => cmd.execute(&ctx).await,
        Commands::Discard(cmd) => cmd.execute(&ctx).await,
        Commands::Log(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx),
        Commands::Completions(_) => Ok(()),
    };

    if let Err(e) = result {
        ctx.formatter().error(&format!("{e:#}"));
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["gitsync", "status", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Status(_)));
    }

    #[test]
    fn test_effective_level() {
        assert_eq!(effective_level(0, "warn"), "warn");
        assert_eq!(effective_level(1, "warn"), "info");
        assert_eq!(effective_level(2, "warn"), "debug");
        assert_eq!(effective_level(5, "warn"), "trace");
    }

    #[test]
    fn test_sync_path_and_message() {
        let cli = Cli::try_parse_from([
            "gitsync", "sync", "--path", "a.md", "--path", "b.md", "-m", "notes",
        ])
        .unwrap();
        let Commands::Sync(cmd) = cli.command else {
            panic!("expected sync");
        };
        assert_eq!(cmd.paths, vec![PathBuf::from("a.md"), PathBuf::from("b.md")]);
        assert_eq!(cmd.message.as_deref(), Some("notes"));
    }

    #[test]
    fn test_message_requires_paths() {
        assert!(Cli::try_parse_from(["gitsync", "sync", "-m", "notes"]).is_err());
    }
}
