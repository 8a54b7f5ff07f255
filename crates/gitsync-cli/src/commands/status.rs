//! Status command - Show repository and sync status
//!
//! Provides the `gitsync status` CLI command which shows:
//! 1. The working tree, remote and upstream branch
//! 2. Any in-progress merge or rebase, and whether the index lock is held
//! 3. Modified, untracked and conflicting paths

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use gitsync_core::ports::{IVersionControl, RepositoryState};

use crate::context::CliContext;
use crate::output::plural;

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Only print counts, not individual paths
    #[arg(long)]
    pub short: bool,
}

impl StatusCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let repository = ctx.repository()?;
        let backend = ctx.backend(&repository);

        let state = backend
            .state()
            .await
            .context("Failed to read repository state")?;
        let status = backend
            .status()
            .await
            .context("Failed to read working tree status")?;
        let upstream = backend
            .upstream_ref()
            .await
            .context("Failed to resolve upstream branch")?;
        let locked = repository.is_locked();

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "repository": repository.path(),
                "remote": ctx.config.repository.remote,
                "upstream": upstream,
                "state": state,
                "locked": locked,
                "modified": status.modified,
                "untracked": status.untracked,
                "conflicting": status.conflicting,
            }));
            return Ok(());
        }

        formatter.info(&format!("Repository: {}", repository));
        formatter.info(&format!(
            "Upstream:   {}",
            upstream.as_deref().unwrap_or("(none)")
        ));
        formatter.info(&format!("State:      {}", state_label(state)));
        if locked {
            formatter.warn(&format!(
                "Index lock held: {}",
                repository.lock_file().display()
            ));
        }

        if status.has_conflicts() {
            formatter.warn(&format!(
                "{} in conflict; run 'gitsync conflicts list'",
                plural(status.conflicting.len(), "file")
            ));
        }

        if !status.has_changes() && !status.has_conflicts() {
            formatter.success("Working tree clean");
            return Ok(());
        }

        print_group("Modified", &status.modified, self.short, formatter.as_ref());
        print_group("Untracked", &status.untracked, self.short, formatter.as_ref());
        print_group("Conflicting", &status.conflicting, self.short, formatter.as_ref());
        Ok(())
    }
}

fn state_label(state: RepositoryState) -> &'static str {
    match state {
        RepositoryState::Clean => "clean",
        RepositoryState::Merging => "merge in progress",
        RepositoryState::Rebasing => "rebase in progress",
        RepositoryState::Other => "other operation in progress",
    }
}

fn print_group(
    label: &str,
    paths: &[PathBuf],
    short: bool,
    formatter: &dyn crate::output::OutputFormatter,
) {
    if paths.is_empty() {
        return;
    }
    println!("{label} ({}):", paths.len());
    if short {
        return;
    }
    for path in paths {
        formatter.info(&format!("  {}", path.display()));
    }
}
