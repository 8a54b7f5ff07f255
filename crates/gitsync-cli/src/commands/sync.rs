//! Sync command - Pull remote changes and push local ones
//!
//! Provides the `gitsync sync` CLI command which runs one request through
//! the same coordinator the daemon uses:
//! - plain: fetch, merge, commit everything, push (with rebase recovery)
//! - `--path`: commit and push only the listed paths with a custom message

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use gitsync_core::domain::SyncOutcome;
use gitsync_sync::{SyncError, SyncReport, SyncRequest};

use crate::context::CliContext;
use crate::output::{plural, OutputFormatter};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Report completion even when nothing changed
    #[arg(long)]
    pub force: bool,

    /// Only stage and push these paths (repeatable)
    #[arg(long = "path", value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Commit message for a --path sync
    #[arg(short, long, requires = "paths")]
    pub message: Option<String>,
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let repository = ctx.repository()?;

        let request = if self.paths.is_empty() {
            SyncRequest::Sync { forced: self.force }
        } else {
            let paths = ctx.repo_relative(&repository, &self.paths)?;
            let message = self
                .message
                .clone()
                .unwrap_or_else(|| ctx.config.commit.format_message(&chrono::Local::now()));
            formatter.info(&format!("Syncing {}", plural(paths.len(), "path")));
            SyncRequest::ManualFiles { paths, message }
        };

        let coordinator = ctx.coordinator(&repository);
        let report = coordinator
            .run_once(request)
            .await
            .map_err(|e| explain_failure(formatter.as_ref(), e))?;

        print_report(ctx, formatter.as_ref(), &report);
        Ok(())
    }
}

/// Adds a next-step hint for failures the user has to act on
pub(crate) fn explain_failure(formatter: &dyn OutputFormatter, err: SyncError) -> anyhow::Error {
    if err.is_conflict() {
        formatter.info("Resolve with 'gitsync conflicts list' and 'gitsync conflicts resolve'");
    } else if err.is_network() {
        formatter.info("The remote is unreachable; try again once you are back online");
    }
    anyhow::Error::new(err)
}

pub(crate) fn print_report(ctx: &CliContext, formatter: &dyn OutputFormatter, report: &SyncReport) {
    if ctx.is_json() {
        formatter.print_json(&serde_json::json!({
            "outcome": report.outcome(),
            "download": report.download,
            "upload": report.upload,
        }));
        return;
    }

    match report.outcome() {
        SyncOutcome::Performed => formatter.success(&format!(
            "Sync complete (download: {}, upload: {})",
            describe(report.download),
            describe(report.upload)
        )),
        SyncOutcome::NotRequired => formatter.success("Already up to date"),
        SyncOutcome::Failed => formatter.warn("Sync did not complete"),
    }
}

fn describe(outcome: SyncOutcome) -> &'static str {
    match outcome {
        SyncOutcome::NotRequired => "nothing to do",
        SyncOutcome::Performed => "done",
        SyncOutcome::Failed => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_outcomes() {
        assert_eq!(describe(SyncOutcome::NotRequired), "nothing to do");
        assert_eq!(describe(SyncOutcome::Performed), "done");
        assert_eq!(describe(SyncOutcome::Failed), "failed");
    }
}
