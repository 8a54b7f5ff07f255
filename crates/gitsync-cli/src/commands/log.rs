//! Log command - Show recent commits with line statistics

use anyhow::{Context, Result};
use chrono::Local;
use clap::Args;
use gitsync_core::ports::{CommitSummary, IVersionControl};

use crate::context::CliContext;

#[derive(Debug, Args)]
pub struct LogCommand {
    /// Number of commits to show
    #[arg(short = 'n', long, default_value_t = 10)]
    pub limit: usize,
}

impl LogCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let repository = ctx.repository()?;
        let commits = ctx
            .backend(&repository)
            .recent_commits(self.limit)
            .await
            .context("Failed to read commit history")?;

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({ "commits": commits }));
            return Ok(());
        }

        if commits.is_empty() {
            formatter.info("No commits yet");
            return Ok(());
        }

        for commit in &commits {
            println!("{}", format_line(commit));
        }
        Ok(())
    }
}

fn format_line(commit: &CommitSummary) -> String {
    format!(
        "{}  {}  {:<20}  +{} -{}  {}",
        commit.id,
        commit.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
        truncate(&commit.author, 20),
        commit.additions,
        commit.deletions,
        commit.summary
    )
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max - 1).collect();
        out.push('\u{2026}');
        out
    }
}
