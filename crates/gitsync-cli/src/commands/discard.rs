//! Discard command - Throw away local changes to files
//!
//! Tracked files are restored from HEAD; untracked files are deleted.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use gitsync_core::ports::IVersionControl;

use crate::context::CliContext;
use crate::output::plural;

#[derive(Debug, Args)]
pub struct DiscardCommand {
    /// Files to restore
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

impl DiscardCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let repository = ctx.repository()?;
        let backend = ctx.backend(&repository);
        let paths = ctx.repo_relative(&repository, &self.paths)?;

        for path in &paths {
            backend
                .checkout_path(path)
                .await
                .with_context(|| format!("Failed to discard changes to {}", path.display()))?;
            formatter.info(&format!("Discarded {}", path.display()));
        }

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({ "discarded": paths }));
        } else {
            formatter.success(&format!(
                "Discarded changes to {}",
                plural(paths.len(), "file")
            ));
        }
        Ok(())
    }
}
