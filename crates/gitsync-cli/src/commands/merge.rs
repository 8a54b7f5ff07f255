//! Merge command - Commit a resolved merge and push it

use anyhow::Result;
use clap::Args;
use gitsync_sync::SyncRequest;

use crate::commands::sync::{explain_failure, print_report};
use crate::context::CliContext;

#[derive(Debug, Args)]
pub struct MergeCommand {
    /// Merge commit message (defaults to the configured template)
    #[arg(short, long)]
    pub message: Option<String>,
}

impl MergeCommand {
    /// Stages everything, commits the merge, then runs a forced sync
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let repository = ctx.repository()?;

        let report = ctx
            .coordinator(&repository)
            .run_once(SyncRequest::Merge {
                message: self.message.clone(),
            })
            .await
            .map_err(|e| explain_failure(formatter.as_ref(), e))?;

        print_report(ctx, formatter.as_ref(), &report);
        Ok(())
    }
}
