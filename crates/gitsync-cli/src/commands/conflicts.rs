//! Conflicts command - Manage merge conflicts
//!
//! Provides the `gitsync conflicts` CLI command which:
//! 1. Lists conflicted files with their remaining block counts
//! 2. Shows the local, base and remote sides of each block
//! 3. Resolves one block or a whole file, stages it once fully resolved,
//!    and completes the merge when the last file is done
//! 4. Aborts the merge, restoring the pre-merge working tree

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use gitsync_conflict::{BlockSides, ConflictResolutionModel, MergeSession, SaveOutcome};
use gitsync_core::domain::ResolutionChoice;
use gitsync_core::ports::IVersionControl;
use gitsync_sync::SyncRequest;
use tracing::info;

use crate::commands::sync::{explain_failure, print_report};
use crate::context::CliContext;
use crate::output::{plural, OutputFormatter};

#[derive(Debug, Subcommand)]
pub enum ConflictsCommand {
    /// List conflicted files
    List,
    /// Show the conflict blocks of a file
    Show {
        /// Conflicted file
        file: PathBuf,
        /// Only this block (1-based)
        #[arg(long)]
        block: Option<usize>,
    },
    /// Resolve the conflict blocks of a file
    Resolve {
        /// Conflicted file
        file: PathBuf,
        /// Side to keep: local, remote, both
        #[arg(long)]
        choice: ResolutionChoice,
        /// Only this block (1-based); all blocks when omitted
        #[arg(long)]
        block: Option<usize>,
        /// Do not commit and push after the last file is resolved
        #[arg(long)]
        no_merge: bool,
    },
    /// Abort the merge and restore the pre-merge state
    Abort,
}

impl ConflictsCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        match self {
            ConflictsCommand::List => self.execute_list(ctx).await,
            ConflictsCommand::Show { file, block } => self.execute_show(ctx, file, *block).await,
            ConflictsCommand::Resolve {
                file,
                choice,
                block,
                no_merge,
            } => {
                self.execute_resolve(ctx, file, *choice, *block, *no_merge)
                    .await
            }
            ConflictsCommand::Abort => self.execute_abort(ctx).await,
        }
    }

    async fn execute_list(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let repository = ctx.repository()?;
        let status = ctx
            .backend(&repository)
            .status()
            .await
            .context("Failed to read working tree status")?;

        let mut entries = Vec::with_capacity(status.conflicting.len());
        for path in &status.conflicting {
            // binary files and deleted sides have no markers to count
            let blocks = ConflictResolutionModel::load(&repository.path().join(path))
                .map(|m| m.conflict_count())
                .unwrap_or(0);
            entries.push((path.clone(), blocks));
        }

        if ctx.is_json() {
            let files: Vec<_> = entries
                .iter()
                .map(|(path, blocks)| serde_json::json!({"path": path, "blocks": blocks}))
                .collect();
            formatter.print_json(&serde_json::json!({ "conflicts": files }));
            return Ok(());
        }

        if entries.is_empty() {
            formatter.success("No conflicts");
            return Ok(());
        }

        println!("{} in conflict:", plural(entries.len(), "file"));
        for (path, blocks) in &entries {
            println!("  {:<50} {}", path.display(), plural(*blocks, "block"));
        }
        Ok(())
    }

    async fn execute_show(&self, ctx: &CliContext, file: &Path, block: Option<usize>) -> Result<()> {
        let formatter = ctx.formatter();
        let repository = ctx.repository()?;
        let relative = single_path(ctx, &repository, file)?;
        let model = ConflictResolutionModel::load(&repository.path().join(&relative))
            .with_context(|| format!("Failed to read {}", relative.display()))?;

        let positions = model.block_positions();
        let selected: Vec<(usize, usize)> = match block {
            Some(n) => {
                let position = block_position(&model, n)?;
                vec![(n, position)]
            }
            None => positions.iter().enumerate().map(|(i, p)| (i + 1, *p)).collect(),
        };

        let mut blocks = Vec::with_capacity(selected.len());
        for (ordinal, position) in selected {
            blocks.push((ordinal, model.sides(position)?));
        }

        if ctx.is_json() {
            let json: Vec<_> = blocks
                .iter()
                .map(|(ordinal, sides)| {
                    serde_json::json!({
                        "block": ordinal,
                        "local_label": sides.local_label,
                        "local": sides.local,
                        "base": sides.base,
                        "remote_label": sides.remote_label,
                        "remote": sides.remote,
                    })
                })
                .collect();
            formatter.print_json(&serde_json::json!({
                "path": relative,
                "total_blocks": positions.len(),
                "blocks": json,
            }));
            return Ok(());
        }

        if blocks.is_empty() {
            formatter.success(&format!("{} has no conflict blocks", relative.display()));
            return Ok(());
        }

        println!("{} ({})", relative.display(), plural(positions.len(), "block"));
        for (ordinal, sides) in &blocks {
            print_block(*ordinal, sides);
        }
        Ok(())
    }

    async fn execute_resolve(
        &self,
        ctx: &CliContext,
        file: &Path,
        choice: ResolutionChoice,
        block: Option<usize>,
        no_merge: bool,
    ) -> Result<()> {
        let formatter = ctx.formatter();
        let repository = ctx.repository()?;
        let backend = ctx.backend(&repository);
        let relative = single_path(ctx, &repository, file)?;

        let status = backend
            .status()
            .await
            .context("Failed to read working tree status")?;
        let mut session = MergeSession::new(repository.path(), status.conflicting);
        session.select(&relative)?;

        let resolved = {
            let model = session.current()?;
            match block {
                Some(n) => {
                    let position = block_position(model, n)?;
                    model.resolve(position, choice)?;
                    1
                }
                None => model.resolve_all(choice),
            }
        };
        let outcome = session.save_current()?;
        info!(file = %relative.display(), %choice, resolved, "Resolved conflict blocks");

        if outcome.file_resolved() {
            backend
                .stage(Some(std::slice::from_ref(&relative)))
                .await
                .with_context(|| format!("Failed to stage {}", relative.display()))?;
        }

        report_outcome(ctx, formatter.as_ref(), &relative, resolved, &outcome);
        if no_merge || !matches!(outcome, SaveOutcome::AllResolved) {
            return Ok(());
        }

        formatter.info("All conflicts resolved; completing merge");
        let report = ctx
            .coordinator(&repository)
            .run_once(SyncRequest::Merge { message: None })
            .await
            .map_err(|e| explain_failure(formatter.as_ref(), e))?;
        print_report(ctx, formatter.as_ref(), &report);
        Ok(())
    }

    async fn execute_abort(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let repository = ctx.repository()?;
        ctx.backend(&repository)
            .merge_abort()
            .await
            .context("Failed to abort merge")?;

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({"aborted": true}));
        } else {
            formatter.success("Merge aborted; working tree restored to HEAD");
        }
        Ok(())
    }
}

fn single_path(
    ctx: &CliContext,
    repository: &gitsync_core::domain::RepositoryHandle,
    file: &Path,
) -> Result<PathBuf> {
    let mut paths = ctx.repo_relative(repository, std::slice::from_ref(&file.to_path_buf()))?;
    paths
        .pop()
        .with_context(|| format!("Invalid path {}", file.display()))
}

/// Sequence position of the user's 1-based block number
fn block_position(model: &ConflictResolutionModel, block: usize) -> Result<usize> {
    block
        .checked_sub(1)
        .and_then(|ordinal| model.nth_block(ordinal))
        .with_context(|| {
            format!(
                "No block {block}; the file has {}",
                plural(model.conflict_count(), "block")
            )
        })
}

fn print_block(ordinal: usize, sides: &BlockSides) {
    println!();
    println!("Block {ordinal}");
    println!("  local ({}):", label_or(&sides.local_label, "local"));
    for line in &sides.local {
        println!("    | {line}");
    }
    if !sides.base.is_empty() {
        println!("  base:");
        for line in &sides.base {
            println!("    | {line}");
        }
    }
    println!("  remote ({}):", label_or(&sides.remote_label, "remote"));
    for line in &sides.remote {
        println!("    | {line}");
    }
}

fn label_or<'a>(label: &'a str, fallback: &'a str) -> &'a str {
    if label.is_empty() {
        fallback
    } else {
        label
    }
}

fn report_outcome(
    ctx: &CliContext,
    formatter: &dyn OutputFormatter,
    file: &Path,
    resolved: usize,
    outcome: &SaveOutcome,
) {
    if ctx.is_json() {
        let (remaining_blocks, remaining_files) = match outcome {
            SaveOutcome::Partial { remaining_blocks } => (*remaining_blocks, None),
            SaveOutcome::Advanced {
                remaining_files, ..
            } => (0, Some(*remaining_files)),
            SaveOutcome::AllResolved => (0, Some(0)),
        };
        formatter.print_json(&serde_json::json!({
            "path": file,
            "resolved_blocks": resolved,
            "remaining_blocks": remaining_blocks,
            "remaining_files": remaining_files,
        }));
        return;
    }

    match outcome {
        SaveOutcome::Partial { remaining_blocks } => formatter.success(&format!(
            "Resolved {} in {}; {} left",
            plural(resolved, "block"),
            file.display(),
            plural(*remaining_blocks, "block")
        )),
        SaveOutcome::Advanced {
            next,
            remaining_files,
        } => {
            formatter.success(&format!("{} resolved and staged", file.display()));
            formatter.info(&format!(
                "{} still in conflict, next: {}",
                plural(*remaining_files, "file"),
                next.display()
            ));
        }
        SaveOutcome::AllResolved => {
            formatter.success(&format!("{} resolved and staged", file.display()));
        }
    }
}
