//! Multi-file merge session
//!
//! Steps through the set of conflicted files of one repository. Each file
//! gets its own [`ConflictResolutionModel`]; unsaved edits survive
//! navigation between files and are only dropped by an explicit reload.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use gitsync_core::domain::ResolutionChoice;
use tracing::{debug, info};

use crate::error::ConflictError;
use crate::model::ConflictResolutionModel;

/// Result of saving the current file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Blocks remain; the file stays in the set
    Partial { remaining_blocks: usize },
    /// The file is resolved and removed; the session moved on
    Advanced {
        next: PathBuf,
        remaining_files: usize,
    },
    /// The last conflicted file was resolved
    AllResolved,
}

impl SaveOutcome {
    /// Whether the saved file left the conflict set
    pub fn file_resolved(&self) -> bool {
        !matches!(self, SaveOutcome::Partial { .. })
    }
}

/// Ordered conflict file set plus per-file drafts
#[derive(Debug)]
pub struct MergeSession {
    root: PathBuf,
    files: Vec<PathBuf>,
    current: usize,
    drafts: HashMap<PathBuf, ConflictResolutionModel>,
}

impl MergeSession {
    /// Creates a session over `files`, given relative to `root`
    pub fn new(root: impl Into<PathBuf>, files: Vec<PathBuf>) -> Self {
        let root = root.into();
        debug!(root = %root.display(), files = files.len(), "Starting merge session");
        Self {
            root,
            files,
            current: 0,
            drafts: HashMap::new(),
        }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn is_complete(&self) -> bool {
        self.files.is_empty()
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.files.get(self.current).map(PathBuf::as_path)
    }

    /// Index of the current file and total file count
    pub fn position(&self) -> (usize, usize) {
        (self.current, self.files.len())
    }

    /// Model of the current file, extracted from disk on first access
    pub fn current(&mut self) -> Result<&mut ConflictResolutionModel, ConflictError> {
        let relative = self
            .files
            .get(self.current)
            .cloned()
            .ok_or(ConflictError::NoFilesRemaining)?;

        if !self.drafts.contains_key(&relative) {
            let model = ConflictResolutionModel::load(&self.root.join(&relative))?;
            self.drafts.insert(relative.clone(), model);
        }

        self.drafts
            .get_mut(&relative)
            .ok_or(ConflictError::UnknownFile(relative))
    }

    /// Discards unsaved edits of the current file and re-reads it
    pub fn reload_current(&mut self) -> Result<&mut ConflictResolutionModel, ConflictError> {
        if let Some(path) = self.files.get(self.current) {
            self.drafts.remove(path);
        }
        self.current()
    }

    pub fn next(&mut self) -> Option<&Path> {
        if self.current + 1 < self.files.len() {
            self.current += 1;
        }
        self.current_path()
    }

    pub fn prev(&mut self) -> Option<&Path> {
        self.current = self.current.saturating_sub(1);
        self.current_path()
    }

    /// Makes `path` the current file
    pub fn select(&mut self, path: &Path) -> Result<(), ConflictError> {
        let index = self
            .files
            .iter()
            .position(|p| p == path)
            .ok_or_else(|| ConflictError::UnknownFile(path.to_path_buf()))?;
        self.current = index;
        Ok(())
    }

    /// Resolves a block of the current file (draft only, nothing is written)
    pub fn resolve(
        &mut self,
        position: usize,
        choice: ResolutionChoice,
    ) -> Result<usize, ConflictError> {
        self.current()?.resolve(position, choice)
    }

    /// Writes the current file and, once it is fully resolved, drops it
    /// from the set
    pub fn save_current(&mut self) -> Result<SaveOutcome, ConflictError> {
        let relative = self
            .current_path()
            .map(Path::to_path_buf)
            .ok_or(ConflictError::NoFilesRemaining)?;
        let absolute = self.root.join(&relative);

        let model = self.current()?;
        model.save(&absolute)?;
        let remaining_blocks = model.conflict_count();

        if remaining_blocks > 0 {
            return Ok(SaveOutcome::Partial { remaining_blocks });
        }

        self.drafts.remove(&relative);
        self.files.remove(self.current);
        info!(file = %relative.display(), remaining = self.files.len(), "File fully resolved");

        if self.files.is_empty() {
            self.current = 0;
            return Ok(SaveOutcome::AllResolved);
        }

        if self.current >= self.files.len() {
            self.current = self.files.len() - 1;
        }
        Ok(SaveOutcome::Advanced {
            next: self.files[self.current].clone(),
            remaining_files: self.files.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture(files: &[(&str, &str)]) -> (TempDir, MergeSession) {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        let paths = files.iter().map(|(n, _)| PathBuf::from(n)).collect();
        let session = MergeSession::new(dir.path(), paths);
        (dir, session)
    }

    const ONE_BLOCK: &str = "<<<<<<< HEAD\nA\n=======\nB\n>>>>>>>\n";
    const TWO_BLOCKS: &str = "<<<<<<< HEAD\n1\n=======\n2\n>>>>>>>\n<<<<<<< HEAD\n3\n=======\n4\n>>>>>>>\n";

    #[test]
    fn test_single_file_resolution_completes_session() {
        let (dir, mut session) = fixture(&[("a.txt", ONE_BLOCK)]);

        session.resolve(0, ResolutionChoice::Remote).unwrap();
        assert_eq!(session.save_current().unwrap(), SaveOutcome::AllResolved);
        assert!(session.is_complete());
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "B\n");
    }

    #[test]
    fn test_resolving_one_of_many_advances() {
        let (_dir, mut session) = fixture(&[("a.txt", ONE_BLOCK), ("b.txt", ONE_BLOCK)]);

        session.resolve(0, ResolutionChoice::Local).unwrap();
        let outcome = session.save_current().unwrap();
        assert_eq!(
            outcome,
            SaveOutcome::Advanced {
                next: PathBuf::from("b.txt"),
                remaining_files: 1
            }
        );
        assert!(outcome.file_resolved());
        assert_eq!(session.current_path(), Some(Path::new("b.txt")));
    }

    #[test]
    fn test_partial_save_keeps_file_in_set() {
        let (_dir, mut session) = fixture(&[("a.txt", TWO_BLOCKS)]);

        session.resolve(0, ResolutionChoice::Both).unwrap();
        assert_eq!(
            session.save_current().unwrap(),
            SaveOutcome::Partial { remaining_blocks: 1 }
        );
        assert_eq!(session.files().len(), 1);
    }

    #[test]
    fn test_navigation_preserves_unsaved_edits() {
        let (_dir, mut session) = fixture(&[("a.txt", TWO_BLOCKS), ("b.txt", ONE_BLOCK)]);

        session.resolve(0, ResolutionChoice::Local).unwrap();
        assert_eq!(session.next(), Some(Path::new("b.txt")));
        assert_eq!(session.current().unwrap().conflict_count(), 1);
        assert_eq!(session.prev(), Some(Path::new("a.txt")));

        assert_eq!(session.current().unwrap().conflict_count(), 1);
    }

    #[test]
    fn test_reload_discards_unsaved_edits() {
        let (_dir, mut session) = fixture(&[("a.txt", TWO_BLOCKS)]);

        session.resolve(0, ResolutionChoice::Local).unwrap();
        assert_eq!(session.reload_current().unwrap().conflict_count(), 2);
    }

    #[test]
    fn test_select_and_unknown_file() {
        let (_dir, mut session) = fixture(&[("a.txt", ONE_BLOCK), ("b.txt", ONE_BLOCK)]);

        session.select(Path::new("b.txt")).unwrap();
        assert_eq!(session.position(), (1, 2));

        session.resolve(0, ResolutionChoice::Remote).unwrap();
        assert_eq!(
            session.save_current().unwrap(),
            SaveOutcome::Advanced {
                next: PathBuf::from("a.txt"),
                remaining_files: 1
            }
        );

        assert!(matches!(
            session.select(Path::new("missing.txt")),
            Err(ConflictError::UnknownFile(_))
        ));
    }

    #[test]
    fn test_empty_session() {
        let (_dir, mut session) = fixture(&[]);
        assert!(session.is_complete());
        assert!(matches!(
            session.save_current(),
            Err(ConflictError::NoFilesRemaining)
        ));
    }
}
