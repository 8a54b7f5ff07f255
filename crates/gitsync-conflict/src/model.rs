//! Editable resolution model for one conflicted file

use std::io::Write;
use std::path::Path;

use gitsync_core::domain::conflict::{
    ConflictSegment, ResolutionChoice, BASE_MARKER, END_MARKER, SEPARATOR_MARKER, START_MARKER,
};
use tracing::{debug, info};

use crate::error::ConflictError;
use crate::extractor::ConflictExtractor;

/// The two sides of a conflict block, split at its markers
///
/// Labels are whatever text follows the start and end markers
/// (`HEAD`, `origin/main`, ...). With diff3-style blocks the base section
/// is kept apart and belongs to neither side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockSides {
    pub local_label: String,
    pub local: Vec<String>,
    pub base: Vec<String>,
    pub remote_label: String,
    pub remote: Vec<String>,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Local,
    Base,
    Remote,
}

impl BlockSides {
    /// Splits the raw text of a conflict block
    ///
    /// A block without a separator has an empty remote side. A block
    /// without an end marker (unbalanced input) keeps every line after the
    /// separator as remote.
    pub fn split(raw: &str) -> Self {
        let mut sides = BlockSides::default();
        let mut lines: Vec<&str> = raw.split('\n').collect();

        if lines.len() > 1 {
            if let Some(last) = lines.last() {
                if last.trim().starts_with(END_MARKER) {
                    sides.remote_label = marker_label(last, END_MARKER);
                    lines.pop();
                }
            }
        }

        let mut iter = lines.into_iter();
        if let Some(first) = iter.next() {
            sides.local_label = marker_label(first, START_MARKER);
        }

        let mut section = Section::Local;
        for line in iter {
            let trimmed = line.trim();
            match section {
                Section::Local | Section::Base if trimmed.starts_with(SEPARATOR_MARKER) => {
                    section = Section::Remote;
                }
                Section::Local if trimmed.starts_with(BASE_MARKER) => {
                    section = Section::Base;
                }
                Section::Local => sides.local.push(line.to_string()),
                Section::Base => sides.base.push(line.to_string()),
                Section::Remote => sides.remote.push(line.to_string()),
            }
        }

        sides
    }

    /// Lines that replace the block for a given choice
    pub fn lines_for(&self, choice: ResolutionChoice) -> Vec<String> {
        match choice {
            ResolutionChoice::Local => self.local.clone(),
            ResolutionChoice::Remote => self.remote.clone(),
            ResolutionChoice::Both => self
                .local
                .iter()
                .chain(self.remote.iter())
                .cloned()
                .collect(),
        }
    }
}

fn marker_label(line: &str, marker: &str) -> String {
    line.trim()
        .strip_prefix(marker)
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// In-memory segment sequence of a file under conflict
///
/// Positions are indices into the current sequence and shift after every
/// resolution, so callers re-read [`segments`](Self::segments) or
/// [`block_positions`](Self::block_positions) instead of caching them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictResolutionModel {
    segments: Vec<ConflictSegment>,
}

impl ConflictResolutionModel {
    pub fn from_segments(segments: Vec<ConflictSegment>) -> Self {
        Self { segments }
    }

    pub fn parse(content: &str) -> Self {
        Self::from_segments(ConflictExtractor::extract_str(content))
    }

    /// Re-extracts the file from disk
    pub fn load(path: &Path) -> Result<Self, ConflictError> {
        let segments = ConflictExtractor::extract_file(path)?;
        debug!(path = %path.display(), segments = segments.len(), "Loaded conflicted file");
        Ok(Self::from_segments(segments))
    }

    pub fn segments(&self) -> &[ConflictSegment] {
        &self.segments
    }

    /// Sequence positions of the remaining conflict blocks, in file order
    pub fn block_positions(&self) -> Vec<usize> {
        self.segments
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_conflict())
            .map(|(i, _)| i)
            .collect()
    }

    /// Sequence position of the `ordinal`-th remaining block (0-based)
    pub fn nth_block(&self, ordinal: usize) -> Option<usize> {
        self.block_positions().get(ordinal).copied()
    }

    pub fn conflict_count(&self) -> usize {
        self.segments.iter().filter(|s| s.is_conflict()).count()
    }

    pub fn is_fully_resolved(&self) -> bool {
        self.conflict_count() == 0
    }

    /// Sides of the block at `position`
    pub fn sides(&self, position: usize) -> Result<BlockSides, ConflictError> {
        match self.segments.get(position) {
            Some(ConflictSegment::ConflictBlock(raw)) => Ok(BlockSides::split(raw)),
            _ => Err(ConflictError::NotAConflictBlock(position)),
        }
    }

    /// Replaces the block at `position` with the lines of the chosen side
    ///
    /// Returns the number of plain lines that took its place.
    pub fn resolve(
        &mut self,
        position: usize,
        choice: ResolutionChoice,
    ) -> Result<usize, ConflictError> {
        let replacement: Vec<ConflictSegment> = self
            .sides(position)?
            .lines_for(choice)
            .into_iter()
            .map(ConflictSegment::PlainLine)
            .collect();
        let inserted = replacement.len();

        self.segments.splice(position..=position, replacement);
        debug!(position, %choice, inserted, "Resolved conflict block");
        Ok(inserted)
    }

    /// Resolves every remaining block with the same choice
    pub fn resolve_all(&mut self, choice: ResolutionChoice) -> usize {
        let mut resolved = 0;
        // Back to front so earlier positions stay valid.
        for position in self.block_positions().into_iter().rev() {
            if self.resolve(position, choice).is_ok() {
                resolved += 1;
            }
        }
        resolved
    }

    /// Serialised file content, one record per segment
    pub fn render(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            out.push_str(segment.text());
            out.push('\n');
        }
        out
    }

    /// Writes the current sequence back to `path`
    ///
    /// Partially resolved content is written as is; the remaining blocks
    /// keep their markers.
    pub fn save(&self, path: &Path) -> Result<(), ConflictError> {
        let mut file = std::fs::File::create(path).map_err(|e| ConflictError::io(path, e))?;
        file.write_all(self.render().as_bytes())
            .map_err(|e| ConflictError::io(path, e))?;
        info!(
            path = %path.display(),
            remaining = self.conflict_count(),
            "Saved conflict resolution"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = "<<<<<<< HEAD\nA\n=======\nB\n>>>>>>>\n";

    #[test]
    fn test_resolve_remote_scenario() {
        let mut model = ConflictResolutionModel::parse(SIMPLE);
        assert_eq!(model.conflict_count(), 1);

        model.resolve(0, ResolutionChoice::Remote).unwrap();
        assert!(model.is_fully_resolved());
        assert_eq!(model.render(), "B\n");
    }

    #[test]
    fn test_resolve_local_keeps_surrounding_lines() {
        let mut model = ConflictResolutionModel::parse(
            "top\n<<<<<<< HEAD\nmine 1\nmine 2\n=======\ntheirs\n>>>>>>> origin/main\nbottom\n",
        );
        let position = model.nth_block(0).unwrap();
        assert_eq!(position, 1);

        let inserted = model.resolve(position, ResolutionChoice::Local).unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(model.render(), "top\nmine 1\nmine 2\nbottom\n");
    }

    #[test]
    fn test_resolve_local_with_empty_side() {
        let mut model =
            ConflictResolutionModel::parse("a\n<<<<<<< HEAD\n=======\nremote only\n>>>>>>> x\nb\n");
        model.resolve(1, ResolutionChoice::Local).unwrap();
        assert_eq!(model.render(), "a\nb\n");
    }

    #[test]
    fn test_resolve_both_orders_local_first() {
        let mut model = ConflictResolutionModel::parse(
            "<<<<<<< HEAD\nl1\n=======\nr1\nr2\nr3\n>>>>>>> x\n",
        );
        model.resolve(0, ResolutionChoice::Both).unwrap();
        assert_eq!(model.render(), "l1\nr1\nr2\nr3\n");
    }

    #[test]
    fn test_positions_shift_after_resolution() {
        let mut model = ConflictResolutionModel::parse(
            "<<<<<<< HEAD\na\nb\n=======\nc\n>>>>>>> x\nmid\n<<<<<<< HEAD\nd\n=======\ne\n>>>>>>> x\n",
        );
        assert_eq!(model.block_positions(), vec![0, 2]);

        model.resolve(0, ResolutionChoice::Local).unwrap();
        assert_eq!(model.block_positions(), vec![3]);

        model.resolve(3, ResolutionChoice::Remote).unwrap();
        assert_eq!(model.render(), "a\nb\nmid\ne\n");
    }

    #[test]
    fn test_resolve_plain_line_is_rejected() {
        let mut model = ConflictResolutionModel::parse("plain\n");
        assert!(matches!(
            model.resolve(0, ResolutionChoice::Local),
            Err(ConflictError::NotAConflictBlock(0))
        ));
        assert!(matches!(
            model.resolve(7, ResolutionChoice::Local),
            Err(ConflictError::NotAConflictBlock(7))
        ));
    }

    #[test]
    fn test_marker_like_text_inside_plain_lines_is_not_a_block() {
        let model = ConflictResolutionModel::parse("a line with ======= inside\n");
        assert!(model.is_fully_resolved());
    }

    #[test]
    fn test_sides_labels_and_diff3_base() {
        let sides = BlockSides::split(
            "<<<<<<< HEAD\nours\n||||||| merged common ancestors\nbase\n=======\ntheirs\n>>>>>>> origin/main",
        );
        assert_eq!(sides.local_label, "HEAD");
        assert_eq!(sides.remote_label, "origin/main");
        assert_eq!(sides.local, vec!["ours"]);
        assert_eq!(sides.base, vec!["base"]);
        assert_eq!(sides.remote, vec!["theirs"]);
    }

    #[test]
    fn test_sides_of_unbalanced_block() {
        let sides = BlockSides::split("<<<<<<< HEAD\nConflict Line\nLine 2");
        assert_eq!(sides.local, vec!["Conflict Line", "Line 2"]);
        assert!(sides.remote.is_empty());

        let sides = BlockSides::split("<<<<<<< HEAD\nx\n=======\ny\nz");
        assert_eq!(sides.local, vec!["x"]);
        assert_eq!(sides.remote, vec!["y", "z"]);
    }

    #[test]
    fn test_round_trip_resolve_all_then_reextract() {
        const CONFLICTED: &str =
            "<<<<<<< HEAD\n1\n=======\n2\n>>>>>>> x\nkeep\n<<<<<<< HEAD\n3\n=======\n4\n>>>>>>> x\n";
        let dir = tempfile::tempdir().unwrap();

        for (choice, expected) in [
            (ResolutionChoice::Local, "1\nkeep\n3\n"),
            (ResolutionChoice::Remote, "2\nkeep\n4\n"),
            (ResolutionChoice::Both, "1\n2\nkeep\n3\n4\n"),
        ] {
            let path = dir.path().join(format!("{choice}.txt"));
            std::fs::write(&path, CONFLICTED).unwrap();

            let mut model = ConflictResolutionModel::load(&path).unwrap();
            assert_eq!(model.conflict_count(), 2);
            assert_eq!(model.resolve_all(choice), 2);
            model.save(&path).unwrap();

            let reloaded = ConflictResolutionModel::load(&path).unwrap();
            assert_eq!(reloaded.conflict_count(), 0, "{choice}");
            assert!(reloaded.is_fully_resolved());
            assert_eq!(std::fs::read_to_string(&path).unwrap(), expected, "{choice}");
        }
    }

    #[test]
    fn test_partial_save_keeps_remaining_markers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.txt");
        let mut model = ConflictResolutionModel::parse(
            "<<<<<<< HEAD\na\n=======\nb\n>>>>>>> x\n<<<<<<< HEAD\nc\n=======\nd\n>>>>>>> x\n",
        );
        model.resolve(0, ResolutionChoice::Remote).unwrap();
        model.save(&path).unwrap();

        let reloaded = ConflictResolutionModel::load(&path).unwrap();
        assert_eq!(reloaded.conflict_count(), 1);
        assert_eq!(reloaded.segments()[0], ConflictSegment::PlainLine("b".into()));
    }
}
