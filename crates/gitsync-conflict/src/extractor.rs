//! Conflict marker extraction
//!
//! Single pass over a file's lines that groups them into
//! [`ConflictSegment`]s. A line starting (after trimming) with `<<<<<<<`
//! opens a block; every following line is buffered until one starting with
//! `>>>>>>>` closes it. The separator is not interpreted here: a block is
//! one opaque unit, split into sides later by the resolution model.
//!
//! Unbalanced input is tolerated. A start marker with no end marker yields
//! a single block running to end of file.

use std::path::Path;

use gitsync_core::domain::conflict::{ConflictSegment, END_MARKER, START_MARKER};
use tracing::debug;

use crate::error::ConflictError;

/// Turns conflicted file content into an ordered segment sequence
pub struct ConflictExtractor;

impl ConflictExtractor {
    /// Groups `lines` into plain lines and whole conflict blocks
    pub fn extract<I, S>(lines: I) -> Vec<ConflictSegment>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut segments = Vec::new();
        let mut block: Option<Vec<String>> = None;

        for line in lines {
            let line = line.as_ref();
            match block.as_mut() {
                Some(buffer) => {
                    buffer.push(line.to_string());
                    if is_end_marker(line) {
                        segments.push(ConflictSegment::ConflictBlock(buffer.join("\n")));
                        block = None;
                    }
                }
                None if is_start_marker(line) => {
                    block = Some(vec![line.to_string()]);
                }
                None => segments.push(ConflictSegment::PlainLine(line.to_string())),
            }
        }

        if let Some(buffer) = block {
            debug!(lines = buffer.len(), "Unterminated conflict block runs to end of file");
            segments.push(ConflictSegment::ConflictBlock(buffer.join("\n")));
        }

        segments
    }

    /// Extracts segments from in-memory file content
    ///
    /// Both `\n` and `\r\n` line endings are accepted; a trailing newline
    /// does not produce an empty final line.
    pub fn extract_str(content: &str) -> Vec<ConflictSegment> {
        Self::extract(content.lines())
    }

    /// Reads `path` from disk and extracts its segments
    pub fn extract_file(path: &Path) -> Result<Vec<ConflictSegment>, ConflictError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConflictError::io(path, e))?;
        Ok(Self::extract_str(&content))
    }

    /// Whether `content` contains at least one start marker line
    pub fn has_markers(content: &str) -> bool {
        content.lines().any(is_start_marker)
    }
}

fn is_start_marker(line: &str) -> bool {
    line.trim().starts_with(START_MARKER)
}

fn is_end_marker(line: &str) -> bool {
    line.trim().starts_with(END_MARKER)
}
