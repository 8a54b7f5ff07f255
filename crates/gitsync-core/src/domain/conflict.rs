//! Conflict domain entities
//!
//! This module defines the segment representation of a file left with
//! conflict markers by a merge, and the choices a user can apply to
//! each conflicted region.

use serde::{Deserialize, Serialize};

/// Line prefix opening a conflicted region
pub const START_MARKER: &str = "<<<<<<<";

/// Line prefix of the optional base section (diff3 style)
pub const BASE_MARKER: &str = "|||||||";

/// Line prefix separating the local side from the remote side
pub const SEPARATOR_MARKER: &str = "=======";

/// Line prefix closing a conflicted region
pub const END_MARKER: &str = ">>>>>>>";

/// One element of a file under conflict
///
/// A file is an ordered sequence of segments. Joining every segment's
/// text with newlines reproduces the original content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum ConflictSegment {
    /// An ordinary line outside any conflicted region
    PlainLine(String),
    /// A whole conflicted region, start marker through end marker, with
    /// internal newlines preserved
    ConflictBlock(String),
}

impl ConflictSegment {
    /// Raw text of the segment
    pub fn text(&self) -> &str {
        match self {
            ConflictSegment::PlainLine(text) | ConflictSegment::ConflictBlock(text) => text,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ConflictSegment::ConflictBlock(_))
    }
}

/// How a single conflict block should be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionChoice {
    /// Keep the lines from the local side
    Local,
    /// Keep the lines from the incoming side
    Remote,
    /// Keep local lines followed by remote lines
    Both,
}

impl std::fmt::Display for ResolutionChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResolutionChoice::Local => "local",
            ResolutionChoice::Remote => "remote",
            ResolutionChoice::Both => "both",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ResolutionChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "ours" | "keep_local" => Ok(ResolutionChoice::Local),
            "remote" | "theirs" | "keep_remote" => Ok(ResolutionChoice::Remote),
            "both" | "keep_both" => Ok(ResolutionChoice::Both),
            other => Err(format!(
                "unknown resolution '{}'; valid options: local, remote, both",
                other
            )),
        }
    }
}
