//! Repository handle
//!
//! A [`RepositoryHandle`] is an opaque, validated reference to a working tree
//! that carries version-control metadata. This crate never creates or clones
//! repositories; handles are only ever built from existing directories.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Name of the metadata directory (or gitdir pointer file) in a working tree
const GIT_DIR_NAME: &str = ".git";

/// Name of the lock artifact libgit2 and git create while mutating the index
const INDEX_LOCK_NAME: &str = "index.lock";

/// Validated reference to a syncable working tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryHandle {
    root: PathBuf,
    git_dir: PathBuf,
}

impl RepositoryHandle {
    /// Builds a handle for the working tree at `root`
    ///
    /// Accepts both a `.git` directory and a `.git` file containing a
    /// `gitdir: <path>` pointer (linked worktrees, submodules).
    ///
    /// # Errors
    /// - `DomainError::InvalidPath` if `root` is not a directory
    /// - `DomainError::NotARepository` if no metadata is found
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, DomainError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(DomainError::InvalidPath(root.display().to_string()));
        }

        let marker = root.join(GIT_DIR_NAME);
        let git_dir = if marker.is_dir() {
            marker
        } else if marker.is_file() {
            resolve_gitdir_pointer(&root, &marker)
                .ok_or_else(|| DomainError::NotARepository(root.display().to_string()))?
        } else {
            return Err(DomainError::NotARepository(root.display().to_string()));
        };

        Ok(Self { root, git_dir })
    }

    /// Working tree root
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Metadata directory
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Location of the index lock artifact
    pub fn lock_file(&self) -> PathBuf {
        self.git_dir.join(INDEX_LOCK_NAME)
    }

    /// Whether another operation currently holds the index lock
    pub fn is_locked(&self) -> bool {
        self.lock_file().exists()
    }

    /// Converts `path` into a path relative to the working tree root
    ///
    /// Relative inputs are returned unchanged.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPath` if an absolute `path` lies outside
    /// the working tree.
    pub fn relativize(&self, path: &Path) -> Result<PathBuf, DomainError> {
        if path.is_relative() {
            return Ok(path.to_path_buf());
        }
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .map_err(|_| DomainError::InvalidPath(path.display().to_string()))
    }

    /// Returns true if `path` points inside the metadata directory
    pub fn is_metadata_path(&self, path: &Path) -> bool {
        path.starts_with(&self.git_dir)
            || path
                .components()
                .any(|c| c.as_os_str() == std::ffi::OsStr::new(GIT_DIR_NAME))
    }
}

impl std::fmt::Display for RepositoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.root.display())
    }
}

fn resolve_gitdir_pointer(root: &Path, marker: &Path) -> Option<PathBuf> {
    let content = std::fs::read_to_string(marker).ok()?;
    let target = content.lines().find_map(|l| l.strip_prefix("gitdir:"))?.trim();
    let target = PathBuf::from(target);
    let resolved = if target.is_absolute() {
        target
    } else {
        root.join(target)
    };
    resolved.is_dir().then_some(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_requires_git_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = RepositoryHandle::open(dir.path()).unwrap_err();
        assert!(matches!(err, DomainError::NotARepository(_)));

        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let handle = RepositoryHandle::open(dir.path()).unwrap();
        assert_eq!(handle.path(), dir.path());
        assert_eq!(handle.git_dir(), dir.path().join(".git"));
    }

    #[test]
    fn test_open_rejects_missing_directory() {
        let err = RepositoryHandle::open("/definitely/not/here").unwrap_err();
        assert!(matches!(err, DomainError::InvalidPath(_)));
    }

    #[test]
    fn test_open_follows_gitdir_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real-git");
        std::fs::create_dir(&real).unwrap();
        let tree = dir.path().join("tree");
        std::fs::create_dir(&tree).unwrap();
        std::fs::write(tree.join(".git"), "gitdir: ../real-git\n").unwrap();

        let handle = RepositoryHandle::open(&tree).unwrap();
        assert_eq!(handle.git_dir(), tree.join("../real-git"));
        assert_eq!(handle.lock_file(), tree.join("../real-git").join("index.lock"));
    }

    #[test]
    fn test_lock_detection() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let handle = RepositoryHandle::open(dir.path()).unwrap();

        assert!(!handle.is_locked());
        std::fs::write(handle.lock_file(), b"").unwrap();
        assert!(handle.is_locked());
    }

    #[test]
    fn test_relativize() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let handle = RepositoryHandle::open(dir.path()).unwrap();

        let inside = dir.path().join("notes/a.md");
        assert_eq!(handle.relativize(&inside).unwrap(), PathBuf::from("notes/a.md"));
        assert_eq!(
            handle.relativize(Path::new("b.md")).unwrap(),
            PathBuf::from("b.md")
        );
        assert!(handle.relativize(Path::new("/elsewhere/c.md")).is_err());
    }

    #[test]
    fn test_metadata_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let handle = RepositoryHandle::open(dir.path()).unwrap();

        assert!(handle.is_metadata_path(&dir.path().join(".git/index")));
        assert!(!handle.is_metadata_path(&dir.path().join("src/.gitignore")));
    }
}
