use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::StoreResult;

/// Metadata of a file or directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileMeta {
    pub is_dir: bool,
    pub len: u64,
    /// Permission bits (`0o644`). Synthesized from the read-only flag where
    /// the platform has no Unix modes.
    pub mode: u32,
    pub mtime: Option<DateTime<Utc>>,
}

/// A filesystem rooted at a project directory.
///
/// Paths are root-relative, `/`-separated and validated by the backend
/// itself; `""` names the root. Implementations must satisfy:
/// - `write` is atomic: readers see the old bytes or the new bytes, never a mix.
/// - Parent directories are created on demand by `write` and `rename`.
/// - Nothing resolves outside the root, including through symlinks.
/// - All I/O errors are propagated, never silently ignored.
pub trait FilesystemBackend: Send + Sync {
    /// Human-readable root location (used in logs and reports).
    fn root(&self) -> &Path;

    /// The real on-disk root, when there is one.
    fn local_root(&self) -> Option<&Path> {
        None
    }

    fn exists(&self, path: &str) -> bool;

    fn is_dir(&self, path: &str) -> bool;

    /// Read a whole file.
    fn read(&self, path: &str) -> StoreResult<Vec<u8>>;

    /// Metadata, or `None` if nothing exists at `path`.
    fn metadata(&self, path: &str) -> StoreResult<Option<FileMeta>>;

    /// Atomically replace (or create) a file. An existing file keeps its mode.
    fn write(&self, path: &str, data: &[u8]) -> StoreResult<()>;

    /// Create a directory and any missing parents. Existing directories are fine.
    fn mkdir(&self, path: &str) -> StoreResult<()>;

    /// Delete a file, clearing a read-only flag first if needed.
    fn delete(&self, path: &str) -> StoreResult<()>;

    /// Remove a directory; `recursive` removes its contents too.
    fn remove_dir(&self, path: &str, recursive: bool) -> StoreResult<()>;

    /// Move a file or directory. The destination must not exist.
    fn rename(&self, from: &str, to: &str) -> StoreResult<()>;

    /// Move a file onto `to` in one step, replacing any file already there.
    /// Readers of `to` see the old file or the new one, never neither.
    fn replace_file(&self, from: &str, to: &str) -> StoreResult<()>;

    fn chmod(&self, path: &str, mode: u32) -> StoreResult<()>;

    /// Names of the direct children of a directory, sorted.
    fn list_dir(&self, path: &str) -> StoreResult<Vec<String>>;

    /// Root-relative paths of every file beneath `path`, sorted.
    fn walk_files(&self, path: &str) -> StoreResult<Vec<String>>;

    /// Remove a file or a whole directory tree, whichever is there.
    fn remove_any(&self, path: &str) -> StoreResult<()> {
        if self.is_dir(path) {
            self.remove_dir(path, true)
        } else {
            self.delete(path)
        }
    }
}
