use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{JailError, StoreError, StoreResult};
use crate::jail;
use crate::retry::RetryPolicy;
use crate::traits::{FileMeta, FilesystemBackend};

/// On-disk backend rooted at a project directory.
///
/// Writes go to a uniquely named temporary sibling (`.<name>.XXXXXX.tmp`),
/// are synced, then renamed over the destination. Every call re-resolves its
/// path and checks that the canonical location is still inside the root.
pub struct LocalBackend {
    root: PathBuf,
    retry: RetryPolicy,
}

impl LocalBackend {
    /// Open a backend on an existing directory.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref();
        let canonical = root.canonicalize().map_err(|e| StoreError::Io {
            op: "open",
            path: root.display().to_string(),
            source: e,
        })?;
        if !canonical.is_dir() {
            return Err(StoreError::NotADirectory(root.display().to_string()));
        }
        Ok(Self {
            root: canonical,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Absolute location of a root-relative path, after the containment check.
    pub fn resolve(&self, path: &str) -> StoreResult<PathBuf> {
        let normalized = jail::normalize(path)?;
        let full = if normalized.is_empty() {
            self.root.clone()
        } else {
            self.root.join(&normalized)
        };
        self.ensure_contained(&full, &normalized)?;
        Ok(full)
    }

    /// Canonicalize the deepest existing ancestor of `full` and require it to
    /// sit under the root. Catches symlinked directories pointing elsewhere.
    fn ensure_contained(&self, full: &Path, rel: &str) -> StoreResult<()> {
        let mut probe = Some(full);
        while let Some(candidate) = probe {
            if let Ok(real) = candidate.canonicalize() {
                if real.starts_with(&self.root) {
                    return Ok(());
                }
                return Err(JailError::OutsideRoot {
                    path: rel.to_string(),
                }
                .into());
            }
            probe = candidate.parent();
        }
        Err(JailError::OutsideRoot {
            path: rel.to_string(),
        }
        .into())
    }

    fn relative(&self, full: &Path) -> String {
        full.strip_prefix(&self.root)
            .unwrap_or(full)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl FilesystemBackend for LocalBackend {
    fn root(&self) -> &Path {
        &self.root
    }

    fn local_root(&self) -> Option<&Path> {
        Some(&self.root)
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path)
            .map(|full| fs::symlink_metadata(full).is_ok())
            .unwrap_or(false)
    }

    fn is_dir(&self, path: &str) -> bool {
        self.resolve(path).map(|full| full.is_dir()).unwrap_or(false)
    }

    fn read(&self, path: &str) -> StoreResult<Vec<u8>> {
        let full = self.resolve(path)?;
        if full.is_dir() {
            return Err(StoreError::IsADirectory(path.to_string()));
        }
        self.retry.run("read", path, || fs::read(&full))
    }

    fn metadata(&self, path: &str) -> StoreResult<Option<FileMeta>> {
        let full = self.resolve(path)?;
        let meta = match fs::metadata(&full) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Io {
                    op: "stat",
                    path: path.to_string(),
                    source: e,
                })
            }
        };
        Ok(Some(FileMeta {
            is_dir: meta.is_dir(),
            len: meta.len(),
            mode: mode_of(&meta),
            mtime: meta.modified().ok().map(DateTime::<Utc>::from),
        }))
    }

    fn write(&self, path: &str, data: &[u8]) -> StoreResult<()> {
        let target = self.resolve(path)?;
        if target.is_dir() {
            return Err(StoreError::IsADirectory(path.to_string()));
        }
        let parent = target
            .parent()
            .ok_or_else(|| StoreError::NotADirectory(path.to_string()))?
            .to_path_buf();
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.retry
            .run("mkdir", path, || fs::create_dir_all(&parent))?;
        let existing = fs::metadata(&target).ok().map(|m| m.permissions());

        self.retry.run("write", path, || {
            let mut tmp = tempfile::Builder::new()
                .prefix(&format!(".{name}."))
                .suffix(".tmp")
                .tempfile_in(&parent)?;
            tmp.write_all(data)?;
            tmp.as_file().sync_all()?;
            match &existing {
                Some(perms) => fs::set_permissions(tmp.path(), perms.clone())?,
                None => set_default_mode(tmp.path())?,
            }
            tmp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })?;
        sync_dir(&parent);

        debug!(path, bytes = data.len(), "atomic write");
        Ok(())
    }

    fn mkdir(&self, path: &str) -> StoreResult<()> {
        let full = self.resolve(path)?;
        if full.exists() && !full.is_dir() {
            return Err(StoreError::NotADirectory(path.to_string()));
        }
        self.retry.run("mkdir", path, || fs::create_dir_all(&full))
    }

    fn delete(&self, path: &str) -> StoreResult<()> {
        let full = self.resolve(path)?;
        match fs::symlink_metadata(&full) {
            Ok(meta) if meta.is_dir() => return Err(StoreError::IsADirectory(path.to_string())),
            Ok(_) => {}
            Err(_) => return Err(StoreError::NotFound(path.to_string())),
        }
        self.retry.run("delete", path, || match fs::remove_file(&full) {
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                clear_readonly(&full)?;
                fs::remove_file(&full)
            }
            other => other,
        })?;
        debug!(path, "deleted file");
        Ok(())
    }

    fn remove_dir(&self, path: &str, recursive: bool) -> StoreResult<()> {
        let full = self.resolve(path)?;
        if full == self.root {
            return Err(JailError::EmptyPath.into());
        }
        match fs::symlink_metadata(&full) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(StoreError::NotADirectory(path.to_string())),
            Err(_) => return Err(StoreError::NotFound(path.to_string())),
        }

        if recursive {
            for entry in walkdir::WalkDir::new(&full).follow_links(false) {
                let entry = entry.map_err(|e| StoreError::Io {
                    op: "walk",
                    path: path.to_string(),
                    source: e.into(),
                })?;
                clear_readonly(entry.path()).map_err(|e| StoreError::Io {
                    op: "chmod",
                    path: self.relative(entry.path()),
                    source: e,
                })?;
            }
            self.retry
                .run("rmdir", path, || fs::remove_dir_all(&full))?;
        } else {
            let mut children = fs::read_dir(&full).map_err(|e| StoreError::Io {
                op: "list",
                path: path.to_string(),
                source: e,
            })?;
            if children.next().is_some() {
                return Err(StoreError::DirectoryNotEmpty(path.to_string()));
            }
            self.retry.run("rmdir", path, || fs::remove_dir(&full))?;
        }
        debug!(path, recursive, "removed directory");
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> StoreResult<()> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        if fs::symlink_metadata(&source).is_err() {
            return Err(StoreError::NotFound(from.to_string()));
        }
        if fs::symlink_metadata(&target).is_ok() {
            return Err(StoreError::AlreadyExists(to.to_string()));
        }
        if let Some(parent) = target.parent() {
            self.retry.run("mkdir", to, || fs::create_dir_all(parent))?;
        }
        self.retry
            .run("rename", from, || fs::rename(&source, &target))?;
        if let Some(parent) = target.parent() {
            sync_dir(parent);
        }
        debug!(from, to, "renamed");
        Ok(())
    }

    fn replace_file(&self, from: &str, to: &str) -> StoreResult<()> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        match fs::symlink_metadata(&source) {
            Ok(meta) if meta.is_dir() => return Err(StoreError::IsADirectory(from.to_string())),
            Ok(_) => {}
            Err(_) => return Err(StoreError::NotFound(from.to_string())),
        }
        if fs::symlink_metadata(&target).map(|m| m.is_dir()).unwrap_or(false) {
            return Err(StoreError::IsADirectory(to.to_string()));
        }
        if let Some(parent) = target.parent() {
            self.retry.run("mkdir", to, || fs::create_dir_all(parent))?;
        }
        self.retry
            .run("replace", to, || fs::rename(&source, &target))?;
        if let Some(parent) = target.parent() {
            sync_dir(parent);
        }
        debug!(from, to, "replaced");
        Ok(())
    }

    fn chmod(&self, path: &str, mode: u32) -> StoreResult<()> {
        let full = self.resolve(path)?;
        if fs::symlink_metadata(&full).is_err() {
            return Err(StoreError::NotFound(path.to_string()));
        }
        self.retry.run("chmod", path, || apply_mode(&full, mode))
    }

    fn list_dir(&self, path: &str) -> StoreResult<Vec<String>> {
        let full = self.resolve(path)?;
        if !full.is_dir() {
            return Err(if full.exists() {
                StoreError::NotADirectory(path.to_string())
            } else {
                StoreError::NotFound(path.to_string())
            });
        }
        let entries = self.retry.run("list", path, || {
            fs::read_dir(&full)?
                .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
                .collect::<io::Result<Vec<_>>>()
        })?;
        let mut names = entries;
        names.sort();
        Ok(names)
    }

    fn walk_files(&self, path: &str) -> StoreResult<Vec<String>> {
        let full = self.resolve(path)?;
        if !full.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(&full)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| StoreError::Io {
                op: "walk",
                path: path.to_string(),
                source: e.into(),
            })?;
            if !entry.file_type().is_dir() {
                files.push(self.relative(entry.path()));
            }
        }
        files.sort();
        Ok(files)
    }
}

#[cfg(unix)]
fn mode_of(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(meta: &fs::Metadata) -> u32 {
    match (meta.is_dir(), meta.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    }
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn apply_mode(path: &Path, mode: u32) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o222 == 0);
    fs::set_permissions(path, perms)
}

#[cfg(unix)]
fn set_default_mode(path: &Path) -> io::Result<()> {
    apply_mode(path, 0o644)
}

#[cfg(not(unix))]
fn set_default_mode(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Make a path writable by its owner. No-op if it already is.
fn clear_readonly(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.file_type().is_symlink() {
        return Ok(());
    }
    let mut perms = meta.permissions();
    if perms.readonly() {
        perms.set_readonly(false);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

/// Flush a directory entry update to disk. Best-effort: not every platform
/// lets a directory be opened for syncing.
#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(handle) = fs::File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> (tempfile::TempDir, LocalBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::open(dir.path())
            .unwrap()
            .with_retry(RetryPolicy::immediate());
        (dir, backend)
    }

    #[test]
    fn write_creates_parents_and_reads_back() {
        let (_dir, fs) = backend();
        fs.write("src/lib/mod.rs", b"pub fn x() {}").unwrap();
        assert_eq!(fs.read("src/lib/mod.rs").unwrap(), b"pub fn x() {}");
        assert!(fs.is_dir("src/lib"));
    }

    #[test]
    fn overwrite_leaves_no_temporaries() {
        let (dir, fs) = backend();
        fs.write("a.txt", b"v1").unwrap();
        fs.write("a.txt", b"v2").unwrap();
        assert_eq!(fs.read("a.txt").unwrap(), b"v2");
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn overwrite_keeps_existing_mode() {
        let (_dir, fs) = backend();
        fs.write("run.sh", b"#!/bin/sh").unwrap();
        assert_eq!(fs.metadata("run.sh").unwrap().unwrap().mode, 0o644);
        fs.chmod("run.sh", 0o755).unwrap();
        fs.write("run.sh", b"#!/bin/sh\necho hi").unwrap();
        assert_eq!(fs.metadata("run.sh").unwrap().unwrap().mode, 0o755);
    }

    #[test]
    fn traversal_never_reaches_disk() {
        let (_dir, fs) = backend();
        let err = fs.write("../escape.txt", b"x").unwrap_err();
        assert!(matches!(err, StoreError::Jail(JailError::PathTraversal { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directory_escape_is_refused() {
        let (dir, fs) = backend();
        let outside = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        let err = fs.write("link/pwned.txt", b"x").unwrap_err();
        assert!(matches!(err, StoreError::Jail(JailError::OutsideRoot { .. })));
        assert!(!outside.path().join("pwned.txt").exists());
    }

    #[test]
    fn delete_clears_readonly_flag() {
        let (dir, fs) = backend();
        fs.write("locked.txt", b"x").unwrap();
        let path = dir.path().join("locked.txt");
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(&path, perms).unwrap();

        fs.delete("locked.txt").unwrap();
        assert!(!fs.exists("locked.txt"));
    }

    #[test]
    fn delete_missing_is_not_found() {
        let (_dir, fs) = backend();
        assert!(fs.delete("ghost.txt").unwrap_err().is_not_found());
    }

    #[test]
    fn non_recursive_rmdir_refuses_contents() {
        let (_dir, fs) = backend();
        fs.write("pkg/mod.txt", b"x").unwrap();
        assert!(matches!(
            fs.remove_dir("pkg", false),
            Err(StoreError::DirectoryNotEmpty(_))
        ));
        fs.remove_dir("pkg", true).unwrap();
        assert!(!fs.exists("pkg"));
    }

    #[test]
    fn rename_refuses_to_clobber() {
        let (_dir, fs) = backend();
        fs.write("a.txt", b"a").unwrap();
        fs.write("b.txt", b"b").unwrap();
        assert!(matches!(
            fs.rename("a.txt", "b.txt"),
            Err(StoreError::AlreadyExists(_))
        ));
        fs.rename("a.txt", "moved/a.txt").unwrap();
        assert_eq!(fs.read("moved/a.txt").unwrap(), b"a");
        assert!(!fs.exists("a.txt"));
    }

    #[test]
    fn replace_file_swaps_in_place() {
        let (_dir, fs) = backend();
        fs.write("a.txt", b"old").unwrap();
        fs.write("staged/a.txt", b"new").unwrap();
        fs.replace_file("staged/a.txt", "a.txt").unwrap();
        assert_eq!(fs.read("a.txt").unwrap(), b"new");
        assert!(!fs.exists("staged/a.txt"));

        fs.mkdir("d").unwrap();
        fs.write("b.txt", b"b").unwrap();
        assert!(matches!(
            fs.replace_file("b.txt", "d"),
            Err(StoreError::IsADirectory(_))
        ));
    }

    #[test]
    fn walk_and_list_are_sorted_and_relative() {
        let (_dir, fs) = backend();
        fs.write("b/2.txt", b"").unwrap();
        fs.write("a.txt", b"").unwrap();
        fs.write("b/1.txt", b"").unwrap();
        fs.mkdir("empty").unwrap();
        assert_eq!(fs.walk_files("").unwrap(), vec!["a.txt", "b/1.txt", "b/2.txt"]);
        assert_eq!(fs.walk_files("b").unwrap(), vec!["b/1.txt", "b/2.txt"]);
        assert_eq!(fs.list_dir("").unwrap(), vec!["a.txt", "b", "empty"]);
        assert!(fs.walk_files("missing").unwrap().is_empty());
    }

    #[test]
    fn metadata_of_missing_path_is_none() {
        let (_dir, fs) = backend();
        assert!(fs.metadata("nope").unwrap().is_none());
        fs.mkdir("d").unwrap();
        assert!(fs.metadata("d").unwrap().unwrap().is_dir);
    }
}
