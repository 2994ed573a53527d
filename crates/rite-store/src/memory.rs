use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::error::{JailError, StoreError, StoreResult};
use crate::jail;
use crate::traits::{FileMeta, FilesystemBackend};

const DEFAULT_FILE_MODE: u32 = 0o644;
const DEFAULT_DIR_MODE: u32 = 0o755;

#[derive(Clone, Debug)]
enum Node {
    File {
        data: Vec<u8>,
        mode: u32,
        mtime: DateTime<Utc>,
    },
    Dir {
        children: BTreeMap<String, Node>,
        mode: u32,
        mtime: DateTime<Utc>,
    },
}

impl Node {
    fn empty_dir() -> Self {
        Node::Dir {
            children: BTreeMap::new(),
            mode: DEFAULT_DIR_MODE,
            mtime: Utc::now(),
        }
    }

    fn get(&self, segments: &[&str]) -> Option<&Node> {
        let mut node = self;
        for segment in segments {
            match node {
                Node::Dir { children, .. } => node = children.get(*segment)?,
                Node::File { .. } => return None,
            }
        }
        Some(node)
    }

    fn get_mut(&mut self, segments: &[&str]) -> Option<&mut Node> {
        let mut node = self;
        for segment in segments {
            match node {
                Node::Dir { children, .. } => node = children.get_mut(*segment)?,
                Node::File { .. } => return None,
            }
        }
        Some(node)
    }

    /// The children map of the directory at `segments`, creating missing
    /// directories along the way.
    fn dir_mut(
        &mut self,
        segments: &[&str],
        path: &str,
    ) -> StoreResult<&mut BTreeMap<String, Node>> {
        let mut node = self;
        for segment in segments {
            node = match node {
                Node::Dir { children, .. } => children
                    .entry((*segment).to_string())
                    .or_insert_with(Node::empty_dir),
                Node::File { .. } => return Err(StoreError::NotADirectory(path.to_string())),
            };
        }
        match node {
            Node::Dir { children, .. } => Ok(children),
            Node::File { .. } => Err(StoreError::NotADirectory(path.to_string())),
        }
    }

    fn collect_files(&self, prefix: &str, out: &mut Vec<String>) {
        match self {
            Node::File { .. } => out.push(prefix.to_string()),
            Node::Dir { children, .. } => {
                for (name, child) in children {
                    child.collect_files(&jail::join(prefix, name), out);
                }
            }
        }
    }
}

fn split(path: &str) -> StoreResult<(String, Vec<String>)> {
    let normalized = jail::normalize(path)?;
    let segments = if normalized.is_empty() {
        Vec::new()
    } else {
        normalized.split('/').map(str::to_string).collect()
    };
    Ok((normalized, segments))
}

fn as_refs(segments: &[String]) -> Vec<&str> {
    segments.iter().map(String::as_str).collect()
}

/// In-memory, tree-structured filesystem.
///
/// Intended for tests and embedding. The whole tree sits behind a `RwLock`;
/// every mutation takes the write lock for its full duration, so writes are
/// trivially atomic.
pub struct MemoryBackend {
    label: PathBuf,
    tree: RwLock<Node>,
}

impl MemoryBackend {
    /// Create an empty filesystem.
    pub fn new() -> Self {
        Self {
            label: PathBuf::from("memory:/"),
            tree: RwLock::new(Node::empty_dir()),
        }
    }

    /// Number of files currently stored.
    pub fn file_count(&self) -> usize {
        let tree = self.tree.read().expect("lock poisoned");
        let mut files = Vec::new();
        tree.collect_files("", &mut files);
        files.len()
    }

    fn remove_node(&self, path: &str) -> StoreResult<Node> {
        let (normalized, segments) = split(path)?;
        let (name, parents) = segments
            .split_last()
            .ok_or(StoreError::Jail(JailError::EmptyPath))?;
        let mut tree = self.tree.write().expect("lock poisoned");
        match tree.get_mut(&as_refs(parents)) {
            Some(Node::Dir { children, .. }) => children
                .remove(name)
                .ok_or(StoreError::NotFound(normalized)),
            _ => Err(StoreError::NotFound(normalized)),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FilesystemBackend for MemoryBackend {
    fn root(&self) -> &Path {
        &self.label
    }

    fn exists(&self, path: &str) -> bool {
        let Ok((_, segments)) = split(path) else {
            return false;
        };
        let tree = self.tree.read().expect("lock poisoned");
        tree.get(&as_refs(&segments)).is_some()
    }

    fn is_dir(&self, path: &str) -> bool {
        let Ok((_, segments)) = split(path) else {
            return false;
        };
        let tree = self.tree.read().expect("lock poisoned");
        matches!(tree.get(&as_refs(&segments)), Some(Node::Dir { .. }))
    }

    fn read(&self, path: &str) -> StoreResult<Vec<u8>> {
        let (normalized, segments) = split(path)?;
        let tree = self.tree.read().expect("lock poisoned");
        match tree.get(&as_refs(&segments)) {
            Some(Node::File { data, .. }) => Ok(data.clone()),
            Some(Node::Dir { .. }) => Err(StoreError::IsADirectory(normalized)),
            None => Err(StoreError::NotFound(normalized)),
        }
    }

    fn metadata(&self, path: &str) -> StoreResult<Option<FileMeta>> {
        let (_, segments) = split(path)?;
        let tree = self.tree.read().expect("lock poisoned");
        Ok(tree.get(&as_refs(&segments)).map(|node| match node {
            Node::File { data, mode, mtime } => FileMeta {
                is_dir: false,
                len: data.len() as u64,
                mode: *mode,
                mtime: Some(*mtime),
            },
            Node::Dir { mode, mtime, .. } => FileMeta {
                is_dir: true,
                len: 0,
                mode: *mode,
                mtime: Some(*mtime),
            },
        }))
    }

    fn write(&self, path: &str, data: &[u8]) -> StoreResult<()> {
        let (normalized, segments) = split(path)?;
        let (name, parents) = segments
            .split_last()
            .ok_or(StoreError::Jail(JailError::EmptyPath))?;
        let mut tree = self.tree.write().expect("lock poisoned");
        let children = tree.dir_mut(&as_refs(parents), &normalized)?;
        let mode = match children.get(name) {
            Some(Node::Dir { .. }) => return Err(StoreError::IsADirectory(normalized)),
            Some(Node::File { mode, .. }) => *mode,
            None => DEFAULT_FILE_MODE,
        };
        children.insert(
            name.clone(),
            Node::File {
                data: data.to_vec(),
                mode,
                mtime: Utc::now(),
            },
        );
        Ok(())
    }

    fn mkdir(&self, path: &str) -> StoreResult<()> {
        let (normalized, segments) = split(path)?;
        let mut tree = self.tree.write().expect("lock poisoned");
        tree.dir_mut(&as_refs(&segments), &normalized)?;
        Ok(())
    }

    fn delete(&self, path: &str) -> StoreResult<()> {
        if self.is_dir(path) {
            return Err(StoreError::IsADirectory(path.to_string()));
        }
        self.remove_node(path).map(|_| ())
    }

    fn remove_dir(&self, path: &str, recursive: bool) -> StoreResult<()> {
        {
            let (normalized, segments) = split(path)?;
            let tree = self.tree.read().expect("lock poisoned");
            match tree.get(&as_refs(&segments)) {
                Some(Node::Dir { children, .. }) => {
                    if !recursive && !children.is_empty() {
                        return Err(StoreError::DirectoryNotEmpty(normalized));
                    }
                }
                Some(Node::File { .. }) => return Err(StoreError::NotADirectory(normalized)),
                None => return Err(StoreError::NotFound(normalized)),
            }
        }
        self.remove_node(path).map(|_| ())
    }

    fn rename(&self, from: &str, to: &str) -> StoreResult<()> {
        let (to_normalized, to_segments) = split(to)?;
        if self.exists(to) {
            return Err(StoreError::AlreadyExists(to_normalized));
        }
        let (name, parents) = to_segments
            .split_last()
            .ok_or(StoreError::Jail(JailError::EmptyPath))?;
        let (from_normalized, _) = split(from)?;
        if jail::is_within(&to_normalized, &from_normalized) {
            return Err(StoreError::Io {
                op: "rename",
                path: to_normalized,
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "cannot move a directory inside itself",
                ),
            });
        }

        let node = self.remove_node(from)?;
        let mut tree = self.tree.write().expect("lock poisoned");
        let children = tree.dir_mut(&as_refs(parents), &to_normalized)?;
        children.insert(name.clone(), node);
        Ok(())
    }

    fn replace_file(&self, from: &str, to: &str) -> StoreResult<()> {
        let (from_normalized, from_segments) = split(from)?;
        let (to_normalized, to_segments) = split(to)?;
        let (name, parents) = to_segments
            .split_last()
            .ok_or(StoreError::Jail(JailError::EmptyPath))?;
        let (source_name, source_parents) = from_segments
            .split_last()
            .ok_or(StoreError::Jail(JailError::EmptyPath))?;

        let mut tree = self.tree.write().expect("lock poisoned");
        match tree.get(&as_refs(&from_segments)) {
            Some(Node::File { .. }) => {}
            Some(Node::Dir { .. }) => return Err(StoreError::IsADirectory(from_normalized)),
            None => return Err(StoreError::NotFound(from_normalized)),
        }
        if let Some(Node::Dir { .. }) = tree.get(&as_refs(&to_segments)) {
            return Err(StoreError::IsADirectory(to_normalized));
        }
        let node = match tree.get_mut(&as_refs(source_parents)) {
            Some(Node::Dir { children, .. }) => children
                .remove(source_name)
                .ok_or_else(|| StoreError::NotFound(from_normalized.clone()))?,
            _ => return Err(StoreError::NotFound(from_normalized)),
        };
        let children = tree.dir_mut(&as_refs(parents), &to_normalized)?;
        children.insert(name.clone(), node);
        Ok(())
    }

    fn chmod(&self, path: &str, new_mode: u32) -> StoreResult<()> {
        let (normalized, segments) = split(path)?;
        let mut tree = self.tree.write().expect("lock poisoned");
        match tree.get_mut(&as_refs(&segments)) {
            Some(Node::File { mode, .. }) | Some(Node::Dir { mode, .. }) => {
                *mode = new_mode;
                Ok(())
            }
            None => Err(StoreError::NotFound(normalized)),
        }
    }

    fn list_dir(&self, path: &str) -> StoreResult<Vec<String>> {
        let (normalized, segments) = split(path)?;
        let tree = self.tree.read().expect("lock poisoned");
        match tree.get(&as_refs(&segments)) {
            Some(Node::Dir { children, .. }) => Ok(children.keys().cloned().collect()),
            Some(Node::File { .. }) => Err(StoreError::NotADirectory(normalized)),
            None => Err(StoreError::NotFound(normalized)),
        }
    }

    fn walk_files(&self, path: &str) -> StoreResult<Vec<String>> {
        let (normalized, segments) = split(path)?;
        let tree = self.tree.read().expect("lock poisoned");
        let mut files = Vec::new();
        if let Some(node) = tree.get(&as_refs(&segments)) {
            node.collect_files(&normalized, &mut files);
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_roundtrip_with_parents() {
        let fs = MemoryBackend::new();
        fs.write("a/b/c.txt", b"hello").unwrap();
        assert_eq!(fs.read("a/b/c.txt").unwrap(), b"hello");
        assert!(fs.is_dir("a/b"));
        assert_eq!(fs.file_count(), 1);
    }

    #[test]
    fn cannot_write_through_a_file() {
        let fs = MemoryBackend::new();
        fs.write("a", b"file").unwrap();
        assert!(matches!(
            fs.write("a/b.txt", b"x"),
            Err(StoreError::NotADirectory(_))
        ));
    }

    #[test]
    fn overwrite_keeps_mode() {
        let fs = MemoryBackend::new();
        fs.write("run.sh", b"1").unwrap();
        fs.chmod("run.sh", 0o755).unwrap();
        fs.write("run.sh", b"2").unwrap();
        assert_eq!(fs.metadata("run.sh").unwrap().unwrap().mode, 0o755);
    }

    #[test]
    fn rmdir_respects_recursive_flag() {
        let fs = MemoryBackend::new();
        fs.write("pkg/mod.txt", b"x").unwrap();
        assert!(matches!(
            fs.remove_dir("pkg", false),
            Err(StoreError::DirectoryNotEmpty(_))
        ));
        fs.remove_dir("pkg", true).unwrap();
        assert!(!fs.exists("pkg"));
    }

    #[test]
    fn rename_moves_whole_subtrees() {
        let fs = MemoryBackend::new();
        fs.write("src/a.txt", b"a").unwrap();
        fs.write("src/sub/b.txt", b"b").unwrap();
        fs.rename("src", "dst/moved").unwrap();
        assert_eq!(
            fs.walk_files("").unwrap(),
            vec!["dst/moved/a.txt", "dst/moved/sub/b.txt"]
        );
        assert!(fs.rename("dst", "dst/inner").is_err());
    }

    #[test]
    fn replace_file_overwrites_files_but_not_dirs() {
        let fs = MemoryBackend::new();
        fs.write("a.txt", b"old").unwrap();
        fs.write("tmp/a.txt", b"new").unwrap();
        fs.replace_file("tmp/a.txt", "a.txt").unwrap();
        assert_eq!(fs.read("a.txt").unwrap(), b"new");
        assert!(!fs.exists("tmp/a.txt"));

        fs.write("b.txt", b"b").unwrap();
        fs.mkdir("dir").unwrap();
        assert!(matches!(
            fs.replace_file("b.txt", "dir"),
            Err(StoreError::IsADirectory(_))
        ));
        assert!(matches!(
            fs.replace_file("missing", "c.txt"),
            Err(StoreError::NotFound(_))
        ));
        fs.replace_file("b.txt", "fresh/b.txt").unwrap();
        assert_eq!(fs.read("fresh/b.txt").unwrap(), b"b");
    }

    #[test]
    fn paths_are_jailed() {
        let fs = MemoryBackend::new();
        assert!(matches!(
            fs.write("../x", b""),
            Err(StoreError::Jail(JailError::PathTraversal { .. }))
        ));
        assert!(!fs.exists("/etc/passwd"));
    }

    #[test]
    fn remove_any_handles_files_and_dirs() {
        let fs = MemoryBackend::new();
        fs.write("f.txt", b"").unwrap();
        fs.write("d/x.txt", b"").unwrap();
        fs.remove_any("f.txt").unwrap();
        fs.remove_any("d").unwrap();
        assert!(fs.list_dir("").unwrap().is_empty());
    }
}
