use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use rite_store::{jail, FilesystemBackend};

use crate::error::UndoResult;

/// Post-undo cleanup of generated leftovers.
///
/// Removes stale atomic-write temporaries (`.<name>.<random>.tmp`) beside the
/// paths a reversed rite touched, and directories the reversed rites created
/// once they are empty. A directory some other rite still relies on is left
/// alone. Protected paths and everything beneath them are never touched.
pub struct Purifier {
    backend: Arc<dyn FilesystemBackend>,
    protected: Vec<String>,
}

impl Purifier {
    pub fn new(backend: Arc<dyn FilesystemBackend>, mut protected: Vec<String>) -> Self {
        protected.retain(|p| !p.is_empty());
        Self { backend, protected }
    }

    pub fn is_protected(&self, path: &str) -> bool {
        self.protected.iter().any(|p| jail::is_within(path, p))
    }

    /// Sweep temporaries around `touched`, then drop whichever of `created`
    /// ended up empty. Returns how many paths were removed.
    pub fn purify(
        &self,
        touched: &BTreeSet<String>,
        created: &BTreeSet<String>,
    ) -> UndoResult<usize> {
        let mut dirs = BTreeSet::new();
        for path in touched {
            dirs.insert(path.as_str());
            dirs.insert(jail::parent(path));
        }

        let mut purged = 0;
        for dir in &dirs {
            if self.is_protected(dir) || !self.backend.is_dir(dir) {
                continue;
            }
            for name in self.backend.list_dir(dir)? {
                let path = jail::join(dir, &name);
                if is_temporary(&name) && !self.backend.is_dir(&path) && !self.is_protected(&path) {
                    self.backend.delete(&path)?;
                    debug!(path = %path, "removed stale temporary");
                    purged += 1;
                }
            }
        }

        // Deepest first so parents empty out after their children.
        for dir in created.iter().rev() {
            if dir.is_empty() || self.is_protected(dir) || !self.backend.is_dir(dir) {
                continue;
            }
            if self.backend.list_dir(dir)?.is_empty() {
                self.backend.remove_dir(dir, false)?;
                debug!(path = %dir, "removed empty directory");
                purged += 1;
            }
        }

        if purged > 0 {
            info!(purged, "orphans purged");
        }
        Ok(purged)
    }
}

fn is_temporary(name: &str) -> bool {
    name.len() > ".x.tmp".len() && name.starts_with('.') && name.ends_with(".tmp")
}

#[cfg(test)]
mod tests {
    use rite_store::MemoryBackend;

    use super::*;

    fn set(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn empty_ancestors_are_removed_deepest_first() {
        let fs = Arc::new(MemoryBackend::new());
        fs.mkdir("a/b/c").unwrap();
        fs.write("keep/file.txt", b"x").unwrap();
        let purifier = Purifier::new(fs.clone(), vec![]);

        let purged = purifier
            .purify(
                &set(&["a/b/c/gone.txt", "keep/gone.txt"]),
                &set(&["a", "a/b", "a/b/c", "keep"]),
            )
            .unwrap();
        assert_eq!(purged, 3);
        assert!(!fs.exists("a"));
        assert!(fs.exists("keep/file.txt"));
    }

    #[test]
    fn empty_dirs_not_created_by_the_undone_rites_survive() {
        let fs = Arc::new(MemoryBackend::new());
        fs.mkdir("docs").unwrap();
        fs.mkdir("gen").unwrap();
        let purifier = Purifier::new(fs.clone(), vec![]);

        let purged = purifier
            .purify(&set(&["docs/a.txt", "gen/b.txt"]), &set(&["gen"]))
            .unwrap();
        assert_eq!(purged, 1);
        assert!(fs.is_dir("docs"));
        assert!(!fs.exists("gen"));
    }

    #[test]
    fn stale_temporaries_are_swept() {
        let fs = Arc::new(MemoryBackend::new());
        fs.write("src/.lib.rs.a1B2c3.tmp", b"partial").unwrap();
        fs.write("src/lib.rs", b"ok").unwrap();
        fs.write("src/notes.tmp", b"user file").unwrap();
        let purifier = Purifier::new(fs.clone(), vec![]);

        assert_eq!(
            purifier.purify(&set(&["src/lib.rs"]), &set(&["src"])).unwrap(),
            1
        );
        assert!(fs.exists("src/lib.rs"));
        assert!(fs.exists("src/notes.tmp"));
        assert!(!fs.exists("src/.lib.rs.a1B2c3.tmp"));
    }

    #[test]
    fn protected_paths_survive() {
        let fs = Arc::new(MemoryBackend::new());
        fs.mkdir(".git/refs").unwrap();
        fs.mkdir(".scaffold/trash").unwrap();
        let purifier = Purifier::new(fs.clone(), vec![".git".into(), ".scaffold".into()]);

        let purged = purifier
            .purify(
                &set(&[".git/refs/x", ".scaffold/trash/y"]),
                &set(&[".git/refs", ".scaffold/trash"]),
            )
            .unwrap();
        assert_eq!(purged, 0);
        assert!(fs.is_dir(".git/refs"));
        assert!(fs.is_dir(".scaffold/trash"));
    }
}
