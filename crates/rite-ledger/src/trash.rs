use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use rite_store::{jail, FilesystemBackend, StoreError};
use rite_types::RiteId;

use crate::error::{LedgerError, LedgerResult};
use crate::layout::ControlLayout;
use crate::records::RiteLedger;

const EXTERNAL_BUCKET: &str = "external";

/// A soft-deleted body inside a rite's trash directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrashItem {
    /// Root-relative location of the body in the trash.
    pub trash_path: String,
    /// Where the body lived before it was trashed.
    pub original_path: String,
}

/// Rite-scoped soft-delete area.
///
/// Files a rite would overwrite or delete are relocated under
/// `<control>/trash/<rite_id>/` instead of being discarded. The same
/// directory holds the rite's persisted ledger.
#[derive(Clone)]
pub struct TrashStore {
    backend: Arc<dyn FilesystemBackend>,
    layout: ControlLayout,
}

impl TrashStore {
    pub fn new(backend: Arc<dyn FilesystemBackend>, layout: ControlLayout) -> Self {
        Self { backend, layout }
    }

    pub fn rite_dir(&self, rite_id: &RiteId) -> String {
        self.layout.trash_root(rite_id)
    }

    /// Where `original` lands in a rite's trash (before collision handling).
    ///
    /// Root-relative paths keep their shape. Absolute paths under the root are
    /// made relative; anything else is namespaced under `external/`.
    pub fn trash_location(&self, rite_id: &RiteId, original: &str) -> String {
        let unified = original.replace('\\', "/");
        let root = self.backend.root().to_string_lossy().replace('\\', "/");
        let relative = match unified.strip_prefix(root.trim_end_matches('/')) {
            Some(rest) if rest.starts_with('/') => rest.trim_start_matches('/').to_string(),
            _ if unified.starts_with('/') || unified.get(1..2) == Some(":") => {
                let flattened = unified.replace(':', "").trim_start_matches('/').to_string();
                jail::join(EXTERNAL_BUCKET, &flattened)
            }
            _ => unified.trim_start_matches("./").to_string(),
        };
        jail::join(&self.rite_dir(rite_id), &relative)
    }

    /// Relocate `path` into the rite's trash and return the trash path.
    ///
    /// The source must exist. A name already taken in the same rite's trash
    /// gets a `.<millis>.bak` suffix instead of being overwritten.
    pub fn move_to_trash(&self, path: &str, rite_id: &RiteId) -> LedgerResult<String> {
        if !self.backend.exists(path) {
            return Err(StoreError::NotFound(path.to_string()).into());
        }
        let destination = self.free_slot(rite_id, path);
        self.backend.rename(path, &destination)?;
        info!(rite_id = %rite_id, path, trash = %destination, "moved to trash");
        Ok(destination)
    }

    /// Copy a file's body (and mode) into the rite's trash, leaving the
    /// original where it is.
    pub fn copy_to_trash(&self, path: &str, rite_id: &RiteId) -> LedgerResult<String> {
        let data = self.backend.read(path)?;
        let mode = self.backend.metadata(path)?.map(|m| m.mode);
        let destination = self.free_slot(rite_id, path);
        self.backend.write(&destination, &data)?;
        if let Some(mode) = mode {
            self.backend.chmod(&destination, mode)?;
        }
        info!(rite_id = %rite_id, path, trash = %destination, "copied to trash");
        Ok(destination)
    }

    fn free_slot(&self, rite_id: &RiteId, path: &str) -> String {
        let base = self.trash_location(rite_id, path);
        let mut destination = base.clone();
        let mut stamp = Utc::now().timestamp_millis();
        while self.backend.exists(&destination) {
            destination = format!("{base}.{stamp}.bak");
            stamp += 1;
        }
        destination
    }

    /// Move a trashed body back to `original`, clearing whatever is there now.
    pub fn restore_from_trash(&self, trash_path: &str, original: &str) -> LedgerResult<()> {
        if !self.backend.exists(trash_path) {
            return Err(StoreError::NotFound(trash_path.to_string()).into());
        }
        if self.backend.exists(original) {
            self.backend.remove_any(original)?;
        }
        self.backend.rename(trash_path, original)?;
        info!(trash = trash_path, path = original, "restored from trash");
        Ok(())
    }

    /// Serialize a rite's ledger into its trash directory.
    pub fn persist_ledger(&self, ledger: &RiteLedger) -> LedgerResult<String> {
        let path = self.layout.ledger_file(&ledger.rite_id);
        let mut json = serde_json::to_vec_pretty(ledger)
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;
        json.push(b'\n');
        self.backend.write(&path, &json)?;
        debug!(rite_id = %ledger.rite_id, entries = ledger.len(), path = %path, "persisted ledger");
        Ok(path)
    }

    /// Load a rite's ledger. `None` when nothing was ever persisted for it.
    pub fn load_ledger(&self, rite_id: &RiteId) -> LedgerResult<Option<RiteLedger>> {
        let path = self.layout.ledger_file(rite_id);
        let data = match self.backend.read(&path) {
            Ok(data) => data,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| LedgerError::Corrupt {
                path,
                reason: e.to_string(),
            })
    }

    pub fn has_ledger(&self, rite_id: &RiteId) -> bool {
        self.backend.exists(&self.layout.ledger_file(rite_id))
    }

    /// Every soft-deleted body in a rite's trash, in path order.
    pub fn list(&self, rite_id: &RiteId) -> LedgerResult<Vec<TrashItem>> {
        let dir = self.rite_dir(rite_id);
        let ledger = self.layout.ledger_file(rite_id);
        let prefix = format!("{dir}/");
        Ok(self
            .backend
            .walk_files(&dir)?
            .into_iter()
            .filter(|path| *path != ledger)
            .map(|trash_path| {
                let relative = trash_path.strip_prefix(&prefix).unwrap_or(&trash_path);
                TrashItem {
                    original_path: strip_collision_suffix(relative).to_string(),
                    trash_path: trash_path.clone(),
                }
            })
            .collect())
    }
}

/// `a.txt.1700000000000.bak` -> `a.txt`.
fn strip_collision_suffix(path: &str) -> &str {
    let Some(stem) = path.strip_suffix(".bak") else {
        return path;
    };
    match stem.rsplit_once('.') {
        Some((original, stamp))
            if !stamp.is_empty() && stamp.bytes().all(|b| b.is_ascii_digit()) =>
        {
            original
        }
        _ => path,
    }
}

#[cfg(test)]
mod tests {
    use rite_store::MemoryBackend;

    use super::*;

    fn store() -> (Arc<MemoryBackend>, TrashStore) {
        let backend = Arc::new(MemoryBackend::new());
        let trash = TrashStore::new(backend.clone(), ControlLayout::default());
        (backend, trash)
    }

    #[test]
    fn trashed_file_keeps_its_content() {
        let (fs, trash) = store();
        let rite = RiteId::new();
        fs.write("b.txt", b"hello").unwrap();

        let moved = trash.move_to_trash("b.txt", &rite).unwrap();
        assert_eq!(moved, format!(".scaffold/trash/{rite}/b.txt"));
        assert_eq!(fs.read(&moved).unwrap(), b"hello");
        assert!(!fs.exists("b.txt"));
    }

    #[test]
    fn collisions_get_a_suffix() {
        let (fs, trash) = store();
        let rite = RiteId::new();
        fs.write("a.txt", b"first").unwrap();
        let first = trash.move_to_trash("a.txt", &rite).unwrap();
        fs.write("a.txt", b"second").unwrap();
        let second = trash.move_to_trash("a.txt", &rite).unwrap();

        assert_ne!(first, second);
        assert!(second.ends_with(".bak"));
        assert_eq!(fs.read(&first).unwrap(), b"first");
        assert_eq!(fs.read(&second).unwrap(), b"second");

        let items = trash.list(&rite).unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.original_path == "a.txt"));
    }

    #[test]
    fn missing_source_is_an_error() {
        let (_fs, trash) = store();
        assert!(trash.move_to_trash("ghost.txt", &RiteId::new()).is_err());
        assert!(trash.copy_to_trash("ghost.txt", &RiteId::new()).is_err());
    }

    #[test]
    fn copy_leaves_the_original_in_place() {
        let (fs, trash) = store();
        let rite = RiteId::new();
        fs.write("run.sh", b"#!/bin/sh").unwrap();
        fs.chmod("run.sh", 0o755).unwrap();

        let copied = trash.copy_to_trash("run.sh", &rite).unwrap();
        assert_eq!(fs.read("run.sh").unwrap(), b"#!/bin/sh");
        assert_eq!(fs.read(&copied).unwrap(), b"#!/bin/sh");
        assert_eq!(fs.metadata(&copied).unwrap().unwrap().mode, 0o755);
        assert_eq!(trash.list(&rite).unwrap()[0].original_path, "run.sh");
    }

    #[test]
    fn restore_replaces_current_occupant() {
        let (fs, trash) = store();
        let rite = RiteId::new();
        fs.write("b.txt", b"hello").unwrap();
        let moved = trash.move_to_trash("b.txt", &rite).unwrap();
        fs.write("b.txt/inner", b"a directory now").unwrap();

        trash.restore_from_trash(&moved, "b.txt").unwrap();
        assert_eq!(fs.read("b.txt").unwrap(), b"hello");
        assert!(trash.list(&rite).unwrap().is_empty());
    }

    #[test]
    fn ledger_persists_and_loads() {
        let (_fs, trash) = store();
        let ledger = RiteLedger::new(RiteId::new(), "init");
        trash.persist_ledger(&ledger).unwrap();
        assert!(trash.has_ledger(&ledger.rite_id));
        assert_eq!(trash.load_ledger(&ledger.rite_id).unwrap(), Some(ledger));
    }

    #[test]
    fn absent_ledger_is_none() {
        let (_fs, trash) = store();
        assert!(trash.load_ledger(&RiteId::new()).unwrap().is_none());
    }

    #[test]
    fn corrupt_ledger_is_reported() {
        let (fs, trash) = store();
        let rite = RiteId::new();
        fs.write(&ControlLayout::default().ledger_file(&rite), b"{not json")
            .unwrap();
        assert!(matches!(
            trash.load_ledger(&rite),
            Err(LedgerError::Corrupt { .. })
        ));
    }

    #[test]
    fn outside_paths_use_the_external_bucket() {
        let (_fs, trash) = store();
        let rite = RiteId::new();
        assert_eq!(
            trash.trash_location(&rite, "/etc/hosts"),
            format!(".scaffold/trash/{rite}/external/etc/hosts")
        );
        assert_eq!(
            trash.trash_location(&rite, "src/lib.rs"),
            format!(".scaffold/trash/{rite}/src/lib.rs")
        );
    }

    #[test]
    fn absolute_paths_under_the_root_stay_relative_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let fs = Arc::new(rite_store::LocalBackend::open(dir.path()).unwrap());
        let trash = TrashStore::new(fs.clone(), ControlLayout::default());
        let rite = RiteId::new();
        fs.write("src/main.rs", b"fn main() {}").unwrap();

        let absolute = fs.root().join("src/main.rs").to_string_lossy().into_owned();
        assert_eq!(
            trash.trash_location(&rite, &absolute),
            format!(".scaffold/trash/{rite}/src/main.rs")
        );

        let moved = trash.move_to_trash("src/main.rs", &rite).unwrap();
        assert!(dir.path().join(&moved).is_file());
        trash.restore_from_trash(&moved, "src/main.rs").unwrap();
        assert_eq!(
            std::fs::read(dir.path().join("src/main.rs")).unwrap(),
            b"fn main() {}"
        );
    }

    #[test]
    fn collision_suffix_parsing() {
        assert_eq!(strip_collision_suffix("a.txt.1700000000000.bak"), "a.txt");
        assert_eq!(strip_collision_suffix("notes.bak"), "notes.bak");
        assert_eq!(strip_collision_suffix("x.v2.bak"), "x.v2.bak");
    }
}
