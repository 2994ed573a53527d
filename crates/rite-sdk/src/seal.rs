use std::collections::BTreeMap;

use tracing::debug;

use rite_ledger::RiteLedger;
use rite_store::{jail, FilesystemBackend, StoreResult};
use rite_types::{EntryAction, Manifest, ManifestEntry, Operation};

/// Fold a committed rite into the previous `HEAD` manifest.
///
/// Paths the rite never touched are carried over as `unchanged`. Touched
/// paths are re-hashed from the real tree, which is what the rite actually
/// left behind after materialization.
pub fn federate(
    backend: &dyn FilesystemBackend,
    base: Option<&Manifest>,
    ledger: &RiteLedger,
) -> StoreResult<Manifest> {
    let mut manifest = base.map(Manifest::carried_over).unwrap_or_default();
    let mut touched: BTreeMap<String, EntryAction> = BTreeMap::new();

    for entry in &ledger.entries {
        match &entry.forward {
            Operation::WriteFile { path, .. } => {
                // Classified against the previous HEAD: a file deleted and
                // rewritten by the same rite is a modification.
                let action = if base.is_some_and(|b| b.contains(path)) {
                    EntryAction::Modified
                } else {
                    EntryAction::Created
                };
                touched.entry(path.clone()).or_insert(action);
            }
            Operation::DeleteFile { path } => {
                touched.remove(path);
                manifest.remove(path);
            }
            Operation::RmDir { path, .. } => {
                touched.retain(|p, _| !jail::is_within(p, path));
                manifest.remove_prefix(path);
            }
            Operation::Rename { from, to } => {
                touched.remove(from);
                manifest.remove(from);
                touched.insert(to.clone(), EntryAction::Moved);
            }
            Operation::MkDir { .. }
            | Operation::Chmod { .. }
            | Operation::SetVar { .. }
            | Operation::ExecShell { .. } => {}
        }
    }

    for (path, action) in touched {
        if backend.is_dir(&path) || !backend.exists(&path) {
            manifest.remove(&path);
            continue;
        }
        let data = backend.read(&path)?;
        manifest.insert(path, ManifestEntry::for_content(&data, action));
    }
    debug!(rite_id = %ledger.rite_id, files = manifest.len(), "manifest federated");
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use rite_ledger::LedgerEntry;
    use rite_store::MemoryBackend;
    use rite_types::{Payload, RiteId};

    use super::*;

    fn ledger(ops: Vec<Operation>) -> RiteLedger {
        let mut ledger = RiteLedger::new(RiteId::new(), "test");
        ledger.entries = ops.into_iter().map(|op| LedgerEntry::new("test", op)).collect();
        ledger
    }

    fn write(path: &str) -> Operation {
        Operation::WriteFile {
            path: path.into(),
            content: Payload::inline(Vec::new()),
        }
    }

    #[test]
    fn untouched_entries_carry_over_and_touched_ones_are_rehashed() {
        let fs = MemoryBackend::new();
        fs.write("keep.txt", b"k").unwrap();
        fs.write("edit.txt", b"v2").unwrap();
        fs.write("new.txt", b"n").unwrap();
        let mut base = Manifest::new();
        base.insert("keep.txt", ManifestEntry::for_content(b"k", EntryAction::Created));
        base.insert("edit.txt", ManifestEntry::for_content(b"v1", EntryAction::Created));

        let manifest = federate(&fs, Some(&base), &ledger(vec![write("edit.txt"), write("new.txt")])).unwrap();
        assert_eq!(manifest.get("keep.txt").unwrap().action, EntryAction::Unchanged);
        assert_eq!(
            manifest.get("edit.txt").unwrap(),
            &ManifestEntry::for_content(b"v2", EntryAction::Modified)
        );
        assert_eq!(manifest.get("new.txt").unwrap().action, EntryAction::Created);
    }

    #[test]
    fn deletes_moves_and_directory_removals() {
        let fs = MemoryBackend::new();
        fs.write("b.txt", b"moved").unwrap();
        let mut base = Manifest::new();
        for path in ["a.txt", "gone.txt", "pkg/x.txt", "pkg/y.txt", "pkgs.txt"] {
            base.insert(path, ManifestEntry::for_content(b"x", EntryAction::Created));
        }

        let manifest = federate(
            &fs,
            Some(&base),
            &ledger(vec![
                Operation::DeleteFile { path: "gone.txt".into() },
                Operation::RmDir {
                    path: "pkg".into(),
                    recursive: true,
                },
                Operation::Rename {
                    from: "a.txt".into(),
                    to: "b.txt".into(),
                },
            ]),
        )
        .unwrap();
        let paths: Vec<&str> = manifest.paths().map(String::as_str).collect();
        assert_eq!(paths, vec!["b.txt", "pkgs.txt"]);
        assert_eq!(manifest.get("b.txt").unwrap().action, EntryAction::Moved);
    }

    #[test]
    fn deleted_then_rewritten_is_a_modification() {
        let fs = MemoryBackend::new();
        fs.write("b.txt", b"again").unwrap();
        let mut base = Manifest::new();
        base.insert("b.txt", ManifestEntry::for_content(b"hello", EntryAction::Created));

        let manifest = federate(
            &fs,
            Some(&base),
            &ledger(vec![
                Operation::DeleteFile { path: "b.txt".into() },
                write("b.txt"),
            ]),
        )
        .unwrap();
        assert_eq!(
            manifest.get("b.txt").unwrap(),
            &ManifestEntry::for_content(b"again", EntryAction::Modified)
        );
    }

    #[test]
    fn written_then_deleted_leaves_no_trace() {
        let fs = MemoryBackend::new();
        let manifest = federate(
            &fs,
            None,
            &ledger(vec![
                write("tmp.txt"),
                Operation::DeleteFile { path: "tmp.txt".into() },
            ]),
        )
        .unwrap();
        assert!(manifest.is_empty());
    }
}
