use std::sync::Arc;

use tracing::{debug, warn};

use rite_ledger::{LedgerEntry, TrashStore};
use rite_store::FilesystemBackend;
use rite_types::{InverseAction, Operation, RiteId};

use crate::edict::EdictRunner;
use crate::error::{UndoError, UndoResult};

/// Applies a single inverse action against the real project.
///
/// Anything an inverse would destroy is moved into the reversed rite's trash
/// first, so an undo can itself be inspected and recovered by hand. Inverses
/// whose target has already gone are no-ops.
pub struct Reverser {
    backend: Arc<dyn FilesystemBackend>,
    trash: TrashStore,
    edicts: Arc<dyn EdictRunner>,
}

impl Reverser {
    pub fn new(
        backend: Arc<dyn FilesystemBackend>,
        trash: TrashStore,
        edicts: Arc<dyn EdictRunner>,
    ) -> Self {
        Self {
            backend,
            trash,
            edicts,
        }
    }

    /// Apply `inverse`, which belongs to `entry` of rite `rite_id`.
    pub fn reverse(
        &self,
        rite_id: &RiteId,
        entry: &LedgerEntry,
        inverse: &InverseAction,
    ) -> UndoResult<()> {
        debug!(rite_id = %rite_id, entry_id = %entry.id, inverse = %inverse.operation().describe(), "reversing");
        match inverse.operation() {
            Operation::WriteFile { path, content } => {
                let data = entry
                    .resolve_payload(content)
                    .ok_or_else(|| UndoError::MissingSnapshot {
                        entry_id: entry.id.to_string(),
                        path: path.clone(),
                    })?;
                if self.backend.exists(path) {
                    self.trash.move_to_trash(path, rite_id)?;
                }
                self.backend.write(path, data)?;
                if let Some(meta) = &entry.snapshot_metadata {
                    self.backend.chmod(path, meta.mode)?;
                }
            }
            Operation::DeleteFile { path } => {
                if !self.backend.exists(path) {
                    warn!(rite_id = %rite_id, path, "already gone; nothing to delete");
                    return Ok(());
                }
                self.trash.move_to_trash(path, rite_id)?;
            }
            Operation::RmDir { path, recursive } => {
                if !self.backend.is_dir(path) {
                    warn!(rite_id = %rite_id, path, "directory already gone");
                    return Ok(());
                }
                if !*recursive && !self.backend.list_dir(path)?.is_empty() {
                    return Err(rite_store::StoreError::DirectoryNotEmpty(path.clone()).into());
                }
                self.trash.move_to_trash(path, rite_id)?;
            }
            Operation::MkDir { path } => self.backend.mkdir(path)?,
            Operation::Chmod { path, mode } => {
                if !self.backend.exists(path) {
                    warn!(rite_id = %rite_id, path, "chmod target gone");
                    return Ok(());
                }
                self.backend.chmod(path, *mode)?;
            }
            Operation::Rename { from, to } => {
                if !self.backend.exists(from) {
                    warn!(rite_id = %rite_id, path = %from, "rename source gone");
                    return Ok(());
                }
                if self.backend.exists(to) {
                    self.trash.move_to_trash(to, rite_id)?;
                }
                self.backend.rename(from, to)?;
            }
            // Variables live in the chronicle and come back with the HEAD swap.
            Operation::SetVar { .. } => {}
            Operation::ExecShell { commands } => {
                for command in commands {
                    self.edicts.run(command)?;
                }
            }
        }
        Ok(())
    }
}
