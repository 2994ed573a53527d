use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, info, warn};

use rite_ledger::{ControlLayout, TrashStore};
use rite_store::{jail, FileMeta, FilesystemBackend};
use rite_types::RiteId;

use crate::error::{TxError, TxResult};
use crate::tree::{Lookup, NodeState, StagingTree};

/// What a successful commit did to the real filesystem.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    /// Staged files moved into place.
    pub moved: Vec<String>,
    /// Directories created.
    pub created_dirs: Vec<String>,
    /// Real paths relocated to the rite's trash first.
    pub trashed: Vec<String>,
}

/// Ephemeral overlay filesystem for one rite.
///
/// In normal mode every write lands under `<control>/staging/<tx_id>/` and
/// the real tree is untouched until [`materialize`](Self::materialize). In
/// simulate mode nothing is staged and paths resolve straight to the root.
pub struct StagingTransaction {
    tx_id: String,
    staging_root: String,
    simulate: bool,
    backend: Arc<dyn FilesystemBackend>,
    tree: StagingTree,
    path_cache: HashMap<String, String>,
    closed: bool,
}

impl StagingTransaction {
    pub fn open(backend: Arc<dyn FilesystemBackend>, layout: &ControlLayout, simulate: bool) -> Self {
        let tx_id = uuid::Uuid::now_v7().simple().to_string();
        let staging_root = layout.staging_root(&tx_id);
        debug!(tx_id = %tx_id, simulate, "staging transaction opened");
        Self {
            tx_id,
            staging_root,
            simulate,
            backend,
            tree: StagingTree::new(),
            path_cache: HashMap::new(),
            closed: false,
        }
    }

    pub fn tx_id(&self) -> &str {
        &self.tx_id
    }

    pub fn staging_root(&self) -> &str {
        &self.staging_root
    }

    pub fn is_simulate(&self) -> bool {
        self.simulate
    }

    pub fn backend(&self) -> &Arc<dyn FilesystemBackend> {
        &self.backend
    }

    pub fn tree(&self) -> &StagingTree {
        &self.tree
    }

    /// Physical location for a logical path, cached for the life of the
    /// transaction.
    pub fn resolve(&mut self, logical: &str) -> String {
        if let Some(physical) = self.path_cache.get(logical) {
            return physical.clone();
        }
        let physical = self.physical(logical);
        self.path_cache
            .insert(logical.to_string(), physical.clone());
        physical
    }

    fn physical(&self, logical: &str) -> String {
        if self.simulate {
            logical.to_string()
        } else {
            jail::join(&self.staging_root, logical)
        }
    }

    pub fn lookup(&self, path: &str) -> Lookup {
        if self.simulate {
            Lookup::Real
        } else {
            self.tree.lookup(path)
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        match self.lookup(path) {
            Lookup::StagedFile | Lookup::StagedDir => true,
            Lookup::Absent => false,
            Lookup::Real => self.backend.exists(path),
        }
    }

    pub fn is_dir(&self, path: &str) -> bool {
        match self.lookup(path) {
            Lookup::StagedDir => true,
            Lookup::StagedFile | Lookup::Absent => false,
            Lookup::Real => self.backend.is_dir(path),
        }
    }

    pub fn is_file(&self, path: &str) -> bool {
        self.exists(path) && !self.is_dir(path)
    }

    /// Current bytes of a file as the rite sees it.
    pub fn read(&self, path: &str) -> TxResult<Option<Vec<u8>>> {
        let source = match self.lookup(path) {
            Lookup::StagedFile => self.physical(path),
            Lookup::Real if self.backend.exists(path) && !self.backend.is_dir(path) => {
                path.to_string()
            }
            _ => return Ok(None),
        };
        Ok(Some(self.backend.read(&source)?))
    }

    /// Metadata as the rite sees it, including modes staged by `chmod`.
    pub fn metadata(&self, path: &str) -> TxResult<Option<FileMeta>> {
        let staged_mode = self.tree.node(path).and_then(|n| n.mode);
        let meta = match self.lookup(path) {
            Lookup::StagedFile => self.backend.metadata(&self.physical(path))?,
            Lookup::StagedDir => Some(FileMeta {
                is_dir: true,
                len: 0,
                mode: 0o755,
                mtime: None,
            }),
            Lookup::Absent => None,
            Lookup::Real => self.backend.metadata(path)?,
        };
        Ok(meta.map(|mut m| {
            if let (Some(mode), false) = (staged_mode, self.simulate) {
                m.mode = mode;
            }
            m
        }))
    }

    /// Whether a directory has no children in the effective view.
    pub fn is_empty_dir(&self, path: &str) -> TxResult<bool> {
        let mut names: BTreeSet<String> = self.tree.child_names(path).into_iter().collect();
        if self.backend.is_dir(path) {
            names.extend(self.backend.list_dir(path)?);
        }
        Ok(!names
            .iter()
            .any(|name| self.exists(&jail::join(path, name))))
    }

    /// Make sure `dir` is a directory in the effective view.
    fn ensure_dir(&mut self, dir: &str) -> TxResult<()> {
        match self.lookup(dir) {
            Lookup::StagedDir => Ok(()),
            Lookup::StagedFile => Err(TxError::NotADirectory(dir.to_string())),
            Lookup::Real if self.backend.is_dir(dir) => Ok(()),
            Lookup::Real if self.backend.exists(dir) => {
                Err(TxError::NotADirectory(dir.to_string()))
            }
            Lookup::Real => {
                self.tree.set(dir, NodeState::Dir { clear_existing: false });
                Ok(())
            }
            Lookup::Absent => {
                let clear_existing = self.backend.exists(dir);
                self.tree.set(dir, NodeState::Dir { clear_existing });
                Ok(())
            }
        }
    }

    fn ensure_parents(&mut self, path: &str) -> TxResult<()> {
        for ancestor in jail::ancestors(path) {
            self.ensure_dir(ancestor)?;
        }
        Ok(())
    }

    pub fn stage_write(&mut self, path: &str, data: &[u8]) -> TxResult<()> {
        self.ensure_parents(path)?;
        let lookup = self.lookup(path);
        if lookup == Lookup::StagedDir || (lookup == Lookup::Real && self.backend.is_dir(path)) {
            return Err(TxError::IsADirectory(path.to_string()));
        }
        let keeps_mode = self.tree.node(path).and_then(|n| n.mode).is_some();
        if lookup == Lookup::Real && !keeps_mode {
            if let Some(meta) = self.backend.metadata(path)? {
                self.tree.set_mode(path, Some(meta.mode));
            }
        }
        let physical = self.resolve(path);
        self.backend.write(&physical, data)?;
        self.tree.set(path, NodeState::File);
        debug!(path, bytes = data.len(), "staged write");
        Ok(())
    }

    pub fn stage_mkdir(&mut self, path: &str) -> TxResult<()> {
        self.ensure_parents(path)?;
        self.ensure_dir(path)
    }

    pub fn stage_delete(&mut self, path: &str) -> TxResult<()> {
        if self.lookup(path) == Lookup::StagedFile {
            let physical = self.resolve(path);
            self.backend.delete(&physical)?;
        }
        self.tree.set(path, NodeState::Removed { recursive: false });
        debug!(path, "staged delete");
        Ok(())
    }

    pub fn stage_rmdir(&mut self, path: &str, recursive: bool) -> TxResult<()> {
        let physical = self.physical(path);
        if self.backend.is_dir(&physical) {
            self.backend.remove_dir(&physical, true)?;
        }
        self.tree.set(path, NodeState::Removed { recursive });
        debug!(path, recursive, "staged rmdir");
        Ok(())
    }

    /// Move a file: stage its body at `to` and remove `from`.
    pub fn stage_rename(&mut self, from: &str, to: &str) -> TxResult<()> {
        let data = self
            .read(from)?
            .ok_or_else(|| TxError::NotFound(from.to_string()))?;
        let mode = self.metadata(from)?.map(|m| m.mode);
        self.stage_write(to, &data)?;
        self.tree.set_mode(to, mode);
        self.stage_delete(from)
    }

    pub fn stage_chmod(&mut self, path: &str, mode: u32) -> TxResult<()> {
        self.tree.set_mode(path, Some(mode));
        Ok(())
    }

    /// Move every staged path into its real destination, parents first.
    ///
    /// Anything the rite replaces or removes is preserved in `rite_id`'s
    /// trash. On failure the paths already moved stay in place, the rest stay
    /// in the staging root, and `MaterializationPartial` says which is which.
    pub fn materialize(mut self, trash: &TrashStore, rite_id: &RiteId) -> TxResult<MaterializeReport> {
        let plan = self.tree.walk();
        let mut report = MaterializeReport::default();

        for (i, (path, state, mode)) in plan.iter().enumerate() {
            if let Err(e) = self.apply(path, *state, *mode, trash, rite_id, &mut report) {
                self.closed = true;
                warn!(
                    tx_id = %self.tx_id,
                    path = %path,
                    moved = report.moved.len(),
                    error = %e,
                    "materialization stopped partway"
                );
                return Err(TxError::MaterializationPartial {
                    moved: report.moved,
                    failed_path: path.clone(),
                    remaining: plan.len() - i,
                    staging_root: self.staging_root.clone(),
                    reason: e.to_string(),
                });
            }
        }

        self.remove_staging_root()?;
        self.closed = true;
        info!(
            tx_id = %self.tx_id,
            moved = report.moved.len(),
            trashed = report.trashed.len(),
            "materialized"
        );
        Ok(report)
    }

    fn apply(
        &mut self,
        path: &str,
        state: NodeState,
        mode: Option<u32>,
        trash: &TrashStore,
        rite_id: &RiteId,
        report: &mut MaterializeReport,
    ) -> TxResult<()> {
        match state {
            NodeState::Passthrough => {}
            NodeState::Removed { .. } => {
                if self.backend.exists(path) {
                    report.trashed.push(trash.move_to_trash(path, rite_id)?);
                }
                return Ok(());
            }
            NodeState::Dir { clear_existing } => {
                let exists = self.backend.exists(path);
                if exists && (clear_existing || !self.backend.is_dir(path)) {
                    report.trashed.push(trash.move_to_trash(path, rite_id)?);
                }
                if !self.backend.is_dir(path) {
                    self.backend.mkdir(path)?;
                    report.created_dirs.push(path.to_string());
                }
            }
            NodeState::File => {
                // An overwritten file is copied aside and then swapped out in
                // a single rename, so `path` never goes missing.
                if self.backend.is_dir(path) {
                    report.trashed.push(trash.move_to_trash(path, rite_id)?);
                } else if self.backend.exists(path) {
                    report.trashed.push(trash.copy_to_trash(path, rite_id)?);
                }
                let physical = self.resolve(path);
                self.backend.replace_file(&physical, path)?;
                report.moved.push(path.to_string());
                debug!(path, "materialized file");
            }
        }
        if let Some(mode) = mode {
            if self.backend.exists(path) {
                self.backend.chmod(path, mode)?;
            }
        }
        Ok(())
    }

    /// Drop everything staged and leave the real tree untouched.
    pub fn discard(mut self) -> TxResult<()> {
        self.remove_staging_root()?;
        self.closed = true;
        debug!(tx_id = %self.tx_id, "staging transaction discarded");
        Ok(())
    }

    fn remove_staging_root(&self) -> TxResult<()> {
        if self.backend.is_dir(&self.staging_root) {
            self.backend.remove_dir(&self.staging_root, true)?;
        }
        Ok(())
    }
}

impl Drop for StagingTransaction {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.remove_staging_root() {
                warn!(tx_id = %self.tx_id, error = %e, "could not clean up abandoned staging root");
            }
        }
    }
}
