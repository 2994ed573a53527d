use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use rite_ledger::{ControlLayout, Ledger, LedgerEntry, RiteLedger, SnapshotMetadata};
use rite_store::{FileMeta, FilesystemBackend, JailedPath, PathJail};
use rite_types::{InverseAction, Operation, Payload, RiteId};

use crate::error::{TxError, TxResult};
use crate::lock::RiteLock;
use crate::staging::StagingTransaction;

/// What a mutation did (or, in simulate mode, would have done).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteAction {
    Created,
    Overwritten,
    Deleted,
    DirectoryCreated,
    DirectoryRemoved,
    ModeChanged,
    Renamed,
    /// Nothing to do: the directory already existed or the target was missing.
    Unchanged,
}

/// Outcome of one mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WriteResult {
    pub path: String,
    pub success: bool,
    pub bytes_written: u64,
    pub action: WriteAction,
    pub simulated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Settings a rite is opened with.
#[derive(Clone, Debug)]
pub struct RiteOptions {
    pub simulate: bool,
    pub actor: String,
    pub max_payload_bytes: u64,
    /// Variable state inherited from `HEAD`.
    pub variables: BTreeMap<String, Value>,
}

impl Default for RiteOptions {
    fn default() -> Self {
        Self {
            simulate: false,
            actor: "rite".to_string(),
            max_payload_bytes: rite_store::jail::DEFAULT_MAX_PAYLOAD_BYTES,
            variables: BTreeMap::new(),
        }
    }
}

/// Everything a finished rite hands over for commit or discard.
pub struct RiteParts {
    pub ledger: RiteLedger,
    pub transaction: StagingTransaction,
    pub variables: BTreeMap<String, Value>,
    pub variables_delta: BTreeMap<String, Value>,
    pub edicts: Vec<String>,
    pub failures: Vec<WriteResult>,
    pub lock: Option<RiteLock>,
}

/// One running rite: the ledgered write paths over a staging transaction.
///
/// Every mutation validates its path, captures the pre-image, appends a
/// ledger entry with the computed inverse (also in simulate mode), and only
/// then stages the physical effect.
pub struct Rite {
    id: RiteId,
    ledger: Ledger,
    tx: StagingTransaction,
    jail: PathJail,
    layout: ControlLayout,
    actor: String,
    variables: BTreeMap<String, Value>,
    variables_delta: BTreeMap<String, Value>,
    edicts: Vec<String>,
    failures: Vec<WriteResult>,
    lock: Option<RiteLock>,
}

impl Rite {
    pub fn begin(
        name: impl Into<String>,
        backend: Arc<dyn FilesystemBackend>,
        layout: ControlLayout,
        options: RiteOptions,
    ) -> Self {
        let id = RiteId::new();
        let name = name.into();
        let tx = StagingTransaction::open(backend, &layout, options.simulate);
        info!(rite_id = %id, rite = %name, simulate = options.simulate, "rite begun");
        Self {
            id,
            ledger: Ledger::new(id, name),
            tx,
            jail: PathJail::new(options.max_payload_bytes),
            layout,
            actor: options.actor,
            variables: options.variables,
            variables_delta: BTreeMap::new(),
            edicts: Vec::new(),
            failures: Vec::new(),
            lock: None,
        }
    }

    /// Hold `lock` until the rite is committed or discarded.
    pub fn with_lock(mut self, lock: RiteLock) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn id(&self) -> RiteId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.ledger.rite_name()
    }

    pub fn is_simulate(&self) -> bool {
        self.tx.is_simulate()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn transaction(&self) -> &StagingTransaction {
        &self.tx
    }

    pub fn variables(&self) -> &BTreeMap<String, Value> {
        &self.variables
    }

    pub fn edicts(&self) -> &[String] {
        &self.edicts
    }

    /// Mutations whose physical effect failed after being ledgered.
    pub fn failures(&self) -> &[WriteResult] {
        &self.failures
    }

    /// Whether `path` exists as the rite currently sees the project.
    pub fn exists(&self, path: &str) -> TxResult<bool> {
        let path = self.guard(path)?;
        Ok(self.tx.exists(path.as_str()))
    }

    /// Current bytes of `path` as the rite sees them, staged writes included.
    pub fn read(&self, path: &str) -> TxResult<Option<Vec<u8>>> {
        let path = self.guard(path)?;
        self.tx.read(path.as_str())
    }

    fn guard(&self, logical: &str) -> TxResult<JailedPath> {
        let path = self.jail.validate(logical)?;
        if self.layout.is_bookkeeping(path.as_str()) {
            return Err(TxError::ReservedPath(path.into_string()));
        }
        Ok(path)
    }

    /// Pre-image of a file: bytes and metadata. Read errors count as "none".
    fn pre_image(&self, path: &str) -> Option<(Vec<u8>, Option<SnapshotMetadata>)> {
        let data = match self.tx.read(path) {
            Ok(data) => data?,
            Err(e) => {
                debug!(path, error = %e, "pre-image unreadable");
                return None;
            }
        };
        Some((data, self.snapshot_meta(path)))
    }

    fn snapshot_meta(&self, path: &str) -> Option<SnapshotMetadata> {
        self.tx
            .metadata(path)
            .ok()
            .flatten()
            .map(|FileMeta { mode, mtime, .. }| SnapshotMetadata { mode, mtime })
    }

    fn record(&mut self, entry: LedgerEntry) {
        let entry = self.ledger.append(entry);
        debug!(rite_id = %self.id, op = %entry.operation(), entry_id = %entry.id, "ledgered");
    }

    /// Stage the physical effect unless simulating, and build the result.
    fn finish(
        &mut self,
        path: &str,
        action: WriteAction,
        bytes: u64,
        effect: impl FnOnce(&mut StagingTransaction) -> TxResult<()>,
    ) -> WriteResult {
        let simulated = self.tx.is_simulate();
        let outcome = if simulated { Ok(()) } else { effect(&mut self.tx) };
        let result = WriteResult {
            path: path.to_string(),
            success: outcome.is_ok(),
            bytes_written: if outcome.is_ok() { bytes } else { 0 },
            action,
            simulated,
            error: outcome.as_ref().err().map(ToString::to_string),
        };
        if let Err(e) = outcome {
            warn!(rite_id = %self.id, path, error = %e, "staged effect failed");
            self.failures.push(result.clone());
        }
        result
    }

    pub fn mkdir(&mut self, path: &str) -> TxResult<WriteResult> {
        let path = self.guard(path)?;
        let p = path.as_str();
        if self.tx.is_file(p) {
            return Err(TxError::NotADirectory(p.to_string()));
        }
        let forward = Operation::MkDir { path: p.to_string() };
        if self.tx.is_dir(p) {
            self.record(LedgerEntry::new(&self.actor, forward).with_context("pre_existing", true));
            return Ok(self.finish(p, WriteAction::Unchanged, 0, |_| Ok(())));
        }
        let inverse = InverseAction::new(Operation::RmDir {
            path: p.to_string(),
            recursive: true,
        });
        self.record(LedgerEntry::new(&self.actor, forward).with_inverse(inverse));
        Ok(self.finish(p, WriteAction::DirectoryCreated, 0, |tx| tx.stage_mkdir(p)))
    }

    pub fn write(&mut self, path: &str, data: impl AsRef<[u8]>) -> TxResult<WriteResult> {
        let data = data.as_ref();
        let path = self.guard(path)?;
        self.jail.check_quota(data.len() as u64)?;
        let p = path.as_str();
        if self.tx.is_dir(p) {
            return Err(TxError::IsADirectory(p.to_string()));
        }

        let forward = Operation::WriteFile {
            path: p.to_string(),
            content: Payload::inline(data.to_vec()),
        };
        let existed = self.tx.exists(p);
        let entry = match self.pre_image(p) {
            Some((old, meta)) => LedgerEntry::new(&self.actor, forward)
                .with_inverse(InverseAction::new(Operation::WriteFile {
                    path: p.to_string(),
                    content: Payload::Snapshot,
                }))
                .with_snapshot(old, meta),
            None if existed => {
                warn!(path = p, "existing file has no readable pre-image; write is irreversible");
                LedgerEntry::new(&self.actor, forward)
            }
            None => LedgerEntry::new(&self.actor, forward).with_inverse(InverseAction::new(
                Operation::DeleteFile {
                    path: p.to_string(),
                },
            )),
        };
        self.record(entry.with_context("bytes", data.len() as u64));

        let action = if existed {
            WriteAction::Overwritten
        } else {
            WriteAction::Created
        };
        Ok(self.finish(p, action, data.len() as u64, |tx| tx.stage_write(p, data)))
    }

    /// Delete a file. A missing target is a warning, not an error, and
    /// leaves no ledger entry.
    pub fn delete(&mut self, path: &str) -> TxResult<WriteResult> {
        let path = self.guard(path)?;
        let p = path.as_str();
        if !self.tx.exists(p) {
            warn!(rite_id = %self.id, path = p, "delete target missing; skipped");
            return Ok(self.finish(p, WriteAction::Unchanged, 0, |_| Ok(())));
        }
        if self.tx.is_dir(p) {
            return Err(TxError::IsADirectory(p.to_string()));
        }

        let forward = Operation::DeleteFile {
            path: p.to_string(),
        };
        let entry = match self.pre_image(p) {
            Some((old, meta)) => LedgerEntry::new(&self.actor, forward)
                .with_inverse(InverseAction::new(Operation::WriteFile {
                    path: p.to_string(),
                    content: Payload::Snapshot,
                }))
                .with_snapshot(old, meta),
            None => {
                warn!(path = p, "no readable pre-image; delete is irreversible");
                LedgerEntry::new(&self.actor, forward)
            }
        };
        self.record(entry);
        Ok(self.finish(p, WriteAction::Deleted, 0, |tx| tx.stage_delete(p)))
    }

    /// Remove a directory.
    ///
    /// The inverse recreates the directory only. Contents are soft-deleted to
    /// the trash at commit but not captured in the ledger, so removing a
    /// non-empty directory is recorded as irreversible.
    pub fn rmdir(&mut self, path: &str, recursive: bool) -> TxResult<WriteResult> {
        let path = self.guard(path)?;
        let p = path.as_str();
        if !self.tx.exists(p) {
            warn!(rite_id = %self.id, path = p, "rmdir target missing; skipped");
            return Ok(self.finish(p, WriteAction::Unchanged, 0, |_| Ok(())));
        }
        if !self.tx.is_dir(p) {
            return Err(TxError::NotADirectory(p.to_string()));
        }
        let empty = self.tx.is_empty_dir(p)?;
        if !empty && !recursive {
            return Err(TxError::DirectoryNotEmpty(p.to_string()));
        }

        let mut entry = LedgerEntry::new(
            &self.actor,
            Operation::RmDir {
                path: p.to_string(),
                recursive,
            },
        )
        .with_inverse(InverseAction::new(Operation::MkDir {
            path: p.to_string(),
        }));
        if let Some(meta) = self.snapshot_meta(p) {
            entry = entry.with_metadata(meta);
        }
        if !empty {
            entry = entry.irreversible().with_context("contents_captured", false);
        }
        self.record(entry);
        Ok(self.finish(p, WriteAction::DirectoryRemoved, 0, |tx| {
            tx.stage_rmdir(p, recursive)
        }))
    }

    pub fn chmod(&mut self, path: &str, mode: u32) -> TxResult<WriteResult> {
        let path = self.guard(path)?;
        let p = path.as_str();
        let old = self
            .tx
            .metadata(p)?
            .ok_or_else(|| TxError::NotFound(p.to_string()))?;
        let entry = LedgerEntry::new(
            &self.actor,
            Operation::Chmod {
                path: p.to_string(),
                mode,
            },
        )
        .with_inverse(InverseAction::new(Operation::Chmod {
            path: p.to_string(),
            mode: old.mode,
        }))
        .with_metadata(SnapshotMetadata {
            mode: old.mode,
            mtime: old.mtime,
        });
        self.record(entry);
        Ok(self.finish(p, WriteAction::ModeChanged, 0, |tx| tx.stage_chmod(p, mode)))
    }

    /// Move a file. The destination must not exist.
    pub fn rename(&mut self, from: &str, to: &str) -> TxResult<WriteResult> {
        let from = self.guard(from)?;
        let to = self.guard(to)?;
        let (f, t) = (from.as_str(), to.as_str());
        if !self.tx.exists(f) {
            return Err(TxError::NotFound(f.to_string()));
        }
        if self.tx.is_dir(f) {
            return Err(TxError::IsADirectory(f.to_string()));
        }
        if self.tx.exists(t) {
            return Err(TxError::AlreadyExists(t.to_string()));
        }

        let mut entry = LedgerEntry::new(
            &self.actor,
            Operation::Rename {
                from: f.to_string(),
                to: t.to_string(),
            },
        )
        .with_inverse(InverseAction::new(Operation::Rename {
            from: t.to_string(),
            to: f.to_string(),
        }));
        if let Some(meta) = self.snapshot_meta(f) {
            entry = entry.with_metadata(meta);
        }
        self.record(entry);
        Ok(self.finish(t, WriteAction::Renamed, 0, |tx| tx.stage_rename(f, t)))
    }

    /// Set (or with `None`, unset) a rite variable.
    pub fn set_var(&mut self, name: &str, value: Option<Value>) {
        let previous = self.variables.get(name).cloned();
        let entry = LedgerEntry::new(
            &self.actor,
            Operation::SetVar {
                name: name.to_string(),
                value: value.clone(),
            },
        )
        .with_inverse(InverseAction::new(Operation::SetVar {
            name: name.to_string(),
            value: previous,
        }));
        self.record(entry);

        match value {
            Some(v) => {
                self.variables.insert(name.to_string(), v.clone());
                self.variables_delta.insert(name.to_string(), v);
            }
            None => {
                self.variables.remove(name);
                self.variables_delta.insert(name.to_string(), Value::Null);
            }
        }
    }

    /// Record a shell edict run on the rite's behalf by the caller.
    ///
    /// `counter_commands` undo it; without them the entry is irreversible.
    pub fn record_edict(&mut self, command: &str, counter_commands: Vec<String>) {
        let forward = Operation::ExecShell {
            commands: vec![command.to_string()],
        };
        let entry = if counter_commands.is_empty() {
            LedgerEntry::new(&self.actor, forward)
        } else {
            LedgerEntry::new(&self.actor, forward).with_inverse(InverseAction::new(
                Operation::ExecShell {
                    commands: counter_commands,
                },
            ))
        };
        self.record(entry);
        self.edicts.push(command.to_string());
    }

    /// Hand the rite over for commit or discard.
    pub fn into_parts(self) -> RiteParts {
        RiteParts {
            ledger: self.ledger.into_record(),
            transaction: self.tx,
            variables: self.variables,
            variables_delta: self.variables_delta,
            edicts: self.edicts,
            failures: self.failures,
            lock: self.lock,
        }
    }
}
