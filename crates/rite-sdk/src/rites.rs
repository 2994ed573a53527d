use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use rite_diff::{
    compare, compute_fingerprint, content_diff, forge_cherry_pick, DiffRecord, FileDiff,
    PatchBlock, PostRun, ReversePatch,
};
use rite_ledger::{Chronicle, ChronicleEntry, ControlLayout, RiteLedger, TrashItem, TrashStore};
use rite_store::{FilesystemBackend, LocalBackend};
use rite_txn::{Rite, RiteLock, RiteOptions, TxError};
use rite_types::RiteId;
use rite_undo::{Confirmer, EdictRunner, SystemShell, UndoEngine, UndoReport, UndoRequest};

use crate::config::RiteConfig;
use crate::error::{SdkError, SdkResult};
use crate::seal::federate;
use crate::summary::{CommitReport, RiteRecord, RiteSummary};

/// High-level API over one project root.
///
/// Opens rites, commits them into the chronicle, undoes them, and forges
/// diffs and patches from the recorded history.
pub struct Rites {
    backend: Arc<dyn FilesystemBackend>,
    config: RiteConfig,
    layout: ControlLayout,
    chronicle: Chronicle,
    trash: TrashStore,
    edicts: Arc<dyn EdictRunner>,
}

impl Rites {
    /// Open the project at `root` on the local disk, reading its config file.
    pub fn open(root: impl AsRef<Path>) -> SdkResult<Self> {
        let config = RiteConfig::load(root.as_ref())?;
        Self::open_with_config(root, config)
    }

    pub fn open_with_config(root: impl AsRef<Path>, config: RiteConfig) -> SdkResult<Self> {
        config.validate()?;
        let backend = LocalBackend::open(root)?.with_retry(config.retry_policy());
        Ok(Self::with_backend(Arc::new(backend), config))
    }

    /// Run over any backend. Edicts run in the backend's local root, if any.
    pub fn with_backend(backend: Arc<dyn FilesystemBackend>, config: RiteConfig) -> Self {
        let layout = config.layout();
        let shell = SystemShell::new(backend.local_root().map(Path::to_path_buf));
        Self {
            chronicle: Chronicle::new(backend.clone(), layout.clone()),
            trash: TrashStore::new(backend.clone(), layout.clone()),
            edicts: Arc::new(shell),
            backend,
            config,
            layout,
        }
    }

    /// Replace the runner used for counter-edicts and patch shell steps.
    pub fn with_edict_runner(mut self, edicts: Arc<dyn EdictRunner>) -> Self {
        self.edicts = edicts;
        self
    }

    pub fn config(&self) -> &RiteConfig {
        &self.config
    }

    pub fn layout(&self) -> &ControlLayout {
        &self.layout
    }

    pub fn backend(&self) -> &Arc<dyn FilesystemBackend> {
        &self.backend
    }

    /// The live state, or `None` at Genesis.
    pub fn head(&self) -> SdkResult<Option<ChronicleEntry>> {
        Ok(self.chronicle.head()?)
    }

    // ---- Rite lifecycle ----

    /// Open a rite that stages its writes until [`commit_rite`](Self::commit_rite).
    ///
    /// On a local root this takes the project's advisory lock, held until the
    /// rite is committed or discarded.
    pub fn begin_rite(&self, name: &str) -> SdkResult<Rite> {
        let lock = self.lock(name)?;
        let rite = Rite::begin(name, self.backend.clone(), self.layout.clone(), self.options(false)?);
        Ok(match lock {
            Some(lock) => rite.with_lock(lock),
            None => rite,
        })
    }

    /// Open a rite that records its ledger but never touches the tree.
    pub fn begin_simulation(&self, name: &str) -> SdkResult<Rite> {
        Ok(Rite::begin(
            name,
            self.backend.clone(),
            self.layout.clone(),
            self.options(true)?,
        ))
    }

    fn options(&self, simulate: bool) -> SdkResult<RiteOptions> {
        Ok(RiteOptions {
            simulate,
            actor: self.config.actor.clone(),
            max_payload_bytes: self.config.max_payload_bytes,
            variables: self.head()?.map(|h| h.variables).unwrap_or_default(),
        })
    }

    fn lock(&self, name: &str) -> SdkResult<Option<RiteLock>> {
        match self.backend.local_root() {
            Some(root) if self.config.lock.enabled => {
                let path = root.join(self.layout.lock_file());
                Ok(Some(RiteLock::acquire(&path, name, self.config.lock.timeout())?))
            }
            _ => Ok(None),
        }
    }

    /// Commit a rite: persist its ledger, move the staged tree into place and
    /// seal the new `HEAD`.
    ///
    /// A simulation is discarded and only its ledger is reported. A rite with
    /// failed mutations is discarded and fails with [`TxError::RiteFailed`].
    pub fn commit_rite(&self, rite: Rite) -> SdkResult<CommitReport> {
        let rite_id = rite.id();
        let simulated = rite.is_simulate();
        let parts = rite.into_parts();

        if simulated {
            parts.transaction.discard()?;
            info!(rite_id = %rite_id, operations = parts.ledger.len(), "simulation finished");
            return Ok(CommitReport {
                rite_id,
                simulated,
                ledger: parts.ledger,
                materialized: None,
                sealed: None,
            });
        }
        if !parts.failures.is_empty() {
            let failures = parts.failures.len();
            parts.transaction.discard()?;
            warn!(rite_id = %rite_id, failures, "rite failed; discarded");
            return Err(TxError::RiteFailed { failures }.into());
        }
        if parts.ledger.is_empty() {
            parts.transaction.discard()?;
            info!(rite_id = %rite_id, "empty rite; nothing sealed");
            return Ok(CommitReport {
                rite_id,
                simulated,
                ledger: parts.ledger,
                materialized: None,
                sealed: None,
            });
        }

        // The ledger goes first so a partially materialized rite stays undoable by hand.
        let mut ledger = parts.ledger;
        self.trash.persist_ledger(&ledger)?;
        let materialized = parts.transaction.materialize(&self.trash, &rite_id)?;
        if !materialized.created_dirs.is_empty() {
            ledger.created_dirs = materialized.created_dirs.clone();
            self.trash.persist_ledger(&ledger)?;
        }

        let head = self.chronicle.head()?;
        let manifest = federate(
            self.backend.as_ref(),
            head.as_ref().map(|h| &h.manifest),
            &ledger,
        )?;
        let entry = ChronicleEntry {
            rite_id,
            rite_name: ledger.rite_name.clone(),
            sequence: self.chronicle.next_sequence()?,
            parent: head.map(|h| h.rite_id),
            timestamp: Utc::now(),
            fingerprint: compute_fingerprint(&manifest),
            manifest,
            variables: parts.variables,
            variables_delta: parts.variables_delta,
            edicts: parts.edicts,
            operations: ledger.len(),
        };
        self.chronicle.seal(&entry)?;
        drop(parts.lock);

        Ok(CommitReport {
            rite_id,
            simulated,
            ledger,
            materialized: Some(materialized),
            sealed: Some(entry),
        })
    }

    /// Throw a rite away. The real tree and the chronicle are untouched.
    pub fn discard_rite(&self, rite: Rite) -> SdkResult<()> {
        let rite_id = rite.id();
        let parts = rite.into_parts();
        parts.transaction.discard()?;
        info!(rite_id = %rite_id, operations = parts.ledger.len(), "rite discarded");
        Ok(())
    }

    // ---- Undo ----

    /// Reverse the most recent `request.steps` rites.
    pub fn undo(&self, request: UndoRequest, confirmer: &dyn Confirmer) -> SdkResult<UndoReport> {
        let _lock = self.lock("undo")?;
        let mut engine = UndoEngine::new(
            self.backend.clone(),
            self.layout.clone(),
            self.edicts.clone(),
            self.config.protected_paths.clone(),
        );
        Ok(engine.run(request, confirmer)?)
    }

    // ---- History ----

    /// The lineage from `HEAD`, newest first, at most `limit` rites.
    pub fn history(&self, limit: usize) -> SdkResult<Vec<RiteSummary>> {
        let timeline = self.chronicle.timeline()?;
        Ok(timeline
            .iter()
            .take(limit)
            .enumerate()
            .map(|(i, entry)| RiteSummary::from_entry(entry, i == 0))
            .collect())
    }

    /// Resolve `HEAD`, `HEAD~N` or an id prefix to a rite id.
    pub fn resolve(&self, reference: &str) -> SdkResult<RiteId> {
        Ok(self.chronicle.resolve(reference)?)
    }

    /// The sealed entry and ledger of one rite, including undone ones.
    pub fn show(&self, reference: &str) -> SdkResult<RiteRecord> {
        let entry = self.entry(reference)?;
        let ledger = self.trash.load_ledger(&entry.rite_id)?;
        Ok(RiteRecord { entry, ledger })
    }

    fn entry(&self, reference: &str) -> SdkResult<ChronicleEntry> {
        let rite_id = self.resolve(reference)?;
        self.chronicle
            .load(&rite_id)?
            .ok_or(SdkError::RiteNotFound(rite_id))
    }

    fn ledger(&self, reference: &str) -> SdkResult<RiteLedger> {
        let rite_id = self.resolve(reference)?;
        self.trash
            .load_ledger(&rite_id)?
            .ok_or(SdkError::LedgerMissing(rite_id))
    }

    // ---- Differ ----

    /// Path-level changes from rite `baseline` to rite `newer`.
    pub fn diff(&self, newer: &str, baseline: &str) -> SdkResult<Vec<DiffRecord>> {
        let newer = self.entry(newer)?;
        let baseline = self.entry(baseline)?;
        Ok(compare(&newer.manifest, &baseline.manifest))
    }

    /// Line-level diffs of every file a rite wrote or deleted.
    pub fn content_diff(&self, reference: &str) -> SdkResult<Vec<FileDiff>> {
        Ok(content_diff(&self.ledger(reference)?))
    }

    pub fn forge_reverse_patch(&self, reference: &str) -> SdkResult<ReversePatch> {
        Ok(ReversePatch::forge(&self.ledger(reference)?)?)
    }

    pub fn forge_cherry_pick(&self, reference: &str) -> SdkResult<String> {
        Ok(forge_cherry_pick(&self.entry(reference)?))
    }

    /// Parse reverse-patch text and apply it as a new rite.
    pub fn apply_reverse_patch(&self, text: &str) -> SdkResult<CommitReport> {
        let patch = ReversePatch::parse(text)?;
        self.apply_patch(&patch)
    }

    /// Apply a reverse patch as a new, itself undoable, rite.
    ///
    /// Variables and blocks are applied first, then the post-run steps in
    /// order. Shell steps are recorded as irreversible edicts and run once
    /// the rite is committed.
    pub fn apply_patch(&self, patch: &ReversePatch) -> SdkResult<CommitReport> {
        let name = if patch.rite_name.is_empty() {
            "reverse patch".to_string()
        } else {
            format!("reverse {}", patch.rite_name)
        };
        let mut rite = self.begin_rite(&name)?;

        for (var, value) in &patch.variables {
            rite.set_var(var, value.clone());
        }
        for block in &patch.blocks {
            match block {
                PatchBlock::Dir { path } => {
                    rite.mkdir(path)?;
                }
                PatchBlock::File { path, content, mode } => {
                    rite.write(path, content)?;
                    if let Some(mode) = mode {
                        rite.chmod(path, *mode)?;
                    }
                }
            }
        }

        let mut shell = Vec::new();
        for step in &patch.post_run {
            match step {
                PostRun::Remove { path } => {
                    rite.delete(path)?;
                }
                PostRun::RemoveDir { path, recursive } => {
                    rite.rmdir(path, *recursive)?;
                }
                PostRun::Chmod { path, mode } => {
                    rite.chmod(path, *mode)?;
                }
                PostRun::Move { from, to } => {
                    rite.rename(from, to)?;
                }
                PostRun::Shell { command } => {
                    rite.record_edict(command, Vec::new());
                    shell.push(command.clone());
                }
            }
        }

        let report = self.commit_rite(rite)?;
        for command in &shell {
            self.edicts.run(command)?;
        }
        Ok(report)
    }

    // ---- Trash ----

    /// Bodies a rite relocated into its trash.
    pub fn trash_list(&self, reference: &str) -> SdkResult<Vec<TrashItem>> {
        let rite_id = self.resolve(reference)?;
        Ok(self.trash.list(&rite_id)?)
    }

    /// Move a trashed body back to its original location, outside any rite.
    pub fn restore_from_trash(&self, item: &TrashItem) -> SdkResult<()> {
        Ok(self
            .trash
            .restore_from_trash(&item.trash_path, &item.original_path)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use proptest::prelude::*;
    use rite_diff::DiffStatus;
    use rite_store::MemoryBackend;
    use rite_undo::{AutoConfirm, UndoError, UndoResult};
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl EdictRunner for Recorder {
        fn run(&self, command: &str) -> UndoResult<()> {
            self.0.lock().expect("lock poisoned").push(command.to_string());
            Ok(())
        }
    }

    fn memory() -> (Arc<MemoryBackend>, Rites) {
        let fs = Arc::new(MemoryBackend::new());
        let rites = Rites::with_backend(fs.clone(), RiteConfig::default())
            .with_edict_runner(Arc::new(Recorder::default()));
        (fs, rites)
    }

    fn commit(rites: &Rites, name: &str, f: impl FnOnce(&mut Rite)) -> CommitReport {
        let mut rite = rites.begin_rite(name).unwrap();
        f(&mut rite);
        rites.commit_rite(rite).unwrap()
    }

    fn undo(rites: &Rites, steps: usize) -> SdkResult<UndoReport> {
        let request = UndoRequest {
            steps,
            force: false,
            non_interactive: true,
        };
        rites.undo(request, &AutoConfirm)
    }

    #[test]
    fn scenario_a_undo_restores_previous_content_and_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let rites = Rites::open(dir.path()).unwrap();

        let r1 = commit(&rites, "r1", |r| {
            r.write("a.txt", "v1").unwrap();
        });
        commit(&rites, "r2", |r| {
            r.write("a.txt", "v2").unwrap();
        });
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "v2");

        let report = undo(&rites, 1).unwrap();
        assert_eq!(report.new_head, Some(r1.rite_id));
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "v1");
        let head = rites.head().unwrap().unwrap();
        assert_eq!(Some(head.fingerprint), r1.fingerprint());
    }

    #[test]
    fn scenario_b_directory_and_contents_are_removed_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let rites = Rites::open(dir.path()).unwrap();
        commit(&rites, "pkg", |r| {
            r.mkdir("pkg").unwrap();
            r.write("pkg/mod.txt", "x").unwrap();
        });
        assert!(dir.path().join("pkg/mod.txt").is_file());

        let report = undo(&rites, 1).unwrap();
        assert_eq!(report.operations_reversed, 2);
        assert_eq!(report.failures, 0);
        assert!(!dir.path().join("pkg").exists());
        assert!(rites.head().unwrap().is_none());
    }

    #[test]
    fn undo_keeps_directories_an_earlier_rite_made() {
        let dir = tempfile::tempdir().unwrap();
        let rites = Rites::open(dir.path()).unwrap();
        commit(&rites, "layout", |r| {
            r.mkdir("docs").unwrap();
        });
        let r1 = commit(&rites, "notes", |r| {
            r.write("docs/a.txt", "x").unwrap();
            r.write("gen/out/b.txt", "y").unwrap();
        });
        assert_eq!(r1.ledger.created_dirs, vec!["gen", "gen/out"]);

        let report = undo(&rites, 1).unwrap();
        assert!(dir.path().join("docs").is_dir());
        assert!(!dir.path().join("docs/a.txt").exists());
        assert!(!dir.path().join("gen").exists());
        assert_eq!(report.orphans_purged, 2);

        undo(&rites, 1).unwrap();
        assert!(!dir.path().join("docs").exists());
    }

    fn scenario_c() -> (tempfile::TempDir, Rites, TrashItem) {
        let dir = tempfile::tempdir().unwrap();
        let rites = Rites::open(dir.path()).unwrap();
        commit(&rites, "seed", |r| {
            r.write("b.txt", "hello").unwrap();
        });
        let r3 = commit(&rites, "delete b", |r| {
            r.delete("b.txt").unwrap();
        });
        assert!(!dir.path().join("b.txt").exists());

        let items = rites.trash_list(&r3.rite_id.to_string()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].original_path, "b.txt");
        let trashed = std::fs::read_to_string(dir.path().join(&items[0].trash_path)).unwrap();
        assert_eq!(trashed, "hello");
        let item = items[0].clone();
        (dir, rites, item)
    }

    #[test]
    fn scenario_c_restore_from_trash_recovers_the_body() {
        let (dir, rites, item) = scenario_c();
        rites.restore_from_trash(&item).unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("b.txt")).unwrap(), "hello");
    }

    #[test]
    fn scenario_c_undo_recovers_the_body() {
        let (dir, rites, _) = scenario_c();
        undo(&rites, 1).unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("b.txt")).unwrap(), "hello");
    }

    #[test]
    fn scenario_d_reverse_patch_of_older_rite_restores_its_paths() {
        let (fs, rites) = memory();
        let base = commit(&rites, "base", |r| {
            r.write("a.txt", "base").unwrap();
            r.write("c.txt", "untouched").unwrap();
        });
        let older = commit(&rites, "older", |r| {
            r.write("a.txt", "changed").unwrap();
            r.write("d.txt", "new").unwrap();
        });
        commit(&rites, "newer", |r| {
            r.write("b.txt", "disjoint").unwrap();
        });

        let text = rites
            .forge_reverse_patch(&older.rite_id.to_string())
            .unwrap()
            .render();
        let applied = rites.apply_reverse_patch(&text).unwrap();
        assert_eq!(fs.read("a.txt").unwrap(), b"base");
        assert!(!fs.exists("d.txt"));

        // Only the newer rite's path separates the result from the pre-rite state.
        let mut after = applied.sealed.unwrap().manifest;
        let base = base.sealed.unwrap();
        let changes = compare(&after, &base.manifest);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "b.txt");
        after.remove("b.txt");
        assert_eq!(compute_fingerprint(&after), base.fingerprint);
    }

    #[test]
    fn undo_zero_steps_changes_nothing() {
        let (fs, rites) = memory();
        let r1 = commit(&rites, "r1", |r| {
            r.write("a.txt", "v1").unwrap();
        });
        let before = rites.head().unwrap();

        let report = undo(&rites, 0).unwrap();
        assert_eq!(report.operations_reversed, 0);
        assert_eq!(report.new_head, Some(r1.rite_id));
        assert_eq!(rites.head().unwrap(), before);
        assert_eq!(fs.read("a.txt").unwrap(), b"v1");
    }

    #[test]
    fn undo_beyond_history_fails_without_mutation() {
        let (fs, rites) = memory();
        commit(&rites, "r1", |r| {
            r.write("a.txt", "v1").unwrap();
        });
        let before = rites.head().unwrap();

        let err = undo(&rites, 2).unwrap_err();
        assert!(matches!(
            err,
            SdkError::Undo(UndoError::InsufficientHistory {
                requested: 2,
                available: 1
            })
        ));
        assert_eq!(rites.head().unwrap(), before);
        assert_eq!(fs.read("a.txt").unwrap(), b"v1");
    }

    #[test]
    fn traversal_is_rejected_for_every_mutation() {
        let (fs, rites) = memory();
        fs.write("a.txt", b"x").unwrap();
        let evil = "../../etc/passwd";
        let mut rite = rites.begin_rite("evil").unwrap();
        assert!(rite.write(evil, "x").is_err());
        assert!(rite.delete(evil).is_err());
        assert!(rite.mkdir(evil).is_err());
        assert!(rite.rmdir(evil, true).is_err());
        assert!(rite.chmod(evil, 0o777).is_err());
        assert!(rite.rename("a.txt", evil).is_err());
        assert!(rite.rename(evil, "b.txt").is_err());
        assert!(rite.ledger().is_empty());

        let report = rites.commit_rite(rite).unwrap();
        assert!(report.sealed.is_none());
        assert!(rites.head().unwrap().is_none());
    }

    #[test]
    fn simulation_records_but_never_writes() {
        let (fs, rites) = memory();
        let mut rite = rites.begin_simulation("plan").unwrap();
        rite.write("a.txt", "x").unwrap();
        rite.mkdir("pkg").unwrap();
        let report = rites.commit_rite(rite).unwrap();
        assert!(report.simulated);
        assert_eq!(report.ledger.len(), 2);
        assert!(report.sealed.is_none());
        assert!(!fs.exists("a.txt"));
        assert!(!fs.exists("pkg"));
        assert!(rites.head().unwrap().is_none());
    }

    #[test]
    fn discard_leaves_tree_and_chronicle_alone() {
        let (fs, rites) = memory();
        let mut rite = rites.begin_rite("scrap").unwrap();
        rite.write("a.txt", "x").unwrap();
        rites.discard_rite(rite).unwrap();
        assert!(!fs.exists("a.txt"));
        assert!(fs.walk_files("").unwrap().is_empty());
        assert!(rites.head().unwrap().is_none());
    }

    #[test]
    fn variables_flow_through_head_and_undo() {
        let (_, rites) = memory();
        commit(&rites, "r1", |r| r.set_var("project", Some(json!("demo"))));
        let r2 = commit(&rites, "r2", |r| {
            assert_eq!(r.variables().get("project"), Some(&json!("demo")));
            r.set_var("project", None);
            r.set_var("feature", Some(json!(true)));
        });
        let sealed = r2.sealed.unwrap();
        assert_eq!(sealed.variables.get("project"), None);
        assert_eq!(sealed.variables_delta.get("project"), Some(&json!(null)));

        undo(&rites, 1).unwrap();
        let head = rites.head().unwrap().unwrap();
        assert_eq!(head.variables.get("project"), Some(&json!("demo")));
        assert!(!head.variables.contains_key("feature"));
    }

    #[test]
    fn history_diff_and_show() {
        let (_, rites) = memory();
        let r1 = commit(&rites, "r1", |r| {
            r.write("a.txt", "v1").unwrap();
            r.write("b.txt", "b").unwrap();
        });
        let r2 = commit(&rites, "r2", |r| {
            r.write("a.txt", "v2").unwrap();
            r.delete("b.txt").unwrap();
            r.write("c.txt", "c").unwrap();
        });

        let history = rites.history(10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].rite_id, r2.rite_id);
        assert!(history[0].is_head);
        assert_eq!(history[0].changed, 2);
        assert_eq!(history[1].rite_id, r1.rite_id);
        assert_eq!(rites.history(1).unwrap().len(), 1);

        let diff = rites.diff("HEAD", "HEAD~1").unwrap();
        let statuses: Vec<(&str, DiffStatus)> =
            diff.iter().map(|d| (d.path.as_str(), d.status)).collect();
        assert_eq!(
            statuses,
            vec![
                ("c.txt", DiffStatus::Created),
                ("b.txt", DiffStatus::Deleted),
                ("a.txt", DiffStatus::Modified),
            ]
        );
        assert!(rites.diff("HEAD", "HEAD").unwrap().is_empty());

        let record = rites.show("HEAD").unwrap();
        assert_eq!(record.entry.rite_id, r2.rite_id);
        assert_eq!(record.ledger.unwrap().len(), 3);

        let diffs = rites.content_diff("HEAD").unwrap();
        let paths: Vec<&str> = diffs.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "b.txt", "c.txt"]);

        let blueprint = rites.forge_cherry_pick("HEAD").unwrap();
        assert!(blueprint.contains("c.txt"));
    }

    #[test]
    fn undone_rites_stay_inspectable() {
        let (_, rites) = memory();
        let r1 = commit(&rites, "r1", |r| {
            r.write("a.txt", "v1").unwrap();
        });
        undo(&rites, 1).unwrap();
        assert!(rites.history(10).unwrap().is_empty());
        let record = rites.show(&r1.rite_id.to_string()).unwrap();
        assert_eq!(record.entry.rite_name, "r1");
        assert!(record.ledger.is_some());
    }

    #[test]
    fn failed_mutations_block_the_commit() {
        let (fs, rites) = memory();
        fs.write("blocker", b"file").unwrap();
        let mut rite = rites.begin_rite("bad").unwrap();
        rite.write("ok.txt", "fine").unwrap();
        let result = rite.write("blocker/child.txt", "x").unwrap();
        assert!(!result.success);

        let err = rites.commit_rite(rite).unwrap_err();
        assert!(matches!(err, SdkError::Tx(TxError::RiteFailed { failures: 1 })));
        assert!(!fs.exists("ok.txt"));
        assert!(rites.head().unwrap().is_none());
    }

    #[test]
    fn patch_shell_steps_run_after_commit() {
        let fs = Arc::new(MemoryBackend::new());
        let recorder = Arc::new(Recorder::default());
        let rites = Rites::with_backend(fs.clone(), RiteConfig::default())
            .with_edict_runner(recorder.clone());
        let r1 = commit(&rites, "deps", |r| {
            r.write("package.json", "{}").unwrap();
            r.record_edict("npm install axios", vec!["npm uninstall axios".into()]);
        });

        let patch = rites.forge_reverse_patch(&r1.rite_id.to_string()).unwrap();
        let applied = rites.apply_patch(&patch).unwrap();
        assert!(!fs.exists("package.json"));
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["npm uninstall axios".to_string()]
        );
        assert_eq!(
            applied.sealed.unwrap().edicts,
            vec!["npm uninstall axios".to_string()]
        );
    }

    #[test]
    fn lock_times_out_while_a_rite_is_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RiteConfig::default();
        config.lock.timeout_ms = 50;
        let rites = Rites::open_with_config(dir.path(), config).unwrap();

        let open = rites.begin_rite("first").unwrap();
        let err = rites.begin_rite("second").err().unwrap();
        assert!(matches!(err, SdkError::Lock(_)));
        rites.discard_rite(open).unwrap();
        let again = rites.begin_rite("third").unwrap();
        rites.discard_rite(again).unwrap();
    }

    #[derive(Clone, Debug)]
    enum Step {
        Write(Vec<u8>),
        Delete,
        Chmod(u32),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            proptest::collection::vec(any::<u8>(), 0..64).prop_map(Step::Write),
            Just(Step::Delete),
            prop_oneof![Just(0o600u32), Just(0o644), Just(0o755)].prop_map(Step::Chmod),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn undo_restores_bytes_and_mode(
            initial in proptest::option::of(proptest::collection::vec(any::<u8>(), 0..64)),
            steps in proptest::collection::vec(step(), 1..8)
        ) {
            let (fs, rites) = memory();
            if let Some(data) = &initial {
                commit(&rites, "seed", |r| {
                    r.write("f.bin", data).unwrap();
                    r.chmod("f.bin", 0o640).unwrap();
                });
            }
            let before = fs.metadata("f.bin").unwrap().map(|m| m.mode);

            let mut rite = rites.begin_rite("churn").unwrap();
            for s in &steps {
                let present = rite.exists("f.bin").unwrap();
                match s {
                    Step::Write(data) => { rite.write("f.bin", data).unwrap(); }
                    Step::Delete if present => { rite.delete("f.bin").unwrap(); }
                    Step::Chmod(mode) if present => { rite.chmod("f.bin", *mode).unwrap(); }
                    _ => {}
                }
            }
            let report = rites.commit_rite(rite).unwrap();
            prop_assume!(report.sealed.is_some());

            undo(&rites, 1).unwrap();
            match &initial {
                Some(data) => {
                    prop_assert_eq!(&fs.read("f.bin").unwrap(), data);
                    prop_assert_eq!(fs.metadata("f.bin").unwrap().map(|m| m.mode), before);
                }
                None => prop_assert!(!fs.exists("f.bin")),
            }
        }
    }
}
