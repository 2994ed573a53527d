use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use rite_ledger::{Chronicle, ChronicleEntry, ControlLayout, TrashStore};
use rite_store::FilesystemBackend;
use rite_types::RiteId;

use crate::confirm::Confirmer;
use crate::edict::EdictRunner;
use crate::error::{UndoError, UndoResult};
use crate::purifier::Purifier;
use crate::reverser::Reverser;

// ---------------------------------------------------------------------------
// Request / report
// ---------------------------------------------------------------------------

/// What to undo and how strictly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UndoRequest {
    /// Number of most recent rites to reverse.
    pub steps: usize,
    /// Skip rites without a ledger and keep going past failed entries.
    pub force: bool,
    /// Never ask for confirmation.
    pub non_interactive: bool,
}

impl UndoRequest {
    pub fn steps(steps: usize) -> Self {
        Self {
            steps,
            ..Self::default()
        }
    }
}

/// Outcome of an undo run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UndoReport {
    /// Rites whose ledgers were walked, newest first.
    pub reversed_rites: Vec<RiteId>,
    /// Rites skipped for lack of a ledger (`force` only).
    pub skipped_rites: Vec<RiteId>,
    pub operations_reversed: usize,
    pub failures: usize,
    pub orphans_purged: usize,
    /// The caller declined at the confirmation step.
    pub declined: bool,
    /// `HEAD` after the run; `None` is Genesis.
    pub new_head: Option<RiteId>,
}

// ---------------------------------------------------------------------------
// UndoEngine
// ---------------------------------------------------------------------------

/// Lifecycle of one undo run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UndoState {
    Idle,
    TimelineLoaded,
    Confirmed,
    Reversing,
    Finalizing,
    Done,
    Aborted,
}

/// Reverses the most recent rites of a project.
///
/// Rites are reversed newest first; within a rite, entries are reversed
/// last-applied-first, since a later operation may depend physically on an
/// earlier one. Afterwards `HEAD` moves to the state before the oldest
/// reversed rite and the [`Purifier`] sweeps around everything touched,
/// dropping directories only those rites created.
pub struct UndoEngine {
    chronicle: Chronicle,
    trash: TrashStore,
    reverser: Reverser,
    purifier: Purifier,
    state: UndoState,
}

impl UndoEngine {
    /// `protected` extends the cleanup allow-list; the control directory and
    /// `.git` are always protected.
    pub fn new(
        backend: Arc<dyn FilesystemBackend>,
        layout: ControlLayout,
        edicts: Arc<dyn EdictRunner>,
        protected: Vec<String>,
    ) -> Self {
        let trash = TrashStore::new(backend.clone(), layout.clone());
        let mut allow = vec![
            layout.control_dir().to_string(),
            ".git".to_string(),
            layout.lockfile().to_string(),
        ];
        allow.extend(protected);
        Self {
            chronicle: Chronicle::new(backend.clone(), layout),
            reverser: Reverser::new(backend.clone(), trash.clone(), edicts),
            purifier: Purifier::new(backend, allow),
            trash,
            state: UndoState::Idle,
        }
    }

    pub fn state(&self) -> UndoState {
        self.state
    }

    /// Run one undo.
    ///
    /// `steps == 0` is a no-op. Asking for more rites than the lineage holds
    /// fails with [`UndoError::InsufficientHistory`] before anything changes.
    pub fn run(&mut self, request: UndoRequest, confirmer: &dyn Confirmer) -> UndoResult<UndoReport> {
        self.state = UndoState::Idle;
        if request.steps == 0 {
            self.state = UndoState::Done;
            return Ok(UndoReport {
                new_head: self.chronicle.head()?.map(|h| h.rite_id),
                ..UndoReport::default()
            });
        }

        let timeline = self.chronicle.timeline()?;
        self.state = UndoState::TimelineLoaded;
        if request.steps > timeline.len() {
            self.state = UndoState::Aborted;
            return Err(UndoError::InsufficientHistory {
                requested: request.steps,
                available: timeline.len(),
            });
        }
        let selected = &timeline[..request.steps];
        let restore_to = timeline.get(request.steps);

        let auto = request.force || request.non_interactive;
        if !auto && !confirmer.confirm(selected) {
            info!(steps = request.steps, "undo declined");
            self.state = UndoState::Done;
            return Ok(UndoReport {
                declined: true,
                new_head: selected.first().map(|h| h.rite_id),
                ..UndoReport::default()
            });
        }
        self.state = UndoState::Confirmed;

        let mut report = UndoReport::default();
        let mut touched = BTreeSet::new();
        let mut created = BTreeSet::new();
        self.state = UndoState::Reversing;
        for rite in selected {
            match self.reverse_rite(rite, request.force, &mut report, &mut touched, &mut created) {
                Ok(()) => {}
                Err(e) => {
                    self.state = UndoState::Aborted;
                    return Err(e);
                }
            }
        }

        self.state = UndoState::Finalizing;
        if let Err(e) = self.finalize(restore_to, &touched, &created, &mut report) {
            self.state = UndoState::Aborted;
            return Err(e);
        }
        self.state = UndoState::Done;
        info!(
            rites = report.reversed_rites.len(),
            operations = report.operations_reversed,
            failures = report.failures,
            purged = report.orphans_purged,
            "undo complete"
        );
        Ok(report)
    }

    fn reverse_rite(
        &self,
        rite: &ChronicleEntry,
        force: bool,
        report: &mut UndoReport,
        touched: &mut BTreeSet<String>,
        created: &mut BTreeSet<String>,
    ) -> UndoResult<()> {
        let loaded = match self.trash.load_ledger(&rite.rite_id) {
            Ok(ledger) => ledger,
            Err(e) if force => {
                warn!(rite_id = %rite.rite_id, error = %e, "unreadable ledger; skipping rite");
                None
            }
            Err(e) => return Err(e.into()),
        };
        let Some(ledger) = loaded else {
            if !force {
                return Err(UndoError::LedgerMissing {
                    rite_id: rite.rite_id,
                });
            }
            warn!(rite_id = %rite.rite_id, rite = %rite.rite_name, "no ledger; skipping rite");
            report.skipped_rites.push(rite.rite_id);
            return Ok(());
        };

        info!(rite_id = %rite.rite_id, rite = %rite.rite_name, entries = ledger.len(), "reversing rite");
        for entry in ledger.entries.iter().rev() {
            let Some(inverse) = entry.usable_inverse() else {
                continue;
            };
            match self.reverser.reverse(&rite.rite_id, entry, inverse) {
                Ok(()) => report.operations_reversed += 1,
                Err(e) => {
                    error!(
                        rite_id = %rite.rite_id,
                        entry_id = %entry.id,
                        op = %entry.operation(),
                        error = %e,
                        "reversal failed"
                    );
                    report.failures += 1;
                    if !force {
                        return Err(UndoError::ReversalFailed {
                            rite_id: rite.rite_id,
                            entry_id: entry.id.to_string(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
        touched.extend(ledger.touched_paths());
        created.extend(ledger.dirs_created());
        report.reversed_rites.push(rite.rite_id);
        Ok(())
    }

    fn finalize(
        &self,
        restore_to: Option<&ChronicleEntry>,
        touched: &BTreeSet<String>,
        created: &BTreeSet<String>,
        report: &mut UndoReport,
    ) -> UndoResult<()> {
        self.chronicle.set_head(restore_to)?;
        report.new_head = restore_to.map(|e| e.rite_id);
        match restore_to {
            Some(head) => info!(rite_id = %head.rite_id, rite = %head.rite_name, "HEAD restored"),
            None => info!("HEAD returned to genesis"),
        }
        report.orphans_purged = self.purifier.purify(touched, created)?;
        Ok(())
    }
}
