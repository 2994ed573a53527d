use rite_ledger::LedgerError;
use rite_store::StoreError;
use rite_types::RiteId;

/// Errors raised while undoing rites.
#[derive(Debug, thiserror::Error)]
pub enum UndoError {
    #[error("cannot undo {requested} rite(s): only {available} recorded")]
    InsufficientHistory { requested: usize, available: usize },

    #[error("no ledger recorded for rite {rite_id}")]
    LedgerMissing { rite_id: RiteId },

    #[error("reversal of entry {entry_id} in rite {rite_id} failed: {reason}")]
    ReversalFailed {
        rite_id: RiteId,
        entry_id: String,
        reason: String,
    },

    #[error("entry {entry_id} restores {path} but carries no snapshot")]
    MissingSnapshot { entry_id: String, path: String },

    #[error("edict `{command}` failed: {reason}")]
    EdictFailed { command: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub type UndoResult<T> = Result<T, UndoError>;
