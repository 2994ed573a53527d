use thiserror::Error;

use rite_types::RiteId;

/// SDK-level errors.
#[derive(Debug, Error)]
pub enum SdkError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no chronicle entry for rite {0}")]
    RiteNotFound(RiteId),

    #[error("no ledger recorded for rite {0}")]
    LedgerMissing(RiteId),

    #[error("store error: {0}")]
    Store(#[from] rite_store::StoreError),

    #[error("ledger error: {0}")]
    Ledger(#[from] rite_ledger::LedgerError),

    #[error("transaction error: {0}")]
    Tx(#[from] rite_txn::TxError),

    #[error("lock error: {0}")]
    Lock(#[from] rite_txn::LockError),

    #[error("diff error: {0}")]
    Diff(#[from] rite_diff::DiffError),

    #[error("undo error: {0}")]
    Undo(#[from] rite_undo::UndoError),
}

pub type SdkResult<T> = Result<T, SdkError>;
