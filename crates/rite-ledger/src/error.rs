use rite_store::StoreError;

/// Errors produced by ledger, trash and chronicle operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt record {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("no rite matches {0:?}")]
    UnknownRite(String),

    #[error("{reference:?} matches {candidates} rites; use a longer prefix")]
    AmbiguousRite { reference: String, candidates: usize },
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
