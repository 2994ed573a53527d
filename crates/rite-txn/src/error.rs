use std::path::PathBuf;

use rite_ledger::LedgerError;
use rite_store::{JailError, StoreError};

/// Errors from the advisory writer lock.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("timed out after {waited_ms}ms waiting for {} (held by {})", .path.display(), .owner.as_deref().unwrap_or("unknown owner"))]
    Timeout {
        path: PathBuf,
        waited_ms: u64,
        owner: Option<String>,
    },

    #[error("lock I/O on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from rite execution and transaction commit.
#[derive(Debug, thiserror::Error)]
pub enum TxError {
    /// The path or payload was refused before any I/O.
    #[error(transparent)]
    Jail(#[from] JailError),

    #[error("{0} is reserved for rite bookkeeping")]
    ReservedPath(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    /// One or more staged mutations failed during the rite.
    #[error("rite recorded {failures} failed operation(s)")]
    RiteFailed { failures: usize },

    /// Commit moved some staged paths into place and then stopped. Paths not
    /// yet moved remain under `staging_root`.
    #[error("materialization stopped at {failed_path} after moving {} path(s), {remaining} remaining: {reason}", .moved.len())]
    MaterializationPartial {
        moved: Vec<String>,
        failed_path: String,
        remaining: usize,
        staging_root: String,
        reason: String,
    },
}

/// Result alias for transaction operations.
pub type TxResult<T> = Result<T, TxError>;
