//! High-level SDK for Rite.
//!
//! [`Rites`] is the entry point for applications embedding the core: it opens
//! rites over a project root, commits them into the chronicle, undoes them,
//! and forges diffs and patches from the recorded history.

pub mod config;
pub mod error;
pub mod rites;
pub mod seal;
pub mod summary;

pub use config::{LockConfig, RetryConfig, RiteConfig};
pub use error::{SdkError, SdkResult};
pub use rites::Rites;
pub use summary::{CommitReport, RiteRecord, RiteSummary};

// Re-export key types
pub use rite_diff::{DiffLine, DiffRecord, DiffStatus, FileDiff, ReversePatch};
pub use rite_ledger::{ChronicleEntry, RiteLedger, TrashItem};
pub use rite_store::{FilesystemBackend, LocalBackend, MemoryBackend};
pub use rite_txn::{Rite, WriteAction, WriteResult};
pub use rite_types::{Manifest, RiteId};
pub use rite_undo::{AutoConfirm, Confirmer, Decline, EdictRunner, UndoReport, UndoRequest};
