//! Staging transactions for Rite.
//!
//! A rite buffers its writes in a staging area under the control directory.
//! Every mutation is jail-checked, snapshotted and ledgered before it is
//! staged; commit moves the staged tree into place, discard throws it away.
//!
//! # Key Types
//!
//! - [`StagingTree`] -- Overlay keyed by path components, walked parents-first
//! - [`StagingTransaction`] -- Owns one staging root; resolves, stages, materializes
//! - [`Rite`] -- The write paths (`mkdir`, `write`, `delete`, `rmdir`, `chmod`, ...)
//! - [`WriteResult`] -- Outcome of one mutation
//! - [`RiteLock`] -- Cross-process advisory lock held for the life of a rite

pub mod conductor;
pub mod error;
pub mod lock;
pub mod staging;
pub mod tree;

pub use conductor::{Rite, RiteOptions, RiteParts, WriteAction, WriteResult};
pub use error::{LockError, TxError, TxResult};
pub use lock::{LockOwner, RiteLock};
pub use staging::{MaterializeReport, StagingTransaction};
pub use tree::{Lookup, NodeState, StagedNode, StagingTree};
