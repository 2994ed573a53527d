//! Durable history for Rite.
//!
//! This crate records what a rite did and keeps enough of the past around to
//! undo it:
//! - [`LedgerEntry`] / [`RiteLedger`] records pairing each forward operation
//!   with its inverse and pre-image snapshot
//! - [`Ledger`], the append-only builder threaded through one rite
//! - [`TrashStore`], the rite-scoped soft-delete area that also persists ledgers
//! - [`Chronicle`], the lineage of sealed rites and the live `HEAD` lockfile
//! - [`ControlLayout`], where all of the above live under the control directory

pub mod chronicle;
pub mod error;
pub mod layout;
pub mod ledger;
pub mod records;
pub mod trash;

pub use chronicle::{Chronicle, ChronicleEntry};
pub use error::{LedgerError, LedgerResult};
pub use layout::ControlLayout;
pub use ledger::Ledger;
pub use records::{LedgerEntry, RiteLedger, SnapshotMetadata};
pub use trash::{TrashItem, TrashStore};
