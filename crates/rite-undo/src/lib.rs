//! Undo engine for Rite.
//!
//! Reverses one or more completed rites by applying their ledgers' inverse
//! actions last-applied-first, then moves `HEAD` back along the chronicle
//! lineage and sweeps orphaned artifacts.
//!
//! # Key Types
//!
//! - [`Reverser`] -- Applies a single inverse action, soft-deleting through the trash
//! - [`UndoEngine`] / [`UndoState`] -- The multi-rite reversal state machine
//! - [`Confirmer`] -- Seam for interactive confirmation
//! - [`EdictRunner`] -- Seam for running shell counter-commands
//! - [`Purifier`] -- Post-undo orphan cleanup honouring a protected allow-list

pub mod confirm;
pub mod edict;
pub mod engine;
pub mod error;
pub mod purifier;
pub mod reverser;

pub use confirm::{AutoConfirm, Confirmer, Decline};
pub use edict::{EdictRunner, SystemShell};
pub use engine::{UndoEngine, UndoReport, UndoRequest, UndoState};
pub use error::{UndoError, UndoResult};
pub use purifier::Purifier;
pub use reverser::Reverser;
