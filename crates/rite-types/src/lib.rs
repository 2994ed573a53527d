//! Foundation types for Rite, the transactional file-mutation core.
//!
//! Every other `rite-*` crate depends on this one. It holds the closed set of
//! operations a rite can perform, the inverse actions recorded next to them,
//! and the value types shared by the ledger, the chronicle and the differ.
//!
//! # Key Types
//!
//! - [`Operation`] / [`OperationKind`] -- Tagged union of forward operations
//! - [`InverseAction`] / [`Payload`] -- The recorded undo of one operation
//! - [`RiteId`] / [`EntryId`] -- UUID v7 identifiers for rites and ledger entries
//! - [`ContentHash`] -- SHA-256 of file content, as stored in manifests
//! - [`Digest`] -- 32-byte fingerprint (Merkle root) of a manifest
//! - [`Manifest`] / [`ManifestEntry`] / [`EntryAction`] -- Point-in-time project state

pub mod bytes;
pub mod digest;
pub mod error;
pub mod id;
pub mod manifest;
pub mod operation;

pub use digest::{ContentHash, Digest};
pub use error::TypeError;
pub use id::{EntryId, RiteId};
pub use manifest::{EntryAction, Manifest, ManifestEntry};
pub use operation::{InverseAction, Operation, OperationKind, Payload};
