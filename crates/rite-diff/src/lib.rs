//! Differ for Rite.
//!
//! Turns manifests and ledger history into comparisons and replayable
//! artifacts. Nothing in this crate mutates a project.
//!
//! # Key Types
//!
//! - [`DiffRecord`] / [`DiffStatus`] -- Path-level manifest comparison
//! - [`compute_fingerprint`] -- Order-independent Merkle fingerprint of a manifest
//! - [`ReversePatch`] -- Structured inverse of a rite that renders to text and parses back
//! - [`forge_cherry_pick`] -- Blueprint replaying a rite's intent elsewhere
//! - [`BlobDiff`] / [`FileDiff`] -- Line-level content diffs

pub mod blob_diff;
pub mod blueprint;
pub mod compare;
pub mod error;
pub mod fingerprint;
pub mod patch;

pub use blob_diff::{content_diff, diff_blobs, BlobDiff, DiffHunk, DiffLine, FileDiff};
pub use blueprint::forge_cherry_pick;
pub use compare::{compare, DiffRecord, DiffStatus};
pub use error::{DiffError, DiffResult};
pub use fingerprint::compute_fingerprint;
pub use patch::{PatchBlock, PostRun, ReversePatch};
