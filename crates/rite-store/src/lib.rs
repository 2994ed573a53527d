//! Filesystem backends for Rite.
//!
//! Every byte a rite writes, deletes or relocates goes through a
//! [`FilesystemBackend`]. Backends address files by root-relative,
//! forward-slash paths and refuse anything that would escape the root.
//!
//! # Key Types
//!
//! - [`PathJail`] / [`JailedPath`] -- Pure path validation and payload quota
//! - [`RetryPolicy`] -- Bounded exponential backoff for transient OS errors
//! - [`FilesystemBackend`] -- The backend trait
//! - [`LocalBackend`] -- Real disk, atomic temp-file-and-rename writes
//! - [`MemoryBackend`] -- Tree-structured in-memory filesystem for tests and embedding
//!
//! # Design Rules
//!
//! 1. Paths are validated before any I/O; validation failures never retry.
//! 2. A write is observed either fully old or fully new, never partial.
//! 3. Transient errors are retried locally; everything else surfaces at once.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod jail;
pub mod local;
pub mod memory;
pub mod retry;
pub mod traits;

pub use error::{JailError, StoreError, StoreResult};
pub use jail::{JailedPath, PathJail};
pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use retry::RetryPolicy;
pub use traits::{FileMeta, FilesystemBackend};
