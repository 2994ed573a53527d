//! Error types for the diff crate.

/// Errors that can occur while forging or parsing patches.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// A `WriteFile` inverse references bytes the entry does not carry.
    #[error("entry {entry_id} restores {path} but carries no snapshot")]
    MissingSnapshot { entry_id: String, path: String },

    /// Patch text could not be parsed.
    #[error("patch line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
