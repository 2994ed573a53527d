use std::io;

/// Pre-flight path and payload validation failures.
///
/// These are policy blocks: raised before any I/O and never retried.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum JailError {
    /// The path contains a `..` segment.
    #[error("path traversal rejected: {path}")]
    PathTraversal { path: String },

    /// The path is rooted or drive-qualified.
    #[error("absolute path rejected: {path}")]
    AbsolutePath { path: String },

    /// The path names the root itself (or nothing at all).
    #[error("empty path")]
    EmptyPath,

    /// The path contains a NUL byte or another character no backend accepts.
    #[error("invalid character in path: {path:?}")]
    InvalidCharacter { path: String },

    /// The payload exceeds the configured byte ceiling.
    #[error("payload of {size} bytes exceeds the {limit}-byte quota")]
    QuotaExceeded { size: u64, limit: u64 },

    /// The resolved location lies outside the root (symlink or race escape).
    #[error("resolved path escapes the root: {path}")]
    OutsideRoot { path: String },
}

/// Errors from backend operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Jail(#[from] JailError),

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

    /// A transient error that persisted through every retry attempt.
    #[error("{op} {path} failed after {attempts} attempts: {source}")]
    Transient {
        op: &'static str,
        path: String,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    /// A non-transient I/O failure.
    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    /// Whether this error means the target was simply absent.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io { source, .. } | Self::Transient { source, .. } => {
                source.kind() == io::ErrorKind::NotFound
            }
            _ => false,
        }
    }
}

/// Result alias for backend operations.
pub type StoreResult<T> = Result<T, StoreError>;
