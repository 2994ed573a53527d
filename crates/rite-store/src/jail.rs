use std::fmt;

use crate::error::JailError;

/// Default payload ceiling: 50 MiB.
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// A validated, root-relative path.
///
/// Always non-empty, forward-slash separated, free of `.` and `..` segments.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JailedPath(String);

impl JailedPath {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Parent directory, or `None` for a top-level entry.
    pub fn parent(&self) -> Option<&str> {
        self.0.rsplit_once('/').map(|(parent, _)| parent)
    }
}

impl fmt::Display for JailedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JailedPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Validates logical paths against the project-root boundary.
///
/// Pure: never touches the filesystem. Every mutating call runs its paths
/// through here before anything else sees them.
#[derive(Clone, Debug)]
pub struct PathJail {
    max_payload_bytes: u64,
}

impl PathJail {
    pub fn new(max_payload_bytes: u64) -> Self {
        Self { max_payload_bytes }
    }

    pub fn max_payload_bytes(&self) -> u64 {
        self.max_payload_bytes
    }

    /// Validate and normalize a logical path.
    pub fn validate(&self, logical: &str) -> Result<JailedPath, JailError> {
        let normalized = normalize(logical)?;
        if normalized.is_empty() {
            return Err(JailError::EmptyPath);
        }
        Ok(JailedPath(normalized))
    }

    /// Reject payloads above the configured ceiling.
    pub fn check_quota(&self, size: u64) -> Result<(), JailError> {
        check_quota(size, self.max_payload_bytes)
    }
}

impl Default for PathJail {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_BYTES)
    }
}

/// Fail with `QuotaExceeded` when `size` is above `limit`.
pub fn check_quota(size: u64, limit: u64) -> Result<(), JailError> {
    if size > limit {
        return Err(JailError::QuotaExceeded { size, limit });
    }
    Ok(())
}

/// Normalize a logical path to its root-relative form.
///
/// Accepts `\` as a separator, strips a leading `./` and empty segments, and
/// returns an empty string for the root itself. Backends use this directly;
/// callers that must name a real entry go through [`PathJail::validate`].
pub fn normalize(logical: &str) -> Result<String, JailError> {
    if logical.contains('\0') {
        return Err(JailError::InvalidCharacter {
            path: logical.to_string(),
        });
    }

    let unified = logical.replace('\\', "/");
    if unified.starts_with('/') || has_drive_prefix(&unified) {
        return Err(JailError::AbsolutePath {
            path: logical.to_string(),
        });
    }

    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(JailError::PathTraversal {
                    path: logical.to_string(),
                })
            }
            other => segments.push(other),
        }
    }
    Ok(segments.join("/"))
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Join two normalized relative paths.
pub fn join(base: &str, rest: &str) -> String {
    match (base.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base}/{rest}"),
    }
}

/// Parent of a normalized relative path; `""` for top-level entries.
pub fn parent(path: &str) -> &str {
    path.rsplit_once('/').map(|(p, _)| p).unwrap_or("")
}

/// Every proper ancestor of a normalized path, shallowest first.
pub fn ancestors(path: &str) -> Vec<&str> {
    path.match_indices('/').map(|(i, _)| &path[..i]).collect()
}

/// Whether `path` equals `prefix` or lies beneath it.
pub fn is_within(path: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || path == prefix
        || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/'))
}
