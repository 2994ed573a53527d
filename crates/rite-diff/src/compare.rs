//! Manifest comparison: which tracked paths were created, deleted or modified.

use serde::Serialize;

use rite_types::{Manifest, ManifestEntry};

/// How a path differs between two manifests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    Created,
    Deleted,
    Modified,
}

/// A single path-level difference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DiffRecord {
    pub path: String,
    pub status: DiffStatus,
    /// Entry in the baseline manifest (absent for created paths).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<ManifestEntry>,
    /// Entry in the newer manifest (absent for deleted paths).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<ManifestEntry>,
}

/// Compare `newer` against `baseline`.
///
/// Paths only in `newer` are created, paths only in `baseline` are deleted,
/// and shared paths whose content hash differs are modified. Records come in
/// three buckets (created, deleted, modified), each sorted by path.
pub fn compare(newer: &Manifest, baseline: &Manifest) -> Vec<DiffRecord> {
    let mut created = Vec::new();
    let mut modified = Vec::new();
    for (path, entry) in newer.iter() {
        match baseline.get(path) {
            None => created.push(DiffRecord {
                path: path.clone(),
                status: DiffStatus::Created,
                old: None,
                new: Some(entry.clone()),
            }),
            Some(old) if old.sha256 != entry.sha256 => modified.push(DiffRecord {
                path: path.clone(),
                status: DiffStatus::Modified,
                old: Some(old.clone()),
                new: Some(entry.clone()),
            }),
            Some(_) => {}
        }
    }
    let deleted = baseline
        .iter()
        .filter(|(path, _)| !newer.contains(path))
        .map(|(path, entry)| DiffRecord {
            path: path.clone(),
            status: DiffStatus::Deleted,
            old: Some(entry.clone()),
            new: None,
        });

    // Manifest iteration is already path-ordered, so each bucket is sorted.
    created.into_iter().chain(deleted).chain(modified).collect()
}
