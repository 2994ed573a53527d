use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::digest::ContentHash;

/// How a manifest entry came to be in its current state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryAction {
    Created,
    Modified,
    Moved,
    /// Carried over from the previous state untouched.
    Unchanged,
}

impl EntryAction {
    /// Whether a rite actively produced this entry.
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// A tracked file in a [`Manifest`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub sha256: ContentHash,
    pub bytes: u64,
    pub action: EntryAction,
}

impl ManifestEntry {
    pub fn for_content(data: &[u8], action: EntryAction) -> Self {
        Self {
            sha256: ContentHash::of(data),
            bytes: data.len() as u64,
            action,
        }
    }
}

/// Point-in-time project state: tracked path to content hash and size.
///
/// Keys are root-relative, forward-slash paths kept in sorted order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, entry: ManifestEntry) -> Option<ManifestEntry> {
        self.entries.insert(path.into(), entry)
    }

    pub fn remove(&mut self, path: &str) -> Option<ManifestEntry> {
        self.entries.remove(path)
    }

    /// Remove `prefix` and everything beneath it. Returns how many entries went.
    pub fn remove_prefix(&mut self, prefix: &str) -> usize {
        let nested = format!("{}/", prefix.trim_end_matches('/'));
        let before = self.entries.len();
        self.entries
            .retain(|path, _| path != prefix && !path.starts_with(&nested));
        before - self.entries.len()
    }

    pub fn get(&self, path: &str) -> Option<&ManifestEntry> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ManifestEntry)> {
        self.entries.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The same tracked content with every entry marked `unchanged`.
    pub fn carried_over(&self) -> Self {
        let entries = self
            .entries
            .iter()
            .map(|(path, entry)| {
                (
                    path.clone(),
                    ManifestEntry {
                        action: EntryAction::Unchanged,
                        ..entry.clone()
                    },
                )
            })
            .collect();
        Self { entries }
    }
}

impl FromIterator<(String, ManifestEntry)> for Manifest {
    fn from_iter<I: IntoIterator<Item = (String, ManifestEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(data: &[u8]) -> ManifestEntry {
        ManifestEntry::for_content(data, EntryAction::Created)
    }

    #[test]
    fn remove_prefix_only_takes_nested_paths() {
        let mut m = Manifest::new();
        m.insert("pkg/a.txt", entry(b"a"));
        m.insert("pkg/sub/b.txt", entry(b"b"));
        m.insert("pkgs.txt", entry(b"c"));

        assert_eq!(m.remove_prefix("pkg"), 2);
        assert_eq!(m.paths().collect::<Vec<_>>(), vec!["pkgs.txt"]);
    }

    #[test]
    fn carried_over_keeps_hashes() {
        let mut m = Manifest::new();
        m.insert("a.txt", entry(b"v1"));
        let carried = m.carried_over();
        let e = carried.get("a.txt").unwrap();
        assert_eq!(e.action, EntryAction::Unchanged);
        assert_eq!(e.sha256, ContentHash::of(b"v1"));
        assert_eq!(e.bytes, 2);
    }

    #[test]
    fn serializes_as_plain_map() {
        let mut m = Manifest::new();
        m.insert("a.txt", entry(b"v1"));
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["a.txt"]["action"], "created");
        assert_eq!(json["a.txt"]["bytes"], 2);
    }
}
