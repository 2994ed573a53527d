use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use rite_store::FilesystemBackend;
use rite_types::{Digest, Manifest, RiteId};

use crate::error::{LedgerError, LedgerResult};
use crate::layout::ControlLayout;

/// Snapshot of project state sealed at the end of a rite.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChronicleEntry {
    pub rite_id: RiteId,
    pub rite_name: String,
    /// Monotonic across the whole project, including undone rites.
    pub sequence: u64,
    /// The rite that was `HEAD` when this one was sealed.
    pub parent: Option<RiteId>,
    pub timestamp: DateTime<Utc>,
    pub manifest: Manifest,
    /// Full variable state after the rite.
    #[serde(default)]
    pub variables: BTreeMap<String, serde_json::Value>,
    /// Variables this rite set (`null` for unset).
    #[serde(default)]
    pub variables_delta: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub edicts: Vec<String>,
    pub fingerprint: Digest,
    /// Number of ledger entries the rite recorded.
    #[serde(default)]
    pub operations: usize,
}

/// Ordered history of sealed rites plus the live `HEAD` lockfile.
///
/// Archived entries are append-only: undoing a rite moves `HEAD` back along
/// the lineage but leaves the undone rite's snapshot in place, detached.
#[derive(Clone)]
pub struct Chronicle {
    backend: Arc<dyn FilesystemBackend>,
    layout: ControlLayout,
}

impl Chronicle {
    pub fn new(backend: Arc<dyn FilesystemBackend>, layout: ControlLayout) -> Self {
        Self { backend, layout }
    }

    /// The live state, or `None` at Genesis.
    pub fn head(&self) -> LedgerResult<Option<ChronicleEntry>> {
        let path = self.layout.lockfile();
        match self.backend.read(path) {
            Ok(data) => decode(path, &data).map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Archive a sealed rite and make it the new `HEAD`.
    pub fn seal(&self, entry: &ChronicleEntry) -> LedgerResult<()> {
        let path = self.layout.chronicle_file(entry.sequence, &entry.rite_id);
        self.backend.write(&path, &encode(entry)?)?;
        self.set_head(Some(entry))?;
        info!(
            rite_id = %entry.rite_id,
            rite = %entry.rite_name,
            sequence = entry.sequence,
            fingerprint = %entry.fingerprint.short_hex(),
            "sealed rite"
        );
        Ok(())
    }

    /// Replace the live lockfile, or delete it to return to Genesis.
    pub fn set_head(&self, entry: Option<&ChronicleEntry>) -> LedgerResult<()> {
        let path = self.layout.lockfile();
        match entry {
            Some(entry) => {
                self.backend.write(path, &encode(entry)?)?;
                debug!(rite_id = %entry.rite_id, "HEAD updated");
            }
            None => {
                if self.backend.exists(path) {
                    self.backend.delete(path)?;
                }
                debug!("HEAD reset to genesis");
            }
        }
        Ok(())
    }

    /// Every archived entry, newest first (timestamp, then sequence).
    pub fn entries(&self) -> LedgerResult<Vec<ChronicleEntry>> {
        let dir = self.layout.chronicles_dir();
        if !self.backend.is_dir(&dir) {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for name in self.backend.list_dir(&dir)? {
            if !name.ends_with(".lock") {
                continue;
            }
            let path = format!("{dir}/{name}");
            let data = self.backend.read(&path)?;
            entries.push(decode(&path, &data)?);
        }
        sort_newest_first(&mut entries);
        Ok(entries)
    }

    /// The archived entry for one rite.
    pub fn load(&self, rite_id: &RiteId) -> LedgerResult<Option<ChronicleEntry>> {
        let dir = self.layout.chronicles_dir();
        if !self.backend.is_dir(&dir) {
            return Ok(None);
        }
        let suffix = format!("-{rite_id}.lock");
        match self
            .backend
            .list_dir(&dir)?
            .into_iter()
            .find(|name| name.ends_with(&suffix))
        {
            Some(name) => {
                let path = format!("{dir}/{name}");
                let data = self.backend.read(&path)?;
                decode(&path, &data).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Rites reachable from `HEAD` through parent links, newest first.
    ///
    /// These are the undo candidates. The lockfile itself is never part of
    /// the list.
    pub fn timeline(&self) -> LedgerResult<Vec<ChronicleEntry>> {
        let mut lineage = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = self.head()?.map(|head| head.rite_id);
        while let Some(id) = cursor {
            if !seen.insert(id) {
                warn!(rite_id = %id, "cycle in chronicle lineage");
                break;
            }
            match self.load(&id)? {
                Some(entry) => {
                    cursor = entry.parent;
                    lineage.push(entry);
                }
                None => {
                    warn!(rite_id = %id, "chronicle lineage references a missing snapshot");
                    break;
                }
            }
        }
        sort_newest_first(&mut lineage);
        Ok(lineage)
    }

    /// Sequence number for the next sealed rite.
    pub fn next_sequence(&self) -> LedgerResult<u64> {
        Ok(self
            .entries()?
            .iter()
            .map(|e| e.sequence)
            .max()
            .map_or(1, |max| max + 1))
    }

    /// Resolve `HEAD`, `HEAD~N`, or a (prefix of a) rite id.
    pub fn resolve(&self, reference: &str) -> LedgerResult<RiteId> {
        let reference = reference.trim();
        if let Some(rest) = reference.strip_prefix("HEAD") {
            let back: usize = match rest.strip_prefix('~') {
                Some(n) => n
                    .parse()
                    .map_err(|_| LedgerError::UnknownRite(reference.to_string()))?,
                None if rest.is_empty() => 0,
                None => return Err(LedgerError::UnknownRite(reference.to_string())),
            };
            return self
                .timeline()?
                .get(back)
                .map(|e| e.rite_id)
                .ok_or_else(|| LedgerError::UnknownRite(reference.to_string()));
        }

        let matches: Vec<RiteId> = self
            .entries()?
            .into_iter()
            .map(|e| e.rite_id)
            .filter(|id| id.matches_prefix(reference))
            .collect();
        match matches.as_slice() {
            [id] => Ok(*id),
            [] => Err(LedgerError::UnknownRite(reference.to_string())),
            many => Err(LedgerError::AmbiguousRite {
                reference: reference.to_string(),
                candidates: many.len(),
            }),
        }
    }
}

fn sort_newest_first(entries: &mut [ChronicleEntry]) {
    entries.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then(b.sequence.cmp(&a.sequence))
    });
}

fn encode(entry: &ChronicleEntry) -> LedgerResult<Vec<u8>> {
    let mut json =
        serde_json::to_vec_pretty(entry).map_err(|e| LedgerError::Serialization(e.to_string()))?;
    json.push(b'\n');
    Ok(json)
}

fn decode(path: &str, data: &[u8]) -> LedgerResult<ChronicleEntry> {
    serde_json::from_slice(data).map_err(|e| LedgerError::Corrupt {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use rite_store::MemoryBackend;

    use super::*;

    fn chronicle() -> (Arc<MemoryBackend>, Chronicle) {
        let backend = Arc::new(MemoryBackend::new());
        let chronicle = Chronicle::new(backend.clone(), ControlLayout::default());
        (backend, chronicle)
    }

    fn entry(sequence: u64, parent: Option<RiteId>) -> ChronicleEntry {
        ChronicleEntry {
            rite_id: RiteId::new(),
            rite_name: format!("rite-{sequence}"),
            sequence,
            parent,
            timestamp: Utc::now(),
            manifest: Manifest::new(),
            variables: BTreeMap::new(),
            variables_delta: BTreeMap::new(),
            edicts: Vec::new(),
            fingerprint: Digest::null(),
            operations: 0,
        }
    }

    #[test]
    fn genesis_has_no_head() {
        let (_fs, chronicle) = chronicle();
        assert!(chronicle.head().unwrap().is_none());
        assert!(chronicle.timeline().unwrap().is_empty());
        assert_eq!(chronicle.next_sequence().unwrap(), 1);
    }

    #[test]
    fn seal_archives_and_moves_head() {
        let (fs, chronicle) = chronicle();
        let first = entry(1, None);
        chronicle.seal(&first).unwrap();

        assert!(fs.exists("scaffold.lock"));
        assert_eq!(chronicle.head().unwrap().unwrap().rite_id, first.rite_id);
        assert_eq!(chronicle.load(&first.rite_id).unwrap(), Some(first));
        assert_eq!(chronicle.next_sequence().unwrap(), 2);
    }

    #[test]
    fn timeline_follows_lineage_newest_first() {
        let (_fs, chronicle) = chronicle();
        let r1 = entry(1, None);
        let r2 = entry(2, Some(r1.rite_id));
        let r3 = entry(3, Some(r2.rite_id));
        for e in [&r1, &r2, &r3] {
            chronicle.seal(e).unwrap();
        }
        let ids: Vec<_> = chronicle.timeline().unwrap().iter().map(|e| e.rite_id).collect();
        assert_eq!(ids, vec![r3.rite_id, r2.rite_id, r1.rite_id]);
    }

    #[test]
    fn detached_rites_leave_the_timeline_but_stay_archived() {
        let (_fs, chronicle) = chronicle();
        let r1 = entry(1, None);
        let r2 = entry(2, Some(r1.rite_id));
        chronicle.seal(&r1).unwrap();
        chronicle.seal(&r2).unwrap();

        chronicle.set_head(Some(&r1)).unwrap();
        assert_eq!(chronicle.timeline().unwrap().len(), 1);
        assert_eq!(chronicle.entries().unwrap().len(), 2);

        chronicle.set_head(None).unwrap();
        assert!(chronicle.head().unwrap().is_none());
        assert!(chronicle.timeline().unwrap().is_empty());
    }

    #[test]
    fn resolve_by_head_offset_and_prefix() {
        let (_fs, chronicle) = chronicle();
        let r1 = entry(1, None);
        let r2 = entry(2, Some(r1.rite_id));
        chronicle.seal(&r1).unwrap();
        chronicle.seal(&r2).unwrap();

        assert_eq!(chronicle.resolve("HEAD").unwrap(), r2.rite_id);
        assert_eq!(chronicle.resolve("HEAD~1").unwrap(), r1.rite_id);
        assert_eq!(chronicle.resolve(&r1.rite_id.to_string()).unwrap(), r1.rite_id);
        assert!(matches!(
            chronicle.resolve("HEAD~5"),
            Err(LedgerError::UnknownRite(_))
        ));
        assert!(matches!(
            chronicle.resolve("zzzz"),
            Err(LedgerError::UnknownRite(_))
        ));
    }
}
