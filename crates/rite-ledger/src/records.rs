use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rite_types::{EntryId, InverseAction, Operation, OperationKind, Payload, RiteId};

/// Mode and modification time of a pre-image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub mode: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<DateTime<Utc>>,
}

/// One atomic ledger record.
///
/// If `snapshot_content` is present the entry overwrote (or removed) existing
/// bytes and its inverse rewrites them. If absent and the target did not
/// pre-exist, the inverse deletes the created path. Entries are immutable once
/// appended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub forward: Operation,
    pub inverse: Option<InverseAction>,
    #[serde(
        with = "rite_types::bytes::base64_opt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub snapshot_content: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_metadata: Option<SnapshotMetadata>,
    pub reversible: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl LedgerEntry {
    /// A fresh entry with no inverse; not reversible until one is attached.
    pub fn new(actor: impl Into<String>, forward: Operation) -> Self {
        Self {
            id: EntryId::new(),
            timestamp: Utc::now(),
            actor: actor.into(),
            forward,
            inverse: None,
            snapshot_content: None,
            snapshot_metadata: None,
            reversible: false,
            context: BTreeMap::new(),
        }
    }

    pub fn with_inverse(mut self, inverse: InverseAction) -> Self {
        self.inverse = Some(inverse);
        self.reversible = true;
        self
    }

    pub fn with_snapshot(mut self, content: Vec<u8>, metadata: Option<SnapshotMetadata>) -> Self {
        self.snapshot_content = Some(content);
        self.snapshot_metadata = metadata;
        self
    }

    pub fn with_metadata(mut self, metadata: SnapshotMetadata) -> Self {
        self.snapshot_metadata = Some(metadata);
        self
    }

    /// Keep any recorded inverse for inspection but never apply it.
    pub fn irreversible(mut self) -> Self {
        self.reversible = false;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn operation(&self) -> OperationKind {
        self.forward.kind()
    }

    /// The inverse, if there is one and it may be applied.
    pub fn usable_inverse(&self) -> Option<&InverseAction> {
        self.inverse.as_ref().filter(|_| self.reversible)
    }

    /// Bytes behind a payload: inline bytes, or this entry's snapshot.
    pub fn resolve_payload<'a>(&'a self, payload: &'a Payload) -> Option<&'a [u8]> {
        match payload {
            Payload::Inline(data) => Some(data),
            Payload::Snapshot => self.snapshot_content.as_deref(),
        }
    }
}

/// The complete ledger of one rite.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiteLedger {
    pub rite_id: RiteId,
    pub rite_name: String,
    pub started_at: DateTime<Utc>,
    pub entries: Vec<LedgerEntry>,
    /// Directories the commit created, including parents made on demand.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub created_dirs: Vec<String>,
}

impl RiteLedger {
    pub fn new(rite_id: RiteId, rite_name: impl Into<String>) -> Self {
        Self {
            rite_id,
            rite_name: rite_name.into(),
            started_at: Utc::now(),
            entries: Vec::new(),
            created_dirs: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every filesystem path touched by a forward operation.
    pub fn touched_paths(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .flat_map(|e| e.forward.paths())
            .map(str::to_string)
            .collect()
    }

    /// Directories this rite brought into existence: reversible `mkdir`s
    /// plus whatever the commit created along the way.
    pub fn dirs_created(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter(|e| e.usable_inverse().is_some())
            .filter_map(|e| match &e.forward {
                Operation::MkDir { path } => Some(path.clone()),
                _ => None,
            })
            .chain(self.created_dirs.iter().cloned())
            .collect()
    }

    /// Shell edicts recorded during the rite, in order.
    pub fn edicts(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|e| match &e.forward {
                Operation::ExecShell { commands } => Some(commands.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &str, data: &[u8]) -> Operation {
        Operation::WriteFile {
            path: path.into(),
            content: Payload::inline(data.to_vec()),
        }
    }

    #[test]
    fn inverse_makes_entry_reversible() {
        let entry = LedgerEntry::new("test", write("a.txt", b"v2")).with_inverse(
            InverseAction::new(Operation::DeleteFile {
                path: "a.txt".into(),
            }),
        );
        assert!(entry.reversible);
        assert!(entry.usable_inverse().is_some());
        assert!(entry.irreversible().usable_inverse().is_none());
    }

    #[test]
    fn snapshot_payload_resolves_to_pre_image() {
        let entry = LedgerEntry::new("test", write("a.txt", b"v2"))
            .with_snapshot(b"v1".to_vec(), None);
        assert_eq!(entry.resolve_payload(&Payload::Snapshot), Some(&b"v1"[..]));
        let inline = Payload::inline(b"x".to_vec());
        assert_eq!(entry.resolve_payload(&inline), Some(&b"x"[..]));
    }

    #[test]
    fn entry_serde_roundtrip_keeps_binary_snapshot() {
        let entry = LedgerEntry::new("test", write("bin.dat", &[0, 255]))
            .with_inverse(InverseAction::new(Operation::WriteFile {
                path: "bin.dat".into(),
                content: Payload::Snapshot,
            }))
            .with_snapshot(
                vec![0xde, 0xad],
                Some(SnapshotMetadata {
                    mode: 0o600,
                    mtime: None,
                }),
            )
            .with_context("bytes", 2);
        let json = serde_json::to_string(&entry).unwrap();
        let parsed: LedgerEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn touched_paths_and_edicts() {
        let mut ledger = RiteLedger::new(RiteId::new(), "init");
        ledger.entries.push(LedgerEntry::new("t", write("b.txt", b"")));
        ledger.entries.push(LedgerEntry::new(
            "t",
            Operation::Rename {
                from: "b.txt".into(),
                to: "c.txt".into(),
            },
        ));
        ledger.entries.push(LedgerEntry::new(
            "t",
            Operation::ExecShell {
                commands: vec!["cargo fmt".into()],
            },
        ));
        assert_eq!(
            ledger.touched_paths().into_iter().collect::<Vec<_>>(),
            vec!["b.txt", "c.txt"]
        );
        assert_eq!(ledger.edicts(), vec!["cargo fmt"]);
    }

    #[test]
    fn dirs_created_skips_pre_existing_mkdirs() {
        let mut ledger = RiteLedger::new(RiteId::new(), "layout");
        ledger.entries.push(
            LedgerEntry::new("t", Operation::MkDir { path: "docs".into() }).with_inverse(
                InverseAction::new(Operation::RmDir {
                    path: "docs".into(),
                    recursive: true,
                }),
            ),
        );
        ledger
            .entries
            .push(LedgerEntry::new("t", Operation::MkDir { path: "src".into() }));
        ledger.entries.push(LedgerEntry::new("t", write("gen/out/a.txt", b"")));
        ledger.created_dirs = vec!["gen".into(), "gen/out".into()];

        assert_eq!(
            ledger.dirs_created().into_iter().collect::<Vec<_>>(),
            vec!["docs", "gen", "gen/out"]
        );
        let json = serde_json::to_string(&ledger).unwrap();
        assert_eq!(serde_json::from_str::<RiteLedger>(&json).unwrap(), ledger);
    }
}
