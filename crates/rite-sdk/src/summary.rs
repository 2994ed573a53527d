use chrono::{DateTime, Utc};
use serde::Serialize;

use rite_ledger::{ChronicleEntry, RiteLedger};
use rite_txn::MaterializeReport;
use rite_types::{Digest, RiteId};

/// One line of history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RiteSummary {
    pub rite_id: RiteId,
    pub rite_name: String,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub operations: usize,
    /// Files the rite created, modified or moved.
    pub changed: usize,
    /// Files tracked after the rite.
    pub tracked: usize,
    pub edicts: usize,
    pub fingerprint: Digest,
    pub is_head: bool,
}

impl RiteSummary {
    pub fn from_entry(entry: &ChronicleEntry, is_head: bool) -> Self {
        Self {
            rite_id: entry.rite_id,
            rite_name: entry.rite_name.clone(),
            sequence: entry.sequence,
            timestamp: entry.timestamp,
            operations: entry.operations,
            changed: entry
                .manifest
                .iter()
                .filter(|(_, e)| e.action.is_change())
                .count(),
            tracked: entry.manifest.len(),
            edicts: entry.edicts.len(),
            fingerprint: entry.fingerprint,
            is_head,
        }
    }
}

/// A sealed rite together with its ledger, when one survives.
#[derive(Clone, Debug)]
pub struct RiteRecord {
    pub entry: ChronicleEntry,
    pub ledger: Option<RiteLedger>,
}

/// What committing (or simulating) a rite produced.
#[derive(Clone, Debug)]
pub struct CommitReport {
    pub rite_id: RiteId,
    pub simulated: bool,
    pub ledger: RiteLedger,
    /// Physical effect of the commit; `None` for simulations and empty rites.
    pub materialized: Option<MaterializeReport>,
    /// The new `HEAD`; `None` if nothing was sealed.
    pub sealed: Option<ChronicleEntry>,
}

impl CommitReport {
    pub fn fingerprint(&self) -> Option<Digest> {
        self.sealed.as_ref().map(|e| e.fingerprint)
    }
}
