use rite_types::RiteId;

use crate::records::{LedgerEntry, RiteLedger};

/// Append-only ledger of the rite currently executing.
///
/// Owned by the rite that writes to it; there is no global "active" ledger.
/// Entries can be appended but never modified or removed, and their
/// timestamps never decrease.
#[derive(Debug)]
pub struct Ledger {
    record: RiteLedger,
}

impl Ledger {
    pub fn new(rite_id: RiteId, rite_name: impl Into<String>) -> Self {
        Self {
            record: RiteLedger::new(rite_id, rite_name),
        }
    }

    pub fn rite_id(&self) -> RiteId {
        self.record.rite_id
    }

    pub fn rite_name(&self) -> &str {
        &self.record.rite_name
    }

    /// Append an entry and return a reference to it as stored.
    pub fn append(&mut self, mut entry: LedgerEntry) -> &LedgerEntry {
        if let Some(last) = self.record.entries.last() {
            if entry.timestamp < last.timestamp {
                entry.timestamp = last.timestamp;
            }
        }
        self.record.entries.push(entry);
        &self.record.entries[self.record.entries.len() - 1]
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.record.entries
    }

    pub fn len(&self) -> usize {
        self.record.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.entries.is_empty()
    }

    pub fn as_record(&self) -> &RiteLedger {
        &self.record
    }

    pub fn into_record(self) -> RiteLedger {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rite_types::Operation;

    use super::*;

    fn mkdir(path: &str) -> LedgerEntry {
        LedgerEntry::new("test", Operation::MkDir { path: path.into() })
    }

    #[test]
    fn append_preserves_order() {
        let mut ledger = Ledger::new(RiteId::new(), "init");
        ledger.append(mkdir("a"));
        ledger.append(mkdir("b"));
        let paths: Vec<_> = ledger
            .entries()
            .iter()
            .flat_map(|e| e.forward.paths())
            .collect();
        assert_eq!(paths, vec!["a", "b"]);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let mut ledger = Ledger::new(RiteId::new(), "init");
        let first = ledger.append(mkdir("a")).timestamp;
        let mut stale = mkdir("b");
        stale.timestamp = first - Duration::seconds(60);
        let stored = ledger.append(stale).timestamp;
        assert_eq!(stored, first);
    }

    #[test]
    fn into_record_keeps_identity() {
        let id = RiteId::new();
        let ledger = Ledger::new(id, "init");
        let record = ledger.into_record();
        assert_eq!(record.rite_id, id);
        assert_eq!(record.rite_name, "init");
        assert!(record.is_empty());
    }
}
