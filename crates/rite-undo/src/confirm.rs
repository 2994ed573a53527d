use rite_ledger::ChronicleEntry;

/// Asks whether the listed rites (newest first) may be reversed.
pub trait Confirmer {
    fn confirm(&self, rites: &[ChronicleEntry]) -> bool;
}

/// Always says yes. Used for non-interactive runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct AutoConfirm;

impl Confirmer for AutoConfirm {
    fn confirm(&self, _rites: &[ChronicleEntry]) -> bool {
        true
    }
}

/// Always says no.
#[derive(Clone, Copy, Debug, Default)]
pub struct Decline;

impl Confirmer for Decline {
    fn confirm(&self, _rites: &[ChronicleEntry]) -> bool {
        false
    }
}
