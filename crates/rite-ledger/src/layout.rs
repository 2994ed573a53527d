use rite_store::jail;
use rite_types::RiteId;

/// Default control-metadata directory.
pub const DEFAULT_CONTROL_DIR: &str = ".scaffold";
/// Default live-state manifest file.
pub const DEFAULT_LOCKFILE: &str = "scaffold.lock";

/// Root-relative locations of everything Rite persists.
///
/// ```text
/// <lockfile>                                   live HEAD manifest
/// <control>/config.toml                        optional configuration
/// <control>/transaction.lock                   advisory writer lock
/// <control>/staging/<tx_id>/...                staged bytes of an open rite
/// <control>/chronicles/<seq>-<rite_id>.lock    sealed rite snapshots
/// <control>/trash/<rite_id>/ledger.json        persisted rite ledger
/// <control>/trash/<rite_id>/<path>[.<ms>.bak]  soft-deleted bodies
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlLayout {
    control_dir: String,
    lockfile: String,
}

impl ControlLayout {
    pub fn new(control_dir: impl Into<String>, lockfile: impl Into<String>) -> Self {
        Self {
            control_dir: control_dir.into(),
            lockfile: lockfile.into(),
        }
    }

    pub fn control_dir(&self) -> &str {
        &self.control_dir
    }

    pub fn lockfile(&self) -> &str {
        &self.lockfile
    }

    pub fn config_file(&self) -> String {
        jail::join(&self.control_dir, "config.toml")
    }

    pub fn lock_file(&self) -> String {
        jail::join(&self.control_dir, "transaction.lock")
    }

    pub fn staging_dir(&self) -> String {
        jail::join(&self.control_dir, "staging")
    }

    pub fn staging_root(&self, tx_id: &str) -> String {
        jail::join(&self.staging_dir(), tx_id)
    }

    pub fn chronicles_dir(&self) -> String {
        jail::join(&self.control_dir, "chronicles")
    }

    pub fn chronicle_file(&self, sequence: u64, rite_id: &RiteId) -> String {
        jail::join(&self.chronicles_dir(), &format!("{sequence:06}-{rite_id}.lock"))
    }

    pub fn trash_dir(&self) -> String {
        jail::join(&self.control_dir, "trash")
    }

    pub fn trash_root(&self, rite_id: &RiteId) -> String {
        jail::join(&self.trash_dir(), &rite_id.to_string())
    }

    pub fn ledger_file(&self, rite_id: &RiteId) -> String {
        jail::join(&self.trash_root(rite_id), "ledger.json")
    }

    /// Whether `path` is Rite's own bookkeeping rather than project content.
    pub fn is_bookkeeping(&self, path: &str) -> bool {
        path == self.lockfile || jail::is_within(path, &self.control_dir)
    }
}

impl Default for ControlLayout {
    fn default() -> Self {
        Self::new(DEFAULT_CONTROL_DIR, DEFAULT_LOCKFILE)
    }
}
