use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LockError;

const INITIAL_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_millis(500);

/// Owner metadata written next to a held lock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOwner {
    pub pid: u32,
    pub rite_name: String,
    pub acquired_at: DateTime<Utc>,
}

/// Exclusive cross-process lock on a project root.
///
/// Backed by an OS advisory lock on `<control>/transaction.lock`, with owner
/// metadata in `transaction.lock.owner.json`. Released on drop.
pub struct RiteLock {
    file: File,
    path: PathBuf,
    owner_path: PathBuf,
}

impl RiteLock {
    /// Acquire the lock, backing off exponentially until `timeout` elapses.
    pub fn acquire(path: &Path, rite_name: &str, timeout: Duration) -> Result<Self, LockError> {
        let io_err = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(io_err)?;

        let start = Instant::now();
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    let waited = start.elapsed();
                    if waited >= timeout {
                        let owner = Self::owner(path).map(|o| {
                            format!("pid {} running {:?} since {}", o.pid, o.rite_name, o.acquired_at)
                        });
                        warn!(path = %path.display(), owner = owner.as_deref().unwrap_or("?"), "lock acquisition timed out");
                        return Err(LockError::Timeout {
                            path: path.to_path_buf(),
                            waited_ms: waited.as_millis() as u64,
                            owner,
                        });
                    }
                    debug!(path = %path.display(), backoff_ms = backoff.as_millis() as u64, "lock contended");
                    thread::sleep(backoff.min(timeout.saturating_sub(waited)));
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(e) => return Err(io_err(e)),
            }
        }

        let owner_path = owner_path(path);
        let owner = LockOwner {
            pid: std::process::id(),
            rite_name: rite_name.to_string(),
            acquired_at: Utc::now(),
        };
        // Owner metadata is advisory; a failure to write it does not void the lock.
        match serde_json::to_vec_pretty(&owner) {
            Ok(json) => {
                if let Err(e) = fs::write(&owner_path, json) {
                    warn!(path = %owner_path.display(), error = %e, "could not record lock owner");
                }
            }
            Err(e) => warn!(error = %e, "could not serialize lock owner"),
        }
        debug!(path = %path.display(), rite = rite_name, "lock acquired");

        Ok(Self {
            file,
            path: path.to_path_buf(),
            owner_path,
        })
    }

    /// Who holds (or last held) the lock at `path`.
    pub fn owner(path: &Path) -> Option<LockOwner> {
        let data = fs::read(owner_path(path)).ok()?;
        serde_json::from_slice(&data).ok()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RiteLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.owner_path);
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "failed to release lock");
        } else {
            debug!(path = %self.path.display(), "lock released");
        }
    }
}

fn owner_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{name}.owner.json"))
}
