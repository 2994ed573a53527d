use std::io;
use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::error::{StoreError, StoreResult};

/// Bounded exponential backoff for transient OS errors.
///
/// Only errors that signal contention (a busy file, an interrupted call, a
/// sharing violation) are retried. Logical errors such as "not found" or a
/// plain permission denial surface on the first attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    /// No waiting between attempts. Used by tests.
    pub fn immediate() -> Self {
        Self::new(5, Duration::ZERO)
    }

    /// Backoff before retry number `attempt` (1-based): 100ms, 200ms, 400ms...
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }

    /// Run `f`, retrying transient failures.
    pub fn run<T>(
        &self,
        op: &'static str,
        path: &str,
        mut f: impl FnMut() -> io::Result<T>,
    ) -> StoreResult<T> {
        let mut attempt = 1;
        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) => {
                    if attempt >= self.max_attempts {
                        return Err(StoreError::Transient {
                            op,
                            path: path.to_string(),
                            attempts: attempt,
                            source: e,
                        });
                    }
                    let delay = self.backoff(attempt);
                    warn!(op, path, attempt, delay_ms = delay.as_millis() as u64, error = %e, "transient I/O error, retrying");
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(classify(op, path, e)),
            }
        }
    }
}

/// Whether an I/O error is worth retrying.
pub fn is_transient(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    ) {
        return true;
    }
    match err.raw_os_error() {
        // EAGAIN, EBUSY, ETXTBSY
        #[cfg(unix)]
        Some(11) | Some(16) | Some(26) => true,
        // ERROR_ACCESS_DENIED while another handle is open, sharing and lock violations
        #[cfg(windows)]
        Some(5) | Some(32) | Some(33) => true,
        _ => false,
    }
}

fn classify(op: &'static str, path: &str, err: io::Error) -> StoreError {
    match err.kind() {
        io::ErrorKind::NotFound => StoreError::NotFound(path.to_string()),
        io::ErrorKind::AlreadyExists => StoreError::AlreadyExists(path.to_string()),
        _ => StoreError::Io {
            op,
            path: path.to_string(),
            source: err,
        },
    }
}
