use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::info;

use crate::error::{UndoError, UndoResult};

/// Runs shell counter-commands recorded as `ExecShell` inverses.
pub trait EdictRunner: Send + Sync {
    fn run(&self, command: &str) -> UndoResult<()>;
}

/// Runs edicts through the platform shell, optionally inside a directory.
#[derive(Clone, Debug, Default)]
pub struct SystemShell {
    cwd: Option<PathBuf>,
}

impl SystemShell {
    pub fn new(cwd: Option<PathBuf>) -> Self {
        Self { cwd }
    }
}

impl EdictRunner for SystemShell {
    fn run(&self, command: &str) -> UndoResult<()> {
        let mut cmd = if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C");
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg("-c");
            cmd
        };
        cmd.arg(command).stdin(Stdio::null());
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        info!(command, "running edict");
        let output = cmd.output().map_err(|e| UndoError::EdictFailed {
            command: command.to_string(),
            reason: format!("failed to spawn: {e}"),
        })?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(UndoError::EdictFailed {
            command: command.to_string(),
            reason: format!("{}: {}", output.status, stderr.trim()),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn runs_in_the_given_directory() {
        let dir = tempfile::tempdir().unwrap();
        let shell = SystemShell::new(Some(dir.path().to_path_buf()));
        shell.run("echo hi > out.txt").unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("out.txt")).unwrap(), "hi\n");
    }

    #[test]
    fn non_zero_exit_is_an_error() {
        let err = SystemShell::default().run("echo boom >&2; exit 3").unwrap_err();
        match err {
            UndoError::EdictFailed { reason, .. } => assert!(reason.contains("boom")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
