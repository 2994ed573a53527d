use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The closed set of operation kinds a rite can record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    MkDir,
    WriteFile,
    DeleteFile,
    RmDir,
    Rename,
    Chmod,
    SetVar,
    ExecShell,
}

impl OperationKind {
    /// All kinds, in declaration order.
    pub const ALL: [OperationKind; 8] = [
        OperationKind::MkDir,
        OperationKind::WriteFile,
        OperationKind::DeleteFile,
        OperationKind::RmDir,
        OperationKind::Rename,
        OperationKind::Chmod,
        OperationKind::SetVar,
        OperationKind::ExecShell,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MkDir => "mkdir",
            Self::WriteFile => "write_file",
            Self::DeleteFile => "delete_file",
            Self::RmDir => "rmdir",
            Self::Rename => "rename",
            Self::Chmod => "chmod",
            Self::SetVar => "set_var",
            Self::ExecShell => "exec_shell",
        }
    }

    /// Whether operations of this kind touch the filesystem.
    pub fn is_filesystem(&self) -> bool {
        !matches!(self, Self::SetVar | Self::ExecShell)
    }

    pub fn parse(s: &str) -> Result<Self, TypeError> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| TypeError::UnknownOperation(s.to_string()))
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The body written by a [`Operation::WriteFile`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    /// Bytes carried inline.
    Inline(#[serde(with = "crate::bytes::base64")] Vec<u8>),
    /// The pre-image captured in the owning ledger entry's `snapshot_content`.
    Snapshot,
}

impl Payload {
    pub fn inline(data: impl Into<Vec<u8>>) -> Self {
        Self::Inline(data.into())
    }

    /// Inline bytes, or `None` for a snapshot reference.
    pub fn as_inline(&self) -> Option<&[u8]> {
        match self {
            Self::Inline(data) => Some(data),
            Self::Snapshot => None,
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline(data) => write!(f, "Inline({} bytes)", data.len()),
            Self::Snapshot => f.write_str("Snapshot"),
        }
    }
}

/// One forward operation with its parameters.
///
/// Each variant carries exactly the fields its kind needs. Paths are
/// jail-validated, root-relative, forward-slash separated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    MkDir {
        path: String,
    },
    WriteFile {
        path: String,
        content: Payload,
    },
    DeleteFile {
        path: String,
    },
    RmDir {
        path: String,
        recursive: bool,
    },
    Rename {
        from: String,
        to: String,
    },
    Chmod {
        path: String,
        mode: u32,
    },
    SetVar {
        name: String,
        /// `None` unsets the variable.
        value: Option<serde_json::Value>,
    },
    ExecShell {
        commands: Vec<String>,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::MkDir { .. } => OperationKind::MkDir,
            Self::WriteFile { .. } => OperationKind::WriteFile,
            Self::DeleteFile { .. } => OperationKind::DeleteFile,
            Self::RmDir { .. } => OperationKind::RmDir,
            Self::Rename { .. } => OperationKind::Rename,
            Self::Chmod { .. } => OperationKind::Chmod,
            Self::SetVar { .. } => OperationKind::SetVar,
            Self::ExecShell { .. } => OperationKind::ExecShell,
        }
    }

    /// The filesystem paths this operation touches.
    pub fn paths(&self) -> Vec<&str> {
        match self {
            Self::MkDir { path }
            | Self::WriteFile { path, .. }
            | Self::DeleteFile { path }
            | Self::RmDir { path, .. }
            | Self::Chmod { path, .. } => vec![path.as_str()],
            Self::Rename { from, to } => vec![from.as_str(), to.as_str()],
            Self::SetVar { .. } | Self::ExecShell { .. } => Vec::new(),
        }
    }

    /// One-line human-readable summary.
    pub fn describe(&self) -> String {
        match self {
            Self::MkDir { path } => format!("mkdir {path}"),
            Self::WriteFile { path, content } => match content {
                Payload::Inline(data) => format!("write {path} ({} bytes)", data.len()),
                Payload::Snapshot => format!("write {path} (snapshot)"),
            },
            Self::DeleteFile { path } => format!("delete {path}"),
            Self::RmDir { path, recursive } => {
                if *recursive {
                    format!("rmdir -r {path}")
                } else {
                    format!("rmdir {path}")
                }
            }
            Self::Rename { from, to } => format!("rename {from} -> {to}"),
            Self::Chmod { path, mode } => format!("chmod {mode:o} {path}"),
            Self::SetVar { name, value } => match value {
                Some(v) => format!("set ${name} = {v}"),
                None => format!("unset ${name}"),
            },
            Self::ExecShell { commands } => format!("exec {}", commands.join(" && ")),
        }
    }
}

/// The recorded undo of exactly one forward operation.
///
/// An inverse is itself an [`Operation`]; a `WriteFile` inverse usually
/// carries [`Payload::Snapshot`] and is resolved against the owning entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InverseAction(Operation);

impl InverseAction {
    pub fn new(operation: Operation) -> Self {
        Self(operation)
    }

    pub fn kind(&self) -> OperationKind {
        self.0.kind()
    }

    pub fn operation(&self) -> &Operation {
        &self.0
    }

    pub fn into_operation(self) -> Operation {
        self.0
    }
}
