//! Reverse patches: the inverse of one rite as a standalone, editable artifact.
//!
//! A patch is forged by walking a rite's ledger backward. Restorative steps
//! (file bodies, directories) are emitted as blocks; removals, moves, mode
//! changes and counter-edicts go to a deferred `%% post-run` section that runs
//! after every block has been written.
//!
//! ```text
//! # == Reverse patch ==
//! # rite: scaffold api
//! # id:   0192f3c4-...
//!
//! $$ project = "demo"
//! $$ feature
//! src/main.rs :: mode=644 """
//! fn main() {}
//! """
//! docs/ :: dir
//! %% post-run
//!     rm -f src/api.rs
//!     rm -rf 'generated dir'
//!     npm uninstall axios # [REVERSE-EDICT]
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde_json::Value;
use tracing::debug;

use rite_ledger::{LedgerEntry, RiteLedger};
use rite_types::{Operation, RiteId};

use crate::error::{DiffError, DiffResult};

const HEADER: &str = "# == Reverse patch ==";
const POST_RUN: &str = "%% post-run";
const EDICT_MARKER: &str = " # [REVERSE-EDICT]";
const DELIMITERS: [&str; 4] = ["\"\"\"", "'''", "~~~", "^^^"];

/// A restorative step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatchBlock {
    File {
        path: String,
        content: Vec<u8>,
        mode: Option<u32>,
    },
    Dir {
        path: String,
    },
}

impl PatchBlock {
    pub fn path(&self) -> &str {
        match self {
            Self::File { path, .. } | Self::Dir { path } => path,
        }
    }
}

/// A deferred step, run in order after all blocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PostRun {
    Remove { path: String },
    RemoveDir { path: String, recursive: bool },
    Chmod { path: String, mode: u32 },
    Move { from: String, to: String },
    Shell { command: String },
}

impl PostRun {
    fn touches(&self, path: &str) -> bool {
        match self {
            Self::Remove { path: p } | Self::Chmod { path: p, .. } => p == path,
            Self::RemoveDir { .. } | Self::Move { .. } | Self::Shell { .. } => false,
        }
    }
}

/// The structured inverse of one rite.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReversePatch {
    pub rite_id: Option<RiteId>,
    pub rite_name: String,
    /// Variables to restore; `None` unsets.
    pub variables: BTreeMap<String, Option<Value>>,
    pub blocks: Vec<PatchBlock>,
    pub post_run: Vec<PostRun>,
}

impl ReversePatch {
    /// Forge the inverse of `ledger`.
    ///
    /// Entries are walked last-applied-first and only usable inverses are
    /// considered. When two undo steps target the same path, the later one
    /// (closer to the pre-rite state) wins.
    pub fn forge(ledger: &RiteLedger) -> DiffResult<Self> {
        let mut patch = Self {
            rite_id: Some(ledger.rite_id),
            rite_name: ledger.rite_name.clone(),
            ..Self::default()
        };
        for entry in ledger.entries.iter().rev() {
            let Some(inverse) = entry.usable_inverse() else {
                continue;
            };
            patch.push_inverse(entry, inverse.operation())?;
        }
        debug!(
            rite_id = %ledger.rite_id,
            blocks = patch.blocks.len(),
            post_run = patch.post_run.len(),
            "forged reverse patch"
        );
        Ok(patch)
    }

    fn push_inverse(&mut self, entry: &LedgerEntry, inverse: &Operation) -> DiffResult<()> {
        match inverse {
            Operation::WriteFile { path, content } => {
                let data = entry
                    .resolve_payload(content)
                    .ok_or_else(|| DiffError::MissingSnapshot {
                        entry_id: entry.id.to_string(),
                        path: path.clone(),
                    })?;
                let mode = entry.snapshot_metadata.as_ref().map(|m| m.mode);
                self.restore(PatchBlock::File {
                    path: path.clone(),
                    content: data.to_vec(),
                    mode,
                });
            }
            Operation::MkDir { path } => self.restore(PatchBlock::Dir { path: path.clone() }),
            Operation::DeleteFile { path } => {
                self.blocks.retain(|b| b.path() != path.as_str());
                self.post_run.retain(|s| !s.touches(path));
                self.post_run.push(PostRun::Remove { path: path.clone() });
            }
            Operation::RmDir { path, recursive } => {
                self.blocks
                    .retain(|b| b.path() != path.as_str() && !is_under(b.path(), path));
                self.post_run.push(PostRun::RemoveDir {
                    path: path.clone(),
                    recursive: *recursive,
                });
            }
            Operation::Chmod { path, mode } => self.post_run.push(PostRun::Chmod {
                path: path.clone(),
                mode: *mode,
            }),
            Operation::Rename { from, to } => self.post_run.push(PostRun::Move {
                from: from.clone(),
                to: to.clone(),
            }),
            Operation::SetVar { name, value } => {
                self.variables.insert(name.clone(), value.clone());
            }
            Operation::ExecShell { commands } => {
                self.post_run.extend(
                    commands
                        .iter()
                        .map(|c| PostRun::Shell { command: c.clone() }),
                );
            }
        }
        Ok(())
    }

    /// Add a restorative block, superseding anything earlier for its path.
    fn restore(&mut self, block: PatchBlock) {
        let path = block.path().to_string();
        self.blocks.retain(|b| b.path() != path);
        let mut kept = Vec::with_capacity(self.post_run.len());
        for step in self.post_run.drain(..) {
            match step {
                s if s.touches(&path) => {}
                PostRun::RemoveDir { path: dir, .. } if dir == path || is_under(&path, &dir) => {}
                // The restored body replaces whatever the move would have
                // brought back; only the relocated copy needs to go.
                PostRun::Move { from, to } if to == path => kept.push(PostRun::Remove { path: from }),
                s => kept.push(s),
            }
        }
        self.post_run = kept;
        self.blocks.push(block);
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty() && self.blocks.is_empty() && self.post_run.is_empty()
    }

    /// Render as patch text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(HEADER);
        out.push('\n');
        let _ = writeln!(out, "# rite: {}", self.rite_name);
        if let Some(id) = &self.rite_id {
            let _ = writeln!(out, "# id:   {id}");
        }
        out.push('\n');

        for (name, value) in &self.variables {
            match value {
                Some(v) => {
                    let _ = writeln!(out, "$$ {name} = {v}");
                }
                None => {
                    let _ = writeln!(out, "$$ {name}");
                }
            }
        }

        for block in &self.blocks {
            match block {
                PatchBlock::Dir { path } => {
                    let _ = writeln!(out, "{}/ :: dir", header_path(path));
                }
                PatchBlock::File {
                    path,
                    content,
                    mode,
                } => {
                    let (text, latin1) = match std::str::from_utf8(content) {
                        Ok(s) => (s.to_string(), false),
                        Err(_) => (content.iter().map(|&b| b as char).collect(), true),
                    };
                    let delimiter = pick_delimiter(&text);
                    out.push_str(&header_path(path));
                    out.push_str(" ::");
                    if latin1 {
                        out.push_str(" latin1");
                    }
                    if let Some(mode) = mode {
                        let _ = write!(out, " mode={mode:o}");
                    }
                    let _ = writeln!(out, " {delimiter}");
                    out.push_str(&text);
                    let _ = writeln!(out, "\n{delimiter}");
                }
            }
        }

        if !self.post_run.is_empty() {
            out.push_str(POST_RUN);
            out.push('\n');
            for step in &self.post_run {
                let line = match step {
                    PostRun::Remove { path } => format!("rm -f {}", quote(path)),
                    PostRun::RemoveDir {
                        path,
                        recursive: true,
                    } => format!("rm -rf {}", quote(path)),
                    PostRun::RemoveDir {
                        path,
                        recursive: false,
                    } => format!("rmdir {}", quote(path)),
                    PostRun::Chmod { path, mode } => format!("chmod {mode:o} {}", quote(path)),
                    PostRun::Move { from, to } => format!("mv {} {}", quote(from), quote(to)),
                    PostRun::Shell { command } => format!("{command}{EDICT_MARKER}"),
                };
                let _ = writeln!(out, "    {line}");
            }
        }
        out
    }

    /// Parse patch text produced by [`ReversePatch::render`], or a hand-edited
    /// variant of it. Unrecognised post-run lines are kept as shell steps.
    pub fn parse(text: &str) -> DiffResult<Self> {
        let mut patch = Self::default();
        let mut in_post_run = false;
        let mut pos = 0;
        let mut line_no = 0;

        while pos < text.len() {
            let end = text[pos..].find('\n').map_or(text.len(), |i| pos + i);
            let line = &text[pos..end];
            line_no += 1;
            pos = (end + 1).min(text.len());
            let trimmed = line.trim();

            if in_post_run {
                if !trimmed.is_empty() && !trimmed.starts_with('#') {
                    patch.post_run.push(parse_post_run(trimmed, line_no)?);
                }
                continue;
            }
            if trimmed.is_empty() {
                continue;
            }
            if let Some(comment) = trimmed.strip_prefix('#') {
                let comment = comment.trim();
                if let Some(name) = comment.strip_prefix("rite:") {
                    patch.rite_name = name.trim().to_string();
                } else if let Some(id) = comment.strip_prefix("id:") {
                    patch.rite_id = Some(id.trim().parse().map_err(|_| DiffError::Parse {
                        line: line_no,
                        reason: format!("invalid rite id {:?}", id.trim()),
                    })?);
                }
                continue;
            }
            if trimmed == POST_RUN {
                in_post_run = true;
                continue;
            }
            if let Some(assignment) = trimmed.strip_prefix("$$") {
                let (name, value) = parse_variable(assignment, line_no)?;
                patch.variables.insert(name, value);
                continue;
            }

            let (path, attrs) = split_header(trimmed).ok_or_else(|| DiffError::Parse {
                line: line_no,
                reason: format!("expected `path :: ...`, got {trimmed:?}"),
            })?;
            let path = path.trim_end_matches('/').to_string();
            let attrs = attrs.trim();
            if attrs == "dir" {
                patch.blocks.push(PatchBlock::Dir { path });
                continue;
            }

            let mut latin1 = false;
            let mut mode = None;
            let mut delimiter = None;
            for token in attrs.split_whitespace() {
                if token == "latin1" {
                    latin1 = true;
                } else if let Some(m) = token.strip_prefix("mode=") {
                    mode = Some(u32::from_str_radix(m, 8).map_err(|_| DiffError::Parse {
                        line: line_no,
                        reason: format!("invalid mode {m:?}"),
                    })?);
                } else {
                    delimiter = Some(token);
                }
            }
            let delimiter = delimiter.ok_or_else(|| DiffError::Parse {
                line: line_no,
                reason: format!("block for {path} has no delimiter"),
            })?;

            let body = &text[pos..];
            let close = format!("\n{delimiter}");
            let (content, consumed) = if let Some(rest) = body.strip_prefix(delimiter).filter(|r| {
                r.is_empty() || r.starts_with('\n')
            }) {
                // Closing delimiter directly after the header: only possible
                // for hand-written empty blocks.
                ("", body.len() - rest.len())
            } else {
                let at = find_closing(body, &close).ok_or_else(|| DiffError::Parse {
                    line: line_no,
                    reason: format!("block for {path} is not closed by {delimiter}"),
                })?;
                (&body[..at], at + close.len())
            };
            line_no += content.matches('\n').count() + 1;
            pos = (pos + consumed + 1).min(text.len());

            let content = if latin1 {
                content.chars().map(|c| c as u32 as u8).collect()
            } else {
                content.as_bytes().to_vec()
            };
            patch.blocks.push(PatchBlock::File {
                path,
                content,
                mode,
            });
        }
        Ok(patch)
    }
}

fn is_under(path: &str, dir: &str) -> bool {
    path.len() > dir.len() && path.starts_with(dir) && path.as_bytes()[dir.len()] == b'/'
}

/// A block path as written in a header line. Paths that would read as a
/// comment, a variable, the post-run marker or a second `::` are quoted.
fn header_path(path: &str) -> String {
    let ambiguous = path.starts_with(['#', '$', '%', '\'', '\\'])
        || path.contains(" ::")
        || path.contains('\n')
        || path.starts_with(char::is_whitespace)
        || path.ends_with(char::is_whitespace);
    if ambiguous {
        quote(path)
    } else {
        path.to_string()
    }
}

/// Split a block header into its path and attribute list.
fn split_header(line: &str) -> Option<(String, &str)> {
    if line.starts_with(['\'', '\\']) {
        let (path, rest) = take_word(line)?;
        let attrs = rest.strip_prefix(" ::")?;
        return Some((path, attrs));
    }
    let (path, attrs) = line.split_once(" :: ")?;
    Some((path.trim().to_string(), attrs))
}

fn pick_delimiter(text: &str) -> String {
    DELIMITERS
        .iter()
        .map(|d| d.to_string())
        .chain((1..).map(|n| format!("==={n}")))
        .find(|d| !text.contains(d.as_str()))
        .unwrap_or_default()
}

/// Offset of `close` in `body` where it is followed by a newline or the end.
fn find_closing(body: &str, close: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(i) = body[from..].find(close) {
        let at = from + i;
        let after = &body[at + close.len()..];
        if after.is_empty() || after.starts_with('\n') {
            return Some(at);
        }
        from = at + 1;
    }
    None
}

fn parse_variable(assignment: &str, line: usize) -> DiffResult<(String, Option<Value>)> {
    let (name, value) = match assignment.split_once('=') {
        Some((name, value)) => {
            let value = serde_json::from_str(value.trim()).map_err(|e| DiffError::Parse {
                line,
                reason: format!("variable value is not JSON: {e}"),
            })?;
            (name.trim(), Some(value))
        }
        None => (assignment.trim(), None),
    };
    if name.is_empty() {
        return Err(DiffError::Parse {
            line,
            reason: "variable without a name".into(),
        });
    }
    Ok((name.to_string(), value))
}

fn parse_post_run(line: &str, line_no: usize) -> DiffResult<PostRun> {
    if let Some(command) = line.strip_suffix(EDICT_MARKER.trim_start()) {
        return Ok(PostRun::Shell {
            command: command.trim_end().to_string(),
        });
    }
    let words = split_words(line).ok_or_else(|| DiffError::Parse {
        line: line_no,
        reason: format!("unbalanced quotes in {line:?}"),
    })?;
    let words: Vec<&str> = words.iter().map(String::as_str).collect();
    let step = match words.as_slice() {
        ["rm", "-f", path] => PostRun::Remove {
            path: path.to_string(),
        },
        ["rm", "-rf", path] => PostRun::RemoveDir {
            path: path.to_string(),
            recursive: true,
        },
        ["rmdir", path] => PostRun::RemoveDir {
            path: path.to_string(),
            recursive: false,
        },
        ["mv", from, to] => PostRun::Move {
            from: from.to_string(),
            to: to.to_string(),
        },
        ["chmod", mode, path] => match u32::from_str_radix(mode, 8) {
            Ok(mode) => PostRun::Chmod {
                path: path.to_string(),
                mode,
            },
            Err(_) => PostRun::Shell {
                command: line.to_string(),
            },
        },
        _ => PostRun::Shell {
            command: line.to_string(),
        },
    };
    Ok(step)
}

fn quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"_-./@+,".contains(&b));
    if plain {
        word.to_string()
    } else {
        word.split('\n')
            .map(|part| format!("'{}'", part.replace('\'', r"'\''")))
            .collect::<Vec<_>>()
            .join(r"\n")
    }
}

/// Split a post-run line into words, honouring single quotes and backslashes.
fn split_words(line: &str) -> Option<Vec<String>> {
    let mut words = Vec::new();
    let mut rest = line.trim_start();
    while !rest.is_empty() {
        let (word, tail) = take_word(rest)?;
        words.push(word);
        rest = tail.trim_start();
    }
    Some(words)
}

/// Read one word from the start of `line` and return it with the unread tail.
///
/// Single quotes group literally; outside quotes a backslash escapes the next
/// character, and `\n` stands for a newline. `None` on an unbalanced quote.
fn take_word(line: &str) -> Option<(String, &str)> {
    let mut word = String::new();
    let mut chars = line.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\'' => loop {
                match chars.next()?.1 {
                    '\'' => break,
                    c => word.push(c),
                }
            },
            '\\' => match chars.next()?.1 {
                'n' => word.push('\n'),
                c => word.push(c),
            },
            c if c.is_whitespace() => return Some((word, &line[i..])),
            c => word.push(c),
        }
    }
    Some((word, ""))
}
