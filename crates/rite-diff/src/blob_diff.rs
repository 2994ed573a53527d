//! Line-level content diffs.
//!
//! Uses the `similar` crate (Myers diff algorithm) to produce structured
//! hunks with context lines.

use similar::{ChangeTag, TextDiff};

use rite_ledger::RiteLedger;
use rite_types::Operation;

/// The result of diffing two file bodies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobDiff {
    pub hunks: Vec<DiffHunk>,
    /// Total number of lines in the old content.
    pub old_lines: usize,
    /// Total number of lines in the new content.
    pub new_lines: usize,
}

impl BlobDiff {
    /// Returns `true` if the two bodies are identical.
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    pub fn additions(&self) -> usize {
        self.hunks
            .iter()
            .flat_map(|h| &h.lines)
            .filter(|l| matches!(l, DiffLine::Added(_)))
            .count()
    }

    pub fn deletions(&self) -> usize {
        self.hunks
            .iter()
            .flat_map(|h| &h.lines)
            .filter(|l| matches!(l, DiffLine::Removed(_)))
            .count()
    }
}

/// A contiguous region of changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffHunk {
    /// 1-based start line in the old content.
    pub old_start: usize,
    pub old_count: usize,
    /// 1-based start line in the new content.
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<DiffLine>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiffLine {
    Context(String),
    Added(String),
    Removed(String),
}

/// What one ledger entry did to one file's content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDiff {
    pub path: String,
    pub diff: BlobDiff,
}

/// Compute a line-by-line diff between two byte slices.
///
/// Non-UTF-8 content yields a single synthetic hunk noting the sizes.
pub fn diff_blobs(old: &[u8], new: &[u8]) -> BlobDiff {
    let (Ok(old_str), Ok(new_str)) = (std::str::from_utf8(old), std::str::from_utf8(new)) else {
        return binary_diff(old, new);
    };

    let old_lines = old_str.lines().count();
    let new_lines = new_str.lines().count();
    if old_str == new_str {
        return BlobDiff {
            hunks: Vec::new(),
            old_lines,
            new_lines,
        };
    }

    let text_diff = TextDiff::from_lines(old_str, new_str);
    let mut hunks = Vec::new();
    for group in text_diff.grouped_ops(3) {
        let Some(first) = group.first() else {
            continue;
        };
        let mut hunk = DiffHunk {
            old_start: first.old_range().start + 1,
            old_count: 0,
            new_start: first.new_range().start + 1,
            new_count: 0,
            lines: Vec::new(),
        };
        for op in &group {
            for change in text_diff.iter_changes(op) {
                let text = change.value().trim_end_matches('\n').to_string();
                match change.tag() {
                    ChangeTag::Equal => {
                        hunk.lines.push(DiffLine::Context(text));
                        hunk.old_count += 1;
                        hunk.new_count += 1;
                    }
                    ChangeTag::Delete => {
                        hunk.lines.push(DiffLine::Removed(text));
                        hunk.old_count += 1;
                    }
                    ChangeTag::Insert => {
                        hunk.lines.push(DiffLine::Added(text));
                        hunk.new_count += 1;
                    }
                }
            }
        }
        hunks.push(hunk);
    }

    BlobDiff {
        hunks,
        old_lines,
        new_lines,
    }
}

fn binary_diff(old: &[u8], new: &[u8]) -> BlobDiff {
    let mut lines = Vec::new();
    if !old.is_empty() {
        lines.push(DiffLine::Removed(format!("(binary content, {} bytes)", old.len())));
    }
    if !new.is_empty() {
        lines.push(DiffLine::Added(format!("(binary content, {} bytes)", new.len())));
    }
    BlobDiff {
        hunks: vec![DiffHunk {
            old_start: 1,
            old_count: usize::from(!old.is_empty()),
            new_start: 1,
            new_count: usize::from(!new.is_empty()),
            lines,
        }],
        old_lines: 0,
        new_lines: 0,
    }
}

/// Content changes recorded in a rite's ledger, in application order.
///
/// Writes diff the captured pre-image (or nothing, for new files) against the
/// written bytes; deletes diff the pre-image against nothing.
pub fn content_diff(ledger: &RiteLedger) -> Vec<FileDiff> {
    ledger
        .entries
        .iter()
        .filter_map(|entry| {
            let old = entry.snapshot_content.as_deref().unwrap_or_default();
            let (path, new) = match &entry.forward {
                Operation::WriteFile { path, content } => (path, content.as_inline()?),
                Operation::DeleteFile { path } => (path, &[][..]),
                _ => return None,
            };
            let diff = diff_blobs(old, new);
            (!diff.is_empty()).then(|| FileDiff {
                path: path.clone(),
                diff,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rite_ledger::LedgerEntry;
    use rite_types::{Payload, RiteId};

    use super::*;

    #[test]
    fn identical_blobs_no_diff() {
        let content = b"hello\nworld\n";
        let diff = diff_blobs(content, content);
        assert!(diff.is_empty());
        assert_eq!(diff.additions(), 0);
        assert_eq!(diff.deletions(), 0);
    }

    #[test]
    fn modification_shows_remove_and_add() {
        let diff = diff_blobs(b"hello world\n", b"hello universe\n");
        assert_eq!(diff.additions(), 1);
        assert_eq!(diff.deletions(), 1);
    }

    #[test]
    fn hunk_carries_context_and_positions() {
        let old = b"a\nb\nc\nd\ne\nf\ng\nh\ni\nj\n";
        let new = b"a\nb\nc\nd\nX\nf\ng\nh\ni\nj\n";
        let diff = diff_blobs(old, new);
        assert_eq!(diff.hunks.len(), 1);
        let hunk = &diff.hunks[0];
        assert_eq!(hunk.old_start, 2);
        assert!(hunk.lines.iter().any(|l| matches!(l, DiffLine::Context(_))));
        assert_eq!(diff.old_lines, 10);
    }

    #[test]
    fn binary_content_is_summarised() {
        let diff = diff_blobs(&[0, 0xff, 0xfe], &[1, 0xff]);
        assert_eq!(diff.hunks.len(), 1);
        assert_eq!(
            diff.hunks[0].lines,
            vec![
                DiffLine::Removed("(binary content, 3 bytes)".into()),
                DiffLine::Added("(binary content, 2 bytes)".into()),
            ]
        );
    }

    #[test]
    fn ledger_content_diff() {
        let mut ledger = RiteLedger::new(RiteId::new(), "edit");
        ledger.entries = vec![
            LedgerEntry::new(
                "test",
                Operation::WriteFile {
                    path: "a.txt".into(),
                    content: Payload::inline(b"v2\n".to_vec()),
                },
            )
            .with_snapshot(b"v1\n".to_vec(), None),
            LedgerEntry::new(
                "test",
                Operation::WriteFile {
                    path: "new.txt".into(),
                    content: Payload::inline(b"fresh\n".to_vec()),
                },
            ),
            LedgerEntry::new("test", Operation::MkDir { path: "pkg".into() }),
            LedgerEntry::new(
                "test",
                Operation::DeleteFile {
                    path: "b.txt".into(),
                },
            )
            .with_snapshot(b"bye\n".to_vec(), None),
        ];

        let diffs = content_diff(&ledger);
        let paths: Vec<_> = diffs.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "new.txt", "b.txt"]);
        assert_eq!(diffs[0].diff.deletions(), 1);
        assert_eq!(diffs[1].diff.additions(), 1);
        assert_eq!(diffs[2].diff.deletions(), 1);
    }
}
