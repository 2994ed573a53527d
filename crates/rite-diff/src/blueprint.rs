//! Cherry-pick blueprints: a sealed rite's intent, replayable elsewhere.

use std::fmt::Write as _;

use rite_ledger::ChronicleEntry;

/// Render a blueprint for `rite`.
///
/// Emits the variables the rite set, every manifest path the rite created,
/// modified or moved (content is referenced by rite, not embedded), and the
/// rite's shell edicts as a post-run section.
pub fn forge_cherry_pick(rite: &ChronicleEntry) -> String {
    let short = rite.rite_id.short_id();
    let mut out = String::new();
    let _ = writeln!(out, "# == Cherry-pick: {} ==", rite.rite_name);
    let _ = writeln!(out, "# Replicating {short}");
    out.push('\n');

    if !rite.variables_delta.is_empty() {
        out.push_str("# --- Variables ---\n");
        for (name, value) in &rite.variables_delta {
            let _ = writeln!(out, "$$ {name} = {value}");
        }
        out.push('\n');
    }

    out.push_str("# --- Form ---\n");
    for (path, entry) in rite.manifest.iter() {
        if entry.action.is_change() {
            let _ = writeln!(out, "{path} << (Summoned from {short})");
        }
    }

    if !rite.edicts.is_empty() {
        out.push_str("\n%% post-run\n");
        for command in &rite.edicts {
            let _ = writeln!(out, "    {command}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use rite_types::{Digest, EntryAction, Manifest, ManifestEntry, RiteId};
    use serde_json::Value;

    use super::*;

    fn sealed(manifest: Manifest) -> ChronicleEntry {
        ChronicleEntry {
            rite_id: RiteId::new(),
            rite_name: "add api".into(),
            sequence: 2,
            parent: None,
            timestamp: Utc::now(),
            manifest,
            variables: BTreeMap::new(),
            variables_delta: BTreeMap::from([("port".to_string(), Value::from(8080))]),
            edicts: vec!["cargo fmt".into()],
            fingerprint: Digest::null(),
            operations: 3,
        }
    }

    #[test]
    fn only_changed_paths_are_summoned() {
        let mut manifest = Manifest::new();
        manifest.insert("README.md", ManifestEntry::for_content(b"r", EntryAction::Unchanged));
        manifest.insert("src/api.rs", ManifestEntry::for_content(b"a", EntryAction::Created));
        manifest.insert("src/lib.rs", ManifestEntry::for_content(b"l", EntryAction::Modified));
        manifest.insert("src/old.rs", ManifestEntry::for_content(b"o", EntryAction::Moved));
        let rite = sealed(manifest);
        let short = rite.rite_id.short_id();

        let text = forge_cherry_pick(&rite);
        assert!(text.starts_with("# == Cherry-pick: add api ==\n"));
        assert!(text.contains("$$ port = 8080\n"));
        assert!(text.contains(&format!("src/api.rs << (Summoned from {short})")));
        assert!(text.contains(&format!("src/lib.rs << (Summoned from {short})")));
        assert!(text.contains(&format!("src/old.rs << (Summoned from {short})")));
        assert!(!text.contains("README.md"));
        assert!(text.ends_with("%% post-run\n    cargo fmt\n"));
    }
}
