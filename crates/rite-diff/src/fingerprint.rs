//! Manifest fingerprints.

use rite_crypto::{ContentHasher, MerkleTree};
use rite_types::{Digest, Manifest};

/// Merkle root over `(path, sha256)` pairs in path order.
///
/// Depends only on tracked content: insertion order, sizes and entry actions
/// never change the result. The empty manifest yields the null digest.
pub fn compute_fingerprint(manifest: &Manifest) -> Digest {
    let leaves = manifest
        .iter()
        .map(|(path, entry)| {
            let hash: &[u8] = entry.sha256.as_bytes();
            ContentHasher::MANIFEST_LEAF.hash_parts(&[path.as_bytes(), hash])
        })
        .collect();
    MerkleTree::from_leaves(leaves).root()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rite_types::{EntryAction, ManifestEntry};

    use super::*;

    fn entry(content: &str, action: EntryAction) -> ManifestEntry {
        ManifestEntry::for_content(content.as_bytes(), action)
    }

    #[test]
    fn empty_manifest_is_null() {
        assert!(compute_fingerprint(&Manifest::new()).is_null());
    }

    #[test]
    fn content_changes_move_the_fingerprint() {
        let mut m = Manifest::new();
        m.insert("a.txt", entry("v1", EntryAction::Created));
        let before = compute_fingerprint(&m);
        m.insert("a.txt", entry("v2", EntryAction::Modified));
        assert_ne!(before, compute_fingerprint(&m));
    }

    #[test]
    fn path_is_part_of_the_leaf() {
        let mut a = Manifest::new();
        a.insert("a.txt", entry("x", EntryAction::Created));
        let mut b = Manifest::new();
        b.insert("b.txt", entry("x", EntryAction::Created));
        assert_ne!(compute_fingerprint(&a), compute_fingerprint(&b));
    }

    #[test]
    fn actions_do_not_matter() {
        let mut m = Manifest::new();
        m.insert("a.txt", entry("x", EntryAction::Created));
        assert_eq!(compute_fingerprint(&m), compute_fingerprint(&m.carried_over()));
    }

    proptest! {
        #[test]
        fn insertion_order_is_irrelevant(
            files in prop::collection::btree_map("[a-z]{1,6}(/[a-z]{1,6})?", "[ -~]{0,16}", 0..12),
            seed in any::<u64>()
        ) {
            let pairs: Vec<_> = files.into_iter().collect();
            let mut shuffled = pairs.clone();
            // Deterministic permutation driven by the seed.
            let n = shuffled.len();
            for i in (1..n).rev() {
                let j = (seed.rotate_left(i as u32) % (i as u64 + 1)) as usize;
                shuffled.swap(i, j);
            }

            let mut forward = Manifest::new();
            for (p, c) in &pairs {
                forward.insert(p.clone(), entry(c, EntryAction::Created));
            }
            let mut permuted = Manifest::new();
            for (p, c) in shuffled.iter().rev() {
                permuted.insert(p.clone(), entry(c, EntryAction::Unchanged));
            }
            prop_assert_eq!(compute_fingerprint(&forward), compute_fingerprint(&permuted));
        }
    }
}
