use rite_types::Digest;

/// Binary Merkle tree over a sequence of leaf digests.
///
/// Leaf order matters; callers that want an order-independent root must sort
/// their leaves first.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    root: Digest,
    leaf_count: usize,
}

impl MerkleTree {
    /// Build a Merkle tree from leaf digests.
    ///
    /// An empty list produces a null root. A single leaf is its own root.
    pub fn from_leaves(leaves: Vec<Digest>) -> Self {
        let leaf_count = leaves.len();
        if leaves.is_empty() {
            return Self {
                root: Digest::null(),
                leaf_count,
            };
        }

        let mut current = leaves;
        while current.len() > 1 {
            current = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_pair(left, right),
                    // Odd node: hash with itself
                    [single] => hash_pair(single, single),
                    _ => unreachable!("chunks(2) yields one or two items"),
                })
                .collect();
        }

        Self {
            root: current[0],
            leaf_count,
        }
    }

    /// The root hash of the tree.
    pub fn root(&self) -> Digest {
        self.root
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }
}

fn hash_pair(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"rite-merkle-v1:");
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Digest::from_hash(*hasher.finalize().as_bytes())
}
