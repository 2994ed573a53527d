use std::collections::BTreeMap;

use rite_store::jail;

/// What a staged node means for its real counterpart at commit time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NodeState {
    /// Untouched; present only to reach staged descendants or carry a mode.
    #[default]
    Passthrough,
    /// A directory that must exist. `clear_existing` hides (and at commit,
    /// trashes) whatever the real filesystem has at this path.
    Dir { clear_existing: bool },
    /// A file whose new body sits in the staging root.
    File,
    /// Removed by the rite.
    Removed { recursive: bool },
}

/// One node of the staging overlay.
#[derive(Clone, Debug, Default)]
pub struct StagedNode {
    pub state: NodeState,
    /// Permission bits to apply after the node is materialized.
    pub mode: Option<u32>,
    children: BTreeMap<String, StagedNode>,
}

/// Effective view of one path through the overlay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup {
    StagedFile,
    StagedDir,
    /// Removed or hidden by the rite.
    Absent,
    /// Not staged; the real filesystem decides.
    Real,
}

/// Overlay of a rite's pending changes, keyed by path components.
///
/// Materialization walks it pre-order with children in name order, so a
/// directory is always handled before anything inside it.
#[derive(Clone, Debug, Default)]
pub struct StagingTree {
    root: StagedNode,
}

impl StagingTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    pub fn node(&self, path: &str) -> Option<&StagedNode> {
        let mut node = &self.root;
        for segment in segments(path) {
            node = node.children.get(segment)?;
        }
        Some(node)
    }

    fn node_mut(&mut self, path: &str) -> &mut StagedNode {
        let mut node = &mut self.root;
        for segment in segments(path) {
            node = node.children.entry(segment.to_string()).or_default();
        }
        node
    }

    /// Set the state of `path`, creating passthrough ancestors.
    ///
    /// Files and removals cannot have staged descendants, so those are
    /// dropped. A removal also forgets any pending mode.
    pub fn set(&mut self, path: &str, state: NodeState) {
        let node = self.node_mut(path);
        node.state = state;
        match state {
            NodeState::File => node.children.clear(),
            NodeState::Removed { .. } => {
                node.children.clear();
                node.mode = None;
            }
            NodeState::Passthrough | NodeState::Dir { .. } => {}
        }
    }

    pub fn set_mode(&mut self, path: &str, mode: Option<u32>) {
        self.node_mut(path).mode = mode;
    }

    /// How `path` looks once the overlay is applied on top of the real tree.
    pub fn lookup(&self, path: &str) -> Lookup {
        let parts: Vec<&str> = segments(path).collect();
        let mut node = &self.root;
        let mut shadowed = false;
        for (i, segment) in parts.iter().enumerate() {
            node = match node.children.get(*segment) {
                Some(child) => child,
                None if shadowed => return Lookup::Absent,
                None => return Lookup::Real,
            };
            let last = i + 1 == parts.len();
            match (node.state, last) {
                (NodeState::File, true) => return Lookup::StagedFile,
                (NodeState::Dir { .. }, true) => return Lookup::StagedDir,
                (NodeState::Removed { .. }, _) => return Lookup::Absent,
                (NodeState::Passthrough, true) => {
                    return if shadowed { Lookup::Absent } else { Lookup::Real }
                }
                (NodeState::File, false) => return Lookup::Absent,
                (NodeState::Dir { clear_existing }, false) => shadowed |= clear_existing,
                (NodeState::Passthrough, false) => {}
            }
        }
        // The root itself.
        Lookup::Real
    }

    /// Names of the staged children of `path`.
    pub fn child_names(&self, path: &str) -> Vec<String> {
        self.node(path)
            .map(|n| n.children.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every node in pre-order (parents before children, siblings by name).
    pub fn walk(&self) -> Vec<(String, NodeState, Option<u32>)> {
        let mut out = Vec::new();
        walk_into(&self.root, "", &mut out);
        out
    }

    /// Nodes that will change something at commit.
    pub fn pending(&self) -> usize {
        self.walk()
            .iter()
            .filter(|(_, state, mode)| *state != NodeState::Passthrough || mode.is_some())
            .count()
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn walk_into(node: &StagedNode, prefix: &str, out: &mut Vec<(String, NodeState, Option<u32>)>) {
    for (name, child) in &node.children {
        let path = jail::join(prefix, name);
        out.push((path.clone(), child.state, child.mode));
        walk_into(child, &path, out);
    }
}
