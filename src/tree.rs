//! In-memory model of a scanned directory subtree.
//!
//! Nodes live in an arena owned by [`Tree`] and are addressed by opaque
//! [`NodeId`] handles. Parent and child relations are stored as handles, not
//! owning references, and a relative-path index supports lookup by path.
//! Handles stay valid for the lifetime of the tree, but after a rename
//! re-keys part of the tree, any *path* cached by a caller is stale — callers
//! must re-resolve through [`Tree::lookup`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Stable handle to a node in a [`Tree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Discriminates what a tree node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The scan root itself.
    Root,
    /// A synthetic grouping node keyed by an external identifier.
    GroupKey,
    /// A real directory on disk.
    Directory,
    /// A playlist manifest file (e.g. `.m3u`).
    PlaylistFile,
    /// A media file accepted by the extension filter.
    MediaFile,
    /// Any other accepted file.
    LeafFile,
}

/// Compliance annotation produced by validation and mutated only by a fresh
/// validation pass or by the applier's `BadName` → `RenamedOk` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplianceState {
    /// Not yet examined, or an intermediate grouping directory.
    Unclassified,
    /// Name conforms (possibly via the flagged out-of-order grammar).
    Ok,
    /// Name does not conform and should be renamed.
    BadName,
    /// A mirror counterpart could not be resolved. Terminal.
    Missing,
    /// Renamed during this run. Terminal; never renamed twice in one pass.
    RenamedOk,
}

/// A single node: one directory or file observed (or synthesized) during a
/// scan, plus its classification annotations.
#[derive(Debug)]
pub struct TreeNode {
    /// Absolute path on disk.
    pub abs_path: PathBuf,
    /// Path relative to the scan root, `/`-separated; `"."` for the root.
    pub rel_path: String,
    pub kind: NodeKind,
    pub state: ComplianceState,
    /// Set when the node matched via an out-of-order grammar variant.
    pub out_of_order: bool,
    /// Capture-name → value, populated once by classification.
    pub fields: BTreeMap<String, String>,
    pub parent: Option<NodeId>,
    /// Child handles in insertion (scan) order.
    pub children: Vec<NodeId>,
}

impl TreeNode {
    /// Final path component as UTF-8, lossy.
    pub fn leaf_name(&self) -> String {
        self.abs_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File stem (base name without extension) as UTF-8, lossy.
    pub fn base_name(&self) -> String {
        self.abs_path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Container nodes: real directories, the root, and synthetic GroupKey
    /// nodes (which hold directories even though nothing backs them on disk).
    pub fn is_dir(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Root | NodeKind::GroupKey | NodeKind::Directory
        )
    }

    pub fn is_file(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::PlaylistFile | NodeKind::MediaFile | NodeKind::LeafFile
        )
    }
}

/// Arena-backed forest rooted at a single scan root.
pub struct Tree {
    root_path: PathBuf,
    nodes: Vec<TreeNode>,
    index: HashMap<String, NodeId>,
}

impl Tree {
    /// Creates a tree containing only the root node for `root_path`.
    pub fn new(root_path: &Path) -> Self {
        let root = TreeNode {
            abs_path: root_path.to_path_buf(),
            rel_path: ".".to_string(),
            kind: NodeKind::Root,
            state: ComplianceState::Unclassified,
            out_of_order: false,
            fields: BTreeMap::new(),
            parent: None,
            children: Vec::new(),
        };
        let mut index = HashMap::new();
        index.insert(".".to_string(), NodeId(0));
        Self {
            root_path: root_path.to_path_buf(),
            nodes: vec![root],
            index,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        // The root always exists; "empty" means nothing was scanned into it.
        self.nodes.len() <= 1
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut TreeNode {
        &mut self.nodes[id.0]
    }

    /// Resolves a relative path (`/`-separated, `"."` for the root) to a
    /// handle. Paths are the only stable way to address a node after a
    /// rename has re-keyed part of the tree.
    pub fn lookup(&self, rel_path: &str) -> Option<NodeId> {
        self.index.get(rel_path).copied()
    }

    /// All node handles in insertion order (root first).
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + use<> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Converts an absolute path under the root into the tree's normalized
    /// relative form. Returns `None` for paths outside the root.
    pub fn relative_key(&self, abs: &Path) -> Option<String> {
        let stripped = abs.strip_prefix(&self.root_path).ok()?;
        let mut parts = Vec::new();
        for component in stripped.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => return None,
            }
        }
        if parts.is_empty() {
            Some(".".to_string())
        } else {
            Some(parts.join("/"))
        }
    }

    /// Inserts a new node under `parent`. The relative path is derived from
    /// the parent's, keeping the `parent.rel / leaf` invariant.
    pub fn insert(&mut self, parent: NodeId, abs_path: PathBuf, kind: NodeKind) -> NodeId {
        let leaf = abs_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let parent_rel = &self.nodes[parent.0].rel_path;
        let rel_path = if parent_rel == "." {
            leaf
        } else {
            format!("{}/{}", parent_rel, leaf)
        };
        let id = NodeId(self.nodes.len());
        self.nodes.push(TreeNode {
            abs_path,
            rel_path: rel_path.clone(),
            kind,
            state: ComplianceState::Unclassified,
            out_of_order: false,
            fields: BTreeMap::new(),
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        self.index.insert(rel_path, id);
        id
    }

    /// Resolves the node for a directory path, synthesizing any missing
    /// ancestors on demand. The recursion terminates at the declared root; a
    /// guard over visited real paths stops cyclic symlink chains.
    pub fn ensure_dir(&mut self, abs: &Path) -> NodeId {
        let mut visiting = HashSet::new();
        self.ensure_dir_guarded(abs, &mut visiting)
    }

    fn ensure_dir_guarded(&mut self, abs: &Path, visiting: &mut HashSet<PathBuf>) -> NodeId {
        let Some(rel) = self.relative_key(abs) else {
            return self.root();
        };
        if let Some(id) = self.index.get(&rel) {
            return *id;
        }
        let real = abs.canonicalize().unwrap_or_else(|_| abs.to_path_buf());
        if !visiting.insert(real) {
            warn!(path = %abs.display(), "cycle detected while synthesizing ancestors");
            return self.root();
        }
        let parent_abs = abs.parent().unwrap_or(&self.root_path).to_path_buf();
        let parent = self.ensure_dir_guarded(&parent_abs, visiting);
        self.insert(parent, abs.to_path_buf(), NodeKind::Directory)
    }

    /// Depth-first preorder walk (parents before children).
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            // Reverse so children come off the stack in insertion order.
            for child in self.nodes[id.0].children.iter().rev() {
                stack.push(*child);
            }
        }
        order
    }

    /// Depth-first postorder walk (children before the parent directory that
    /// contains them) — the order renames must be applied in.
    pub fn postorder(&self) -> Vec<NodeId> {
        let mut order = self.preorder();
        order.reverse();
        order
    }

    /// Re-keys a node (and its entire subtree) after a rename, updating both
    /// the stored paths and the relative-path index. Incremental by design:
    /// later siblings in the same pass resolve against the new key.
    pub fn rekey(&mut self, id: NodeId, new_abs: PathBuf) {
        let old_rel = self.nodes[id.0].rel_path.clone();
        let new_rel = self
            .relative_key(&new_abs)
            .unwrap_or_else(|| old_rel.clone());

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &mut self.nodes[current.0];
            let suffix = node.rel_path[old_rel.len()..].to_string();
            let updated_rel = format!("{}{}", new_rel, suffix);
            let updated_abs = if current == id {
                new_abs.clone()
            } else {
                let tail: PathBuf = suffix.trim_start_matches('/').split('/').collect();
                new_abs.join(tail)
            };
            self.index.remove(&node.rel_path);
            node.rel_path = updated_rel.clone();
            node.abs_path = updated_abs;
            self.index.insert(updated_rel, current);
            stack.extend(node.children.iter().copied());
        }
    }
}
