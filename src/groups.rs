//! Grouping directories by external identifier.
//!
//! Directories carrying the same database id (multiple cuts or editions of
//! one title) are collected under a shared group key. Groups with a single
//! member are built but hidden: grouping only earns its place on screen when
//! there is actually more than one edition.

use crate::classifier::{Classification, Classifier};
use crate::tree::{NodeId, NodeKind, Tree};
use crate::validator::{ValidationSummary, Validator};
use std::collections::HashMap;
use tracing::debug;

/// One group: every scanned directory sharing an external id.
#[derive(Debug)]
pub struct Group {
    /// The external id the members share.
    pub key: String,
    /// Display name, taken from the first member encountered.
    pub name: String,
    /// Member directories in scan order.
    pub members: Vec<NodeId>,
}

impl Group {
    /// Singleton groups exist but are not worth showing.
    pub fn is_hidden(&self) -> bool {
        self.members.len() < 2
    }
}

/// All groups extracted from one tree, in order of first appearance.
#[derive(Debug, Default)]
pub struct GroupSet {
    groups: Vec<Group>,
}

impl GroupSet {
    /// Builds groups from every directory whose name carries an id tag.
    pub fn build(tree: &Tree) -> Self {
        let classifier = Classifier::group_keys();
        let mut by_key: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<Group> = Vec::new();

        for id in tree.preorder() {
            let node = tree.node(id);
            if node.kind != NodeKind::Directory {
                continue;
            }
            let Classification::Match(info) = classifier.classify(&node.leaf_name()) else {
                continue;
            };
            let Some(key) = info.fields.get("id") else {
                continue;
            };
            let slot = *by_key.entry(key.clone()).or_insert_with(|| {
                groups.push(Group {
                    key: key.clone(),
                    name: info
                        .fields
                        .get("name")
                        .cloned()
                        .unwrap_or_else(|| key.clone()),
                    members: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].members.push(id);
        }

        debug!(groups = groups.len(), "grouping complete");
        Self { groups }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// All groups, hidden ones included.
    pub fn iter(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter()
    }

    /// Only the groups with two or more members.
    pub fn visible(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter().filter(|group| !group.is_hidden())
    }

    /// Materializes the grouping as its own forest: one synthetic GroupKey
    /// node per group under the root, with the member directories attached
    /// beneath it, carrying over their compliance annotations. The forest is
    /// the display model for group review; the source tree stays untouched.
    pub fn forest(&self, source: &Tree) -> Tree {
        let mut forest = Tree::new(source.root_path());
        for group in &self.groups {
            let key_abs = source
                .root_path()
                .join(format!("{} [{}]", group.name, group.key));
            let key_node = forest.insert(forest.root(), key_abs, NodeKind::GroupKey);
            for member in group.members.iter().copied() {
                let node = source.node(member);
                let id = forest.insert(key_node, node.abs_path.clone(), NodeKind::Directory);
                let copy = forest.node_mut(id);
                copy.state = node.state;
                copy.out_of_order = node.out_of_order;
            }
        }
        forest
    }

    /// Re-checks the primary-file constraint for every member directory that
    /// carries an `extra` segment, so group review surfaces file-level
    /// problems next to the grouping itself.
    pub fn validate_members(&self, tree: &mut Tree, validator: &Validator<'_>) -> ValidationSummary {
        let mut summary = ValidationSummary::default();
        for group in &self.groups {
            for member in group.members.iter().copied() {
                if tree.node(member).fields.contains_key("extra") {
                    validator.check_primary_child(tree, member, &mut summary);
                }
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataCache;
    use crate::tree::ComplianceState;
    use std::path::Path;

    fn dir(tree: &mut Tree, name: &str) -> NodeId {
        let abs = tree.root_path().join(name);
        tree.insert(tree.root(), abs, NodeKind::Directory)
    }

    #[test]
    fn test_editions_group_under_shared_id() {
        let mut tree = Tree::new(Path::new("/library"));
        dir(&mut tree, "Alien (1979) - Theatrical [tmdbid=348]");
        dir(&mut tree, "Alien (1979) - Director's Cut [tmdbid=348]");
        dir(&mut tree, "Dune (1984) [tmdbid=841]");

        let groups = GroupSet::build(&tree);
        assert_eq!(groups.len(), 2);

        let visible: Vec<&Group> = groups.visible().collect();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].key, "348");
        assert_eq!(visible[0].name, "Alien");
        assert_eq!(visible[0].members.len(), 2);
    }

    #[test]
    fn test_singleton_groups_are_hidden() {
        let mut tree = Tree::new(Path::new("/library"));
        dir(&mut tree, "Dune (1984) [tmdbid=841]");

        let groups = GroupSet::build(&tree);
        assert_eq!(groups.len(), 1);
        assert!(groups.iter().next().unwrap().is_hidden());
        assert_eq!(groups.visible().count(), 0);
    }

    #[test]
    fn test_untagged_directories_do_not_group() {
        let mut tree = Tree::new(Path::new("/library"));
        dir(&mut tree, "Loose Files");

        let groups = GroupSet::build(&tree);
        assert!(groups.is_empty());
    }

    #[test]
    fn test_forest_synthesizes_group_key_nodes() {
        let mut tree = Tree::new(Path::new("/library"));
        let theatrical = dir(&mut tree, "Alien (1979) - Theatrical [tmdbid=348]");
        dir(&mut tree, "Alien (1979) - Director's Cut [tmdbid=348]");
        tree.node_mut(theatrical).state = ComplianceState::Ok;

        let groups = GroupSet::build(&tree);
        let forest = groups.forest(&tree);

        let keys = &forest.node(forest.root()).children;
        assert_eq!(keys.len(), 1);
        let key = forest.node(keys[0]);
        assert_eq!(key.kind, NodeKind::GroupKey);
        assert_eq!(key.leaf_name(), "Alien [348]");
        // A GroupKey is a container even though nothing backs it on disk.
        assert!(key.is_dir());

        assert_eq!(key.children.len(), 2);
        let first = forest.node(key.children[0]);
        assert_eq!(first.kind, NodeKind::Directory);
        assert_eq!(first.leaf_name(), "Alien (1979) - Theatrical [tmdbid=348]");
        // Member annotations carry over from the source tree.
        assert_eq!(first.state, ComplianceState::Ok);
    }

    #[test]
    fn test_member_files_are_checked_within_groups() {
        let mut tree = Tree::new(Path::new("/library"));
        let a = dir(&mut tree, "Alien (1979) - Theatrical [tmdbid=348]");
        let file = tree.insert(
            a,
            Path::new("/library/Alien (1979) - Theatrical [tmdbid=348]/Alien.mkv").to_path_buf(),
            NodeKind::MediaFile,
        );
        dir(&mut tree, "Alien (1979) - Director's Cut [tmdbid=348]");

        let cache = MetadataCache::new();
        let validator = Validator::new(&cache);
        validator.validate(&mut tree);

        let groups = GroupSet::build(&tree);
        groups.validate_members(&mut tree, &validator);
        // "Alien" does not match "Alien - Theatrical".
        assert_eq!(tree.node(file).state, ComplianceState::BadName);
    }
}
