//! Compliance validation over a scanned tree.
//!
//! Validation annotates every node with a [`ComplianceState`] without
//! touching the filesystem (other than reading `.nfo` sidecars through the
//! metadata cache). The rules, in order of precedence for a directory:
//!
//! 1. A grammar match with doubled interior spaces is still malformed:
//!    the spacing override wins and the node is `BadName`, keeping the
//!    captured fields so a canonical destination can be rendered.
//! 2. A clean grammar match is `Ok` (flagged when the out-of-order variant
//!    matched).
//! 3. No match, but the directory contains subdirectories: an intermediate
//!    grouping level, left `Unclassified`.
//! 4. No match and no subdirectories: `BadName`. The sidecar cache is
//!    consulted so the renamer can tag the name with `(year) [tmdbid=id]`.
//!
//! A directory that matched with an `extra` segment additionally constrains
//! its primary media file; zero or several primary files is a structural
//! inconsistency that is logged and leaves the children untouched.

use crate::classifier::{
    canonical_child_base, canonical_track_name, compact_child_base, has_doubled_spaces,
    Classification, Classifier,
};
use crate::metadata::MetadataCache;
use crate::tree::{ComplianceState, NodeId, NodeKind, Tree};
use tracing::{debug, warn};

/// Aggregate counts from one validation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ValidationSummary {
    pub ok: usize,
    pub bad_name: usize,
    pub unclassified: usize,
    /// Directories whose primary-file constraint could not be checked
    /// because they held zero or several primary media files.
    pub inconsistencies: usize,
}

/// Stateless validation pass over a tree, backed by the sidecar cache.
pub struct Validator<'a> {
    movies: Classifier,
    tracks: Classifier,
    metadata: &'a MetadataCache,
}

impl<'a> Validator<'a> {
    pub fn new(metadata: &'a MetadataCache) -> Self {
        Self {
            movies: Classifier::movie_directories(),
            tracks: Classifier::tracks(),
            metadata,
        }
    }

    /// Annotates every node in the tree and returns the aggregate counts.
    /// Idempotent: a second pass over an unchanged tree yields the same
    /// states.
    pub fn validate(&self, tree: &mut Tree) -> ValidationSummary {
        let mut summary = ValidationSummary::default();

        for id in tree.preorder() {
            if id == tree.root() {
                continue;
            }
            match tree.node(id).kind {
                NodeKind::Directory => self.validate_directory(tree, id, &mut summary),
                NodeKind::MediaFile => self.validate_track_file(tree, id),
                _ => {}
            }
        }

        for id in tree.ids() {
            if id == tree.root() {
                continue;
            }
            match tree.node(id).state {
                ComplianceState::Ok => summary.ok += 1,
                ComplianceState::BadName => summary.bad_name += 1,
                ComplianceState::Unclassified => summary.unclassified += 1,
                _ => {}
            }
        }
        summary
    }

    fn validate_directory(&self, tree: &mut Tree, id: NodeId, summary: &mut ValidationSummary) {
        let leaf = tree.node(id).leaf_name();

        match self.movies.classify(&leaf) {
            Classification::Match(info) => {
                let malformed = has_doubled_spaces(&leaf);
                let constrain_child = info.fields.contains_key("extra");
                {
                    let node = tree.node_mut(id);
                    node.out_of_order = info.out_of_order;
                    node.fields = info.fields;
                    node.state = if malformed {
                        ComplianceState::BadName
                    } else {
                        ComplianceState::Ok
                    };
                }
                if constrain_child {
                    self.check_primary_child(tree, id, summary);
                }
            }
            Classification::NoMatch => {
                let has_subdirs = tree
                    .node(id)
                    .children
                    .iter()
                    .any(|child| tree.node(*child).is_dir());
                if has_subdirs {
                    // Intermediate grouping level; not subject to naming.
                    tree.node_mut(id).state = ComplianceState::Unclassified;
                    return;
                }

                let entry = self.metadata.lookup(&tree.node(id).abs_path);
                let node = tree.node_mut(id);
                node.state = ComplianceState::BadName;
                if entry.valid {
                    debug!(dir = %node.abs_path.display(), id = %entry.external_id,
                        "sidecar metadata available for tagging");
                    node.fields.insert("id".to_string(), entry.external_id);
                    node.fields.insert("year".to_string(), entry.year);
                    node.fields.insert("tag".to_string(), "tmdbid".to_string());
                }
            }
        }
    }

    /// Checks the primary-file constraint for a directory that matched with
    /// an `extra` segment: exactly one media file, named `{name} - {extra}`
    /// (or the compact `{name}-{extra}`). A parent matched by the
    /// out-of-order variant forces the file to `BadName` regardless of its
    /// current name. Also used by the grouping pass.
    pub fn check_primary_child(
        &self,
        tree: &mut Tree,
        dir: NodeId,
        summary: &mut ValidationSummary,
    ) {
        let media: Vec<NodeId> = tree
            .node(dir)
            .children
            .iter()
            .copied()
            .filter(|child| tree.node(*child).kind == NodeKind::MediaFile)
            .collect();

        if media.len() != 1 {
            warn!(
                dir = %tree.node(dir).abs_path.display(),
                count = media.len(),
                "expected exactly one primary media file"
            );
            summary.inconsistencies += 1;
            return;
        }

        let child = media[0];
        let parent = tree.node(dir);
        let Some(canonical) = canonical_child_base(&parent.fields) else {
            return;
        };
        let compact = compact_child_base(&parent.fields);
        let out_of_order = parent.out_of_order;
        let parent_fields = parent.fields.clone();

        let base = tree.node(child).base_name();
        let conforms = !out_of_order
            && (base == canonical || compact.as_deref() == Some(base.as_str()));

        let node = tree.node_mut(child);
        if conforms {
            node.state = ComplianceState::Ok;
        } else {
            node.state = ComplianceState::BadName;
            // Carry the parent's fields so the applier can render the
            // canonical child name.
            node.fields = parent_fields;
        }
    }

    /// Normalizes ordinal-prefixed media names (`3 - Theme` → `03 - Theme`).
    /// Only applies to files no parent constraint has already annotated.
    fn validate_track_file(&self, tree: &mut Tree, id: NodeId) {
        if tree.node(id).state != ComplianceState::Unclassified {
            return;
        }
        let base = tree.node(id).base_name();
        if let Classification::Match(info) = self.tracks.classify(&base) {
            let track: u32 = match info.fields["track"].parse() {
                Ok(track) => track,
                Err(_) => return,
            };
            // Empty captures are omitted from the field map: an ordinal with
            // nothing after the separator has no canonical form.
            let Some(name) = info.fields.get("name") else {
                return;
            };
            let canonical = canonical_track_name(track, name);
            let node = tree.node_mut(id);
            if base == canonical {
                node.state = ComplianceState::Ok;
            } else {
                node.state = ComplianceState::BadName;
                node.fields = info.fields;
            }
        }
    }
}
