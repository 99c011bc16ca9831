//! Mirror-tree synchronization.
//!
//! A mirror is a second directory tree kept structurally parallel to a
//! reference tree (a transcoded copy of a library, for instance). After the
//! reference has been renamed into canonical form, the mirror's directories
//! must follow. The relation is non-owning: a [`MirrorIndex`] maps relative
//! paths to mirror-side absolute paths, and the applier consults and re-keys
//! it incrementally as it renames.
//!
//! Only directories participate; files travel with the directory that
//! contains them.

use crate::progress::CancelToken;
use crate::report::{Outcome, RunReport};
use crate::tree::{ComplianceState, Tree};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Relative path → mirror-side absolute path, directories only.
#[derive(Debug)]
pub struct MirrorIndex {
    dirs: HashMap<String, PathBuf>,
}

impl MirrorIndex {
    /// Indexes every directory of a scanned mirror tree, the root included
    /// (under its `"."` key).
    pub fn build(mirror: &Tree) -> Self {
        let mut dirs = HashMap::new();
        for id in mirror.ids() {
            let node = mirror.node(id);
            if node.is_dir() {
                dirs.insert(node.rel_path.clone(), node.abs_path.clone());
            }
        }
        Self { dirs }
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    pub fn lookup(&self, rel_path: &str) -> Option<&PathBuf> {
        self.dirs.get(rel_path)
    }

    /// Re-keys an entry and its whole subtree after a mirror-side rename, so
    /// later lookups in the same pass resolve against the new location.
    pub fn rekey(&mut self, old_rel: &str, new_rel: &str, new_abs: &Path) {
        let affected: Vec<String> = self
            .dirs
            .keys()
            .filter(|key| {
                key.as_str() == old_rel || key.starts_with(&format!("{}/", old_rel))
            })
            .cloned()
            .collect();

        for key in affected {
            let suffix = key[old_rel.len()..].to_string();
            let updated_rel = format!("{}{}", new_rel, suffix);
            let updated_abs = if suffix.is_empty() {
                new_abs.to_path_buf()
            } else {
                let tail: PathBuf = suffix.trim_start_matches('/').split('/').collect();
                new_abs.join(tail)
            };
            self.dirs.remove(&key);
            self.dirs.insert(updated_rel, updated_abs);
        }
    }
}

/// Tallies from one synchronization pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MirrorSummary {
    /// Reference directories whose counterpart already had the right path.
    pub in_sync: usize,
    /// Mirror directories renamed to match the reference.
    pub renamed: usize,
    /// Reference directories with no resolvable counterpart.
    pub missing: usize,
}

/// Propagates reference-side directory names onto the mirror.
///
/// Walks the validated reference tree top-down. For each directory whose
/// relative path is absent from the mirror index, the counterpart is resolved
/// by fallback under the already-synchronized mirror parent: a directory
/// named `{name}`, then `{name} ({year})`, from the reference node's captured
/// fields. A resolved counterpart is renamed to the reference leaf name and
/// the index re-keyed; an unresolved one marks the reference node `Missing`
/// and reports `MissingCounterpart`. Failures never stop the pass.
pub fn sync(
    reference: &mut Tree,
    index: &mut MirrorIndex,
    cancel: &CancelToken,
    report: &mut RunReport,
) -> MirrorSummary {
    let mut summary = MirrorSummary::default();

    for id in reference.preorder() {
        if cancel.is_cancelled() {
            break;
        }
        if id == reference.root() {
            continue;
        }
        let node = reference.node(id);
        if !node.is_dir() {
            continue;
        }

        let rel = node.rel_path.clone();
        if index.lookup(&rel).is_some() {
            summary.in_sync += 1;
            continue;
        }

        let leaf = node.leaf_name();
        let parent_rel = node
            .parent
            .map(|parent| reference.node(parent).rel_path.clone())
            .unwrap_or_else(|| ".".to_string());
        let Some(mirror_parent) = index.lookup(&parent_rel).cloned() else {
            // The whole ancestor chain is absent on the mirror side.
            summary.missing += 1;
            report.record(&reference.node(id).abs_path, Outcome::MissingCounterpart);
            reference.node_mut(id).state = ComplianceState::Missing;
            continue;
        };

        let Some((candidate_leaf, candidate_abs)) =
            resolve_counterpart(reference.node(id).fields.get("name"), reference.node(id).fields.get("year"), &mirror_parent)
        else {
            summary.missing += 1;
            report.record(&reference.node(id).abs_path, Outcome::MissingCounterpart);
            reference.node_mut(id).state = ComplianceState::Missing;
            continue;
        };

        let target = mirror_parent.join(&leaf);
        if target.exists() {
            warn!(target = %target.display(), "mirror destination already exists");
            report.record(
                &candidate_abs,
                Outcome::Failed(format!("destination exists: {}", target.display())),
            );
            continue;
        }

        match fs::rename(&candidate_abs, &target) {
            Ok(()) => {
                debug!(from = %candidate_abs.display(), to = %target.display(),
                    "mirror directory renamed");
                let candidate_rel = if parent_rel == "." {
                    candidate_leaf
                } else {
                    format!("{}/{}", parent_rel, candidate_leaf)
                };
                index.rekey(&candidate_rel, &rel, &target);
                report.record(&candidate_abs, Outcome::RenamedOk);
                summary.renamed += 1;
            }
            Err(e) => {
                warn!(from = %candidate_abs.display(), error = %e, "mirror rename failed");
                report.record(&candidate_abs, Outcome::Failed(e.to_string()));
            }
        }
    }
    summary
}

/// Tries the fallback counterpart names under the mirror parent: `{name}`,
/// then `{name} ({year})`. Returns the first that exists as a directory.
fn resolve_counterpart(
    name: Option<&String>,
    year: Option<&String>,
    mirror_parent: &Path,
) -> Option<(String, PathBuf)> {
    let name = name?;
    let mut candidates = vec![name.clone()];
    if let Some(year) = year {
        candidates.push(format!("{} ({})", name, year));
    }
    for candidate in candidates {
        let abs = mirror_parent.join(&candidate);
        if abs.is_dir() {
            return Some((candidate, abs));
        }
    }
    None
}
