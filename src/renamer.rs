//! Rename planning and application.
//!
//! Renaming is split into two phases so dry runs are first-class: planners
//! walk the validated tree and produce a list of intended renames without
//! touching the filesystem; the applier executes a plan bottom-up, one node
//! at a time, re-keying the tree after each success so later plan entries
//! resolve against the updated paths.
//!
//! A destination that already exists on disk, or that an earlier rename in
//! the same pass already claimed, is never clobbered: that entry fails and
//! the pass moves on.

use crate::classifier::{canonical_child_base, canonical_directory_name, canonical_track_name};
use crate::progress::CancelToken;
use crate::report::{Outcome, RunReport};
use crate::tree::{ComplianceState, NodeId, NodeKind, Tree};
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// An existing parenthesized number anywhere in a name, with surrounding
/// whitespace, so re-tagging replaces a stale year instead of stacking a
/// second one.
static YEAR_PAREN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\(\s*\d+\s*\)\s*").expect("valid regex"));

/// One intended rename. `from` and `to` are the paths as of planning time;
/// the applier re-resolves against the live tree before executing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRename {
    pub node: NodeId,
    pub from: PathBuf,
    pub to: PathBuf,
}

/// A full plan: the renames to perform plus the flagged nodes that have no
/// canonical target and are deliberately left alone.
#[derive(Debug, Default)]
pub struct RenamePlan {
    pub renames: Vec<PlannedRename>,
    pub skipped: Vec<NodeId>,
}

impl RenamePlan {
    pub fn is_empty(&self) -> bool {
        self.renames.is_empty() && self.skipped.is_empty()
    }
}

pub struct Renamer;

impl Renamer {
    /// Plans canonical renames for every `BadName` node that validation gave
    /// enough fields to render a target from. Bottom-up order: files before
    /// the directories that contain them.
    pub fn plan_bad_names(tree: &Tree) -> RenamePlan {
        let mut plan = RenamePlan::default();

        for id in tree.postorder() {
            if id == tree.root() {
                continue;
            }
            let node = tree.node(id);
            if node.state != ComplianceState::BadName {
                continue;
            }

            let target_leaf = match node.kind {
                NodeKind::Directory => canonical_directory_name(&node.fields),
                NodeKind::MediaFile => Self::media_target(tree, id),
                _ => None,
            };

            match target_leaf {
                Some(leaf) if leaf != node.leaf_name() => {
                    let to = node
                        .abs_path
                        .parent()
                        .map(|parent| parent.join(&leaf))
                        .unwrap_or_else(|| PathBuf::from(&leaf));
                    plan.renames.push(PlannedRename {
                        node: id,
                        from: node.abs_path.clone(),
                        to,
                    });
                }
                _ => plan.skipped.push(id),
            }
        }
        plan
    }

    /// Canonical base name for a flagged media file, extension preserved.
    fn media_target(tree: &Tree, id: NodeId) -> Option<String> {
        let node = tree.node(id);
        let base = if let Some(child_base) = canonical_child_base(&node.fields) {
            child_base
        } else {
            let track: u32 = node.fields.get("track")?.parse().ok()?;
            canonical_track_name(track, node.fields.get("name")?)
        };
        Some(match node.abs_path.extension() {
            Some(ext) => format!("{}.{}", base, ext.to_string_lossy()),
            None => base,
        })
    }

    /// Plans sidecar-driven tagging for flagged directories the grammars
    /// could not parse but whose `.nfo` metadata validation attached:
    /// `Alien` becomes `Alien (1979) [tmdbid=348]`. An existing
    /// parenthesized number is replaced rather than duplicated.
    pub fn plan_metadata_tags(tree: &Tree) -> RenamePlan {
        let mut plan = RenamePlan::default();

        for id in tree.postorder() {
            if id == tree.root() {
                continue;
            }
            let node = tree.node(id);
            if node.kind != NodeKind::Directory || node.state != ComplianceState::BadName {
                continue;
            }
            // Grammar-matched directories are handled by plan_bad_names.
            if node.fields.contains_key("name") {
                continue;
            }
            let (Some(external_id), Some(year)) =
                (node.fields.get("id"), node.fields.get("year"))
            else {
                plan.skipped.push(id);
                continue;
            };

            let leaf = node.leaf_name();
            if leaf.contains("[tmdbid=") || leaf.contains("[imdbid=") {
                debug!(dir = %node.abs_path.display(), "already tagged, leaving alone");
                plan.skipped.push(id);
                continue;
            }

            let tag = node.fields.get("tag").map(String::as_str).unwrap_or("tmdbid");
            let dated = if YEAR_PAREN_RE.is_match(&leaf) {
                YEAR_PAREN_RE
                    .replace(&leaf, format!(" ({}) ", year))
                    .trim()
                    .to_string()
            } else {
                format!("{} ({})", leaf.trim_end(), year)
            };
            let target = format!("{} [{}={}]", dated, tag, external_id);

            if target != leaf {
                let to = node
                    .abs_path
                    .parent()
                    .map(|parent| parent.join(&target))
                    .unwrap_or_else(|| PathBuf::from(&target));
                plan.renames.push(PlannedRename {
                    node: id,
                    from: node.abs_path.clone(),
                    to,
                });
            }
        }
        plan
    }

    /// Executes a plan. Each entry is re-resolved against the live tree (an
    /// earlier rename may have moved an ancestor), pre-flight checked
    /// against both the disk and the destinations already claimed this pass,
    /// then renamed. Failures are recorded and the pass continues; a
    /// cancellation request stops between entries without rolling back.
    pub fn apply(
        tree: &mut Tree,
        plan: &RenamePlan,
        cancel: &CancelToken,
        report: &mut RunReport,
    ) {
        for id in plan.skipped.iter().copied() {
            report.record(&tree.node(id).abs_path, Outcome::Skipped);
        }

        let mut claimed: HashSet<PathBuf> = HashSet::new();
        for rename in &plan.renames {
            if cancel.is_cancelled() {
                break;
            }

            let from = tree.node(rename.node).abs_path.clone();
            let leaf = rename
                .to
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let to = from
                .parent()
                .map(|parent| parent.join(&leaf))
                .unwrap_or_else(|| PathBuf::from(&leaf));

            if to.exists() || claimed.contains(&to) {
                warn!(from = %from.display(), to = %to.display(), "destination exists");
                report.record(
                    &from,
                    Outcome::Failed(format!("destination exists: {}", to.display())),
                );
                continue;
            }

            match fs::rename(&from, &to) {
                Ok(()) => {
                    claimed.insert(to.clone());
                    tree.rekey(rename.node, to);
                    tree.node_mut(rename.node).state = ComplianceState::RenamedOk;
                    report.record(&from, Outcome::RenamedOk);
                }
                Err(e) => {
                    warn!(from = %from.display(), error = %e, "rename failed");
                    report.record(&from, Outcome::Failed(e.to_string()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use crate::metadata::MetadataCache;
    use crate::scanner::Scanner;
    use crate::validator::Validator;
    use std::path::Path;

    fn scan_and_validate(root: &Path) -> Tree {
        let filter = ScanConfig::default().compile().unwrap();
        let mut tree = Scanner::new(&filter)
            .scan(root, &CancelToken::new(), None, None)
            .unwrap()
            .tree;
        let cache = MetadataCache::new();
        Validator::new(&cache).validate(&mut tree);
        tree
    }

    #[test]
    fn test_out_of_order_directory_renames_its_file_only() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("Alien (1979) [tmdbid=348] - Director's Cut");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("Alien.mkv"), b"").unwrap();

        let mut tree = scan_and_validate(tmp.path());
        let plan = Renamer::plan_bad_names(&tree);
        let mut report = RunReport::new();
        Renamer::apply(&mut tree, &plan, &CancelToken::new(), &mut report);

        assert!(dir.join("Alien - Director's Cut.mkv").exists());
        assert!(!dir.join("Alien.mkv").exists());
        // The flagged directory itself keeps its name.
        assert!(dir.exists());
        assert_eq!(report.counts().renamed, 1);
    }

    #[test]
    fn test_canonical_child_under_flagged_parent_is_left_in_place() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("Alien (1979) [tmdbid=348] - Director's Cut");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("Alien - Director's Cut.mkv"), b"").unwrap();

        let mut tree = scan_and_validate(tmp.path());
        // Flagged by validation, but the target equals the current name.
        let plan = Renamer::plan_bad_names(&tree);
        assert!(plan.renames.is_empty());
        assert_eq!(plan.skipped.len(), 1);

        let mut report = RunReport::new();
        Renamer::apply(&mut tree, &plan, &CancelToken::new(), &mut report);
        assert!(dir.join("Alien - Director's Cut.mkv").exists());
        assert_eq!(report.counts().skipped, 1);
    }

    #[test]
    fn test_doubled_space_directory_renamed_to_canonical() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("Alien  (1979) [tmdbid=348]")).unwrap();

        let mut tree = scan_and_validate(tmp.path());
        let plan = Renamer::plan_bad_names(&tree);
        let mut report = RunReport::new();
        Renamer::apply(&mut tree, &plan, &CancelToken::new(), &mut report);

        assert!(tmp.path().join("Alien (1979) [tmdbid=348]").exists());
        assert!(!tmp.path().join("Alien  (1979) [tmdbid=348]").exists());
        // The tree follows the rename.
        assert!(tree.lookup("Alien (1979) [tmdbid=348]").is_some());
    }

    #[test]
    fn test_existing_destination_is_never_clobbered() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("Alien  (1979) [tmdbid=348]")).unwrap();
        fs::create_dir(tmp.path().join("Alien (1979) [tmdbid=348]")).unwrap();

        let mut tree = scan_and_validate(tmp.path());
        let plan = Renamer::plan_bad_names(&tree);
        let mut report = RunReport::new();
        Renamer::apply(&mut tree, &plan, &CancelToken::new(), &mut report);

        // Both directories still exist; the collision is reported.
        assert!(tmp.path().join("Alien  (1979) [tmdbid=348]").exists());
        assert_eq!(report.counts().failed, 1);
        assert_eq!(report.counts().renamed, 0);
    }

    #[test]
    fn test_unrenderable_bad_names_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("Loose Name")).unwrap();

        let mut tree = scan_and_validate(tmp.path());
        let plan = Renamer::plan_bad_names(&tree);
        assert!(plan.renames.is_empty());
        assert_eq!(plan.skipped.len(), 1);

        let mut report = RunReport::new();
        Renamer::apply(&mut tree, &plan, &CancelToken::new(), &mut report);
        assert_eq!(report.counts().skipped, 1);
        assert!(tmp.path().join("Loose Name").exists());
    }

    #[test]
    fn test_track_padding_rename() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("3 - Main Theme.mkv"), b"").unwrap();

        let mut tree = scan_and_validate(tmp.path());
        let plan = Renamer::plan_bad_names(&tree);
        let mut report = RunReport::new();
        Renamer::apply(&mut tree, &plan, &CancelToken::new(), &mut report);

        assert!(tmp.path().join("03 - Main Theme.mkv").exists());
        assert!(!tmp.path().join("3 - Main Theme.mkv").exists());
    }

    #[test]
    fn test_metadata_tagging_appends_year_and_id() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("Alien");
        fs::create_dir(&dir).unwrap();
        fs::write(
            dir.join("movie.nfo"),
            "<movie><tmdbid>348</tmdbid><releasedate>1979-05-25</releasedate></movie>",
        )
        .unwrap();

        let mut tree = scan_and_validate(tmp.path());
        let plan = Renamer::plan_metadata_tags(&tree);
        let mut report = RunReport::new();
        Renamer::apply(&mut tree, &plan, &CancelToken::new(), &mut report);

        assert!(tmp.path().join("Alien (1979) [tmdbid=348]").exists());
        assert!(!dir.exists());
    }

    #[test]
    fn test_metadata_tagging_replaces_stale_year() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("Alien (1980)");
        fs::create_dir(&dir).unwrap();
        fs::write(
            dir.join("movie.nfo"),
            "<movie><tmdbid>348</tmdbid><releasedate>1979-05-25</releasedate></movie>",
        )
        .unwrap();

        let mut tree = scan_and_validate(tmp.path());
        let plan = Renamer::plan_metadata_tags(&tree);
        let mut report = RunReport::new();
        Renamer::apply(&mut tree, &plan, &CancelToken::new(), &mut report);

        assert!(tmp.path().join("Alien (1979) [tmdbid=348]").exists());
    }

    #[test]
    fn test_planning_does_not_touch_the_filesystem() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("Alien  (1979) [tmdbid=348]")).unwrap();

        let tree = scan_and_validate(tmp.path());
        let plan = Renamer::plan_bad_names(&tree);
        assert_eq!(plan.renames.len(), 1);
        // Dry run: nothing moved.
        assert!(tmp.path().join("Alien  (1979) [tmdbid=348]").exists());
    }
}
