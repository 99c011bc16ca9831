//! Filesystem scanning into an in-memory [`Tree`].
//!
//! The scan walks a root directory depth-first, prunes skipped subtrees,
//! classifies accepted files by the configured filters, and builds the node
//! arena that every later pass (validation, renaming, mirror sync) operates
//! on. The walk is sequential; an optional parallel pre-count provides the
//! progress total up front.

use crate::config::ScanFilter;
use crate::progress::{CancelToken, Progress};
use crate::tree::{NodeKind, Tree};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Errors that abort a scan before it produces any tree.
#[derive(Debug)]
pub enum ScanError {
    /// The scan root does not exist or is not a directory.
    InvalidRoot(PathBuf),
    /// The root could not be read at all.
    IoError(String),
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::InvalidRoot(path) => {
                write!(f, "Scan root is not a directory: {}", path.display())
            }
            ScanError::IoError(msg) => write!(f, "IO error while scanning: {}", msg),
        }
    }
}

impl std::error::Error for ScanError {}

/// Result of a scan: the tree plus bookkeeping about how the walk ended.
pub struct ScanOutcome {
    pub tree: Tree,
    /// File nodes inserted into the tree.
    pub files: u64,
    /// True when the walk stopped early on a cancellation request. The tree
    /// holds everything accepted up to that point.
    pub cancelled: bool,
}

/// Directory walker configured with compiled scan filters.
pub struct Scanner<'a> {
    filter: &'a ScanFilter,
}

impl<'a> Scanner<'a> {
    pub fn new(filter: &'a ScanFilter) -> Self {
        Self { filter }
    }

    /// Counts the entries a scan of `root` would visit, for use as the
    /// progress total. Read-only; each top-level subtree is counted on its
    /// own worker.
    pub fn count_entries(&self, root: &Path) -> u64 {
        let Ok(entries) = fs::read_dir(root) else {
            return 0;
        };
        let children: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                let leaf = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                !self.filter.skips(&leaf)
            })
            .collect();

        children
            .par_iter()
            .map(|child| {
                if child.is_dir() {
                    WalkDir::new(child)
                        .follow_links(false)
                        .into_iter()
                        .filter_entry(|entry| {
                            !self.filter.skips(&entry.file_name().to_string_lossy())
                        })
                        .filter_map(Result::ok)
                        .count() as u64
                } else {
                    1
                }
            })
            .sum()
    }

    /// Walks `root` and builds the tree.
    ///
    /// Skipped entries prune their whole subtree. Unreadable entries are
    /// logged and skipped; only an unusable root fails the scan. Symlinked
    /// files are never followed. The cancel token is checked on every entry;
    /// on cancellation the partial tree built so far is returned as-is.
    ///
    /// # Errors
    ///
    /// Returns `ScanError::InvalidRoot` when `root` is missing or not a
    /// directory.
    pub fn scan(
        &self,
        root: &Path,
        cancel: &CancelToken,
        progress: Option<Progress<'_>>,
        total: Option<u64>,
    ) -> Result<ScanOutcome, ScanError> {
        if !root.is_dir() {
            return Err(ScanError::InvalidRoot(root.to_path_buf()));
        }

        let mut tree = Tree::new(root);
        let mut files = 0u64;
        let mut visited = 0u64;
        let mut cancelled = false;

        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                let leaf = entry.file_name().to_string_lossy();
                if self.filter.skips(&leaf) {
                    debug!(path = %entry.path().display(), "skipping subtree");
                    false
                } else {
                    true
                }
            });

        for entry in walker {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "unreadable entry, skipping");
                    continue;
                }
            };

            visited += 1;
            if let Some(report) = progress {
                report(visited, total);
            }

            let path = entry.path();
            if entry.file_type().is_dir() {
                tree.ensure_dir(path);
                continue;
            }
            if entry.path_is_symlink() {
                debug!(path = %path.display(), "symlinked file, skipping");
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }

            let leaf = entry.file_name().to_string_lossy();
            let kind = if self.filter.is_playlist(&leaf) {
                NodeKind::PlaylistFile
            } else if self.filter.is_media(&leaf) {
                NodeKind::MediaFile
            } else {
                NodeKind::LeafFile
            };

            let parent_abs = path.parent().unwrap_or(root).to_path_buf();
            let parent = tree.ensure_dir(&parent_abs);
            tree.insert(parent, path.to_path_buf(), kind);
            files += 1;
        }

        Ok(ScanOutcome {
            tree,
            files,
            cancelled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use crate::tree::NodeKind;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("Alien (1979) [tmdbid=348]")).unwrap();
        fs::write(
            root.join("Alien (1979) [tmdbid=348]/Alien.mkv"),
            b"",
        )
        .unwrap();
        fs::write(
            root.join("Alien (1979) [tmdbid=348]/movie.nfo"),
            b"<movie/>",
        )
        .unwrap();
        fs::create_dir_all(root.join("Extras")).unwrap();
        fs::write(root.join("Extras/bonus.mkv"), b"").unwrap();
        fs::write(root.join("favorites.m3u"), b"#EXTM3U\n").unwrap();
        dir
    }

    #[test]
    fn test_scan_builds_tree_with_kinds() {
        let dir = fixture();
        let filter = ScanConfig::default().compile().unwrap();
        let scanner = Scanner::new(&filter);
        let outcome = scanner
            .scan(dir.path(), &CancelToken::new(), None, None)
            .unwrap();

        let tree = &outcome.tree;
        let movie = tree
            .lookup("Alien (1979) [tmdbid=348]/Alien.mkv")
            .expect("media file scanned");
        assert_eq!(tree.node(movie).kind, NodeKind::MediaFile);

        let nfo = tree
            .lookup("Alien (1979) [tmdbid=348]/movie.nfo")
            .expect("sidecar scanned");
        assert_eq!(tree.node(nfo).kind, NodeKind::LeafFile);

        let playlist = tree.lookup("favorites.m3u").expect("playlist scanned");
        assert_eq!(tree.node(playlist).kind, NodeKind::PlaylistFile);
        assert_eq!(outcome.files, 3);
        assert!(!outcome.cancelled);
    }

    #[test]
    fn test_skip_substring_prunes_whole_subtree() {
        let dir = fixture();
        let filter = ScanConfig::default().compile().unwrap();
        let scanner = Scanner::new(&filter);
        let outcome = scanner
            .scan(dir.path(), &CancelToken::new(), None, None)
            .unwrap();

        assert!(outcome.tree.lookup("Extras").is_none());
        assert!(outcome.tree.lookup("Extras/bonus.mkv").is_none());
    }

    #[test]
    fn test_invalid_root_fails_fast() {
        let filter = ScanConfig::default().compile().unwrap();
        let scanner = Scanner::new(&filter);
        let result = scanner.scan(
            Path::new("/nonexistent/library"),
            &CancelToken::new(),
            None,
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_pre_cancelled_scan_returns_partial_tree() {
        let dir = fixture();
        let filter = ScanConfig::default().compile().unwrap();
        let scanner = Scanner::new(&filter);
        let token = CancelToken::new();
        token.cancel();

        let outcome = scanner.scan(dir.path(), &token, None, None).unwrap();
        assert!(outcome.cancelled);
        assert!(outcome.tree.is_empty());
    }

    #[test]
    fn test_cancel_mid_scan_keeps_accepted_entries() {
        let dir = fixture();
        let filter = ScanConfig::default().compile().unwrap();
        let scanner = Scanner::new(&filter);
        let token = CancelToken::new();

        // Cancel from inside the progress callback after the first entry.
        let trip = token.clone();
        let progress: Progress<'_> = &move |current, _| {
            if current >= 1 {
                trip.cancel();
            }
        };
        let outcome = scanner.scan(dir.path(), &token, Some(progress), None).unwrap();
        assert!(outcome.cancelled);
        // Whatever was accepted before the stop is still in the tree, and
        // nothing appears twice.
        let mut keys: Vec<String> = outcome
            .tree
            .ids()
            .map(|id| outcome.tree.node(id).rel_path.clone())
            .collect();
        let before = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), before);
    }

    #[test]
    fn test_count_entries_matches_walk() {
        let dir = fixture();
        let filter = ScanConfig::default().compile().unwrap();
        let scanner = Scanner::new(&filter);

        let counted = scanner.count_entries(dir.path());
        // One movie dir + two files inside + one playlist; Extras is pruned.
        assert_eq!(counted, 4);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_file_is_skipped() {
        let dir = fixture();
        std::os::unix::fs::symlink(
            dir.path().join("Alien (1979) [tmdbid=348]/Alien.mkv"),
            dir.path().join("link.mkv"),
        )
        .unwrap();

        let filter = ScanConfig::default().compile().unwrap();
        let scanner = Scanner::new(&filter);
        let outcome = scanner
            .scan(dir.path(), &CancelToken::new(), None, None)
            .unwrap();
        assert!(outcome.tree.lookup("link.mkv").is_none());
    }
}
