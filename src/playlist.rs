//! M3U playlist reconciliation.
//!
//! After a library has been renamed, playlists still point at the old paths.
//! This pass rewrites each playlist's references in place: every reference
//! line is percent-decoded, resolved against the files that actually exist,
//! and percent-encoded back. `#EXTINF` directive lines keep their pairing
//! with the reference line that follows them.
//!
//! Resolution chain per reference, first hit wins:
//! 1. the path as written still exists;
//! 2. the path with the ordinal prefix (`NN - `) stripped from its file name
//!    exists;
//! 3. a media file with the same file name (original or stripped) or the
//!    same stem exists somewhere under the playlist's parent directory.
//!
//! A reference that resolves nowhere is written back unchanged. The new
//! content is computed fully in memory; only when it differs is the old file
//! moved to a single-generation `.bak` and the new one written.

use crate::progress::CancelToken;
use crate::report::{Outcome, RunReport};
use crate::tree::{NodeId, NodeKind, Tree};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Characters escaped when writing references back. `/` stays literal so
/// relative paths remain readable.
const PATH_ESCAPE: &AsciiSet = &CONTROLS.add(b' ').add(b'%').add(b'#').add(b'?');

static ORDINAL_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\s*-\s*").expect("valid regex"));

const MARKER: &str = "#EXTM3U";

#[derive(Debug)]
pub enum PlaylistError {
    IoError(String),
}

impl std::fmt::Display for PlaylistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaylistError::IoError(msg) => write!(f, "IO error rewriting playlist: {}", msg),
        }
    }
}

impl std::error::Error for PlaylistError {}

/// Tallies from one playlist pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RewriteSummary {
    pub rewritten: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Rewrites every playlist in the tree. One playlist failing (unreadable,
/// unwritable) is reported and the pass continues with the next.
pub fn rewrite_all(tree: &Tree, cancel: &CancelToken, report: &mut RunReport) -> RewriteSummary {
    let mut summary = RewriteSummary::default();

    for id in tree.preorder() {
        if cancel.is_cancelled() {
            break;
        }
        if tree.node(id).kind != NodeKind::PlaylistFile {
            continue;
        }
        let path = tree.node(id).abs_path.clone();
        match rewrite_playlist(tree, id) {
            Ok(true) => {
                summary.rewritten += 1;
                report.record(&path, Outcome::RenamedOk);
            }
            Ok(false) => {
                summary.unchanged += 1;
                report.record(&path, Outcome::Skipped);
            }
            Err(e) => {
                warn!(playlist = %path.display(), error = %e, "playlist rewrite failed");
                summary.failed += 1;
                report.record(&path, Outcome::Failed(e.to_string()));
            }
        }
    }
    summary
}

/// Rewrites a single playlist node. Returns whether the content changed.
fn rewrite_playlist(tree: &Tree, playlist: NodeId) -> Result<bool, PlaylistError> {
    let node = tree.node(playlist);
    let path = &node.abs_path;
    let playlist_dir = path.parent().unwrap_or(tree.root_path()).to_path_buf();

    let content = fs::read_to_string(path).map_err(|e| PlaylistError::IoError(e.to_string()))?;
    let siblings = sibling_media(tree, playlist);

    let mut lines: Vec<String> = Vec::new();
    let mut changed = false;

    let has_marker = content
        .lines()
        .find(|line| !line.trim().is_empty())
        .is_some_and(|line| line.trim() == MARKER);
    if !has_marker {
        lines.push(MARKER.to_string());
        changed = true;
    }

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            // Marker, #EXTINF directives, comments: passed through. The
            // directive's pairing with the next reference line is preserved
            // because reference lines are rewritten in place.
            lines.push(line.to_string());
            continue;
        }

        let decoded = percent_decode_str(trimmed).decode_utf8_lossy().into_owned();
        let resolved = resolve_reference(&playlist_dir, &siblings, &decoded);
        let encoded = utf8_percent_encode(&resolved, PATH_ESCAPE).to_string();
        if encoded != trimmed {
            changed = true;
        }
        lines.push(encoded);
    }

    if !changed {
        return Ok(false);
    }

    let new_content = format!("{}\n", lines.join("\n"));

    // Single-generation backup: the previous .bak, if any, is replaced.
    let leaf = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let backup = path.with_file_name(format!("{}.bak", leaf));
    if backup.exists() {
        fs::remove_file(&backup).map_err(|e| PlaylistError::IoError(e.to_string()))?;
    }
    fs::rename(path, &backup).map_err(|e| PlaylistError::IoError(e.to_string()))?;
    fs::write(path, new_content).map_err(|e| PlaylistError::IoError(e.to_string()))?;
    debug!(playlist = %path.display(), "playlist rewritten");
    Ok(true)
}

/// All media files under the playlist's parent directory, for the fallback
/// search.
fn sibling_media(tree: &Tree, playlist: NodeId) -> Vec<PathBuf> {
    let Some(parent) = tree.node(playlist).parent else {
        return Vec::new();
    };
    let mut media = Vec::new();
    let mut stack = vec![parent];
    while let Some(id) = stack.pop() {
        for child in tree.node(id).children.iter().copied() {
            let node = tree.node(child);
            match node.kind {
                NodeKind::MediaFile => media.push(node.abs_path.clone()),
                NodeKind::Directory => stack.push(child),
                _ => {}
            }
        }
    }
    media
}

/// Resolves one decoded reference. Returns the (decoded) reference to write,
/// which is the input itself when nothing better is found.
fn resolve_reference(playlist_dir: &Path, siblings: &[PathBuf], reference: &str) -> String {
    // 1. The reference is still valid as written.
    if playlist_dir.join(reference).exists() {
        return reference.to_string();
    }

    let as_path = Path::new(reference);
    let file_name = as_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    // 2. Retry with the ordinal prefix stripped off the file name.
    let stripped = ORDINAL_PREFIX_RE.replace(&file_name, "").into_owned();
    if stripped != file_name {
        let retry = match as_path.parent() {
            Some(parent) if parent != Path::new("") => parent.join(&stripped),
            _ => PathBuf::from(&stripped),
        };
        if playlist_dir.join(&retry).exists() {
            return retry.to_string_lossy().into_owned();
        }
    }

    // 3. Search the sibling media for a matching file name or stem.
    let stem = Path::new(&file_name)
        .file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    for sibling in siblings {
        let sibling_name = sibling
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let sibling_stem = sibling
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let hit = sibling_name == file_name
            || sibling_name == stripped
            || (!stem.is_empty() && sibling_stem == stem);
        if hit {
            let rel = sibling
                .strip_prefix(playlist_dir)
                .map(|rel| rel.to_string_lossy().into_owned())
                .unwrap_or_else(|_| sibling.to_string_lossy().into_owned());
            return rel;
        }
    }

    // Nothing resolved: a missing movie is a library problem, not ours.
    debug!(reference, "playlist reference did not resolve");
    reference.to_string()
}
