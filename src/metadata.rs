//! Sidecar metadata cache.
//!
//! Directories in a media library commonly carry an `.nfo` sidecar file with
//! scraped metadata. This module reads the two fields the renamer needs — the
//! external database id and the release year — and caches the result per
//! directory so repeated validation passes touch each sidecar at most once.
//!
//! A directory with zero or more than one `.nfo` file, or with a sidecar
//! missing the required fields, is cached as a permanent negative: the
//! ambiguity will not resolve itself between passes.

use dashmap::DashMap;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

static TMDBID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<tmdbid>\s*([^<]*?)\s*</tmdbid>").expect("valid regex"));
static RELEASEDATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<releasedate>\s*([^<]*?)\s*</releasedate>").expect("valid regex"));
static PREMIERED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<premiered>\s*([^<]*?)\s*</premiered>").expect("valid regex"));

/// Metadata extracted from a directory's `.nfo` sidecar.
///
/// `valid` is false when the sidecar was missing, ambiguous, unreadable, or
/// lacked either required field; the other fields are empty in that case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    /// Canonical database URL built from the external id.
    pub url: String,
    /// External database id (`<tmdbid>`).
    pub external_id: String,
    /// Four-digit release year, taken from `<releasedate>` (or `<premiered>`
    /// as a fallback) before the first `-`.
    pub year: String,
    /// Whether both required fields were present.
    pub valid: bool,
}

impl MetadataEntry {
    fn invalid() -> Self {
        Self {
            url: String::new(),
            external_id: String::new(),
            year: String::new(),
            valid: false,
        }
    }
}

/// Concurrent per-directory sidecar cache.
///
/// Lookups go through the map's entry API, so each directory's sidecar is
/// read and parsed at most once even under concurrent callers.
#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: DashMap<PathBuf, MetadataEntry>,
    #[cfg(test)]
    computes: std::sync::atomic::AtomicUsize,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of directories cached so far (including negatives).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up metadata for a directory, reading its `.nfo` sidecar on the
    /// first call and serving the cached entry afterwards.
    pub fn lookup(&self, dir: &Path) -> MetadataEntry {
        self.entries
            .entry(dir.to_path_buf())
            .or_insert_with(|| {
                #[cfg(test)]
                self.computes
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                Self::compute(dir)
            })
            .clone()
    }

    /// How many sidecar parses have actually run, as opposed to cache hits.
    #[cfg(test)]
    fn computes(&self) -> usize {
        self.computes.load(std::sync::atomic::Ordering::Relaxed)
    }

    fn compute(dir: &Path) -> MetadataEntry {
        let Some(sidecar) = Self::sole_sidecar(dir) else {
            debug!(dir = %dir.display(), "no unambiguous .nfo sidecar");
            return MetadataEntry::invalid();
        };

        let content = match fs::read_to_string(&sidecar) {
            Ok(content) => content,
            Err(e) => {
                debug!(sidecar = %sidecar.display(), error = %e, "unreadable sidecar");
                return MetadataEntry::invalid();
            }
        };

        let id = TMDBID_RE
            .captures(&content)
            .map(|c| c[1].to_string())
            .unwrap_or_default();

        // <releasedate> wins; <premiered> is the scraper's older spelling.
        let date = RELEASEDATE_RE
            .captures(&content)
            .or_else(|| PREMIERED_RE.captures(&content))
            .map(|c| c[1].to_string())
            .unwrap_or_default();

        // Dates are YYYY-MM-DD; the year is everything before the first dash.
        let year = date.split('-').next().unwrap_or("").trim().to_string();

        if id.is_empty() || year.is_empty() {
            debug!(sidecar = %sidecar.display(), "sidecar missing id or release date");
            return MetadataEntry::invalid();
        }

        MetadataEntry {
            url: format!("https://themoviedb.org/movie/{}", id),
            external_id: id,
            year,
            valid: true,
        }
    }

    /// Returns the directory's single `.nfo` file, or `None` when there are
    /// zero or several.
    fn sole_sidecar(dir: &Path) -> Option<PathBuf> {
        let entries = fs::read_dir(dir).ok()?;
        let mut found: Option<PathBuf> = None;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let is_nfo = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("nfo"));
            if is_nfo {
                if found.is_some() {
                    return None;
                }
                found = Some(path);
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_nfo(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_lookup_reads_id_and_year() {
        let dir = tempfile::tempdir().unwrap();
        write_nfo(
            dir.path(),
            "movie.nfo",
            "<movie><tmdbid>348</tmdbid><releasedate>1979-05-25</releasedate></movie>",
        );

        let cache = MetadataCache::new();
        let entry = cache.lookup(dir.path());
        assert!(entry.valid);
        assert_eq!(entry.external_id, "348");
        assert_eq!(entry.year, "1979");
        assert_eq!(entry.url, "https://themoviedb.org/movie/348");
    }

    #[test]
    fn test_premiered_is_a_fallback_for_releasedate() {
        let dir = tempfile::tempdir().unwrap();
        write_nfo(
            dir.path(),
            "movie.nfo",
            "<movie><tmdbid>603</tmdbid><premiered>1999-03-31</premiered></movie>",
        );

        let cache = MetadataCache::new();
        let entry = cache.lookup(dir.path());
        assert!(entry.valid);
        assert_eq!(entry.year, "1999");
    }

    #[test]
    fn test_no_sidecar_is_a_cached_negative() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MetadataCache::new();

        let entry = cache.lookup(dir.path());
        assert!(!entry.valid);

        // Adding a sidecar afterwards does not change the cached answer.
        write_nfo(
            dir.path(),
            "movie.nfo",
            "<movie><tmdbid>1</tmdbid><releasedate>2000-01-01</releasedate></movie>",
        );
        assert!(!cache.lookup(dir.path()).valid);
    }

    #[test]
    fn test_multiple_sidecars_are_ambiguous() {
        let dir = tempfile::tempdir().unwrap();
        write_nfo(
            dir.path(),
            "movie.nfo",
            "<movie><tmdbid>1</tmdbid><releasedate>2000-01-01</releasedate></movie>",
        );
        write_nfo(
            dir.path(),
            "other.nfo",
            "<movie><tmdbid>2</tmdbid><releasedate>2001-01-01</releasedate></movie>",
        );

        let cache = MetadataCache::new();
        assert!(!cache.lookup(dir.path()).valid);
    }

    #[test]
    fn test_missing_id_or_date_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        write_nfo(dir.path(), "movie.nfo", "<movie><tmdbid>42</tmdbid></movie>");

        let cache = MetadataCache::new();
        assert!(!cache.lookup(dir.path()).valid);
    }

    #[test]
    fn test_lookup_is_computed_once() {
        let dir = tempfile::tempdir().unwrap();
        write_nfo(
            dir.path(),
            "movie.nfo",
            "<movie><tmdbid>348</tmdbid><releasedate>1979-05-25</releasedate></movie>",
        );

        let cache = MetadataCache::new();
        let first = cache.lookup(dir.path());

        // Rewriting the sidecar after the first lookup has no effect.
        write_nfo(
            dir.path(),
            "movie.nfo",
            "<movie><tmdbid>999</tmdbid><releasedate>2020-01-01</releasedate></movie>",
        );
        let second = cache.lookup(dir.path());
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.computes(), 1);
    }

    #[test]
    fn test_concurrent_lookups_parse_a_sidecar_once() {
        use std::sync::{Arc, Barrier};
        use std::thread;

        let dir = tempfile::tempdir().unwrap();
        write_nfo(
            dir.path(),
            "movie.nfo",
            "<movie><tmdbid>348</tmdbid><releasedate>1979-05-25</releasedate></movie>",
        );

        let cache = Arc::new(MetadataCache::new());
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                let path = dir.path().to_path_buf();
                thread::spawn(move || {
                    barrier.wait();
                    cache.lookup(&path)
                })
            })
            .collect();

        let entries: Vec<MetadataEntry> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(entries[0], entries[1]);
        assert!(entries[0].valid);
        assert_eq!(entries[0].external_id, "348");
        // The entry lock serializes the two racing callers onto one parse.
        assert_eq!(cache.computes(), 1);
    }
}
